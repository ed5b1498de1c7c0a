use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            LoginRequest, LoginResponse, MessageResponse, PublicUser, RegisterRequest,
            ResetPasswordRequest, ResetRequest,
        },
        extractors::{AuthUser, CurrentUser},
        password::{hash_password, verify_password},
        principal::Principal,
        repo_types::{Role, User},
        token::TokenSigner,
    },
    error::AppError,
    mailer,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/confirm/:token", get(confirm))
        .route("/auth/confirm/resend", post(resend_confirmation))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/reset", post(password_reset_request))
        .route("/auth/reset/:token", post(password_reset))
        .route("/auth/unconfirmed", get(unconfirmed))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/users/:id", get(get_profile))
        .route("/admin/users", get(list_users))
}

/// Emails are stored and compared exactly as typed; only surrounding
/// whitespace goes. `Foo@Bar.com` and `foo@bar.com` are distinct accounts.
fn normalize_email(email: &str) -> String {
    email.trim().to_string()
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// A valid token for some other account confirms nobody; the mismatch is
/// indistinguishable from a bad token to the caller.
fn ensure_token_subject(subject: Uuid, user_id: Uuid) -> Result<(), AppError> {
    if subject != user_id {
        warn!(user_id = %user_id, token_subject = %subject, "confirm token user mismatch");
        return Err(AppError::InvalidOrExpiredToken);
    }
    Ok(())
}

/// Post-login redirect target. Only same-origin relative paths pass; anything
/// absolute or external falls back to the landing page.
fn sanitize_next(next: Option<&str>) -> String {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        _ => "/".to_string(),
    }
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.email = normalize_email(&payload.email);

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("Name must not be empty".into()));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(AppError::Validation("Password too short".into()));
    }

    // Pre-check; the unique constraint on users.email is the real backstop.
    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::DuplicateEmail);
    }

    let hash = hash_password(&payload.password)?;

    let role = match &state.config.admin_email {
        Some(admin) if admin == &payload.email => {
            Role::find_by_name(&state.db, "Administrator")
                .await?
                .ok_or_else(|| anyhow::anyhow!("Administrator role missing"))?
        }
        _ => Role::default_role(&state.db).await?,
    };

    let user = User::create(&state.db, &payload.email, &payload.name, &hash, role.id).await?;

    let signer = TokenSigner::from_ref(&state);
    let token = signer.sign_confirm(user.id)?;
    let (text, html) = mailer::confirm_email_body(&user.name, &token);
    mailer::dispatch(
        &state,
        user.email.clone(),
        "Confirm your account".into(),
        text,
        html,
    );

    info!(user_id = %user.id, email = %user.email, role = %role.name, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(
            "A confirmation email has been sent to you by email.",
        )),
    ))
}

#[instrument(skip_all)]
pub async fn confirm(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    if user.confirmed {
        return Ok(Json(MessageResponse::new("Your account is already confirmed.")));
    }

    let signer = TokenSigner::from_ref(&state);
    let subject = signer
        .verify_confirm(&token)
        .map_err(|_| AppError::InvalidOrExpiredToken)?;
    ensure_token_subject(subject, user.id)?;

    User::set_confirmed(&state.db, user.id).await?;
    info!(user_id = %user.id, "account confirmed");
    Ok(Json(MessageResponse::new(
        "You have confirmed your account. Thanks!",
    )))
}

#[instrument(skip_all)]
pub async fn resend_confirmation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<MessageResponse>, AppError> {
    // Always issues a fresh token, confirmed or not.
    let signer = TokenSigner::from_ref(&state);
    let token = signer.sign_confirm(user.id)?;
    let (text, html) = mailer::confirm_email_body(&user.name, &token);
    mailer::dispatch(
        &state,
        user.email.clone(),
        "Confirm your account".into(),
        text,
        html,
    );
    info!(user_id = %user.id, "confirmation email resent");
    Ok(Json(MessageResponse::new(
        "A new confirmation email has been sent to you by email.",
    )))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    payload.email = normalize_email(&payload.email);

    // Unknown email and wrong password are indistinguishable to the caller.
    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(user) => user,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(AppError::InvalidCredentials);
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let signer = TokenSigner::from_ref(&state);
    let access_token = signer.sign_session(user.id, payload.remember)?;
    User::ping(&state.db, user.id).await?;

    let redirect = sanitize_next(payload.next.as_deref());
    info!(user_id = %user.id, email = %user.email, remember = payload.remember, "user logged in");
    Ok(Json(LoginResponse {
        access_token,
        redirect,
        user: PublicUser::from(&user),
    }))
}

#[instrument(skip_all)]
pub async fn logout(AuthUser(user_id): AuthUser) -> Json<MessageResponse> {
    // Sessions live in the token; the client drops it and is out.
    info!(user_id = %user_id, "user logged out");
    Json(MessageResponse::new("You have been logged out."))
}

#[instrument(skip_all)]
pub async fn password_reset_request(
    State(state): State<AppState>,
    principal: Principal,
    Json(mut payload): Json<ResetRequest>,
) -> Result<axum::response::Response, AppError> {
    // Logged-in callers have no business resetting a forgotten password.
    if principal.user().is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    payload.email = normalize_email(&payload.email);

    // Tells the caller whether the address is registered. Kept as-is; see
    // DESIGN.md on the enumeration tradeoff.
    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| AppError::NotFound("Email is not registered".into()))?;

    let signer = TokenSigner::from_ref(&state);
    let token = signer.sign_reset(user.id)?;
    let (text, html) = mailer::reset_email_body(&user.name, &token);
    mailer::dispatch(
        &state,
        user.email.clone(),
        "Reset your password".into(),
        text,
        html,
    );
    info!(user_id = %user.id, "password reset requested");
    Ok(Json(MessageResponse::new(
        "An email with instructions to reset your password has been sent to you.",
    ))
    .into_response())
}

#[instrument(skip_all)]
pub async fn password_reset(
    State(state): State<AppState>,
    principal: Principal,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<axum::response::Response, AppError> {
    if principal.user().is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    if payload.password.len() < 8 {
        return Err(AppError::Validation("Password too short".into()));
    }

    let signer = TokenSigner::from_ref(&state);
    let subject = signer
        .verify_reset(&token)
        .map_err(|_| AppError::InvalidOrExpiredToken)?;

    let user = User::find_by_id(&state.db, subject)
        .await?
        .ok_or(AppError::InvalidOrExpiredToken)?;

    let hash = hash_password(&payload.password)?;
    User::set_password_hash(&state.db, user.id, &hash).await?;
    info!(user_id = %user.id, "password reset");
    Ok(Json(MessageResponse::new("Your password has been updated.")).into_response())
}

#[instrument(skip_all)]
pub async fn unconfirmed(principal: Principal) -> axum::response::Response {
    match principal.user() {
        Some(user) if !user.confirmed => Json(MessageResponse::new(
            "You have not confirmed your account yet. Check your inbox for the \
             confirmation email, or request a new one.",
        ))
        .into_response(),
        _ => Redirect::to("/").into_response(),
    }
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(PublicUser::from(&user))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, AppError> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(PublicUser::from(&user)))
}

/// Admin-gated listing; the capability guard runs before any data access.
#[instrument(skip(state, principal))]
pub async fn list_users(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    principal.authorize_admin()?;
    let users = User::list(&state.db).await?;
    Ok(Json(users.iter().map(PublicUser::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;

    fn make_signer() -> TokenSigner {
        TokenSigner::new(&TokenConfig {
            secret: "test-secret".into(),
            confirm_ttl_seconds: 3600,
            session_ttl_minutes: 5,
            remember_ttl_minutes: 60,
        })
    }

    #[test]
    fn normalize_email_trims_but_keeps_case() {
        assert_eq!(normalize_email("  Foo@Bar.com "), "Foo@Bar.com");
        assert_eq!(normalize_email("foo@bar.com"), "foo@bar.com");
        assert_ne!(normalize_email("Foo@Bar.com"), normalize_email("foo@bar.com"));
    }

    #[test]
    fn confirm_token_for_one_user_never_confirms_another() {
        let signer = make_signer();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        let token = signer.sign_confirm(user_a).expect("sign confirm");
        let subject = signer.verify_confirm(&token).expect("token itself is valid");
        assert_eq!(subject, user_a);
        // The subject check is what the confirm handler runs before any write.
        let err = ensure_token_subject(subject, user_b).unwrap_err();
        assert!(matches!(err, AppError::InvalidOrExpiredToken));
        assert!(ensure_token_subject(subject, user_a).is_ok());
    }

    #[test]
    fn sanitize_next_accepts_relative_paths() {
        assert_eq!(sanitize_next(Some("/secret-page")), "/secret-page");
        assert_eq!(sanitize_next(Some("/users/42?tab=posts")), "/users/42?tab=posts");
    }

    #[test]
    fn sanitize_next_rejects_external_urls() {
        assert_eq!(sanitize_next(Some("http://evil.example/phish")), "/");
        assert_eq!(sanitize_next(Some("https://evil.example")), "/");
        assert_eq!(sanitize_next(Some("//evil.example")), "/");
        assert_eq!(sanitize_next(Some("javascript:alert(1)")), "/");
        assert_eq!(sanitize_next(None), "/");
    }

    #[test]
    fn email_regex_accepts_and_rejects() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("user.name+tag@sub.example.org"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("spaces in@example.com"));
    }

    #[test]
    fn login_failures_share_one_error_value() {
        // Both causes collapse to the same variant, so the serialized
        // outcome cannot distinguish them.
        let unknown_email = AppError::InvalidCredentials;
        let wrong_password = AppError::InvalidCredentials;
        assert_eq!(unknown_email.to_string(), wrong_password.to_string());
    }
}
