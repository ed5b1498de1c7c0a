use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use sqlx::PgPool;
use tracing::{error, warn};
use uuid::Uuid;

use crate::auth::permissions::Permissions;
use crate::auth::principal::Principal;
use crate::auth::repo_types::{Role, User};
use crate::auth::token::TokenSigner;
use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
}

/// Extracts and validates the session token, returning the user ID.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenSigner: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let signer = TokenSigner::from_ref(state);
        let token = bearer_token(&parts.headers).ok_or((
            StatusCode::UNAUTHORIZED,
            "Missing Authorization header".to_string(),
        ))?;

        match signer.verify_session(token) {
            Ok(user_id) => Ok(AuthUser(user_id)),
            Err(_) => {
                warn!("invalid or expired session token");
                Err((
                    StatusCode::UNAUTHORIZED,
                    "Invalid or expired token".to_string(),
                ))
            }
        }
    }
}

/// Session-stored id -> full principal. The single resolver for the whole
/// application; both the extractor and the per-request gate go through it.
pub async fn resolve_principal(db: &PgPool, user_id: Uuid) -> anyhow::Result<Principal> {
    let Some(user) = User::find_by_id(db, user_id).await? else {
        return Ok(Principal::Anonymous);
    };
    let permissions = Role::find_by_id(db, user.role_id)
        .await?
        .map(|role| role.permissions)
        .unwrap_or(Permissions::empty());
    Ok(Principal::Authenticated { user, permissions })
}

/// Resolves the caller into a principal without rejecting: requests with no
/// or invalid credentials come out as `Anonymous`.
#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let signer = TokenSigner::from_ref(&app);
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(Principal::Anonymous);
        };
        let Ok(user_id) = signer.verify_session(token) else {
            return Ok(Principal::Anonymous);
        };
        resolve_principal(&app.db, user_id).await.map_err(|e| {
            error!(error = %e, "resolve principal failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        })
    }
}

/// The authenticated caller's full user row.
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
    TokenSigner: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let AuthUser(user_id) = AuthUser::from_request_parts(parts, state).await?;
        let user = User::find_by_id(&app.db, user_id)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user_id, "load current user failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            })?
            .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;
        Ok(CurrentUser(user))
    }
}

/// Runs before every route. Authenticated requests touch last_seen; an
/// authenticated but unconfirmed account is bounced to the unconfirmed
/// notice unless it is asking for the auth area or the health probe.
pub async fn confirmation_gate(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let signer = TokenSigner::from_ref(&state);
    let user_id = bearer_token(req.headers()).and_then(|t| signer.verify_session(t).ok());

    if let Some(user_id) = user_id {
        if let Err(e) = User::ping(&state.db, user_id).await {
            error!(error = %e, user_id = %user_id, "ping failed");
        }
        let path = req.uri().path();
        if !path.starts_with("/auth") && path != "/health" {
            match User::find_by_id(&state.db, user_id).await {
                Ok(Some(user)) if !user.confirmed => {
                    return Redirect::to("/auth/unconfirmed").into_response();
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, user_id = %user_id, "gate lookup failed"),
            }
        }
    }

    next.run(req).await
}
