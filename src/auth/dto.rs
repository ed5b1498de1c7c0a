use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::User;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// Request body for login. `next` is the originally requested page, echoed
/// back as the redirect target when it is a safe relative path.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
    pub next: Option<String>,
}

/// Request body for asking for a password reset mail.
#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

/// Request body for setting a new password via a reset token.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

/// Response returned after a successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub redirect: String,
    pub user: PublicUser,
}

/// Public part of the user returned to clients.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub location: Option<String>,
    pub about_me: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub member_since: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
    pub confirmed: bool,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            location: user.location.clone(),
            about_me: user.about_me.clone(),
            member_since: user.member_since,
            last_seen: user.last_seen,
            confirmed: user.confirmed,
        }
    }
}

/// Plain message payload for outcomes that only need a notice.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_user_serializes_expected_fields() {
        let user = User {
            id: Uuid::new_v4(),
            email: "test@example.com".into(),
            name: "Test".into(),
            location: Some("Porto".into()),
            about_me: None,
            member_since: OffsetDateTime::now_utc(),
            last_seen: OffsetDateTime::now_utc(),
            role_id: 1,
            password_hash: "secret-hash".into(),
            confirmed: true,
        };
        let json = serde_json::to_string(&PublicUser::from(&user)).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("member_since"));
        assert!(!json.contains("secret-hash"));
    }

    #[test]
    fn login_request_remember_defaults_to_false() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"email":"a@b.c","password":"pw"}"#).unwrap();
        assert!(!req.remember);
        assert!(req.next.is_none());
    }
}
