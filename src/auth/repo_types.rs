use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::permissions::Permissions;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub member_since: OffsetDateTime,
    pub last_seen: OffsetDateTime,
    pub role_id: i32,
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 PHC string, never exposed in JSON
    pub confirmed: bool,
}

/// Role record: a named permission mask. Exactly one role is the default
/// assigned at registration.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: i32,
    pub name: String,
    pub is_default: bool,
    pub permissions: Permissions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_json_never_leaks_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            email: "a@example.com".into(),
            name: "A".into(),
            location: None,
            about_me: None,
            member_since: OffsetDateTime::now_utc(),
            last_seen: OffsetDateTime::now_utc(),
            role_id: 1,
            password_hash: "$argon2id$v=19$secret".into(),
            confirmed: false,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("argon2id"));
    }
}
