use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::auth::permissions::ROLE_DEFS;
use crate::auth::repo_types::{Role, User};

const USER_COLUMNS: &str = "id, email, name, location, about_me, member_since, last_seen, role_id, password_hash, confirmed";

impl User {
    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new unconfirmed user with a hashed password.
    pub async fn create(
        db: &PgPool,
        email: &str,
        name: &str,
        password_hash: &str,
        role_id: i32,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, name, password_hash, role_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .bind(role_id)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// One-way transition: unconfirmed -> confirmed.
    pub async fn set_confirmed(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET confirmed = true WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn set_password_hash(db: &PgPool, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Touch last_seen. Runs on every authenticated request; one write per
    /// request is the accepted cost.
    pub async fn ping(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET last_seen = now() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY member_since"
        ))
        .fetch_all(db)
        .await?;
        Ok(users)
    }
}

impl Role {
    pub async fn find_by_id(db: &PgPool, id: i32) -> anyhow::Result<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT id, name, is_default, permissions FROM roles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(role)
    }

    pub async fn find_by_name(db: &PgPool, name: &str) -> anyhow::Result<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT id, name, is_default, permissions FROM roles WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(db)
        .await?;
        Ok(role)
    }

    /// The role handed to fresh registrations.
    pub async fn default_role(db: &PgPool) -> anyhow::Result<Role> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT id, name, is_default, permissions FROM roles WHERE is_default = true",
        )
        .fetch_one(db)
        .await?;
        Ok(role)
    }

    /// Idempotent upsert of the built-in roles. Permission masks are written
    /// from scratch each run, so re-seeding never accumulates stale flags and
    /// never duplicates rows.
    pub async fn seed(db: &PgPool) -> anyhow::Result<()> {
        for def in ROLE_DEFS {
            sqlx::query(
                r#"
                INSERT INTO roles (name, is_default, permissions)
                VALUES ($1, $2, $3)
                ON CONFLICT (name) DO UPDATE
                    SET is_default = EXCLUDED.is_default,
                        permissions = EXCLUDED.permissions
                "#,
            )
            .bind(def.name)
            .bind(def.default)
            .bind(def.mask())
            .execute(db)
            .await?;
        }
        info!(roles = ROLE_DEFS.len(), "roles seeded");
        Ok(())
    }
}
