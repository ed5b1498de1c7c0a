use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub secret: String,
    pub confirm_ttl_seconds: i64,
    pub session_ttl_minutes: i64,
    pub remember_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub sender: String,
    pub subject_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub admin_email: Option<String>,
    pub token: TokenConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let token = TokenConfig {
            secret: std::env::var("SECRET_KEY")?,
            confirm_ttl_seconds: std::env::var("CONFIRM_TOKEN_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(3600),
            session_ttl_minutes: std::env::var("SESSION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            remember_ttl_minutes: std::env::var("REMEMBER_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 14),
        };
        let mail = MailConfig {
            server: std::env::var("MAIL_SERVER").unwrap_or_else(|_| "localhost".into()),
            port: std::env::var("MAIL_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(587),
            username: std::env::var("MAIL_USERNAME").unwrap_or_default(),
            password: std::env::var("MAIL_PASSWORD").unwrap_or_default(),
            sender: std::env::var("MAIL_SENDER")
                .unwrap_or_else(|_| "Userhub <noreply@userhub.local>".into()),
            subject_prefix: std::env::var("MAIL_SUBJECT_PREFIX")
                .unwrap_or_else(|_| "[Userhub]".into()),
        };
        Ok(Self {
            database_url,
            admin_email: std::env::var("ADMIN_EMAIL").ok(),
            token,
            mail,
        })
    }
}
