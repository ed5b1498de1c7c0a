use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{error, info};

use crate::config::MailConfig;
use crate::state::AppState;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, text: &str, html: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        let sender: Mailbox = config.sender.parse()?;
        Ok(Self { transport, sender })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, text: &str, html: &str) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.sender.clone())
            .to(to.parse()?)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                text.to_string(),
                html.to_string(),
            ))?;
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Hand the actual network send to a detached task so the response never
/// waits on the mail server. Delivery failures are logged and dropped; there
/// is no retry and the original caller never learns of them.
pub fn dispatch(state: &AppState, to: String, subject: String, text: String, html: String) {
    let mailer = state.mailer.clone();
    let subject = format!("{} {}", state.config.mail.subject_prefix, subject);
    tokio::spawn(async move {
        match mailer.send(&to, &subject, &text, &html).await {
            Ok(()) => info!(to = %to, subject = %subject, "email sent"),
            Err(e) => error!(to = %to, error = %e, "email send failed"),
        }
    });
}

/// Text and HTML bodies for the account confirmation mail.
pub fn confirm_email_body(name: &str, token: &str) -> (String, String) {
    let text = format!(
        "Dear {name},\n\n\
         Welcome! To confirm your account please visit /auth/confirm/{token}\n\n\
         Sincerely,\nThe Userhub team\n\n\
         Note: replies to this email address are not monitored.\n"
    );
    let html = format!(
        "<p>Dear {name},</p>\
         <p>Welcome! To confirm your account please \
         <a href=\"/auth/confirm/{token}\">click here</a>.</p>\
         <p>Sincerely,<br>The Userhub team</p>\
         <p><small>Note: replies to this email address are not monitored.</small></p>"
    );
    (text, html)
}

/// Text and HTML bodies for the password reset mail.
pub fn reset_email_body(name: &str, token: &str) -> (String, String) {
    let text = format!(
        "Dear {name},\n\n\
         To reset your password please visit /auth/reset/{token}\n\n\
         If you have not requested a password reset simply ignore this message.\n\n\
         Sincerely,\nThe Userhub team\n"
    );
    let html = format!(
        "<p>Dear {name},</p>\
         <p>To reset your password \
         <a href=\"/auth/reset/{token}\">click here</a>.</p>\
         <p>If you have not requested a password reset simply ignore this message.</p>\
         <p>Sincerely,<br>The Userhub team</p>"
    );
    (text, html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_body_renders_both_variants_with_token() {
        let (text, html) = confirm_email_body("Alice", "tok123");
        assert!(text.contains("Dear Alice"));
        assert!(text.contains("/auth/confirm/tok123"));
        assert!(html.contains("<a href=\"/auth/confirm/tok123\">"));
    }

    #[test]
    fn reset_body_renders_both_variants_with_token() {
        let (text, html) = reset_email_body("Bob", "tok456");
        assert!(text.contains("/auth/reset/tok456"));
        assert!(html.contains("/auth/reset/tok456"));
        assert!(html.contains("Bob"));
    }
}
