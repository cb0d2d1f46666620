use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

use crate::config::{AppConfig, SmtpConfig};

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("failed to build email message: {0}")]
    MessageBuild(String),
    #[error("failed to send email: {0}")]
    SendFailed(String),
    #[error("mail configuration error: {0}")]
    Config(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends the link that carries a plaintext password reset token.
    async fn send_password_reset(&self, to_email: &str, reset_url: &str) -> Result<(), MailError>;
}

/// Logs outgoing mail instead of sending it. Used when SMTP is not configured.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, to_email: &str, reset_url: &str) -> Result<(), MailError> {
        tracing::info!(to = %to_email, %reset_url, "password reset email (not sent, SMTP disabled)");
        Ok(())
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> Result<Self, MailError> {
        let credentials = Credentials::new(cfg.username.clone(), cfg.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            .map_err(|e| MailError::Config(format!("SMTP starttls error: {}", e)))?
            .port(cfg.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from: format!("{} <{}>", cfg.from_name, cfg.from_email),
        })
    }
}

pub(crate) fn reset_email_body(reset_url: &str) -> String {
    format!(
        "You are receiving this email because a password reset was requested for your account.\n\
         Please make a PUT request to:\n\n{}\n\n\
         If you did not request it, ignore this email; the link expires shortly.",
        reset_url
    )
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_password_reset(&self, to_email: &str, reset_url: &str) -> Result<(), MailError> {
        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| MailError::MessageBuild(format!("invalid from address: {}", e)))?,
            )
            .to(to_email
                .parse()
                .map_err(|e| MailError::MessageBuild(format!("invalid to address: {}", e)))?)
            .subject("Password reset token")
            .header(ContentType::TEXT_PLAIN)
            .body(reset_email_body(reset_url))
            .map_err(|e| MailError::MessageBuild(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| MailError::SendFailed(e.to_string()))?;

        tracing::info!(to = %to_email, "password reset email sent");
        Ok(())
    }
}

pub fn create_mailer(config: &AppConfig) -> Arc<dyn Mailer> {
    match &config.smtp {
        Some(smtp) => match SmtpMailer::new(smtp) {
            Ok(mailer) => {
                tracing::info!(host = %smtp.host, "using SMTP mailer");
                Arc::new(mailer)
            }
            Err(e) => {
                tracing::warn!(error = %e, "SMTP mailer init failed; falling back to log mailer");
                Arc::new(LogMailer)
            }
        },
        None => {
            tracing::info!("SMTP not configured; reset emails will only be logged");
            Arc::new(LogMailer)
        }
    }
}
