/// Email sending functionality
///
/// Delivery is optional: without SMTP configuration every send is skipped
/// with a warning so local development works without a mail server.
pub mod templates;

use crate::{
    config::EmailConfig,
    error::{AuthError, AuthResult},
};
use lettre::{
    message::{Message, MultiPart},
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use templates::EmailContent;

/// Email mailer service
#[derive(Clone)]
pub struct Mailer {
    from_address: Option<String>,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl Mailer {
    /// Create a new mailer; accepts smtp:// and smtps:// URLs with credentials
    pub fn new(config: Option<EmailConfig>) -> AuthResult<Self> {
        let Some(config) = config else {
            return Ok(Self::disabled());
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::from_url(&config.smtp_url)
            .map_err(|e| AuthError::Internal(format!("SMTP setup failed: {}", e)))?
            .build();

        Ok(Self {
            from_address: Some(config.from_address),
            transport: Some(transport),
        })
    }

    /// Mailer that logs and drops every message
    pub fn disabled() -> Self {
        Self {
            from_address: None,
            transport: None,
        }
    }

    pub async fn send_verification_code(
        &self,
        to: &str,
        name: &str,
        code: &str,
        ttl_minutes: i64,
    ) -> AuthResult<()> {
        self.send(to, templates::verification(name, code, ttl_minutes))
            .await
    }

    pub async fn send_password_reset_code(
        &self,
        to: &str,
        name: &str,
        code: &str,
        ttl_minutes: i64,
    ) -> AuthResult<()> {
        self.send(to, templates::password_reset(name, code, ttl_minutes))
            .await
    }

    pub async fn send_sign_in_code(
        &self,
        to: &str,
        name: &str,
        code: &str,
        ttl_minutes: i64,
    ) -> AuthResult<()> {
        self.send(to, templates::sign_in_code(name, code, ttl_minutes))
            .await
    }

    pub async fn send_welcome(&self, to: &str, name: &str, login_link: &str) -> AuthResult<()> {
        self.send(to, templates::welcome(name, login_link)).await
    }

    async fn send(&self, to: &str, content: EmailContent) -> AuthResult<()> {
        let (Some(transport), Some(from)) = (&self.transport, &self.from_address) else {
            tracing::warn!(subject = %content.subject, "Email not configured, skipping message");
            return Ok(());
        };

        let email = Message::builder()
            .from(
                from.parse()
                    .map_err(|e| AuthError::Internal(format!("Invalid from address: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| AuthError::Internal(format!("Invalid to address: {}", e)))?)
            .subject(content.subject.as_str())
            .multipart(MultiPart::alternative_plain_html(content.text, content.html))
            .map_err(|e| AuthError::Internal(format!("Failed to build email: {}", e)))?;

        transport
            .send(email)
            .await
            .map_err(|e| AuthError::Internal(format!("Failed to send email: {}", e)))?;

        tracing::info!(subject = %content.subject, "Sent email");
        Ok(())
    }

    /// Check if email is configured
    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }
}
