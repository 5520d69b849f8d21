use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::Notifier;
use crate::config::EmailConfig;
use crate::error::NotifyError;

/// SMTP notifier. The sender address is checked per send, so a missing
/// sender fails each dispatch instead of the whole process.
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Option<String>,
}

impl EmailNotifier {
    pub fn from_config(cfg: &EmailConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)
            .with_context(|| format!("invalid smtp_host {:?}", cfg.smtp_host))?
            .timeout(Some(std::time::Duration::from_secs(cfg.timeout_secs)));

        if let (Some(user), Some(pass)) = (&cfg.smtp_user, &cfg.smtp_pass) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        tracing::info!(
            host = %cfg.smtp_host,
            auth = cfg.smtp_user.is_some(),
            sender_set = cfg.from_address.is_some(),
            "email notifier configured"
        );

        Ok(Self {
            mailer: builder.build(),
            from: cfg.from_address.clone(),
        })
    }

    pub fn with_transport(mailer: AsyncSmtpTransport<Tokio1Executor>, from: Option<String>) -> Self {
        Self { mailer, from }
    }

    fn sender(&self) -> Result<Mailbox, NotifyError> {
        let raw = self
            .from
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| NotifyError::Configuration("from email address was not set".into()))?;
        raw.parse()
            .map_err(|_| NotifyError::Configuration(format!("invalid from address {raw:?}")))
    }

    fn build(&self, recipient: &str, subject: &str, body: &str) -> Result<Message, NotifyError> {
        let from = self.sender()?;
        let to: Mailbox = recipient
            .parse()
            .map_err(|_| NotifyError::InvalidRecipient {
                recipient: recipient.to_string(),
            })?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotifyError::Build(e.to_string()))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let msg = self.build(recipient, subject, body)?;
        self.mailer
            .send(msg)
            .await
            .map_err(NotifyError::transport)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
