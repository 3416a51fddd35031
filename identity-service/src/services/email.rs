//! Outbound email. The outbox dispatcher is the only caller.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};
use thiserror::Error;

use crate::config::SmtpConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email provider not enabled: {0}")]
    NotEnabled(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

pub struct SmtpEmailSender {
    config: SmtpConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpEmailSender {
    pub fn new(config: SmtpConfig) -> Result<Self, EmailError> {
        if !config.enabled {
            tracing::warn!("SMTP disabled; outbox emails will be retried until it is enabled");
            return Ok(Self {
                config,
                transport: None,
            });
        }

        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| EmailError::Configuration(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .timeout(Some(std::time::Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, port = config.port, "SMTP email sender initialized");

        Ok(Self {
            config,
            transport: Some(transport),
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, email: &EmailMessage) -> Result<(), EmailError> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| EmailError::NotEnabled("SMTP email sender is not enabled".to_string()))?;

        let from_mailbox: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| EmailError::Configuration(format!("Invalid from address: {}", e)))?;

        let to_mailbox: Mailbox = email
            .to
            .parse()
            .map_err(|e| EmailError::InvalidRecipient(format!("{}", e)))?;

        let builder = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(&email.subject);

        let message = match &email.text {
            Some(text) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html.clone()),
                    ),
            ),
            None => builder
                .header(ContentType::TEXT_HTML)
                .body(email.html.clone()),
        }
        .map_err(|e| EmailError::SendFailed(format!("Failed to build message: {}", e)))?;

        transport
            .send(message)
            .await
            .map_err(|e| EmailError::SendFailed(format!("Failed to send email: {}", e)))?;

        tracing::info!(subject = %email.subject, "Email sent");
        Ok(())
    }
}

/// Records every message; can be told to fail the next N sends.
#[derive(Default)]
pub struct MockEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    failures_remaining: AtomicUsize,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(times: usize) -> Self {
        let sender = Self::default();
        sender.fail_next(times);
        sender
    }

    pub fn fail_next(&self, times: usize) {
        self.failures_remaining.store(times, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        match self.sent.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn sent_to(&self, address: &str) -> Vec<EmailMessage> {
        self.sent().into_iter().filter(|m| m.to == address).collect()
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(EmailError::SendFailed("mock failure".to_string()));
        }

        match self.sent.lock() {
            Ok(mut guard) => guard.push(message.clone()),
            Err(poisoned) => poisoned.into_inner().push(message.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "a@b.co".to_string(),
            subject: "Hi".to_string(),
            html: "<p>Hi</p>".to_string(),
            text: None,
        }
    }

    #[tokio::test]
    async fn test_mock_records_and_fails_on_demand() {
        let sender = MockEmailSender::failing(2);
        assert!(sender.send(&message()).await.is_err());
        assert!(sender.send(&message()).await.is_err());
        assert!(sender.send(&message()).await.is_ok());
        assert_eq!(sender.sent().len(), 1);
        assert_eq!(sender.sent_to("a@b.co").len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_smtp_refuses_to_send() {
        let config = SmtpConfig {
            enabled: false,
            host: "localhost".to_string(),
            port: 587,
            user: String::new(),
            password: String::new(),
            from_email: "no-reply@localhost".to_string(),
            from_name: "Project Hub".to_string(),
        };
        let sender = SmtpEmailSender::new(config).unwrap();
        assert!(matches!(
            sender.send(&message()).await,
            Err(EmailError::NotEnabled(_))
        ));
    }
}
