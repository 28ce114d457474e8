//! Delivery — emails an original e-book to the reader's address via SMTP (lettre).
//!
//! One message per file, exactly one attachment. Sending is blocking and runs
//! on the blocking pool. Failures are returned to the pipeline, which logs and
//! carries on; nothing here is retried.

use std::path::Path;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::config::env_parse;
use crate::error::{ConfigError, DeliveryError};

/// Default subject line.
pub const DEFAULT_SUBJECT: &str = "Kindle Upload";

/// Default message body.
pub const DEFAULT_BODY: &str = "Here is your book!";

const ATTACHMENT_CONTENT_TYPE: &str = "application/octet-stream";

// ── Configuration ───────────────────────────────────────────────────

/// SMTP delivery configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    /// Implicit-TLS submission port.
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    pub to_address: String,
    pub subject: String,
    pub body: String,
}

impl EmailConfig {
    /// Build config from environment variables.
    /// Returns `Ok(None)` if `KINDLE_SMTP_USERNAME` is not set (delivery disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(username) = std::env::var("KINDLE_SMTP_USERNAME") else {
            return Ok(None);
        };

        let password = std::env::var("KINDLE_SMTP_PASSWORD")
            .map_err(|_| ConfigError::MissingEnvVar("KINDLE_SMTP_PASSWORD".into()))?;
        let to_address = std::env::var("KINDLE_TO_ADDRESS")
            .map_err(|_| ConfigError::MissingEnvVar("KINDLE_TO_ADDRESS".into()))?;

        let smtp_host =
            std::env::var("KINDLE_SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string());
        let smtp_port: u16 = env_parse("KINDLE_SMTP_PORT", 465)?;
        let from_address =
            std::env::var("KINDLE_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Ok(Some(Self {
            smtp_host,
            smtp_port,
            username,
            password: SecretString::from(password),
            from_address,
            to_address,
            subject: DEFAULT_SUBJECT.to_string(),
            body: DEFAULT_BODY.to_string(),
        }))
    }
}

// ── Delivery ────────────────────────────────────────────────────────

/// Sends an original file to the reader.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, path: &Path) -> Result<(), DeliveryError>;
}

/// SMTP-over-TLS delivery.
pub struct SmtpDelivery {
    config: EmailConfig,
}

impl SmtpDelivery {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Delivery for SmtpDelivery {
    async fn deliver(&self, path: &Path) -> Result<(), DeliveryError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| DeliveryError::Attachment {
                path: path.to_path_buf(),
                source,
            })?;
        let email = build_message(&self.config, &attachment_name(path), bytes)?;

        let cfg = self.config.clone();
        tokio::task::spawn_blocking(move || send_message(&cfg, &email))
            .await
            .map_err(|e| DeliveryError::SendFailed(format!("send task panicked: {e}")))??;

        info!(path = %path.display(), to = %self.config.to_address, "Sent");
        Ok(())
    }
}

/// Stand-in used when no SMTP credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledDelivery;

#[async_trait]
impl Delivery for DisabledDelivery {
    async fn deliver(&self, path: &Path) -> Result<(), DeliveryError> {
        warn!(path = %path.display(), "Delivery skipped, SMTP is not configured");
        Err(DeliveryError::NotConfigured)
    }
}

// ── Helpers (public for testing) ────────────────────────────────────

/// The attachment name: the file's own name, lossily decoded.
pub fn attachment_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string())
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| DeliveryError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Build the message: text body plus one binary attachment.
pub fn build_message(
    config: &EmailConfig,
    file_name: &str,
    bytes: Vec<u8>,
) -> Result<Message, DeliveryError> {
    let content_type = ContentType::parse(ATTACHMENT_CONTENT_TYPE)
        .map_err(|e| DeliveryError::Build(format!("content type: {e}")))?;

    Message::builder()
        .from(parse_mailbox(&config.from_address)?)
        .to(parse_mailbox(&config.to_address)?)
        .subject(config.subject.clone())
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(config.body.clone()))
                .singlepart(Attachment::new(file_name.to_string()).body(bytes, content_type)),
        )
        .map_err(|e| DeliveryError::Build(e.to_string()))
}

/// Authenticate and send over implicit TLS (blocking — run in spawn_blocking).
fn send_message(config: &EmailConfig, email: &Message) -> Result<(), DeliveryError> {
    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );

    let transport = SmtpTransport::relay(&config.smtp_host)
        .map_err(|e| DeliveryError::Relay(e.to_string()))?
        .port(config.smtp_port)
        .credentials(creds)
        .build();

    transport
        .send(email)
        .map_err(|e| DeliveryError::SendFailed(e.to_string()))?;
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config() -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.test.com".into(),
            smtp_port: 465,
            username: "reader@test.com".into(),
            password: SecretString::from("hunter2"),
            from_address: "reader@test.com".into(),
            to_address: "reader_abc@kindle.com".into(),
            subject: DEFAULT_SUBJECT.into(),
            body: DEFAULT_BODY.into(),
        }
    }

    #[test]
    fn attachment_name_is_base_name() {
        assert_eq!(
            attachment_name(Path::new("/home/u/ebooks/novel.epub")),
            "novel.epub"
        );
        assert_eq!(attachment_name(Path::new("/")), "attachment");
    }

    #[test]
    fn message_carries_one_named_attachment() {
        let message = build_message(&test_config(), "novel.epub", b"EPUBDATA".to_vec()).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();

        assert!(raw.contains("Subject: Kindle Upload"));
        assert!(raw.contains("reader_abc@kindle.com"));
        assert!(raw.contains("novel.epub"));
        assert!(raw.contains("application/octet-stream"));
        assert!(raw.contains("Here is your book!"));
        assert_eq!(raw.matches("Content-Disposition: attachment").count(), 1);
    }

    #[test]
    fn invalid_recipient_is_rejected() {
        let mut config = test_config();
        config.to_address = "not an address".into();
        let err = build_message(&config, "a.pdf", vec![]).unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidAddress { .. }));
    }

    #[test]
    fn password_is_redacted_in_debug() {
        let rendered = format!("{:?}", test_config());
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn missing_attachment_fails_before_network() {
        let dir = TempDir::new().unwrap();
        let delivery = SmtpDelivery::new(test_config());
        let err = delivery
            .deliver(&dir.path().join("gone.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Attachment { .. }));
    }

    #[tokio::test]
    async fn disabled_delivery_reports_not_configured() {
        let err = DisabledDelivery
            .deliver(Path::new("book.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::NotConfigured));
    }

    #[test]
    fn config_from_env_returns_none_without_username() {
        // SAFETY: no other test reads KINDLE_SMTP_USERNAME.
        unsafe { std::env::remove_var("KINDLE_SMTP_USERNAME") };
        assert!(EmailConfig::from_env().unwrap().is_none());
    }
}
