//! Email delivery — one multipart message per run, every artifact attached.
//! Sending goes through [`Mailer`] so the transport can be swapped out.

use async_trait::async_trait;
use ledgerlens_core::config::EmailConfig;
use ledgerlens_core::{DeliveryMethod, ReportError, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

use crate::channel::{DeliveryChannel, DeliveryPayload, human_size};

const CHANNEL: &str = "email";

/// Sends a fully built message.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: Message) -> Result<()>;
}

/// SMTP over STARTTLS via lettre's async transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| ReportError::delivery(CHANNEL, format!("SMTP relay: {e}")))?
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }
        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: Message) -> Result<()> {
        self.transport
            .send(message)
            .await
            .map_err(|e| ReportError::delivery(CHANNEL, format!("SMTP send: {e}")))?;
        Ok(())
    }
}

pub struct EmailChannel {
    from: Mailbox,
    mailer: Box<dyn Mailer>,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig, mailer: Box<dyn Mailer>) -> Result<Self> {
        let from_name = config.display_name.as_deref().unwrap_or("LedgerLens Reports");
        let from: Mailbox = format!("{from_name} <{}>", config.from_address)
            .parse()
            .map_err(|e| ReportError::Config(format!("Invalid email.from_address: {e}")))?;
        Ok(Self { from, mailer })
    }

    /// Assemble the message without sending it.
    pub fn build_message(&self, payload: &DeliveryPayload) -> Result<Message> {
        if payload.recipients.is_empty() {
            return Err(ReportError::delivery(CHANNEL, "no recipients"));
        }
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(payload.subject());
        for to in &payload.recipients {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|e| ReportError::delivery(CHANNEL, format!("Invalid recipient '{to}': {e}")))?;
            builder = builder.to(mailbox);
        }

        let mut body = format!(
            "{}\nReporting period: {}\nGenerated: {}\n\nAttached:\n",
            payload.report_name,
            payload.period.label(),
            payload.generated_at.format("%Y-%m-%d %H:%M UTC")
        );
        for a in &payload.artifacts {
            body.push_str(&format!("  - {} ({})\n", a.file_name, human_size(a.bytes.len())));
        }

        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(body));
        for a in &payload.artifacts {
            let content_type = ContentType::parse(a.mime_type())
                .map_err(|e| ReportError::delivery(CHANNEL, format!("Content type: {e}")))?;
            parts = parts.singlepart(Attachment::new(a.file_name.clone()).body(a.bytes.clone(), content_type));
        }

        builder
            .multipart(parts)
            .map_err(|e| ReportError::delivery(CHANNEL, format!("Build email: {e}")))
    }
}

#[async_trait]
impl DeliveryChannel for EmailChannel {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Email
    }

    async fn deliver(&self, payload: &DeliveryPayload) -> Result<()> {
        let message = self.build_message(payload)?;
        self.mailer.send(message).await?;
        tracing::info!(
            "📤 Email '{}' sent to {} recipient(s) with {} attachment(s)",
            payload.report_name,
            payload.recipients.len(),
            payload.artifacts.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::fixtures;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct RecordingMailer {
        sent: Arc<Mutex<Vec<Message>>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: Message) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _message: Message) -> Result<()> {
            Err(ReportError::delivery(CHANNEL, "connection refused"))
        }
    }

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.example.test".into(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from_address: "reports@example.test".into(),
            display_name: None,
            timeout_secs: 60,
        }
    }

    #[tokio::test]
    async fn test_email_attaches_every_artifact() {
        let mailer = RecordingMailer::default();
        let channel = EmailChannel::new(&config(), Box::new(mailer.clone())).unwrap();
        let payload = fixtures::payload(&["cfo@example.test", "ops@example.test"]);
        channel.deliver(&payload).await.unwrap();

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].envelope().to().len(), 2);
        let raw = String::from_utf8_lossy(&sent[0].formatted()).into_owned();
        for a in &payload.artifacts {
            assert!(raw.contains(&a.file_name), "missing {}", a.file_name);
        }
        assert!(raw.contains("application/pdf"));
    }

    #[tokio::test]
    async fn test_email_rejects_bad_recipients() {
        let channel = EmailChannel::new(&config(), Box::new(RecordingMailer::default())).unwrap();
        let err = channel.deliver(&fixtures::payload(&[])).await.unwrap_err();
        assert!(matches!(err, ReportError::Delivery { .. }));
        let err = channel.deliver(&fixtures::payload(&["not an address"])).await.unwrap_err();
        assert!(matches!(err, ReportError::Delivery { .. }));
    }

    #[tokio::test]
    async fn test_transport_failure_is_a_delivery_error() {
        let channel = EmailChannel::new(&config(), Box::new(FailingMailer)).unwrap();
        let err = channel.deliver(&fixtures::payload(&["cfo@example.test"])).await.unwrap_err();
        assert_eq!(err.failure_kind(), ledgerlens_core::FailureKind::Delivery);
    }
}
