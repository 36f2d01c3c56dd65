//! Delivery transports.
//!
//! The worker only sees [`NotificationTransport`]; SMTP via lettre is the
//! production implementation and [`LogOnlyTransport`] stands in when no
//! SMTP host is configured.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::config::SmtpConfig;
use crate::error::TransportError;
use crate::notify::model::OutboundMessage;

/// Pure I/O seam for outbound delivery.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Transport name for logs and audit detail.
    fn name(&self) -> &'static str;

    /// Deliver one message. Errors are recorded on the message and retried
    /// within the budget; they never propagate past the worker.
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), TransportError>;
}

/// SMTP transport via lettre.
pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());

        let transport = SmtpTransport::relay(&self.config.host)
            .map_err(|e| TransportError::Smtp(format!("relay error: {e}")))?
            .port(self.config.port)
            .credentials(creds)
            .build();

        let email = Message::builder()
            .from(self.config.from_address.parse().map_err(|e| {
                TransportError::Address {
                    address: self.config.from_address.clone(),
                    reason: format!("{e}"),
                }
            })?)
            .to(to.parse().map_err(|e| TransportError::Address {
                address: to.to_string(),
                reason: format!("{e}"),
            })?)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| TransportError::Send(format!("failed to build email: {e}")))?;

        transport
            .send(&email)
            .map_err(|e| TransportError::Send(format!("SMTP send failed: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl NotificationTransport for SmtpNotifier {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        self.send_mail(&message.recipient, &message.subject, &message.body)?;
        info!(
            message_id = %message.id,
            recipient = %message.recipient,
            "Notification delivered via SMTP"
        );
        Ok(())
    }
}

/// Fallback transport: logs the message and reports success. Keeps the
/// pipeline observable in environments without an SMTP relay.
#[derive(Debug, Default)]
pub struct LogOnlyTransport;

impl LogOnlyTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationTransport for LogOnlyTransport {
    fn name(&self) -> &'static str {
        "log-only"
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        info!(
            message_id = %message.id,
            recipient = %message.recipient,
            subject = %message.subject,
            "Notification (log-only transport)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn log_only_transport_always_succeeds() {
        let transport = LogOnlyTransport::new();
        let message = OutboundMessage::new(
            Uuid::new_v4(),
            None,
            "ops@example.com",
            "subject",
            "body",
            "key-1",
        );
        assert!(transport.deliver(&message).await.is_ok());
        assert_eq!(transport.name(), "log-only");
    }

    #[test]
    fn smtp_rejects_malformed_recipient() {
        let notifier = SmtpNotifier::new(SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            username: "u".into(),
            password: "p".into(),
            from_address: "support@example.com".into(),
        });
        let err = notifier.send_mail("not-an-address", "s", "b").unwrap_err();
        assert!(matches!(err, TransportError::Address { .. }));
    }
}
