//! Transport that only logs, for dry runs and local development.

use super::{DeliveryReceipt, EmailTransport, OutboundEmail};
use crate::error::TransportError;
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

/// Logs every email at `info` level and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, TransportError> {
        let id = format!("dry-run-{}", Uuid::new_v4());
        info!(
            message_id = %id,
            from = %email.from,
            to = %email.to,
            subject = %email.subject,
            html_bytes = email.html.len(),
            "Dry run: email not sent"
        );
        Ok(DeliveryReceipt { id })
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_transport_always_succeeds() {
        let email = OutboundEmail {
            from: "noreply@ssm.ro".to_string(),
            to: "ana@example.ro".to_string(),
            subject: "Test".to_string(),
            html: "<p>test</p>".to_string(),
        };

        let receipt = LogTransport.send(&email).await.unwrap();
        assert!(receipt.id.starts_with("dry-run-"));
        assert_eq!(LogTransport.name(), "log");
    }
}
