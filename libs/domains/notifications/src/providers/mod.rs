//! Delivery transports.
//!
//! This module contains the `EmailTransport` trait and its implementations.
//! The queue talks to exactly one transport and never calls it concurrently.

mod log;
mod resend;

pub use log::LogTransport;
pub use resend::{ResendConfig, ResendTransport};

use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A fully rendered email, ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Acknowledgement from the transport that it accepted a message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeliveryReceipt {
    /// Provider-assigned message id.
    pub id: String,
}

/// Trait for delivery transports.
///
/// Any error is treated as transient and retried by the queue; validating
/// recipients is the producer's job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Send one email.
    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, TransportError>;

    /// Transport name for logs and metric labels.
    fn name(&self) -> &'static str;
}
