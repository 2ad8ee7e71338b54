//! Notifications Domain
//!
//! Transactional email for the compliance platform: welcome messages,
//! document expiry alerts, monthly reports, invitations and password resets.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  API / Cron job │  ← Calls a typed send_* method
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │ NotificationSvc │  ← Renders the template, returns the item id
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │  DeliveryQueue  │  ← In-memory FIFO, one dispatcher task
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │ EmailTransport  │  ← Resend, or log-only for dry runs
//! └─────────────────┘
//! ```
//!
//! Delivery is at-most-once per process lifetime: nothing is persisted, and
//! items still queued when the process exits are lost.
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_notifications::{
//!     DeliveryQueue, NotificationService, QueueConfig, TemplateEngine,
//!     providers::{ResendConfig, ResendTransport},
//! };
//!
//! let transport = Arc::new(ResendTransport::new(ResendConfig::from_env()?)?);
//! let queue = DeliveryQueue::new(transport, QueueConfig::from_env()?);
//! let service = NotificationService::new(
//!     queue,
//!     Arc::new(TemplateEngine::new()?),
//!     NotificationServiceConfig::from_env()?,
//! );
//!
//! let id = service.send_expiry_alert(&alert)?;
//! ```

pub mod config;
pub mod dead_letter;
pub mod error;
pub mod metrics;
pub mod models;
pub mod providers;
pub mod queue;
pub mod service;
pub mod templates;

// Re-export commonly used types
pub use config::{NotificationServiceConfig, QueueConfig};
pub use dead_letter::{DeadLetter, DeadLetterSink, LogDeadLetterSink, MemoryDeadLetterSink};
pub use error::{NotificationError, NotificationResult, TransportError};
pub use models::{
    ExpiryAlert, ExpirySeverity, Invitation, ItemState, MonthlyReport, NotificationKind,
    PasswordReset, QueueItem, QueueStatus, ReportEntry, WelcomeUser,
};
pub use providers::{DeliveryReceipt, EmailTransport, LogTransport, OutboundEmail};
pub use queue::{Backoff, DeliveryQueue, DeliveryQueueBuilder};
pub use service::NotificationService;
pub use templates::{RenderedNotification, Renderer, TemplateEngine};
