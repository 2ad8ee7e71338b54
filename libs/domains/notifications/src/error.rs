//! Error types for the notifications domain.

use thiserror::Error;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors surfaced to producers.
///
/// Transport failures never show up here: once an item is enqueued the
/// producer has already returned, and the dispatcher handles every
/// [`TransportError`] itself.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Template rendering error.
    #[error("Template rendering error: {0}")]
    TemplateError(String),

    /// Template data did not match the shape expected for the kind.
    #[error("Invalid template data: {0}")]
    InvalidData(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<handlebars::RenderError> for NotificationError {
    fn from(err: handlebars::RenderError) -> Self {
        NotificationError::TemplateError(err.to_string())
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::InvalidData(err.to_string())
    }
}

impl From<core_config::ConfigError> for NotificationError {
    fn from(err: core_config::ConfigError) -> Self {
        NotificationError::ConfigError(err.to_string())
    }
}

/// A failed send, as reported by an [`EmailTransport`](crate::providers::EmailTransport).
///
/// Every transport error is treated as retryable by the dispatcher; the
/// message is kept for diagnostics only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::new(format!("HTTP error: {err}"))
    }
}
