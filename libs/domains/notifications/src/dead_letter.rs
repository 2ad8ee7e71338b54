//! Terminal failure reporting.
//!
//! Items that exhaust their retries are handed to a [`DeadLetterSink`]. The
//! queue keeps nothing itself; persisting dead letters is up to the sink.

use crate::models::QueueItem;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::error;

/// An item that will not be retried again.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub item: QueueItem,
    /// Transport error from the final attempt.
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(item: QueueItem, error: impl Into<String>) -> Self {
        Self {
            item,
            error: error.into(),
            failed_at: Utc::now(),
        }
    }
}

/// Receives items that exhausted their retries.
///
/// Called from the dispatcher after the item has left the queue; a slow sink
/// delays the next delivery, so implementations should be quick.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn record(&self, dead_letter: DeadLetter);
}

/// Default sink: one `error` event per dead letter.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LogDeadLetterSink {
    async fn record(&self, dead_letter: DeadLetter) {
        let item = &dead_letter.item;
        error!(
            item_id = %item.id(),
            kind = %item.kind(),
            to = %item.recipient(),
            subject = %item.subject(),
            attempts = item.retry_count(),
            error = %dead_letter.error,
            created_at = %item.created_at(),
            "Notification dropped after exhausting retries"
        );
    }
}

/// Sink that keeps dead letters in memory, for tests and admin tooling.
#[derive(Debug, Clone, Default)]
pub struct MemoryDeadLetterSink {
    entries: Arc<Mutex<Vec<DeadLetter>>>,
}

impl MemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<DeadLetter> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetterSink {
    async fn record(&self, dead_letter: DeadLetter) {
        LogDeadLetterSink.record(dead_letter.clone()).await;
        self.entries.lock().await.push(dead_letter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationKind;

    #[tokio::test]
    async fn test_memory_sink_records_entries() {
        let sink = MemoryDeadLetterSink::new();
        assert!(sink.is_empty().await);

        let item = QueueItem::new(NotificationKind::Invite, "k", "a@b.ro", "Invitație", "<p/>");
        sink.record(DeadLetter::new(item, "connection refused")).await;

        let entries = sink.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].error, "connection refused");
        assert_eq!(entries[0].item.recipient(), "a@b.ro");
    }
}
