//! Delivery queue metrics.
//!
//! Emitted through the `metrics` facade; nothing is recorded until the host
//! application installs a recorder.

use crate::models::NotificationKind;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Metrics helper, labelled by transport so several queues can coexist.
#[derive(Debug, Clone)]
pub struct QueueMetrics {
    transport: &'static str,
}

impl QueueMetrics {
    pub fn new(transport: &'static str) -> Self {
        Self { transport }
    }

    pub fn enqueued(&self, kind: NotificationKind) {
        counter!(
            "notification_queue_enqueued_total",
            "transport" => self.transport,
            "kind" => kind.as_str()
        )
        .increment(1);
    }

    pub fn sent(&self, kind: NotificationKind, duration: Duration) {
        counter!(
            "notification_queue_sent_total",
            "transport" => self.transport,
            "kind" => kind.as_str()
        )
        .increment(1);

        histogram!(
            "notification_send_duration_seconds",
            "transport" => self.transport,
            "kind" => kind.as_str()
        )
        .record(duration.as_secs_f64());
    }

    pub fn retried(&self, kind: NotificationKind) {
        counter!(
            "notification_queue_retried_total",
            "transport" => self.transport,
            "kind" => kind.as_str()
        )
        .increment(1);
    }

    pub fn dead_lettered(&self, kind: NotificationKind) {
        counter!(
            "notification_queue_dead_letter_total",
            "transport" => self.transport,
            "kind" => kind.as_str()
        )
        .increment(1);
    }

    pub fn cancelled(&self, kind: NotificationKind) {
        counter!(
            "notification_queue_cancelled_total",
            "transport" => self.transport,
            "kind" => kind.as_str()
        )
        .increment(1);
    }

    pub fn depth(&self, depth: usize) {
        gauge!("notification_queue_depth", "transport" => self.transport).set(depth as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_without_recorder_are_noops() {
        let metrics = QueueMetrics::new("test");
        metrics.enqueued(NotificationKind::Welcome);
        metrics.sent(NotificationKind::Welcome, Duration::from_millis(5));
        metrics.depth(3);
        assert_eq!(metrics.transport, "test");
    }
}
