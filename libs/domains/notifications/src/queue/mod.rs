//! In-process delivery queue.
//!
//! ```text
//! producers ──enqueue──► VecDeque<QueueItem> ──► dispatcher task ──► EmailTransport
//!                             ▲                        │
//!                             └── failed, retries left ┘   (tail, with backoff)
//!                                                      │
//!                                 retries exhausted ───┴──► DeadLetterSink
//! ```
//!
//! One dispatcher task per queue sends items strictly one at a time, in queue
//! order. A head item whose `scheduled_at` lies in the future holds up the
//! items behind it until it is due; failed items are moved to the tail so
//! that this only happens when the retry is the sole remaining work.

mod backoff;
mod dispatcher;

pub use backoff::Backoff;

use crate::config::QueueConfig;
use crate::dead_letter::{DeadLetterSink, LogDeadLetterSink};
use crate::metrics::QueueMetrics;
use crate::models::{QueueItem, QueueStatus};
use crate::providers::EmailTransport;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handle to a delivery queue and its dispatcher task.
///
/// Cloning is cheap and every clone feeds the same dispatcher. The
/// dispatcher keeps running until [`DeliveryQueue::shutdown`] is called or the
/// runtime stops, even if every handle is dropped.
#[derive(Clone)]
pub struct DeliveryQueue {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    state: Mutex<QueueState>,
    /// Woken on every enqueue, cancel and shutdown.
    wake: Notify,
    /// `true` while the queue is empty and nothing is in flight.
    idle: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    config: QueueConfig,
    backoff: Backoff,
    transport: Arc<dyn EmailTransport>,
    dead_letters: Arc<dyn DeadLetterSink>,
    metrics: QueueMetrics,
}

#[derive(Default)]
pub(crate) struct QueueState {
    waiting: VecDeque<QueueItem>,
    in_flight: Option<QueueItem>,
    closed: bool,
}

impl QueueState {
    fn len(&self) -> usize {
        self.waiting.len() + usize::from(self.in_flight.is_some())
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        // The critical sections never panic midway, so a poisoned lock still
        // guards consistent data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builder for [`DeliveryQueue`].
pub struct DeliveryQueueBuilder {
    transport: Arc<dyn EmailTransport>,
    config: QueueConfig,
    dead_letters: Arc<dyn DeadLetterSink>,
}

impl DeliveryQueueBuilder {
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Where items that exhaust their retries are reported. Defaults to
    /// [`LogDeadLetterSink`].
    pub fn dead_letter_sink(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = sink;
        self
    }

    /// Start the dispatcher task on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(self) -> DeliveryQueue {
        let config = match self.config.validate() {
            Ok(()) => self.config,
            Err(e) => {
                warn!(error = %e, "Invalid queue configuration, clamping to usable values");
                self.config.normalized()
            }
        };

        let (idle, _) = watch::channel(true);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let metrics = QueueMetrics::new(self.transport.name());

        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
            idle,
            shutdown,
            dispatcher: Mutex::new(None),
            backoff: Backoff::new(config.base_delay),
            config,
            transport: self.transport,
            dead_letters: self.dead_letters,
            metrics,
        });

        info!(
            transport = %shared.transport.name(),
            max_retries = shared.config.max_retries,
            base_delay_ms = shared.config.base_delay.as_millis() as u64,
            inter_item_delay_ms = shared.config.inter_item_delay.as_millis() as u64,
            "Starting delivery queue"
        );

        let handle = tokio::spawn(dispatcher::run(Arc::clone(&shared), shutdown_rx));
        *shared
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        DeliveryQueue { shared }
    }
}

impl DeliveryQueue {
    pub fn builder(transport: Arc<dyn EmailTransport>) -> DeliveryQueueBuilder {
        DeliveryQueueBuilder {
            transport,
            config: QueueConfig::default(),
            dead_letters: Arc::new(LogDeadLetterSink),
        }
    }

    /// Start a queue with the default dead letter sink.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(transport: Arc<dyn EmailTransport>, config: QueueConfig) -> Self {
        Self::builder(transport).config(config).spawn()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Append an item and wake the dispatcher.
    ///
    /// Never blocks on I/O and never fails. The item enters the queue as a
    /// fresh one: no failures recorded, due immediately. After
    /// [`shutdown`](Self::shutdown) the item is dropped with a warning.
    pub fn enqueue(&self, mut item: QueueItem) {
        item.reset_for_enqueue(Utc::now());
        let kind = item.kind();
        let depth = {
            let mut state = self.shared.lock_state();
            if state.closed {
                warn!(item_id = %item.id(), kind = %kind, "Delivery queue is shut down, dropping notification");
                return;
            }

            debug!(
                item_id = %item.id(),
                kind = %kind,
                to = %item.recipient(),
                "Queued notification"
            );
            state.waiting.push_back(item);
            self.shared.idle.send_replace(false);
            state.len()
        };

        self.shared.metrics.enqueued(kind);
        self.shared.metrics.depth(depth);
        self.shared.wake.notify_one();
    }

    /// Snapshot of the queue.
    pub fn status(&self) -> QueueStatus {
        let state = self.shared.lock_state();
        QueueStatus {
            length: state.len(),
            is_processing: !*self.shared.idle.borrow(),
            in_flight: state.in_flight.clone(),
            items: state.waiting.iter().cloned().collect(),
        }
    }

    /// Number of items waiting or in flight.
    pub fn len(&self) -> usize {
        self.shared.lock_state().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a waiting item. Returns `false` if no waiting item has this id;
    /// an item that is already being sent cannot be cancelled.
    pub fn cancel(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.shared.lock_state();
            let position = state.waiting.iter().position(|item| item.id() == id);
            position.and_then(|index| state.waiting.remove(index))
        };

        match removed {
            Some(item) => {
                info!(item_id = %item.id(), kind = %item.kind(), "Cancelled queued notification");
                self.shared.metrics.cancelled(item.kind());
                self.shared.wake.notify_one();
                true
            }
            None => false,
        }
    }

    /// Resolve once the queue is empty and nothing is in flight.
    pub async fn wait_idle(&self) {
        let mut idle = self.shared.idle.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = idle.wait_for(|idle| *idle).await;
    }

    /// Stop the dispatcher.
    ///
    /// Waiting items are dropped; an in-flight send is allowed to finish.
    /// Returns the number of dropped items. Calling it again is a no-op.
    pub async fn shutdown(&self) -> usize {
        let dropped = {
            let mut state = self.shared.lock_state();
            if state.closed {
                return 0;
            }
            state.closed = true;
            let dropped = state.waiting.len();
            state.waiting.clear();
            dropped
        };

        if dropped > 0 {
            warn!(dropped, "Delivery queue shutting down with undelivered notifications");
        } else {
            info!("Delivery queue shutting down");
        }

        self.shared.shutdown.send_replace(true);
        self.shared.wake.notify_one();

        let handle = self
            .shared
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Delivery dispatcher ended abnormally");
            }
        }

        self.shared.idle.send_replace(true);
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::models::{ItemState, NotificationKind};
    use crate::providers::{DeliveryReceipt, MockEmailTransport};
    use chrono::TimeZone;
    use std::time::Duration;

    fn fast_config() -> QueueConfig {
        QueueConfig::default()
            .with_base_delay(Duration::from_millis(10))
            .with_inter_item_delay(Duration::ZERO)
    }

    fn item(key: &str) -> QueueItem {
        QueueItem::new(NotificationKind::Welcome, key, format!("{key}@example.ro"), "Bun venit", "<p>hi</p>")
    }

    fn ok_transport(times: usize) -> MockEmailTransport {
        let mut transport = MockEmailTransport::new();
        transport.expect_name().return_const("mock");
        transport
            .expect_send()
            .times(times)
            .returning(|email| Ok(DeliveryReceipt { id: format!("id-{}", email.to) }));
        transport
    }

    #[tokio::test]
    async fn test_single_item_is_delivered_and_queue_drains() {
        let queue = DeliveryQueue::new(Arc::new(ok_transport(1)), fast_config());

        queue.enqueue(item("ana"));
        queue.wait_idle().await;

        let status = queue.status();
        assert_eq!(status.length, 0);
        assert!(!status.is_processing);
        assert!(status.items.is_empty());
        assert!(status.in_flight.is_none());
    }

    #[tokio::test]
    async fn test_transport_gets_configured_sender_and_content() {
        let mut transport = MockEmailTransport::new();
        transport.expect_name().return_const("mock");
        transport
            .expect_send()
            .withf(|email| {
                email.from == "alerte@ssm.ro"
                    && email.to == "ana@example.ro"
                    && email.subject == "Bun venit"
                    && email.html == "<p>hi</p>"
            })
            .times(1)
            .returning(|_| Ok(DeliveryReceipt { id: "1".to_string() }));

        let queue = DeliveryQueue::new(
            Arc::new(transport),
            fast_config().with_from_address("alerte@ssm.ro"),
        );
        queue.enqueue(item("ana"));
        queue.wait_idle().await;
    }

    #[tokio::test]
    async fn test_failed_item_waits_in_queue_with_error() {
        let mut transport = MockEmailTransport::new();
        transport.expect_name().return_const("mock");
        transport
            .expect_send()
            .times(1)
            .returning(|_| Err(TransportError::new("503 Service Unavailable")));

        let config = fast_config().with_base_delay(Duration::from_secs(60));
        let queue = DeliveryQueue::new(Arc::new(transport), config);
        queue.enqueue(item("ana"));

        let mut waited = Duration::ZERO;
        while queue.status().items.first().map(|i| i.retry_count()) != Some(1) {
            tokio::time::sleep(Duration::from_millis(5)).await;
            waited += Duration::from_millis(5);
            assert!(waited < Duration::from_secs(5), "item never failed");
        }

        let status = queue.status();
        assert_eq!(status.length, 1);
        assert!(status.is_processing);
        let waiting = &status.items[0];
        assert_eq!(waiting.state(), ItemState::Waiting);
        assert_eq!(waiting.last_error(), Some("503 Service Unavailable"));
        assert!(waiting.scheduled_at() > waiting.created_at());

        assert_eq!(queue.shutdown().await, 1);
    }

    #[tokio::test]
    async fn test_cancel_removes_waiting_item() {
        let mut transport = MockEmailTransport::new();
        transport.expect_name().return_const("mock");
        transport
            .expect_send()
            .times(1)
            .returning(|_| Err(TransportError::new("down")));

        let config = fast_config().with_base_delay(Duration::from_secs(60));
        let queue = DeliveryQueue::new(Arc::new(transport), config);
        let first = item("ana");
        let id = first.id().to_string();
        queue.enqueue(first);

        while queue.status().items.first().map(|i| i.retry_count()) != Some(1) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(queue.cancel(&id));
        assert!(!queue.cancel(&id));
        queue.wait_idle().await;
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_resets_item_to_fresh_state() {
        let queue = DeliveryQueue::new(Arc::new(ok_transport(1)), fast_config());

        let mut stale = item("ana");
        for _ in 0..5 {
            stale.record_failure("earlier failure");
        }
        stale.reschedule(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap());
        stale.mark_in_flight();

        let before = Utc::now();
        queue.enqueue(stale);

        // The dispatcher has not run yet on the current-thread runtime.
        let status = queue.status();
        let queued = &status.items[0];
        assert_eq!(queued.retry_count(), 0);
        assert_eq!(queued.max_retries(), 3);
        assert_eq!(queued.state(), ItemState::Waiting);
        assert!(queued.last_error().is_none());
        assert!(queued.scheduled_at() >= before);
        assert!(queued.scheduled_at() <= Utc::now());

        tokio::time::timeout(Duration::from_secs(5), queue.wait_idle())
            .await
            .expect("item scheduled in the past should be sent right away");
    }

    #[tokio::test]
    async fn test_invalid_config_is_clamped_on_spawn() {
        let config = fast_config()
            .with_base_delay(Duration::ZERO)
            .with_max_retries(0);
        let queue = DeliveryQueue::new(Arc::new(ok_transport(0)), config);

        assert_eq!(queue.config().base_delay, Duration::from_millis(1));
        assert_eq!(queue.config().max_retries, 1);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_dropped() {
        let queue = DeliveryQueue::new(Arc::new(ok_transport(0)), fast_config());
        assert_eq!(queue.shutdown().await, 0);
        assert_eq!(queue.shutdown().await, 0);

        queue.enqueue(item("late"));
        assert!(queue.is_empty());
    }
}
