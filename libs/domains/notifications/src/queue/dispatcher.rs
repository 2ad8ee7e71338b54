//! The dispatcher loop: the only code that sends or mutates queued items.

use super::Shared;
use crate::dead_letter::DeadLetter;
use crate::models::QueueItem;
use crate::providers::OutboundEmail;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub(super) async fn run(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    debug!("Delivery dispatcher started");

    while let Some(item) = next_due(&shared, &mut shutdown).await {
        attempt(&shared, item).await;

        let delay = shared.config.inter_item_delay;
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    debug!("Delivery dispatcher stopped");
}

/// Wait for the head item to become due and take it off the queue.
///
/// Returns `None` on shutdown. Never looks past the head: a later item that
/// is already due still waits for the head.
async fn next_due(shared: &Shared, shutdown: &mut watch::Receiver<bool>) -> Option<QueueItem> {
    loop {
        if *shutdown.borrow() {
            return None;
        }

        let wait = {
            let mut state = shared.lock_state();
            let now = Utc::now();
            match state.waiting.front().map(|head| head.scheduled_at()) {
                None => {
                    shared.idle.send_replace(true);
                    None
                }
                Some(due) if due <= now => {
                    if let Some(mut item) = state.waiting.pop_front() {
                        item.mark_in_flight();
                        state.in_flight = Some(item.clone());
                        return Some(item);
                    }
                    None
                }
                Some(due) => Some((due - now).to_std().unwrap_or_default()),
            }
        };

        match wait {
            None => {
                tokio::select! {
                    _ = shared.wake.notified() => {}
                    _ = shutdown.changed() => {}
                }
            }
            Some(delay) => {
                debug!(delay_ms = delay.as_millis() as u64, "Head of queue not due yet");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shared.wake.notified() => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }
}

/// Send one item and settle its fate.
async fn attempt(shared: &Shared, mut item: QueueItem) {
    let email = OutboundEmail {
        from: shared.config.from_address.clone(),
        to: item.recipient().to_string(),
        subject: item.subject().to_string(),
        html: item.body().to_string(),
    };

    debug!(
        item_id = %item.id(),
        kind = %item.kind(),
        to = %item.recipient(),
        attempt = item.retry_count() + 1,
        last_attempt = item.on_last_attempt(),
        "Sending notification"
    );

    let started = Instant::now();
    let result = shared.transport.send(&email).await;
    let elapsed = started.elapsed();

    match result {
        Ok(receipt) => {
            let depth = settle(shared, None);
            shared.metrics.sent(item.kind(), elapsed);
            shared.metrics.depth(depth);
            info!(
                item_id = %item.id(),
                kind = %item.kind(),
                to = %item.recipient(),
                message_id = %receipt.id,
                attempts = item.retry_count() + 1,
                "Notification delivered"
            );
        }
        Err(error) => {
            let retry_count = item.record_failure(error.message());

            if retry_count < item.max_retries() {
                let delay = shared.backoff.delay_for(retry_count);
                item.reschedule(shared.backoff.next_attempt_at(Utc::now(), retry_count));
                warn!(
                    item_id = %item.id(),
                    kind = %item.kind(),
                    to = %item.recipient(),
                    retry_count,
                    max_retries = item.max_retries(),
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Send failed, retry scheduled"
                );
                shared.metrics.retried(item.kind());
                let depth = settle(shared, Some(item));
                shared.metrics.depth(depth);
            } else {
                let depth = settle(shared, None);
                shared.metrics.dead_lettered(item.kind());
                shared.metrics.depth(depth);
                shared
                    .dead_letters
                    .record(DeadLetter::new(item, error.message()))
                    .await;
            }
        }
    }
}

/// Clear the in-flight slot and, for a retry, put the item at the tail.
/// Returns the new queue depth.
fn settle(shared: &Shared, retry: Option<QueueItem>) -> usize {
    let mut state = shared.lock_state();
    state.in_flight = None;
    if let Some(item) = retry {
        if state.closed {
            warn!(item_id = %item.id(), "Queue shut down, dropping pending retry");
        } else {
            state.waiting.push_back(item);
        }
    }
    state.len()
}
