//! Data models for the notifications domain.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Queue Types
// ============================================================================

/// Types of notifications the queue can deliver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Sent once after a user registers.
    Welcome,
    /// A tracked compliance item is about to expire or has expired.
    ExpiryAlert,
    /// Monthly compliance summary for an organization.
    MonthlyReport,
    /// Invitation to join an organization.
    Invite,
    /// Password reset link.
    PasswordReset,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 5] = [
        NotificationKind::Welcome,
        NotificationKind::ExpiryAlert,
        NotificationKind::MonthlyReport,
        NotificationKind::Invite,
        NotificationKind::PasswordReset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Welcome => "welcome",
            NotificationKind::ExpiryAlert => "expiry_alert",
            NotificationKind::MonthlyReport => "monthly_report",
            NotificationKind::Invite => "invite",
            NotificationKind::PasswordReset => "password_reset",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an item currently is in its lifecycle.
///
/// There is no terminal state: a delivered or dead-lettered item is dropped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Sitting in the queue, not being sent.
    Waiting,
    /// Taken off the head of the queue; the transport call is outstanding.
    InFlight,
}

/// Default number of attempts before an item is dead-lettered.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A rendered notification waiting for delivery.
///
/// Producers build one with [`QueueItem::new`] and hand it to the queue by
/// value; from then on only the dispatcher changes it. Serialize-only: items
/// are snapshotted for status and dead letters but never rebuilt from data.
#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    id: String,
    kind: NotificationKind,
    recipient: String,
    subject: String,
    body: String,
    retry_count: u32,
    max_retries: u32,
    state: ItemState,
    scheduled_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    last_error: Option<String>,
}

impl QueueItem {
    /// Create an item that is due immediately.
    ///
    /// `entity_key` identifies the thing the notification is about (a user,
    /// an alert, a report period) and only ends up in the id for log
    /// correlation. Ids are never used for deduplication.
    pub fn new(
        kind: NotificationKind,
        entity_key: &str,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!("{}:{}:{}", kind, entity_key, Uuid::now_v7()),
            kind,
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            state: ItemState::Waiting,
            scheduled_at: now,
            created_at: now,
            last_error: None,
        }
    }

    /// Override the retry ceiling. Values below 1 are clamped to 1 so every
    /// item gets at least one attempt.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Number of failed attempts so far.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    /// Earliest time the dispatcher may attempt this item.
    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether another failure would exhaust the retry budget.
    pub fn on_last_attempt(&self) -> bool {
        self.retry_count + 1 >= self.max_retries
    }

    /// Restore the state of a fresh item: no failures, waiting, due at `now`.
    pub(crate) fn reset_for_enqueue(&mut self, now: DateTime<Utc>) {
        self.retry_count = 0;
        self.max_retries = self.max_retries.max(1);
        self.state = ItemState::Waiting;
        self.scheduled_at = now;
        self.last_error = None;
    }

    pub(crate) fn mark_in_flight(&mut self) {
        self.state = ItemState::InFlight;
    }

    /// Record a failed attempt. Returns the new retry count.
    pub(crate) fn record_failure(&mut self, error: &str) -> u32 {
        self.retry_count = (self.retry_count + 1).min(self.max_retries);
        self.last_error = Some(error.to_string());
        self.retry_count
    }

    /// Put the item back into the waiting state, due at `at`.
    ///
    /// `scheduled_at` only ever moves forward.
    pub(crate) fn reschedule(&mut self, at: DateTime<Utc>) {
        self.scheduled_at = self.scheduled_at.max(at);
        self.state = ItemState::Waiting;
    }
}

/// Point-in-time view of a queue, see
/// [`DeliveryQueue::status`](crate::queue::DeliveryQueue::status).
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    /// Waiting items plus the in-flight one, if any.
    pub length: usize,
    /// Whether the dispatcher has work (waiting or in flight).
    pub is_processing: bool,
    /// The item currently being sent.
    pub in_flight: Option<QueueItem>,
    /// Waiting items in queue order.
    pub items: Vec<QueueItem>,
}

// ============================================================================
// Expiry Severity
// ============================================================================

/// Urgency of an expiry alert, derived from the days left until expiry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpirySeverity {
    /// Already expired (zero or fewer days left).
    Expired,
    /// One to seven days left.
    Urgent,
    /// More than seven days left.
    Warning,
}

impl ExpirySeverity {
    pub fn from_days(days_until_expiry: i64) -> Self {
        match days_until_expiry {
            d if d <= 0 => ExpirySeverity::Expired,
            1..=7 => ExpirySeverity::Urgent,
            _ => ExpirySeverity::Warning,
        }
    }

    /// Label used as the subject prefix.
    pub fn label(&self) -> &'static str {
        match self {
            ExpirySeverity::Expired => "EXPIRAT",
            ExpirySeverity::Urgent => "URGENT",
            ExpirySeverity::Warning => "ATENȚIE",
        }
    }

    /// Accent color used by the alert template.
    pub fn color(&self) -> &'static str {
        match self {
            ExpirySeverity::Expired => "#dc2626",
            ExpirySeverity::Urgent => "#ea580c",
            ExpirySeverity::Warning => "#ca8a04",
        }
    }
}

impl std::fmt::Display for ExpirySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Producer Requests
// ============================================================================

/// A newly registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeUser {
    pub email: String,
    pub name: String,
}

/// A compliance item (medical check, training, equipment inspection) nearing
/// or past its expiry date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryAlert {
    pub alert_id: String,
    pub recipient_email: String,
    pub recipient_name: String,
    pub org_name: String,
    pub employee_name: String,
    /// Category, e.g. "Fișă de aptitudine" or "Instruire PSI".
    pub item_type: String,
    pub item_name: String,
    pub expiry_date: NaiveDate,
    /// Negative once the item has expired.
    pub days_until_expiry: i64,
}

impl ExpiryAlert {
    pub fn severity(&self) -> ExpirySeverity {
        ExpirySeverity::from_days(self.days_until_expiry)
    }
}

/// Monthly compliance summary for one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyReport {
    pub org_id: String,
    pub recipient_email: String,
    pub recipient_name: String,
    pub org_name: String,
    /// Human readable period, e.g. "octombrie 2026".
    pub period: String,
    pub total_items: u32,
    pub expired: u32,
    pub expiring_soon: u32,
    pub valid: u32,
    pub upcoming: Vec<ReportEntry>,
}

/// One line in the "upcoming expiries" table of a monthly report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub employee_name: String,
    pub item_name: String,
    pub expiry_date: NaiveDate,
    pub days_until_expiry: i64,
}

/// Invitation to join an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub email: String,
    pub org_name: String,
    pub inviter_name: String,
    pub role: String,
    pub invite_url: String,
    pub expires_in_days: u32,
}

/// Password reset request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordReset {
    pub email: String,
    pub name: Option<String>,
    pub reset_url: String,
    pub expires_in_minutes: u32,
}
