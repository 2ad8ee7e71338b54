//! Typed producers: render a notification and hand it to the delivery queue.

use crate::config::NotificationServiceConfig;
use crate::error::NotificationResult;
use crate::models::{
    ExpiryAlert, Invitation, MonthlyReport, NotificationKind, PasswordReset, QueueItem,
    WelcomeUser,
};
use crate::queue::DeliveryQueue;
use crate::templates::Renderer;
use chrono::NaiveDate;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, instrument};

/// Entry point for application code that wants to notify someone.
///
/// Each `send_*` call renders synchronously, so template errors come back to
/// the caller; delivery itself happens later on the queue's dispatcher and
/// its outcome is never reported back here.
#[derive(Clone)]
pub struct NotificationService {
    queue: DeliveryQueue,
    renderer: Arc<dyn Renderer>,
    config: NotificationServiceConfig,
}

impl NotificationService {
    pub fn new(
        queue: DeliveryQueue,
        renderer: Arc<dyn Renderer>,
        config: NotificationServiceConfig,
    ) -> Self {
        Self {
            queue,
            renderer,
            config,
        }
    }

    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    /// Queue a welcome email for a newly registered user. Returns the item id.
    #[instrument(skip_all, fields(to = %user.email))]
    pub fn send_welcome(&self, user: &WelcomeUser, org_name: &str) -> NotificationResult<String> {
        let item = self.welcome_item(user, org_name)?;
        Ok(self.enqueue(item))
    }

    /// Queue an expiry alert. The subject carries a severity prefix.
    #[instrument(skip_all, fields(to = %alert.recipient_email, alert_id = %alert.alert_id))]
    pub fn send_expiry_alert(&self, alert: &ExpiryAlert) -> NotificationResult<String> {
        let item = self.expiry_alert_item(alert)?;
        Ok(self.enqueue(item))
    }

    #[instrument(skip_all, fields(to = %report.recipient_email, org_id = %report.org_id))]
    pub fn send_monthly_report(&self, report: &MonthlyReport) -> NotificationResult<String> {
        let item = self.monthly_report_item(report)?;
        Ok(self.enqueue(item))
    }

    #[instrument(skip_all, fields(to = %invite.email))]
    pub fn send_invite(&self, invite: &Invitation) -> NotificationResult<String> {
        let item = self.invite_item(invite)?;
        Ok(self.enqueue(item))
    }

    #[instrument(skip_all, fields(to = %reset.email))]
    pub fn send_password_reset(&self, reset: &PasswordReset) -> NotificationResult<String> {
        let item = self.password_reset_item(reset)?;
        Ok(self.enqueue(item))
    }

    /// Build, without enqueueing, the item [`send_welcome`](Self::send_welcome) would queue.
    pub fn welcome_item(&self, user: &WelcomeUser, org_name: &str) -> NotificationResult<QueueItem> {
        let data = self.template_data(json!({
            "user_name": user.name,
            "org_name": org_name,
            "dashboard_url": format!("{}/dashboard", self.config.app_url),
        }));
        self.build(NotificationKind::Welcome, &user.email, &user.email, &data, None)
    }

    pub fn expiry_alert_item(&self, alert: &ExpiryAlert) -> NotificationResult<QueueItem> {
        let severity = alert.severity();
        let data = self.template_data(json!({
            "recipient_name": alert.recipient_name,
            "org_name": alert.org_name,
            "employee_name": alert.employee_name,
            "item_type": alert.item_type,
            "item_name": alert.item_name,
            "expiry_date": format_date(alert.expiry_date),
            "days_until_expiry": alert.days_until_expiry,
            "days_label": days_label(alert.days_until_expiry),
            "severity": severity.label(),
            "severity_color": severity.color(),
            "alert_url": format!("{}/alerte/{}", self.config.app_url, alert.alert_id),
        }));
        self.build(
            NotificationKind::ExpiryAlert,
            &alert.alert_id,
            &alert.recipient_email,
            &data,
            Some(severity.label()),
        )
    }

    pub fn monthly_report_item(&self, report: &MonthlyReport) -> NotificationResult<QueueItem> {
        let upcoming: Vec<Value> = report
            .upcoming
            .iter()
            .map(|entry| {
                json!({
                    "employee_name": entry.employee_name,
                    "item_name": entry.item_name,
                    "expiry_date": format_date(entry.expiry_date),
                    "days_until_expiry": entry.days_until_expiry,
                })
            })
            .collect();

        let data = self.template_data(json!({
            "recipient_name": report.recipient_name,
            "org_name": report.org_name,
            "period": report.period,
            "total_items": report.total_items,
            "expired": report.expired,
            "expiring_soon": report.expiring_soon,
            "valid": report.valid,
            "upcoming": upcoming,
            "report_url": format!("{}/rapoarte", self.config.app_url),
        }));
        let key = format!("{}/{}", report.org_id, report.period);
        self.build(
            NotificationKind::MonthlyReport,
            &key,
            &report.recipient_email,
            &data,
            None,
        )
    }

    pub fn invite_item(&self, invite: &Invitation) -> NotificationResult<QueueItem> {
        let data = self.template_data(json!({
            "org_name": invite.org_name,
            "inviter_name": invite.inviter_name,
            "role": invite.role,
            "invite_url": invite.invite_url,
            "expires_in_days": invite.expires_in_days,
        }));
        self.build(NotificationKind::Invite, &invite.email, &invite.email, &data, None)
    }

    pub fn password_reset_item(&self, reset: &PasswordReset) -> NotificationResult<QueueItem> {
        let user_name = reset.name.as_deref().unwrap_or(&reset.email);
        let data = self.template_data(json!({
            "user_name": user_name,
            "reset_url": reset.reset_url,
            "expires_in_minutes": reset.expires_in_minutes,
        }));
        self.build(
            NotificationKind::PasswordReset,
            &reset.email,
            &reset.email,
            &data,
            None,
        )
    }

    /// Merge the fields every template can rely on into `data`.
    fn template_data(&self, mut data: Value) -> Value {
        if let Some(fields) = data.as_object_mut() {
            fields.insert("app_name".to_string(), json!(self.config.app_name));
            fields.insert("app_url".to_string(), json!(self.config.app_url));
        }
        data
    }

    fn build(
        &self,
        kind: NotificationKind,
        entity_key: &str,
        recipient: &str,
        data: &Value,
        subject_prefix: Option<&str>,
    ) -> NotificationResult<QueueItem> {
        let rendered = self.renderer.render(kind, data)?;
        let subject = match subject_prefix {
            Some(prefix) => format!("[{prefix}] {}", rendered.subject),
            None => rendered.subject,
        };

        Ok(QueueItem::new(kind, entity_key, recipient, subject, rendered.html)
            .with_max_retries(self.queue.config().max_retries))
    }

    fn enqueue(&self, item: QueueItem) -> String {
        let id = item.id().to_string();
        info!(item_id = %id, kind = %item.kind(), subject = %item.subject(), "Queueing notification");
        self.queue.enqueue(item);
        id
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// Romanian "N zile", with the "de" that numbers from 20 up take.
fn zile(n: i64) -> String {
    let n = n.abs();
    match n {
        1 => "o zi".to_string(),
        _ if n % 100 == 0 || n % 100 >= 20 => format!("{n} de zile"),
        _ => format!("{n} zile"),
    }
}

/// Human description of how far away expiry is, used in the subject and body.
pub fn days_label(days_until_expiry: i64) -> String {
    match days_until_expiry {
        d if d < 0 => format!("a expirat acum {}", zile(d)),
        0 => "expiră astăzi".to_string(),
        1 => "expiră mâine".to_string(),
        d => format!("expiră în {}", zile(d)),
    }
}
