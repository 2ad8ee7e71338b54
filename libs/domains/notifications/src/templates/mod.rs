//! Notification rendering.
//!
//! [`Renderer`] is the seam the service renders through; [`TemplateEngine`]
//! is the Handlebars implementation used in production.

use crate::error::{NotificationError, NotificationResult};
use crate::models::NotificationKind;
use handlebars::Handlebars;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Rendered notification content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNotification {
    pub subject: String,
    pub html: String,
}

/// Turns a notification kind plus template data into a subject and body.
///
/// Implementations must be pure and fast; they run on the producer's call
/// path before anything is enqueued.
#[cfg_attr(test, mockall::automock)]
pub trait Renderer: Send + Sync {
    fn render(&self, kind: NotificationKind, data: &Value)
        -> NotificationResult<RenderedNotification>;
}

/// Handlebars templates for every notification kind.
///
/// Runs in strict mode: a template that references a field missing from the
/// data fails to render instead of producing an email with blanks.
#[derive(Clone)]
pub struct TemplateEngine {
    handlebars: Arc<Handlebars<'static>>,
}

impl TemplateEngine {
    /// Create a new template engine with all templates registered.
    pub fn new() -> NotificationResult<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);

        for (name, partial) in [("header", HEADER_PARTIAL), ("footer", FOOTER_PARTIAL)] {
            handlebars.register_partial(name, partial).map_err(|e| {
                NotificationError::TemplateError(format!("Failed to register {name}: {e}"))
            })?;
        }

        for kind in NotificationKind::ALL {
            let (subject, html) = templates_for(kind);
            for (name, source) in [
                (subject_template(kind), subject),
                (html_template(kind), html),
            ] {
                handlebars
                    .register_template_string(&name, source)
                    .map_err(|e| {
                        NotificationError::TemplateError(format!(
                            "Failed to register {name}: {e}"
                        ))
                    })?;
            }
        }

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }
}

impl Renderer for TemplateEngine {
    fn render(
        &self,
        kind: NotificationKind,
        data: &Value,
    ) -> NotificationResult<RenderedNotification> {
        debug!(kind = %kind, "Rendering notification");

        let subject = self.handlebars.render(&subject_template(kind), data)?;
        let html = self.handlebars.render(&html_template(kind), data)?;

        Ok(RenderedNotification {
            subject: subject.trim().to_string(),
            html,
        })
    }
}

fn subject_template(kind: NotificationKind) -> String {
    format!("{kind}_subject")
}

fn html_template(kind: NotificationKind) -> String {
    format!("{kind}_html")
}

fn templates_for(kind: NotificationKind) -> (&'static str, &'static str) {
    match kind {
        NotificationKind::Welcome => (WELCOME_SUBJECT, WELCOME_HTML),
        NotificationKind::ExpiryAlert => (EXPIRY_ALERT_SUBJECT, EXPIRY_ALERT_HTML),
        NotificationKind::MonthlyReport => (MONTHLY_REPORT_SUBJECT, MONTHLY_REPORT_HTML),
        NotificationKind::Invite => (INVITE_SUBJECT, INVITE_HTML),
        NotificationKind::PasswordReset => (PASSWORD_RESET_SUBJECT, PASSWORD_RESET_HTML),
    }
}

// ============================================================================
// Templates
// ============================================================================

// Subjects use triple-stash: they are plain text, not HTML.

const WELCOME_SUBJECT: &str = "Bun venit pe {{{app_name}}}, {{{user_name}}}!";
const EXPIRY_ALERT_SUBJECT: &str = "{{{item_type}}} - {{{employee_name}}} {{{days_label}}}";
const MONTHLY_REPORT_SUBJECT: &str = "Raport lunar {{{period}}} - {{{org_name}}}";
const INVITE_SUBJECT: &str = "{{{inviter_name}}} v-a invitat în {{{org_name}}}";
const PASSWORD_RESET_SUBJECT: &str = "Resetare parolă {{{app_name}}}";

const HEADER_PARTIAL: &str = r#"<!DOCTYPE html>
<html lang="ro">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{{app_name}}</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background-color: #f4f4f5;">
  <table role="presentation" width="100%" cellspacing="0" cellpadding="0" style="max-width: 600px; margin: 0 auto; padding: 40px 20px;">
    <tr>
      <td style="background-color: #ffffff; border-radius: 8px; padding: 40px; box-shadow: 0 2px 4px rgba(0,0,0,0.1);">
        <p style="color: #18181b; font-size: 14px; font-weight: 700; letter-spacing: 0.05em; margin: 0 0 24px 0;">{{app_name}}</p>
"#;

const FOOTER_PARTIAL: &str = r#"      </td>
    </tr>
    <tr>
      <td style="padding: 24px 0; text-align: center;">
        <p style="color: #a1a1aa; font-size: 12px; margin: 0;">
          Acest mesaj a fost trimis automat de <a href="{{app_url}}" style="color: #71717a;">{{app_name}}</a>. Vă rugăm să nu răspundeți la acest email.
        </p>
      </td>
    </tr>
  </table>
</body>
</html>"#;

const WELCOME_HTML: &str = r#"{{> header}}
        <h1 style="color: #18181b; font-size: 24px; font-weight: 600; margin: 0 0 16px 0;">Bun venit, {{user_name}}!</h1>
        <p style="color: #52525b; font-size: 16px; line-height: 24px; margin: 0 0 24px 0;">
          Contul dumneavoastră pentru <strong>{{org_name}}</strong> a fost creat. De acum puteți urmări fișele medicale, instruirile SSM și verificările PSI într-un singur loc.
        </p>
        <a href="{{dashboard_url}}" style="display: inline-block; background-color: #2563eb; color: #ffffff; font-size: 16px; font-weight: 500; padding: 12px 32px; text-decoration: none; border-radius: 6px;">Deschide panoul</a>
{{> footer}}"#;

const EXPIRY_ALERT_HTML: &str = r#"{{> header}}
        <p style="display: inline-block; background-color: {{severity_color}}; color: #ffffff; font-size: 12px; font-weight: 700; padding: 4px 10px; border-radius: 4px; margin: 0 0 16px 0;">{{severity}}</p>
        <h1 style="color: #18181b; font-size: 22px; font-weight: 600; margin: 0 0 16px 0;">{{item_type}}: {{employee_name}}</h1>
        <p style="color: #52525b; font-size: 16px; line-height: 24px; margin: 0 0 8px 0;">Bună ziua, {{recipient_name}},</p>
        <p style="color: #52525b; font-size: 16px; line-height: 24px; margin: 0 0 24px 0;">
          Documentul <strong>{{item_name}}</strong> pentru {{employee_name}} ({{org_name}}) {{days_label}}. Data expirării: <strong>{{expiry_date}}</strong>.
        </p>
        <a href="{{alert_url}}" style="display: inline-block; background-color: {{severity_color}}; color: #ffffff; font-size: 16px; font-weight: 500; padding: 12px 32px; text-decoration: none; border-radius: 6px;">Vezi detalii</a>
{{> footer}}"#;

const MONTHLY_REPORT_HTML: &str = r#"{{> header}}
        <h1 style="color: #18181b; font-size: 22px; font-weight: 600; margin: 0 0 16px 0;">Raport lunar: {{period}}</h1>
        <p style="color: #52525b; font-size: 16px; line-height: 24px; margin: 0 0 24px 0;">Bună ziua, {{recipient_name}}, iată situația conformității pentru <strong>{{org_name}}</strong>.</p>
        <table width="100%" cellspacing="0" cellpadding="8" style="margin-bottom: 24px; text-align: center;">
          <tr>
            <td style="background-color: #f4f4f5; border-radius: 6px;"><strong style="font-size: 20px;">{{total_items}}</strong><br><span style="color: #71717a; font-size: 12px;">Total</span></td>
            <td style="background-color: #fee2e2; border-radius: 6px;"><strong style="font-size: 20px; color: #dc2626;">{{expired}}</strong><br><span style="color: #71717a; font-size: 12px;">Expirate</span></td>
            <td style="background-color: #ffedd5; border-radius: 6px;"><strong style="font-size: 20px; color: #ea580c;">{{expiring_soon}}</strong><br><span style="color: #71717a; font-size: 12px;">Expiră curând</span></td>
            <td style="background-color: #dcfce7; border-radius: 6px;"><strong style="font-size: 20px; color: #16a34a;">{{valid}}</strong><br><span style="color: #71717a; font-size: 12px;">Valabile</span></td>
          </tr>
        </table>
        {{#if upcoming}}
        <h2 style="color: #18181b; font-size: 16px; margin: 0 0 8px 0;">Expirări în perioada următoare</h2>
        <table width="100%" cellspacing="0" cellpadding="6" style="border-collapse: collapse; font-size: 14px; color: #3f3f46; margin-bottom: 24px;">
          {{#each upcoming}}
          <tr style="border-bottom: 1px solid #e4e4e7;">
            <td>{{this.employee_name}}</td>
            <td>{{this.item_name}}</td>
            <td style="text-align: right;">{{this.expiry_date}}</td>
          </tr>
          {{/each}}
        </table>
        {{/if}}
        <a href="{{report_url}}" style="display: inline-block; background-color: #2563eb; color: #ffffff; font-size: 16px; font-weight: 500; padding: 12px 32px; text-decoration: none; border-radius: 6px;">Raport complet</a>
{{> footer}}"#;

const INVITE_HTML: &str = r#"{{> header}}
        <h1 style="color: #18181b; font-size: 22px; font-weight: 600; margin: 0 0 16px 0;">Ați fost invitat în {{org_name}}</h1>
        <p style="color: #52525b; font-size: 16px; line-height: 24px; margin: 0 0 24px 0;">
          {{inviter_name}} vă invită să vă alăturați organizației <strong>{{org_name}}</strong> cu rolul <strong>{{role}}</strong>.
        </p>
        <a href="{{invite_url}}" style="display: inline-block; background-color: #2563eb; color: #ffffff; font-size: 16px; font-weight: 500; padding: 12px 32px; text-decoration: none; border-radius: 6px;">Acceptă invitația</a>
        <p style="color: #71717a; font-size: 12px; margin: 16px 0 0 0;">Invitația expiră în {{expires_in_days}} zile.</p>
{{> footer}}"#;

const PASSWORD_RESET_HTML: &str = r#"{{> header}}
        <h1 style="color: #18181b; font-size: 22px; font-weight: 600; margin: 0 0 16px 0;">Resetare parolă</h1>
        <p style="color: #52525b; font-size: 16px; line-height: 24px; margin: 0 0 24px 0;">
          Bună ziua, {{user_name}}. Am primit o cerere de resetare a parolei pentru contul dumneavoastră.
        </p>
        <a href="{{reset_url}}" style="display: inline-block; background-color: #2563eb; color: #ffffff; font-size: 16px; font-weight: 500; padding: 12px 32px; text-decoration: none; border-radius: 6px;">Setează o parolă nouă</a>
        <p style="color: #71717a; font-size: 12px; margin: 16px 0 0 0;">
          Linkul este valabil {{expires_in_minutes}} de minute. Dacă nu ați cerut resetarea, ignorați acest mesaj.
        </p>
{{> footer}}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!({ "app_name": "SSM Conform", "app_url": "https://app.ssm.ro" })
    }

    fn with(mut data: Value, extra: Value) -> Value {
        if let (Some(target), Some(source)) = (data.as_object_mut(), extra.as_object()) {
            for (k, v) in source {
                target.insert(k.clone(), v.clone());
            }
        }
        data
    }

    #[test]
    fn test_template_engine_creation() {
        assert!(TemplateEngine::new().is_ok());
    }

    #[test]
    fn test_render_welcome() {
        let engine = TemplateEngine::new().unwrap();
        let data = with(
            base(),
            json!({
                "user_name": "Ana Popescu",
                "org_name": "Construct SRL",
                "dashboard_url": "https://app.ssm.ro/dashboard",
            }),
        );

        let rendered = engine.render(NotificationKind::Welcome, &data).unwrap();
        assert_eq!(rendered.subject, "Bun venit pe SSM Conform, Ana Popescu!");
        assert!(rendered.html.contains("Construct SRL"));
        assert!(rendered.html.contains("https://app.ssm.ro/dashboard"));
    }

    #[test]
    fn test_subject_is_not_html_escaped() {
        let engine = TemplateEngine::new().unwrap();
        let data = with(
            base(),
            json!({
                "org_name": "Pop & Fiii",
                "inviter_name": "Ion",
                "role": "admin",
                "invite_url": "https://app.ssm.ro/invite/abc",
                "expires_in_days": 7,
            }),
        );

        let rendered = engine.render(NotificationKind::Invite, &data).unwrap();
        assert_eq!(rendered.subject, "Ion v-a invitat în Pop & Fiii");
        assert!(rendered.html.contains("Pop &amp; Fiii"));
    }

    #[test]
    fn test_missing_field_is_template_error() {
        let engine = TemplateEngine::new().unwrap();
        let err = engine
            .render(NotificationKind::PasswordReset, &base())
            .unwrap_err();
        assert!(matches!(err, NotificationError::TemplateError(_)));
    }

    #[test]
    fn test_render_monthly_report_lists_upcoming() {
        let engine = TemplateEngine::new().unwrap();
        let data = with(
            base(),
            json!({
                "recipient_name": "Maria",
                "org_name": "Construct SRL",
                "period": "octombrie 2026",
                "total_items": 12,
                "expired": 1,
                "expiring_soon": 2,
                "valid": 9,
                "upcoming": [
                    { "employee_name": "Ion Ionescu", "item_name": "Fișă de aptitudine", "expiry_date": "25.10.2026", "days_until_expiry": 7 }
                ],
                "report_url": "https://app.ssm.ro/reports",
            }),
        );

        let rendered = engine.render(NotificationKind::MonthlyReport, &data).unwrap();
        assert_eq!(rendered.subject, "Raport lunar octombrie 2026 - Construct SRL");
        assert!(rendered.html.contains("Ion Ionescu"));
        assert!(rendered.html.contains("25.10.2026"));
    }
}
