//! Compliance Notifier
//!
//! Command-line front end for the notifications domain: renders one
//! notification, delivers it through a [`DeliveryQueue`] and waits for the
//! queue to drain.
//!
//! ## Architecture
//!
//! ```text
//! CLI arguments / JSON file
//!   ↓ (typed request)
//! NotificationService
//!   ↓ (renders templates)
//! DeliveryQueue (retry with exponential backoff)
//!   ↓
//! ResendTransport, or LogTransport with --dry-run
//! ```
//!
//! ## Environment
//!
//! - `RESEND_API_KEY`, `RESEND_API_URL`: transport (not needed with `--dry-run`)
//! - `EMAIL_FROM`, `NOTIFY_MAX_RETRIES`, `NOTIFY_BASE_DELAY_MS`,
//!   `NOTIFY_INTER_ITEM_DELAY_MS`: queue policy
//! - `APP_NAME`, `APP_URL`: values shown in every template
//! - `APP_ENV`, `RUST_LOG`: log format and filter

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{ConfigError, Environment, FromEnv};
use domain_notifications::providers::{ResendConfig, ResendTransport};
use domain_notifications::{
    DeliveryQueue, EmailTransport, ExpiryAlert, Invitation, LogTransport, MemoryDeadLetterSink,
    MonthlyReport, NotificationService, NotificationServiceConfig, PasswordReset, QueueConfig,
    TemplateEngine, WelcomeUser,
};
use eyre::{Result, WrapErr, bail};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "compliance_notifier")]
#[command(about = "Render and deliver compliance notification emails")]
pub struct Cli {
    /// Log emails instead of sending them through Resend
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Welcome a newly registered user
    Welcome {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        /// Organization the user joined
        #[arg(long)]
        org: String,
    },

    /// Warn that a compliance document expires or has expired
    ExpiryAlert {
        #[arg(long)]
        to: String,
        #[arg(long)]
        recipient_name: String,
        #[arg(long)]
        org: String,
        #[arg(long)]
        employee: String,
        /// Category, e.g. "Fișă de aptitudine"
        #[arg(long)]
        item_type: String,
        #[arg(long)]
        item_name: String,
        /// Expiry date as YYYY-MM-DD
        #[arg(long)]
        expiry_date: NaiveDate,
        /// Alert id used in links and logs. Generated when omitted.
        #[arg(long)]
        alert_id: Option<String>,
    },

    /// Send a monthly report described by a JSON file
    MonthlyReport {
        #[arg(long)]
        file: PathBuf,
    },

    /// Invite someone to an organization
    Invite {
        #[arg(long)]
        email: String,
        #[arg(long)]
        org: String,
        #[arg(long)]
        inviter: String,
        #[arg(long, default_value = "angajat")]
        role: String,
        #[arg(long)]
        invite_url: String,
        #[arg(long, default_value_t = 7)]
        expires_in_days: u32,
    },

    /// Send a password reset link
    PasswordReset {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        reset_url: String,
        #[arg(long, default_value_t = 60)]
        expires_in_minutes: u32,
    },
}

/// Everything the notifier reads from the environment, apart from the
/// transport credentials.
#[derive(Debug, Clone)]
pub struct Settings {
    pub queue: QueueConfig,
    pub service: NotificationServiceConfig,
}

impl FromEnv for Settings {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            queue: QueueConfig::from_env()?,
            service: NotificationServiceConfig::from_env()?,
        })
    }
}

/// Run the notifier
///
/// 1. Sets up structured logging (env-aware: JSON for prod, pretty for dev)
/// 2. Parses the command line and loads settings from the environment
/// 3. Queues the requested notification and waits until it is delivered or
///    dead-lettered
///
/// # Errors
///
/// Returns an error if configuration is invalid, rendering fails, or the
/// notification could not be delivered.
pub async fn run() -> Result<()> {
    install_color_eyre();
    let environment = Environment::from_env();
    init_tracing(&environment);

    let cli = Cli::parse();
    let settings = Settings::from_env().wrap_err("Failed to load notifier configuration")?;

    let transport = build_transport(cli.dry_run)?;
    execute(cli.command, settings, transport, Utc::now().date_naive()).await
}

/// Pick the transport: log-only for dry runs, Resend otherwise.
pub fn build_transport(dry_run: bool) -> Result<Arc<dyn EmailTransport>> {
    if dry_run {
        info!("Dry run: emails will be logged, not sent");
        return Ok(Arc::new(LogTransport));
    }

    let config = ResendConfig::from_env()
        .wrap_err("Resend is not configured; set RESEND_API_KEY or pass --dry-run")?;
    let transport = ResendTransport::new(config).wrap_err("Failed to create Resend client")?;
    info!(api_url = %transport.api_url(), "Using Resend transport");
    Ok(Arc::new(transport))
}

/// Queue one notification and wait for the outcome.
///
/// `today` anchors the days-until-expiry calculation for expiry alerts.
pub async fn execute(
    command: Command,
    settings: Settings,
    transport: Arc<dyn EmailTransport>,
    today: NaiveDate,
) -> Result<()> {
    let templates = TemplateEngine::new().wrap_err("Failed to initialize template engine")?;

    let dead_letters = MemoryDeadLetterSink::new();
    let queue = DeliveryQueue::builder(transport)
        .config(settings.queue)
        .dead_letter_sink(Arc::new(dead_letters.clone()))
        .spawn();

    let service = NotificationService::new(queue.clone(), Arc::new(templates), settings.service);

    let submitted = submit(&service, command, today).await;
    let id = match submitted {
        Ok(id) => id,
        Err(e) => {
            queue.shutdown().await;
            return Err(e);
        }
    };

    let interrupted = tokio::select! {
        _ = queue.wait_idle() => false,
        signal = tokio::signal::ctrl_c() => {
            signal.wrap_err("Failed to listen for Ctrl+C")?;
            warn!("Received Ctrl+C, abandoning pending notifications");
            true
        }
    };

    queue.shutdown().await;
    if interrupted {
        bail!("Interrupted before notification {id} was confirmed delivered");
    }

    if let Some(dead) = dead_letters.entries().await.into_iter().next() {
        bail!(
            "Notification {id} failed after {} attempts: {}",
            dead.item.retry_count(),
            dead.error
        );
    }

    info!(item_id = %id, "Notification delivered");
    Ok(())
}

/// Turn a command into a typed request and queue it. Returns the item id.
async fn submit(
    service: &NotificationService,
    command: Command,
    today: NaiveDate,
) -> Result<String> {
    let id = match command {
        Command::Welcome { email, name, org } => {
            service.send_welcome(&WelcomeUser { email, name }, &org)?
        }
        Command::ExpiryAlert {
            to,
            recipient_name,
            org,
            employee,
            item_type,
            item_name,
            expiry_date,
            alert_id,
        } => {
            let alert = ExpiryAlert {
                alert_id: alert_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                recipient_email: to,
                recipient_name,
                org_name: org,
                employee_name: employee,
                item_type,
                item_name,
                expiry_date,
                days_until_expiry: (expiry_date - today).num_days(),
            };
            service.send_expiry_alert(&alert)?
        }
        Command::MonthlyReport { file } => {
            let contents = tokio::fs::read_to_string(&file)
                .await
                .wrap_err_with(|| format!("Failed to read {}", file.display()))?;
            let report: MonthlyReport = serde_json::from_str(&contents)
                .wrap_err_with(|| format!("Invalid monthly report in {}", file.display()))?;
            service.send_monthly_report(&report)?
        }
        Command::Invite {
            email,
            org,
            inviter,
            role,
            invite_url,
            expires_in_days,
        } => service.send_invite(&Invitation {
            email,
            org_name: org,
            inviter_name: inviter,
            role,
            invite_url,
            expires_in_days,
        })?,
        Command::PasswordReset {
            email,
            name,
            reset_url,
            expires_in_minutes,
        } => service.send_password_reset(&PasswordReset {
            email,
            name,
            reset_url,
            expires_in_minutes,
        })?,
    };

    info!(item_id = %id, "Notification queued");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use domain_notifications::{DeliveryReceipt, OutboundEmail, TransportError};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records what it is asked to send; fails every call when `fail` is set.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutboundEmail>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl EmailTransport for RecordingTransport {
        async fn send(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, TransportError> {
            self.sent.lock().unwrap().push(email.clone());
            if self.fail {
                Err(TransportError::new("Resend error (422): invalid `to` field"))
            } else {
                Ok(DeliveryReceipt {
                    id: "re_123".to_string(),
                })
            }
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn settings() -> Settings {
        Settings {
            queue: QueueConfig::default()
                .with_base_delay(Duration::from_millis(5))
                .with_inter_item_delay(Duration::ZERO),
            service: NotificationServiceConfig::default(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("compliance_notifier").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_expiry_alert() {
        let cli = parse(&[
            "--dry-run",
            "expiry-alert",
            "--to",
            "hr@construct.ro",
            "--recipient-name",
            "Maria",
            "--org",
            "Construct SRL",
            "--employee",
            "Ion Ionescu",
            "--item-type",
            "Fișă de aptitudine",
            "--item-name",
            "Control medical periodic",
            "--expiry-date",
            "2026-10-16",
        ]);

        assert!(cli.dry_run);
        match cli.command {
            Command::ExpiryAlert {
                expiry_date,
                alert_id,
                ..
            } => {
                assert_eq!(expiry_date, NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
                assert!(alert_id.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_date() {
        let result = Cli::try_parse_from([
            "compliance_notifier",
            "expiry-alert",
            "--to",
            "a@b.ro",
            "--recipient-name",
            "A",
            "--org",
            "O",
            "--employee",
            "E",
            "--item-type",
            "T",
            "--item-name",
            "N",
            "--expiry-date",
            "16.10.2026",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invite_defaults() {
        let cli = parse(&[
            "invite",
            "--email",
            "nou@construct.ro",
            "--org",
            "Construct SRL",
            "--inviter",
            "Ion",
            "--invite-url",
            "https://app.ssm.ro/invite/abc",
        ]);

        assert!(!cli.dry_run);
        match cli.command {
            Command::Invite {
                role,
                expires_in_days,
                ..
            } => {
                assert_eq!(role, "angajat");
                assert_eq!(expires_in_days, 7);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_expired_alert_is_delivered_with_expired_prefix() {
        let transport = Arc::new(RecordingTransport::default());
        let cli = parse(&[
            "expiry-alert",
            "--to",
            "hr@construct.ro",
            "--recipient-name",
            "Maria",
            "--org",
            "Construct SRL",
            "--employee",
            "Ion Ionescu",
            "--item-type",
            "Fișă de aptitudine",
            "--item-name",
            "Control medical periodic",
            "--expiry-date",
            "2026-10-16",
            "--alert-id",
            "alert-1",
        ]);

        execute(cli.command, settings(), transport.clone(), today())
            .await
            .unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "hr@construct.ro");
        assert!(sent[0].subject.starts_with("[EXPIRAT] "), "{}", sent[0].subject);
        assert!(sent[0].html.contains("/alerte/alert-1"));
    }

    #[tokio::test]
    async fn test_undeliverable_notification_is_an_error() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let cli = parse(&[
            "password-reset",
            "--email",
            "ana@example.ro",
            "--reset-url",
            "https://app.ssm.ro/reset/abc",
        ]);

        let err = execute(cli.command, settings(), transport.clone(), today())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("failed after 3 attempts"), "{err}");
        assert_eq!(transport.sent.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_monthly_report_from_file() {
        let path = std::env::temp_dir().join(format!("monthly-report-{}.json", Uuid::new_v4()));
        let report = serde_json::json!({
            "org_id": "org-9",
            "recipient_email": "admin@construct.ro",
            "recipient_name": "Maria",
            "org_name": "Construct SRL",
            "period": "septembrie 2026",
            "total_items": 4,
            "expired": 1,
            "expiring_soon": 1,
            "valid": 2,
            "upcoming": [{
                "employee_name": "Ion Ionescu",
                "item_name": "Instruire PSI",
                "expiry_date": "2026-11-02",
                "days_until_expiry": 15
            }]
        });
        std::fs::write(&path, report.to_string()).unwrap();

        let transport = Arc::new(RecordingTransport::default());
        let cli = parse(&["monthly-report", "--file", path.to_str().unwrap()]);
        let result = execute(cli.command, settings(), transport.clone(), today()).await;
        std::fs::remove_file(&path).ok();

        result.unwrap();
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].subject, "Raport lunar septembrie 2026 - Construct SRL");
    }

    #[tokio::test]
    async fn test_missing_report_file_is_an_error() {
        let transport = Arc::new(RecordingTransport::default());
        let cli = parse(&["monthly-report", "--file", "/nonexistent/report.json"]);

        let err = execute(cli.command, settings(), transport.clone(), today())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Failed to read"));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dry_run_needs_no_credentials() {
        temp_env::with_var_unset("RESEND_API_KEY", || {
            assert!(build_transport(false).is_err());
            let transport = build_transport(true).unwrap();
            assert_eq!(transport.name(), "log");
        });
    }

    #[test]
    fn test_settings_from_env() {
        temp_env::with_vars(
            [
                ("NOTIFY_MAX_RETRIES", Some("5")),
                ("APP_URL", Some("https://app.ssm.ro/")),
            ],
            || {
                let settings = Settings::from_env().unwrap();
                assert_eq!(settings.queue.max_retries, 5);
                assert_eq!(settings.service.app_url, "https://app.ssm.ro");
            },
        );
    }
}
