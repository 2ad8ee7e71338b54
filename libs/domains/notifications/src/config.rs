//! Configuration for the delivery queue and the notification service.

use crate::models::DEFAULT_MAX_RETRIES;
use core_config::{ConfigError, FromEnv, env_or_default, env_parse};
use std::time::Duration;

/// Retry and pacing policy for a [`DeliveryQueue`](crate::queue::DeliveryQueue).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Sender address passed to the transport.
    pub from_address: String,
    /// Attempts per item before it is dead-lettered.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,
    /// Pause after every send attempt to stay under provider rate limits.
    pub inter_item_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            from_address: "Conformitate <notificari@localhost>".to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_secs(5),
            inter_item_delay: Duration::from_millis(100),
        }
    }
}

impl QueueConfig {
    pub fn with_from_address(mut self, from: impl Into<String>) -> Self {
        self.from_address = from.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_inter_item_delay(mut self, delay: Duration) -> Self {
        self.inter_item_delay = delay;
        self
    }

    /// Reject policies the dispatcher cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid {
                key: "NOTIFY_MAX_RETRIES".to_string(),
                details: "must be at least 1".to_string(),
            });
        }
        if self.base_delay.is_zero() {
            return Err(ConfigError::Invalid {
                key: "NOTIFY_BASE_DELAY_MS".to_string(),
                details: "must be greater than zero".to_string(),
            });
        }
        if self.from_address.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "EMAIL_FROM".to_string(),
                details: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Replace the values [`validate`](Self::validate) rejects with the
    /// nearest usable ones.
    pub(crate) fn normalized(mut self) -> Self {
        self.max_retries = self.max_retries.max(1);
        if self.base_delay.is_zero() {
            self.base_delay = Duration::from_millis(1);
        }
        if self.from_address.trim().is_empty() {
            self.from_address = Self::default().from_address;
        }
        self
    }
}

impl FromEnv for QueueConfig {
    /// Reads:
    /// - `EMAIL_FROM`: sender address
    /// - `NOTIFY_MAX_RETRIES`: defaults to 3
    /// - `NOTIFY_BASE_DELAY_MS`: defaults to 5000
    /// - `NOTIFY_INTER_ITEM_DELAY_MS`: defaults to 100
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            from_address: env_or_default("EMAIL_FROM", &defaults.from_address),
            max_retries: env_parse("NOTIFY_MAX_RETRIES", defaults.max_retries)?,
            base_delay: Duration::from_millis(env_parse("NOTIFY_BASE_DELAY_MS", 5_000u64)?),
            inter_item_delay: Duration::from_millis(env_parse(
                "NOTIFY_INTER_ITEM_DELAY_MS",
                100u64,
            )?),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Values the typed producers put into every template.
#[derive(Debug, Clone)]
pub struct NotificationServiceConfig {
    /// Product name shown in subjects and footers.
    pub app_name: String,
    /// Base URL of the web application.
    pub app_url: String,
}

impl Default for NotificationServiceConfig {
    fn default() -> Self {
        Self {
            app_name: "SSM Conform".to_string(),
            app_url: "http://localhost:3000".to_string(),
        }
    }
}

impl FromEnv for NotificationServiceConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            app_name: env_or_default("APP_NAME", &defaults.app_name),
            app_url: env_or_default("APP_URL", &defaults.app_url)
                .trim_end_matches('/')
                .to_string(),
        })
    }
}
