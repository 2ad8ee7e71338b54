//! Resend HTTP API transport.

use super::{DeliveryReceipt, EmailTransport, OutboundEmail};
use crate::error::TransportError;
use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_or_default, env_required};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_API_URL: &str = "https://api.resend.com";

/// Resend API configuration.
#[derive(Debug, Clone)]
pub struct ResendConfig {
    /// Resend API key (`re_...`).
    pub api_key: String,
    /// API base URL, overridable for tests and proxies.
    pub api_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ResendConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl FromEnv for ResendConfig {
    /// Reads `RESEND_API_KEY` (required) and `RESEND_API_URL`.
    fn from_env() -> Result<Self, ConfigError> {
        let api_key = env_required("RESEND_API_KEY")?;
        let api_url = env_or_default("RESEND_API_URL", DEFAULT_API_URL);
        Ok(Self::new(api_key).with_api_url(api_url))
    }
}

/// Sends email through `POST {api_url}/emails`.
pub struct ResendTransport {
    config: ResendConfig,
    client: Client,
}

impl ResendTransport {
    pub fn new(config: ResendConfig) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }

    fn endpoint(&self) -> String {
        format!("{}/emails", self.config.api_url)
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    name: Option<String>,
    message: String,
}

#[async_trait]
impl EmailTransport for ResendTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, TransportError> {
        let request = SendRequest {
            from: &email.from,
            to: [&email.to],
            subject: &email.subject,
            html: &email.html,
        };

        debug!(to = %email.to, subject = %email.subject, "Sending email via Resend");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let receipt: DeliveryReceipt = response.json().await?;
            return Ok(receipt);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => match err.name {
                Some(name) => format!("{name}: {}", err.message),
                None => err.message,
            },
            Err(_) => body,
        };

        error!(to = %email.to, status = %status, error = %message, "Resend rejected email");
        Err(TransportError::new(format!("Resend error ({status}): {message}")))
    }

    fn name(&self) -> &'static str {
        "resend"
    }
}
