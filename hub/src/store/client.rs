use reqwest::header::{ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::config::HubConfig;

const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(200);
const RETRY_AFTER_CAP: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store request timed out")]
    Timeout,
    #[error("store transport error: {0}")]
    Transport(String),
    #[error("store returned HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },
    #[error("store response decode failed: {0}")]
    Decode(String),
    #[error("store client closed")]
    Closed,
    #[error("store client build failed: {0}")]
    Build(String),
}

impl StoreError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Closed | Self::Build(_) => false,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Process-wide InfluxDB 2.x HTTP client.
///
/// Wraps one pooled `reqwest::Client`; concurrent queries share its
/// connections.  Every request carries the configured timeout and failed
/// attempts are retried within a fixed budget.
pub struct InfluxClient {
    http: Mutex<Option<Client>>,
    base_url: String,
    token: String,
    org: String,
    retries: u32,
    backoff_base: Duration,
}

impl InfluxClient {
    pub fn connect(cfg: &HubConfig) -> Result<Self, StoreError> {
        let http = Client::builder()
            .user_agent(concat!("coin-predict-hub/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(cfg.store_timeout)
            .timeout(cfg.store_timeout)
            .build()
            .map_err(|e| StoreError::Build(e.to_string()))?;

        Ok(Self {
            http: Mutex::new(Some(http)),
            base_url: cfg.influx_url.clone(),
            token: cfg.influx_token.clone(),
            org: cfg.influx_org.clone(),
            retries: cfg.store_retries,
            backoff_base: RETRY_BACKOFF_BASE,
        })
    }

    #[cfg(test)]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn http(&self) -> Result<Client, StoreError> {
        self.http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StoreError::Closed)
    }

    /// Release pooled connections.  Returns `false` if already closed.
    pub fn close(&self) -> bool {
        let taken = self
            .http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        taken.is_some()
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// `GET /ping`; single attempt.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let resp = self
            .http()?
            .get(format!("{}/ping", self.base_url))
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(StoreError::Status {
                status: status.as_u16(),
                message: "ping failed".to_string(),
                retry_after: None,
            })
        }
    }

    /// Run a Flux query and return the raw CSV body.
    pub async fn query_csv(&self, flux: &str) -> Result<String, StoreError> {
        let attempts = self.retries.saturating_add(1);
        let mut last_err = StoreError::Transport("no attempt made".to_string());

        for attempt in 1..=attempts {
            match self.query_once(flux).await {
                Ok(body) => return Ok(body),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    tracing::debug!("store query attempt {attempt}/{attempts} failed: {e}");
                    let backoff = match &e {
                        StoreError::Status {
                            retry_after: Some(d),
                            ..
                        } => (*d).min(RETRY_AFTER_CAP),
                        _ => self.backoff_base * attempt.saturating_mul(attempt),
                    };
                    last_err = e;
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        Err(last_err)
    }

    async fn query_once(&self, flux: &str) -> Result<String, StoreError> {
        let mut req = self
            .http()?
            .post(format!("{}/api/v2/query", self.base_url))
            .header(ACCEPT, "application/csv")
            .json(&json!({
                "query": flux,
                "type": "flux",
                "dialect": {
                    "header": true,
                    "annotations": [],
                    "delimiter": ",",
                },
            }));
        if !self.org.is_empty() {
            req = req.query(&[("org", self.org.as_str())]);
        }
        if !self.token.is_empty() {
            req = req.header(AUTHORIZATION, format!("Token {}", self.token));
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return resp.text().await.map_err(|e| {
                if e.is_timeout() {
                    StoreError::Timeout
                } else {
                    StoreError::Decode(e.to_string())
                }
            });
        }

        let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
            resp.headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
        } else {
            None
        };
        let body = resp.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            message: error_message(&body),
            retry_after,
        })
    }
}

/// Pull `message` out of an InfluxDB error body, else a bounded prefix.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Closes the shared client when dropped, whichever way the process exits.
pub struct StoreGuard(Arc<InfluxClient>);

impl StoreGuard {
    pub fn new(client: Arc<InfluxClient>) -> Self {
        Self(client)
    }
}

impl Drop for StoreGuard {
    fn drop(&mut self) {
        if self.0.close() {
            tracing::info!("Closed InfluxDB client ({})", self.0.base_url());
        }
    }
}
