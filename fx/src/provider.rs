//! Rate source trait and the upstream provider client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use ratekeeper_common::{constants, CurrencyCode, DurationExt, Snapshot};

use crate::conversion::{normalize, ProviderResponse};
use crate::error::{FxError, FxResult};

/// Longest provider error body kept in an error message.
const MAX_ERROR_BODY: usize = 256;

/// Trait for sources of rate snapshots.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Fetch one snapshot normalized to the base currency.
    async fn fetch(&self) -> FxResult<Snapshot>;
}

/// Upstream provider settings.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Provider endpoint.
    pub api_base_url: String,
    /// Provider API key; `None` selects the built-in fallback snapshot.
    pub api_key: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://openexchangerates.org/api/latest.json".to_string(),
            api_key: None,
            timeout: constants::upstream_timeout().as_std(),
        }
    }
}

/// HTTP client for the rate provider.
pub struct UpstreamClient {
    http: reqwest::Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    /// Build a client with the configured timeout.
    pub fn new(config: UpstreamConfig) -> FxResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FxError::Configuration(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Whether fetches go to the network.
    pub fn has_api_key(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn fetch_remote(&self, api_key: &str) -> FxResult<Snapshot> {
        // The key travels in the query string; strip the URL from errors.
        let response = self
            .http
            .get(&self.config.api_base_url)
            .query(&[("app_id", api_key)])
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message: String = body.chars().take(MAX_ERROR_BODY).collect();
            error!(status_code = status.as_u16(), "HTTP error fetching rates");
            return Err(FxError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await.map_err(|e| self.network_error(e))?;
        info!(status_code = status.as_u16(), bytes = body.len(), "External API response received");

        let parsed: ProviderResponse = serde_json::from_slice(&body).map_err(|e| {
            error!(error = %e, "Invalid JSON in API response");
            FxError::Format(e.to_string())
        })?;

        normalize(parsed, Utc::now())
    }

    fn network_error(&self, e: reqwest::Error) -> FxError {
        let e = e.without_url();
        if e.is_timeout() {
            error!(timeout_secs = self.config.timeout.as_secs(), "Timed out fetching rates");
            FxError::Network(format!("request timed out after {:?}", self.config.timeout))
        } else {
            error!(error = %e, "Network error fetching rates");
            FxError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl RateSource for UpstreamClient {
    fn name(&self) -> &str {
        if self.has_api_key() {
            "upstream"
        } else {
            "fallback"
        }
    }

    async fn fetch(&self) -> FxResult<Snapshot> {
        match &self.config.api_key {
            Some(key) => self.fetch_remote(key).await,
            None => {
                warn!("API key not configured, using built-in fallback rates");
                Ok(fallback_snapshot(Utc::now()))
            }
        }
    }
}

/// Fixed development snapshot used when no API key is configured.
pub fn fallback_snapshot(captured_at: DateTime<Utc>) -> Snapshot {
    let rates: BTreeMap<CurrencyCode, Decimal> = [
        (CurrencyCode::usd(), Decimal::new(112, 4)),
        (CurrencyCode::eur(), Decimal::new(101, 4)),
        (CurrencyCode::gbp(), Decimal::new(87, 4)),
        (CurrencyCode::cny(), Decimal::new(1534, 4)),
        (CurrencyCode::jpy(), Decimal::new(8203, 4)),
    ]
    .into_iter()
    .collect();
    Snapshot::new(rates, captured_at)
}

/// Scripted rate source for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateSource {
    name: String,
    next: parking_lot::Mutex<FxResult<BTreeMap<CurrencyCode, Decimal>>>,
    delay: parking_lot::Mutex<Option<Duration>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateSource {
    /// Create a mock that returns an empty snapshot.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next: parking_lot::Mutex::new(Ok(BTreeMap::new())),
            delay: parking_lot::Mutex::new(None),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Return these rates from every following fetch.
    pub fn set_rates(&self, rates: &[(&str, Decimal)]) {
        let rates = rates
            .iter()
            .map(|(code, value)| (CurrencyCode::parse(code).expect("valid code"), *value))
            .collect();
        *self.next.lock() = Ok(rates);
    }

    /// Fail every following fetch with `error`.
    pub fn fail_with(&self, error: FxError) {
        *self.next.lock() = Err(error);
    }

    /// Sleep before answering each fetch.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of fetches so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for MockRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> FxResult<Snapshot> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.next.lock().clone();
        next.map(|rates| Snapshot::new(rates, Utc::now()))
    }
}
