//! Ratekeeper FX
//!
//! Everything the refresh pipeline needs around the rate store.
//!
//! # Features
//!
//! - Upstream client fetching the provider feed, with a built-in fallback
//!   snapshot when no API key is configured
//! - Normalization of the provider's USD-based rates to RUB
//! - Refresh gate enforcing the provider's request budget
//! - Freshness cache holding the precomputed rates and names responses
//!
//! # Example
//!
//! ```rust,ignore
//! use ratekeeper_fx::{RateSource, UpstreamClient, UpstreamConfig};
//!
//! let client = UpstreamClient::new(UpstreamConfig::default())?;
//! let snapshot = client.fetch().await?;
//! ```

pub mod provider;
pub mod conversion;
pub mod cache;
pub mod gate;
pub mod error;

pub use provider::{RateSource, UpstreamClient, UpstreamConfig};
pub use conversion::{normalize, ProviderResponse};
pub use cache::{
    CacheBackend, CacheConfig, FreshnessCache, MemoryCache, NamesPayload, RatesPayload,
    NAMES_CACHE_KEY, RATES_CACHE_KEY,
};
pub use gate::{should_refresh, RefreshDecision, RefreshGate};
pub use error::{FxError, FxResult};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateSource;
#[cfg(any(test, feature = "test-utils"))]
pub use cache::UnavailableCache;
