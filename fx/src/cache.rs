//! Freshness cache with TTL support.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ratekeeper_common::{constants, Rate, BASE_CURRENCY};

use crate::error::{FxError, FxResult};

/// Key of the precomputed rates response.
pub const RATES_CACHE_KEY: &str = "rates_cache";

/// Key of the precomputed currency names response.
pub const NAMES_CACHE_KEY: &str = "currency_names_cache";

/// Key/value store with per-entry expiry.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a live value.
    async fn get(&self, key: &str) -> FxResult<Option<String>>;

    /// Store a value for `ttl`.
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> FxResult<()>;

    /// Delete a key, returning whether it existed.
    async fn delete(&self, key: &str) -> FxResult<bool>;
}

/// Cached value entry.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    cached_at: DateTime<Utc>,
    ttl: Duration,
}

impl CacheEntry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            cached_at: Utc::now(),
            ttl,
        }
    }

    fn is_valid(&self) -> bool {
        Utc::now().signed_duration_since(self.cached_at) < self.ttl
    }
}

/// Configuration for the in-process cache backend.
#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    /// Maximum number of entries before expired ones are evicted.
    pub max_entries: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self { max_entries: 1024 }
    }
}

/// Thread-safe in-process cache backend.
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    config: MemoryCacheConfig,
}

impl MemoryCache {
    /// Create a new cache with default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryCacheConfig::default())
    }

    /// Create a new cache with custom configuration.
    pub fn with_config(config: MemoryCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    /// Get the number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict expired entries.
    pub fn evict_expired(&self) {
        self.entries.retain(|_, entry| entry.is_valid());
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> FxResult<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_valid() {
                debug!(key, "Cache hit");
                return Ok(Some(entry.value.clone()));
            }
            debug!(key, "Cache entry expired");
            drop(entry);
            self.entries.remove(key);
        }

        debug!(key, "Cache miss");
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> FxResult<()> {
        if self.entries.len() >= self.config.max_entries {
            self.evict_expired();
        }
        self.entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> FxResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }
}

/// Backend that fails every call, for testing degraded paths.
#[cfg(any(test, feature = "test-utils"))]
pub struct UnavailableCache;

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl CacheBackend for UnavailableCache {
    async fn get(&self, _key: &str) -> FxResult<Option<String>> {
        Err(FxError::Cache("connection refused".to_string()))
    }

    async fn set_ex(&self, _key: &str, _value: String, _ttl: Duration) -> FxResult<()> {
        Err(FxError::Cache("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> FxResult<bool> {
        Err(FxError::Cache("connection refused".to_string()))
    }
}

/// Precomputed `rates_cache` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatesPayload {
    pub updated_at: DateTime<Utc>,
    pub base: String,
    pub rates: BTreeMap<String, f64>,
}

impl RatesPayload {
    /// Project stored rows; an empty store is stamped with `now`.
    pub fn from_rates(rates: &[Rate], now: DateTime<Utc>) -> Self {
        Self {
            updated_at: rates.iter().map(|r| r.updated_at).max().unwrap_or(now),
            base: BASE_CURRENCY.to_string(),
            rates: rates
                .iter()
                .map(|r| (r.code.to_string(), r.value.to_f64().unwrap_or_default()))
                .collect(),
        }
    }
}

/// Precomputed `currency_names_cache` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamesPayload {
    pub updated_at: DateTime<Utc>,
    pub names: BTreeMap<String, String>,
}

impl NamesPayload {
    /// Project stored rows; an empty store is stamped with `now`.
    pub fn from_rates(rates: &[Rate], now: DateTime<Utc>) -> Self {
        Self {
            updated_at: rates.iter().map(|r| r.updated_at).max().unwrap_or(now),
            names: rates
                .iter()
                .map(|r| (r.code.to_string(), r.code.display_name().to_string()))
                .collect(),
        }
    }
}

/// TTLs of the two cached projections.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub rates_ttl: Duration,
    pub names_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            rates_ttl: constants::rates_cache_ttl(),
            names_ttl: constants::names_cache_ttl(),
        }
    }
}

/// Typed access to the cached rates and names projections.
///
/// Entries are only ever deleted on change, never updated in place; the next
/// reader rebuilds them from the rate store.
///
/// Each projection carries an epoch bumped by every invalidation. A reader
/// rebuilding a projection records the epoch before reading the store and
/// fills through [`fill_rates`](Self::fill_rates) /
/// [`fill_names`](Self::fill_names), which refuse to keep an entry built
/// across an invalidation. Clones share the epochs.
#[derive(Clone)]
pub struct FreshnessCache {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    rates_epoch: Arc<AtomicU64>,
    names_epoch: Arc<AtomicU64>,
}

impl FreshnessCache {
    /// Create a cache over a backend.
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            rates_epoch: Arc::new(AtomicU64::new(0)),
            names_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current invalidation epoch of the rates projection.
    pub fn rates_epoch(&self) -> u64 {
        self.rates_epoch.load(Ordering::SeqCst)
    }

    /// Current invalidation epoch of the names projection.
    pub fn names_epoch(&self) -> u64 {
        self.names_epoch.load(Ordering::SeqCst)
    }

    /// Store a rates response built from a store read that started at
    /// `epoch`. Returns `false` if an invalidation intervened, in which case
    /// the entry is not kept.
    pub async fn fill_rates(&self, payload: &RatesPayload, epoch: u64) -> FxResult<bool> {
        if self.rates_epoch() != epoch {
            debug!("Rates changed during rebuild, not caching");
            return Ok(false);
        }
        self.put_rates(payload).await?;
        self.discard_if_stale(RATES_CACHE_KEY, &self.rates_epoch, epoch).await
    }

    /// Names counterpart of [`fill_rates`](Self::fill_rates).
    pub async fn fill_names(&self, payload: &NamesPayload, epoch: u64) -> FxResult<bool> {
        if self.names_epoch() != epoch {
            debug!("Currency names changed during rebuild, not caching");
            return Ok(false);
        }
        self.put_names(payload).await?;
        self.discard_if_stale(NAMES_CACHE_KEY, &self.names_epoch, epoch).await
    }

    // An invalidation landing between the epoch check and the write has
    // already bumped the epoch, so a second check after the write catches it.
    async fn discard_if_stale(&self, key: &str, current: &AtomicU64, epoch: u64) -> FxResult<bool> {
        if current.load(Ordering::SeqCst) == epoch {
            return Ok(true);
        }
        warn!(key, "Cache invalidated during rebuild, dropping entry");
        self.backend.delete(key).await?;
        Ok(false)
    }

    /// Cached rates response, if live.
    pub async fn get_rates(&self) -> FxResult<Option<RatesPayload>> {
        self.get_json(RATES_CACHE_KEY).await
    }

    /// Store the rates response for the rates TTL.
    pub async fn put_rates(&self, payload: &RatesPayload) -> FxResult<()> {
        self.put_json(RATES_CACHE_KEY, payload, self.config.rates_ttl).await?;
        info!(rates_count = payload.rates.len(), "Rates cached successfully");
        Ok(())
    }

    /// Cached names response, if live.
    pub async fn get_names(&self) -> FxResult<Option<NamesPayload>> {
        self.get_json(NAMES_CACHE_KEY).await
    }

    /// Store the names response for the names TTL.
    pub async fn put_names(&self, payload: &NamesPayload) -> FxResult<()> {
        self.put_json(NAMES_CACHE_KEY, payload, self.config.names_ttl).await?;
        info!(names_count = payload.names.len(), "Currency names cached successfully");
        Ok(())
    }

    /// Drop the rates response.
    pub async fn invalidate_rates(&self) -> FxResult<()> {
        self.rates_epoch.fetch_add(1, Ordering::SeqCst);
        self.backend.delete(RATES_CACHE_KEY).await?;
        info!("Rates cache cleared");
        Ok(())
    }

    /// Drop the names response.
    pub async fn invalidate_names(&self) -> FxResult<()> {
        self.names_epoch.fetch_add(1, Ordering::SeqCst);
        self.backend.delete(NAMES_CACHE_KEY).await?;
        info!("Currency names cache cleared");
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> FxResult<Option<T>> {
        let Some(raw) = self.backend.get(key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                // Treat a corrupt entry as a miss; the caller rebuilds it.
                warn!(key, error = %e, "Discarding unreadable cache entry");
                self.backend.delete(key).await?;
                Ok(None)
            }
        }
    }

    async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> FxResult<()> {
        let raw = serde_json::to_string(value).map_err(|e| FxError::Cache(e.to_string()))?;
        self.backend.set_ex(key, raw, ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratekeeper_common::CurrencyCode;
    use rust_decimal_macros::dec;
    use std::time::Duration as StdDuration;

    fn sample_rates() -> Vec<Rate> {
        let now = Utc::now();
        vec![
            Rate::new(CurrencyCode::eur(), dec!(0.0101), now - Duration::minutes(1)),
            Rate::new(CurrencyCode::usd(), dec!(0.0112), now),
        ]
    }

    #[tokio::test]
    async fn test_cache_set_and_get() {
        let cache = MemoryCache::new();
        cache.set_ex("k", "v".to_string(), Duration::seconds(60)).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(cache.get("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_expiry() {
        let cache = MemoryCache::new();
        cache.set_ex("k", "v".to_string(), Duration::milliseconds(50)).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::sleep(StdDuration::from_millis(60)).await;

        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cache_delete() {
        let cache = MemoryCache::new();
        cache.set_ex("k", "v".to_string(), Duration::seconds(60)).await.unwrap();

        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_rates_payload_roundtrip_through_cache() {
        let cache = FreshnessCache::new(Arc::new(MemoryCache::new()), CacheConfig::default());
        let rates = sample_rates();
        let payload = RatesPayload::from_rates(&rates, Utc::now());

        cache.put_rates(&payload).await.unwrap();
        let cached = cache.get_rates().await.unwrap().unwrap();

        assert_eq!(cached.base, "RUB");
        assert_eq!(cached.updated_at, rates[1].updated_at);
        assert_eq!(cached.rates["USD"], 0.0112);
    }

    #[tokio::test]
    async fn test_invalidation_is_per_key() {
        let cache = FreshnessCache::new(Arc::new(MemoryCache::new()), CacheConfig::default());
        let rates = sample_rates();
        cache.put_rates(&RatesPayload::from_rates(&rates, Utc::now())).await.unwrap();
        cache.put_names(&NamesPayload::from_rates(&rates, Utc::now())).await.unwrap();

        cache.invalidate_rates().await.unwrap();

        assert!(cache.get_rates().await.unwrap().is_none());
        let names = cache.get_names().await.unwrap().unwrap();
        assert_eq!(names.names["EUR"], "Euro");
    }

    #[tokio::test]
    async fn test_fill_refused_after_invalidation() {
        let cache = FreshnessCache::new(Arc::new(MemoryCache::new()), CacheConfig::default());
        let rates = sample_rates();
        let epoch = cache.rates_epoch();

        cache.invalidate_rates().await.unwrap();
        let kept = cache
            .fill_rates(&RatesPayload::from_rates(&rates, Utc::now()), epoch)
            .await
            .unwrap();

        assert!(!kept);
        assert!(cache.get_rates().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fill_kept_without_invalidation() {
        let cache = FreshnessCache::new(Arc::new(MemoryCache::new()), CacheConfig::default());
        let rates = sample_rates();
        let names_epoch = cache.names_epoch();

        // Rates invalidation leaves the names epoch alone.
        cache.invalidate_rates().await.unwrap();
        let kept = cache
            .fill_names(&NamesPayload::from_rates(&rates, Utc::now()), names_epoch)
            .await
            .unwrap();

        assert!(kept);
        assert!(cache.clone().get_names().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let backend = Arc::new(MemoryCache::new());
        backend
            .set_ex(RATES_CACHE_KEY, "not json".to_string(), Duration::seconds(60))
            .await
            .unwrap();
        let cache = FreshnessCache::new(backend.clone(), CacheConfig::default());

        assert!(cache.get_rates().await.unwrap().is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_backend_surfaces_cache_error() {
        let cache = FreshnessCache::new(Arc::new(UnavailableCache), CacheConfig::default());
        assert!(matches!(cache.invalidate_rates().await, Err(FxError::Cache(_))));
    }

    #[test]
    fn test_empty_payload_uses_now() {
        let now = Utc::now();
        let payload = RatesPayload::from_rates(&[], now);
        assert_eq!(payload.updated_at, now);
        assert!(payload.rates.is_empty());
    }
}
