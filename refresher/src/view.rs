//! Read-through access to rates for the serving side.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use ratekeeper_common::{CurrencyCode, Rate, RateStats, Result};
use ratekeeper_fx::{FreshnessCache, NamesPayload, RatesPayload};
use ratekeeper_store::RateStore;

/// Cache-first reader over the rate store.
///
/// A miss rebuilds the projection from the store and caches it, unless the
/// projection was invalidated while the store was being read. The cache is
/// an accelerator only: if it is unreachable, reads go to the store.
#[derive(Clone)]
pub struct RatesView {
    store: Arc<dyn RateStore>,
    cache: FreshnessCache,
}

impl RatesView {
    pub fn new(store: Arc<dyn RateStore>, cache: FreshnessCache) -> Self {
        Self { store, cache }
    }

    /// All current rates relative to RUB.
    pub async fn rates(&self) -> Result<RatesPayload> {
        match self.cache.get_rates().await {
            Ok(Some(payload)) => {
                debug!("Rates served from cache");
                return Ok(payload);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Rates cache read failed, falling back to store"),
        }

        let epoch = self.cache.rates_epoch();
        let rows = self.store.all_rates().await?;
        let payload = RatesPayload::from_rates(&rows, Utc::now());

        if let Err(e) = self.cache.fill_rates(&payload, epoch).await {
            warn!(error = %e, "Failed to cache rates");
        }

        Ok(payload)
    }

    /// Display names of every stored currency.
    pub async fn currency_names(&self) -> Result<NamesPayload> {
        match self.cache.get_names().await {
            Ok(Some(payload)) => return Ok(payload),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Currency names cache read failed, falling back to store"),
        }

        let epoch = self.cache.names_epoch();
        let rows = self.store.all_rates().await?;
        let payload = NamesPayload::from_rates(&rows, Utc::now());

        if let Err(e) = self.cache.fill_names(&payload, epoch).await {
            warn!(error = %e, "Failed to cache currency names");
        }

        Ok(payload)
    }

    /// A single rate; the code is case-insensitive. Malformed codes are
    /// treated as unknown.
    pub async fn rate(&self, code: &str) -> Result<Option<Rate>> {
        let Ok(code) = CurrencyCode::normalize(code) else {
            return Ok(None);
        };
        self.store.get_rate(&code).await
    }

    /// Counts and timestamps, always from the store.
    pub async fn stats(&self) -> Result<RateStats> {
        self.store.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratekeeper_fx::{CacheConfig, MemoryCache, UnavailableCache};
    use ratekeeper_store::{FlakyRateStore, MemoryRateStore};
    use rust_decimal_macros::dec;

    fn seeded_store() -> MemoryRateStore {
        MemoryRateStore::with_rates([
            Rate::new(CurrencyCode::usd(), dec!(0.0112), Utc::now()),
            Rate::new(CurrencyCode::eur(), dec!(0.0101), Utc::now()),
        ])
    }

    #[tokio::test]
    async fn test_miss_populates_cache() {
        let backend = Arc::new(MemoryCache::new());
        let cache = FreshnessCache::new(backend.clone(), CacheConfig::default());
        let view = RatesView::new(Arc::new(seeded_store()), cache.clone());

        let payload = view.rates().await.unwrap();

        assert_eq!(payload.base, "RUB");
        assert_eq!(payload.rates.len(), 2);
        assert_eq!(cache.get_rates().await.unwrap(), Some(payload));
    }

    #[tokio::test]
    async fn test_hit_does_not_touch_store() {
        let store = Arc::new(FlakyRateStore::new(seeded_store()));
        let cache = FreshnessCache::new(Arc::new(MemoryCache::new()), CacheConfig::default());
        let view = RatesView::new(store.clone(), cache);

        let first = view.rates().await.unwrap();
        store.fail_reads(true);
        let second = view.rates().await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unavailable_cache_degrades_to_store() {
        let cache = FreshnessCache::new(Arc::new(UnavailableCache), CacheConfig::default());
        let view = RatesView::new(Arc::new(seeded_store()), cache);

        assert_eq!(view.rates().await.unwrap().rates.len(), 2);
        assert_eq!(view.currency_names().await.unwrap().names["EUR"], "Euro");
    }

    #[tokio::test]
    async fn test_empty_store_yields_empty_rates() {
        let cache = FreshnessCache::new(Arc::new(MemoryCache::new()), CacheConfig::default());
        let view = RatesView::new(Arc::new(MemoryRateStore::new()), cache);

        let payload = view.rates().await.unwrap();
        assert!(payload.rates.is_empty());
    }

    #[tokio::test]
    async fn test_rate_lookup_is_case_insensitive() {
        let cache = FreshnessCache::new(Arc::new(MemoryCache::new()), CacheConfig::default());
        let view = RatesView::new(Arc::new(seeded_store()), cache);

        let rate = view.rate("usd").await.unwrap().unwrap();
        assert_eq!(rate.value, dec!(0.0112));
        assert!(view.rate("XYZ").await.unwrap().is_none());
        assert!(view.rate("not-a-code").await.unwrap().is_none());
    }
}
