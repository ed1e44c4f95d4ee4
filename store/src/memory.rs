//! In-process rate store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use ratekeeper_common::{CurrencyCode, MergeSummary, Rate, Result, Snapshot};

use crate::store::RateStore;

/// Rate store held in memory.
///
/// A merge is staged on a copy of the table and swapped in under the write
/// lock, so concurrent readers see either the old or the new table.
pub struct MemoryRateStore {
    rows: RwLock<BTreeMap<CurrencyCode, Rate>>,
}

impl MemoryRateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a store pre-populated with rows.
    pub fn with_rates(rates: impl IntoIterator<Item = Rate>) -> Self {
        let rows = rates.into_iter().map(|r| (r.code.clone(), r)).collect();
        Self {
            rows: RwLock::new(rows),
        }
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Merge with a hook called after each staged upsert (1-based count).
    /// An error from the hook discards the staged table.
    fn merge_with<F>(&self, snapshot: &Snapshot, now: DateTime<Utc>, mut after_upsert: F) -> Result<MergeSummary>
    where
        F: FnMut(usize) -> Result<()>,
    {
        let mut rows = self.rows.write();
        let mut staged = rows.clone();
        let mut summary = MergeSummary::default();

        for (code, value) in &snapshot.rates {
            match staged.get_mut(code) {
                Some(existing) => {
                    existing.value = *value;
                    existing.updated_at = existing.updated_at.max(now);
                    summary.updated += 1;
                    debug!(currency = %code, value = %value, "Updated existing rate");
                }
                None => {
                    staged.insert(code.clone(), Rate::new(code.clone(), *value, now));
                    summary.inserted += 1;
                    debug!(currency = %code, value = %value, "Created new rate");
                }
            }
            after_upsert(summary.written())?;
        }

        *rows = staged;
        Ok(summary)
    }
}

impl Default for MemoryRateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn latest_update(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.rows.read().values().map(|r| r.updated_at).max())
    }

    #[instrument(skip(self, snapshot), fields(currencies = snapshot.len()))]
    async fn merge_snapshot(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<MergeSummary> {
        let summary = self.merge_with(snapshot, now, |_| Ok(()))?;
        info!(
            updated = summary.updated,
            inserted = summary.inserted,
            "Rate merge committed"
        );
        Ok(summary)
    }

    async fn all_rates(&self) -> Result<Vec<Rate>> {
        Ok(self.rows.read().values().cloned().collect())
    }

    async fn get_rate(&self, code: &CurrencyCode) -> Result<Option<Rate>> {
        Ok(self.rows.read().get(code).cloned())
    }
}

/// Memory store with injectable storage failures, for tests.
#[cfg(any(test, feature = "test-utils"))]
pub struct FlakyRateStore {
    inner: MemoryRateStore,
    fail_reads: std::sync::atomic::AtomicBool,
    fail_after_upserts: parking_lot::Mutex<Option<usize>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl FlakyRateStore {
    /// Wrap a memory store.
    pub fn new(inner: MemoryRateStore) -> Self {
        Self {
            inner,
            fail_reads: std::sync::atomic::AtomicBool::new(false),
            fail_after_upserts: parking_lot::Mutex::new(None),
        }
    }

    /// Make `latest_update` and the read methods fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Fail the next merges after `count` upserts have been staged.
    pub fn fail_after_upserts(&self, count: Option<usize>) {
        *self.fail_after_upserts.lock() = count;
    }

    /// Access the wrapped store.
    pub fn inner(&self) -> &MemoryRateStore {
        &self.inner
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ratekeeper_common::RatekeeperError::StorageError(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateStore for FlakyRateStore {
    async fn latest_update(&self) -> Result<Option<DateTime<Utc>>> {
        self.check_reads()?;
        self.inner.latest_update().await
    }

    async fn merge_snapshot(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<MergeSummary> {
        let limit = *self.fail_after_upserts.lock();
        self.inner.merge_with(snapshot, now, |written| match limit {
            Some(limit) if written >= limit => Err(ratekeeper_common::RatekeeperError::StorageError(
                format!("write failed after {} upserts", written),
            )),
            _ => Ok(()),
        })
    }

    async fn all_rates(&self) -> Result<Vec<Rate>> {
        self.check_reads()?;
        self.inner.all_rates().await
    }

    async fn get_rate(&self, code: &CurrencyCode) -> Result<Option<Rate>> {
        self.check_reads()?;
        self.inner.get_rate(code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ratekeeper_common::RatekeeperError;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tokio_test::{assert_err, assert_ok};

    fn snapshot(rates: &[(&str, Decimal)]) -> Snapshot {
        let rates = rates
            .iter()
            .map(|(code, value)| (CurrencyCode::parse(code).unwrap(), *value))
            .collect();
        Snapshot::new(rates, Utc::now())
    }

    fn five_currencies(scale: Decimal) -> Snapshot {
        snapshot(&[
            ("CNY", dec!(0.1534) * scale),
            ("EUR", dec!(0.0101) * scale),
            ("GBP", dec!(0.0087) * scale),
            ("JPY", dec!(0.8203) * scale),
            ("USD", dec!(0.0112) * scale),
        ])
    }

    #[tokio::test]
    async fn test_empty_store_has_no_latest_update() {
        let store = MemoryRateStore::new();
        assert_eq!(store.latest_update().await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_merge_inserts_then_updates() {
        let store = MemoryRateStore::new();
        let first = Utc::now();

        let summary = store.merge_snapshot(&five_currencies(Decimal::ONE), first).await.unwrap();
        assert_eq!(summary.inserted, 5);
        assert_eq!(summary.updated, 0);

        let second = first + Duration::minutes(61);
        let summary = store
            .merge_snapshot(&snapshot(&[("EUR", dec!(0.0102)), ("TRY", dec!(0.35))]), second)
            .await
            .unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.inserted, 1);
        assert_eq!(store.len(), 6);

        let eur = store.get_rate(&CurrencyCode::eur()).await.unwrap().unwrap();
        assert_eq!(eur.value, dec!(0.0102));
        assert_eq!(eur.updated_at, second);

        let usd = store.get_rate(&CurrencyCode::usd()).await.unwrap().unwrap();
        assert_eq!(usd.updated_at, first);
        assert_eq!(store.latest_update().await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_updated_at_never_moves_backwards() {
        let now = Utc::now();
        let store = MemoryRateStore::with_rates([Rate::new(CurrencyCode::usd(), dec!(0.0112), now)]);

        store
            .merge_snapshot(&snapshot(&[("USD", dec!(0.0113))]), now - Duration::minutes(5))
            .await
            .unwrap();

        let usd = store.get_rate(&CurrencyCode::usd()).await.unwrap().unwrap();
        assert_eq!(usd.value, dec!(0.0113));
        assert_eq!(usd.updated_at, now);
    }

    #[tokio::test]
    async fn test_failed_merge_leaves_table_untouched() {
        let before = Utc::now() - Duration::hours(2);
        let original: Vec<Rate> = five_currencies(Decimal::ONE)
            .rates
            .into_iter()
            .map(|(code, value)| Rate::new(code, value, before))
            .collect();
        let store = FlakyRateStore::new(MemoryRateStore::with_rates(original.clone()));
        store.fail_after_upserts(Some(2));

        let result = store.merge_snapshot(&five_currencies(dec!(2)), Utc::now()).await;
        assert!(matches!(result, Err(RatekeeperError::StorageError(_))));

        assert_eq!(store.all_rates().await.unwrap(), original);
    }

    #[tokio::test]
    async fn test_flaky_reads() {
        let store = FlakyRateStore::new(MemoryRateStore::new());
        store.fail_reads(true);
        assert_err!(store.latest_update().await);

        store.fail_reads(false);
        assert_ok!(store.latest_update().await);
    }

    #[tokio::test]
    async fn test_stats_default_method() {
        let store = MemoryRateStore::new();
        let now = Utc::now();
        store.merge_snapshot(&five_currencies(Decimal::ONE), now).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_currencies, 5);
        assert_eq!(stats.last_updated, Some(now));
        assert_eq!(stats.currencies[0], CurrencyCode::cny());
    }
}
