//! Rate store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ratekeeper_common::{CurrencyCode, MergeSummary, Rate, RateStats, Result, Snapshot};

/// Durable storage of current rates, one row per currency code.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Most recent `updated_at` across all rows, `None` on an empty store.
    async fn latest_update(&self) -> Result<Option<DateTime<Utc>>>;

    /// Upsert every rate of the snapshot with `updated_at = now`.
    ///
    /// All-or-nothing: on error no row has changed.
    async fn merge_snapshot(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<MergeSummary>;

    /// All stored rates ordered by code.
    async fn all_rates(&self) -> Result<Vec<Rate>>;

    /// Look up a single rate.
    async fn get_rate(&self, code: &CurrencyCode) -> Result<Option<Rate>>;

    /// Aggregate statistics.
    async fn stats(&self) -> Result<RateStats> {
        let rates = self.all_rates().await?;
        Ok(RateStats::from_rates(&rates))
    }
}
