//! Stored rates and fetched snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CurrencyCode;

/// Fractional digits kept for a stored rate value.
pub const RATE_SCALE: u32 = 6;

/// Current rate of one currency against the base currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    /// ISO currency code (unique per store).
    pub code: CurrencyCode,
    /// Positive rate value.
    pub value: Decimal,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl Rate {
    /// Create a new rate.
    pub fn new(code: CurrencyCode, value: Decimal, updated_at: DateTime<Utc>) -> Self {
        Self {
            code,
            value,
            updated_at,
        }
    }
}

/// One fetched and normalized set of rates.
///
/// Produced by the upstream client and consumed once by a merge; never
/// persisted as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Base currency the rates are expressed against.
    pub base: CurrencyCode,
    /// Rate per currency code.
    pub rates: BTreeMap<CurrencyCode, Decimal>,
    /// When the snapshot was captured.
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Create a snapshot against the base currency.
    pub fn new(rates: BTreeMap<CurrencyCode, Decimal>, captured_at: DateTime<Utc>) -> Self {
        Self {
            base: CurrencyCode::base(),
            rates,
            captured_at,
        }
    }

    /// Number of currencies in the snapshot.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Check if the snapshot carries no rates.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Result of merging a snapshot into the rate store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergeSummary {
    /// Rows that already existed and were overwritten.
    pub updated: usize,
    /// Rows created by this merge.
    pub inserted: usize,
}

impl MergeSummary {
    /// Total rows written.
    pub fn written(&self) -> usize {
        self.updated + self.inserted
    }

    /// Whether the set of stored currency codes changed.
    pub fn codes_changed(&self) -> bool {
        self.inserted > 0
    }
}

/// Aggregate view of the rate store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateStats {
    pub total_currencies: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub currencies: Vec<CurrencyCode>,
}

impl RateStats {
    /// Compute statistics from a set of rows.
    pub fn from_rates(rates: &[Rate]) -> Self {
        let mut currencies: Vec<CurrencyCode> = rates.iter().map(|r| r.code.clone()).collect();
        currencies.sort();
        Self {
            total_currencies: rates.len(),
            last_updated: rates.iter().map(|r| r.updated_at).max(),
            currencies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_snapshot_defaults_to_base_currency() {
        let snapshot = Snapshot::new(BTreeMap::new(), Utc::now());
        assert_eq!(snapshot.base.code(), "RUB");
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_stats_from_rates() {
        let now = Utc::now();
        let rates = vec![
            Rate::new(CurrencyCode::usd(), dec!(0.0112), now - Duration::minutes(5)),
            Rate::new(CurrencyCode::eur(), dec!(0.0101), now),
        ];

        let stats = RateStats::from_rates(&rates);
        assert_eq!(stats.total_currencies, 2);
        assert_eq!(stats.last_updated, Some(now));
        assert_eq!(stats.currencies, vec![CurrencyCode::eur(), CurrencyCode::usd()]);
    }

    #[test]
    fn test_stats_empty_store() {
        let stats = RateStats::from_rates(&[]);
        assert_eq!(stats.total_currencies, 0);
        assert!(stats.last_updated.is_none());
    }

    #[test]
    fn test_merge_summary() {
        let summary = MergeSummary {
            updated: 3,
            inserted: 2,
        };
        assert_eq!(summary.written(), 5);
        assert!(summary.codes_changed());
        assert!(!MergeSummary::default().codes_changed());
    }
}
