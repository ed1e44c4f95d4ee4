//! Refresh gate: the upstream request budget.
//!
//! A pure decision over "now" and the rate store's most recent `updated_at`.
//! It holds no state and performs no I/O; callers fetch the timestamp.

use chrono::{DateTime, Duration, Utc};

/// Outcome of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    /// An upstream call is allowed now.
    Permitted,
    /// Too soon since the last update.
    Denied { wait_remaining: Duration },
}

impl RefreshDecision {
    /// Check if the refresh may proceed.
    pub fn is_permitted(&self) -> bool {
        matches!(self, RefreshDecision::Permitted)
    }
}

/// Permit when there is no prior update or `now - last >= min_interval`.
pub fn should_refresh(
    now: DateTime<Utc>,
    last_update: Option<DateTime<Utc>>,
    min_interval: Duration,
) -> bool {
    RefreshGate::new(min_interval).decide(now, last_update).is_permitted()
}

/// Gate configured with a minimum refresh interval.
#[derive(Debug, Clone, Copy)]
pub struct RefreshGate {
    min_interval: Duration,
}

impl RefreshGate {
    /// Create a gate.
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    /// Minimum spacing between upstream calls.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Decide whether a refresh is permitted at `now`.
    pub fn decide(&self, now: DateTime<Utc>, last_update: Option<DateTime<Utc>>) -> RefreshDecision {
        let Some(last) = last_update else {
            return RefreshDecision::Permitted;
        };

        let elapsed = now.signed_duration_since(last);
        if elapsed >= self.min_interval {
            RefreshDecision::Permitted
        } else {
            RefreshDecision::Denied {
                wait_remaining: self
                    .min_interval
                    .checked_sub(&elapsed)
                    .unwrap_or(self.min_interval),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cold_start_is_permitted() {
        assert!(should_refresh(Utc::now(), None, Duration::minutes(60)));
    }

    #[test]
    fn test_exact_interval_is_permitted() {
        let now = Utc::now();
        let last = now - Duration::minutes(60);
        assert!(should_refresh(now, Some(last), Duration::minutes(60)));
    }

    #[test]
    fn test_denial_reports_remaining_wait() {
        let now = Utc::now();
        let gate = RefreshGate::new(Duration::minutes(60));

        let decision = gate.decide(now, Some(now - Duration::minutes(10)));

        assert_eq!(
            decision,
            RefreshDecision::Denied {
                wait_remaining: Duration::minutes(50)
            }
        );
    }

    #[test]
    fn test_future_timestamp_is_denied() {
        let now = Utc::now();
        assert!(!should_refresh(now, Some(now + Duration::minutes(1)), Duration::minutes(60)));
    }

    proptest! {
        #[test]
        fn prop_permitted_iff_elapsed_reaches_interval(
            elapsed_secs in -86_400i64..86_400,
            interval_secs in 0i64..86_400,
        ) {
            let now = Utc::now();
            let last = now - Duration::seconds(elapsed_secs);
            let interval = Duration::seconds(interval_secs);

            let permitted = should_refresh(now, Some(last), interval);
            prop_assert_eq!(permitted, elapsed_secs >= interval_secs);

            if let RefreshDecision::Denied { wait_remaining } = RefreshGate::new(interval).decide(now, Some(last)) {
                prop_assert_eq!(wait_remaining, Duration::seconds(interval_secs - elapsed_secs));
            }
        }
    }
}
