//! Time utilities and constants for the refresh pipeline.

use chrono::Duration;

/// Pipeline timing constants.
pub mod constants {
    use super::Duration;

    /// Minimum spacing between upstream calls (60 minutes).
    pub fn min_refresh_interval() -> Duration {
        Duration::minutes(60)
    }

    /// Scheduler check cadence (30 minutes).
    pub fn check_interval() -> Duration {
        Duration::minutes(30)
    }

    /// Delay of the warm-up run after start (5 seconds).
    pub fn initial_refresh_delay() -> Duration {
        Duration::seconds(5)
    }

    /// Upstream request timeout (30 seconds).
    pub fn upstream_timeout() -> Duration {
        Duration::seconds(30)
    }

    /// TTL of the `rates_cache` entry (1 hour).
    pub fn rates_cache_ttl() -> Duration {
        Duration::seconds(3600)
    }

    /// TTL of the `currency_names_cache` entry (24 hours).
    pub fn names_cache_ttl() -> Duration {
        Duration::seconds(86400)
    }
}

/// Fractional minutes in a duration, rounded to one decimal place.
pub fn whole_minutes(duration: Duration) -> f64 {
    let minutes = duration.num_milliseconds() as f64 / 60_000.0;
    (minutes * 10.0).round() / 10.0
}

/// Duration extensions for convenient conversion.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}
