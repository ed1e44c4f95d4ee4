//! Refresher configuration.

use std::time::Duration;

use ratekeeper_common::{constants, DurationExt};
use ratekeeper_fx::{CacheConfig, UpstreamConfig};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cadence of the non-forced check tick.
    pub check_interval: Duration,
    /// Delay of the one-shot warm-up tick after start.
    pub initial_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval: constants::check_interval().as_std(),
            initial_delay: constants::initial_refresh_delay().as_std(),
        }
    }
}

/// Main refresher configuration.
#[derive(Debug, Clone)]
pub struct RefresherConfig {
    /// Minimum spacing between upstream calls.
    pub min_refresh_interval: Duration,
    /// Upstream provider settings.
    pub upstream: UpstreamConfig,
    /// Scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Freshness cache TTLs.
    pub cache: CacheConfig,
    /// Database URL; `None` keeps rates in memory.
    pub database_url: Option<String>,
    /// Database pool size.
    pub database_max_connections: u32,
    /// Log level.
    pub log_level: String,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            min_refresh_interval: constants::min_refresh_interval().as_std(),
            upstream: UpstreamConfig::default(),
            scheduler: SchedulerConfig::default(),
            cache: CacheConfig::default(),
            database_url: None,
            database_max_connections: 5,
            log_level: "info".to_string(),
        }
    }
}

impl RefresherConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let minutes = |key: &str| parse_u64(&lookup, key).map(|m| Duration::from_secs(m.saturating_mul(60)));
        let seconds = |key: &str| parse_u64(&lookup, key).map(Duration::from_secs);

        if let Some(url) = lookup("RATES_API_URL") {
            config.upstream.api_base_url = url;
        }

        if let Some(key) = lookup("RATES_API_KEY").filter(|k| !k.trim().is_empty()) {
            config.upstream.api_key = Some(key);
        }

        if let Some(interval) = minutes("RATES_UPDATE_INTERVAL_MINUTES") {
            config.min_refresh_interval = interval;
        }

        if let Some(interval) = minutes("RATES_CHECK_INTERVAL_MINUTES") {
            config.scheduler.check_interval = interval;
        }

        if let Some(delay) = seconds("RATES_INITIAL_DELAY_SECONDS") {
            config.scheduler.initial_delay = delay;
        }

        if let Some(timeout) = seconds("RATES_REQUEST_TIMEOUT_SECONDS") {
            config.upstream.timeout = timeout;
        }

        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.is_empty()) {
            config.database_url = Some(url);
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_refresh_interval.is_zero() {
            return Err("Minimum refresh interval cannot be 0".to_string());
        }

        if self.scheduler.check_interval.is_zero() {
            return Err("Check interval cannot be 0".to_string());
        }

        if self.upstream.timeout.is_zero() {
            return Err("Upstream timeout cannot be 0".to_string());
        }

        let url = self.upstream.api_base_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!("Rates API URL must be http(s): {}", url));
        }

        if self.database_max_connections == 0 {
            return Err("Database pool size cannot be 0".to_string());
        }

        Ok(())
    }

    /// Minimum refresh interval as a chrono duration for the gate.
    pub fn gate_interval(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.min_refresh_interval).unwrap_or(chrono::Duration::MAX)
    }
}

fn parse_u64<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> RefresherConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RefresherConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = RefresherConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_refresh_interval, Duration::from_secs(3600));
        assert_eq!(config.scheduler.check_interval, Duration::from_secs(1800));
        assert_eq!(config.scheduler.initial_delay, Duration::from_secs(5));
        assert_eq!(config.upstream.timeout, Duration::from_secs(30));
        assert!(config.upstream.api_key.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = config_from(&[
            ("RATES_API_KEY", "abc"),
            ("RATES_UPDATE_INTERVAL_MINUTES", "120"),
            ("RATES_CHECK_INTERVAL_MINUTES", "15"),
            ("RATES_INITIAL_DELAY_SECONDS", "1"),
            ("DATABASE_URL", "postgres://localhost/rates"),
        ]);

        assert_eq!(config.upstream.api_key.as_deref(), Some("abc"));
        assert_eq!(config.min_refresh_interval, Duration::from_secs(7200));
        assert_eq!(config.scheduler.check_interval, Duration::from_secs(900));
        assert_eq!(config.scheduler.initial_delay, Duration::from_secs(1));
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/rates"));
        assert_eq!(config.gate_interval(), chrono::Duration::minutes(120));
    }

    #[test]
    fn test_blank_api_key_means_fallback() {
        let config = config_from(&[("RATES_API_KEY", "  ")]);
        assert!(config.upstream.api_key.is_none());
    }

    #[test]
    fn test_unparseable_numbers_keep_defaults() {
        let config = config_from(&[("RATES_UPDATE_INTERVAL_MINUTES", "hourly")]);
        assert_eq!(config.min_refresh_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = RefresherConfig::default();
        config.scheduler.check_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let config = config_from(&[("RATES_API_URL", "ftp://rates")]);
        assert!(config.validate().is_err());
    }
}
