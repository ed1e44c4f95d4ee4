//! Error types for the Ratekeeper refresh pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for Ratekeeper operations.
#[derive(Error, Debug)]
pub enum RatekeeperError {
    /// Upstream unreachable: connection failure or timeout.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Upstream answered with a non-success status.
    #[error("Upstream error: status {status}: {message}")]
    UpstreamError { status: u16, message: String },

    /// Upstream response does not match the expected schema.
    #[error("Format error: {0}")]
    FormatError(String),

    /// Rate store unavailable for read or write.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Freshness cache unavailable.
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl RatekeeperError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RatekeeperError::NetworkError(_) => ErrorKind::Network,
            RatekeeperError::UpstreamError { .. } => ErrorKind::Upstream,
            RatekeeperError::FormatError(_) => ErrorKind::Format,
            RatekeeperError::StorageError(_) => ErrorKind::Storage,
            RatekeeperError::CacheError(_) => ErrorKind::Cache,
            RatekeeperError::ConfigurationError(_) => ErrorKind::Configuration,
        }
    }

    /// Check if a later run may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RatekeeperError::NetworkError(_)
                | RatekeeperError::UpstreamError { .. }
                | RatekeeperError::StorageError(_)
                | RatekeeperError::CacheError(_)
        )
    }

    /// Get error code for reports.
    pub fn error_code(&self) -> &'static str {
        self.kind().code()
    }
}

/// Error classification carried in failed run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Network,
    Upstream,
    Format,
    Storage,
    Cache,
    Configuration,
}

impl ErrorKind {
    /// Stable code string.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Upstream => "UPSTREAM_ERROR",
            ErrorKind::Format => "FORMAT_ERROR",
            ErrorKind::Storage => "STORAGE_ERROR",
            ErrorKind::Cache => "CACHE_ERROR",
            ErrorKind::Configuration => "CONFIGURATION_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Result type alias for Ratekeeper operations.
pub type Result<T> = std::result::Result<T, RatekeeperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            RatekeeperError::NetworkError("timeout".into()).error_code(),
            "NETWORK_ERROR"
        );
        assert_eq!(
            RatekeeperError::UpstreamError {
                status: 401,
                message: "invalid app_id".into()
            }
            .error_code(),
            "UPSTREAM_ERROR"
        );
        assert_eq!(
            RatekeeperError::StorageError("down".into()).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn test_format_errors_are_not_retryable() {
        assert!(!RatekeeperError::FormatError("missing RUB".into()).is_retryable());
        assert!(RatekeeperError::NetworkError("reset".into()).is_retryable());
    }

    #[test]
    fn test_kind_serializes_as_code() {
        let json = serde_json::to_string(&ErrorKind::Format).unwrap();
        assert_eq!(json, "\"FORMAT\"");
    }
}
