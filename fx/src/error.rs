//! FX error types.

use ratekeeper_common::RatekeeperError;
use thiserror::Error;

/// Errors raised by the upstream client and the freshness cache.
#[derive(Debug, Clone, Error)]
pub enum FxError {
    /// Provider unreachable: connection failure or timeout.
    #[error("Network error: {0}")]
    Network(String),

    /// Provider returned a non-success status.
    #[error("Upstream returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Provider response does not match the expected schema.
    #[error("Unexpected provider response: {0}")]
    Format(String),

    /// Cache backend failure.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Client could not be built from its configuration.
    #[error("Invalid client configuration: {0}")]
    Configuration(String),
}

impl From<FxError> for RatekeeperError {
    fn from(e: FxError) -> Self {
        match e {
            FxError::Network(msg) => RatekeeperError::NetworkError(msg),
            FxError::Upstream { status, message } => {
                RatekeeperError::UpstreamError { status, message }
            }
            FxError::Format(msg) => RatekeeperError::FormatError(msg),
            FxError::Cache(msg) => RatekeeperError::CacheError(msg),
            FxError::Configuration(msg) => RatekeeperError::ConfigurationError(msg),
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
