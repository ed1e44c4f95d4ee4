//! Structured result of a refresh run.

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};

use ratekeeper_common::{whole_minutes, ErrorKind, RatekeeperError, RunId};

/// Why a run did not reach the upstream provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The refresh gate denied the run.
    RateLimited,
    /// Another run was already in flight.
    Busy,
}

impl SkipReason {
    pub fn describe(&self) -> &'static str {
        match self {
            SkipReason::RateLimited => "Rate limiting: too soon since last update",
            SkipReason::Busy => "Another refresh is already in progress",
        }
    }
}

/// Result of one orchestrator invocation.
///
/// Only `Completed` is a success; `Skipped` is an expected outcome, not an
/// error.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed {
        run_id: RunId,
        /// Rows written (updated plus inserted).
        updated_count: usize,
        /// Rows created by this run.
        inserted_count: usize,
        /// Currencies in the fetched snapshot.
        currency_count: usize,
        timestamp: DateTime<Utc>,
    },
    Skipped {
        reason: SkipReason,
        wait_remaining: Option<Duration>,
        timestamp: DateTime<Utc>,
    },
    Failed {
        run_id: RunId,
        kind: ErrorKind,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl RunOutcome {
    pub(crate) fn failed(run_id: RunId, error: &RatekeeperError) -> Self {
        RunOutcome::Failed {
            run_id,
            kind: error.kind(),
            message: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn busy() -> Self {
        RunOutcome::Skipped {
            reason: SkipReason::Busy,
            wait_remaining: None,
            timestamp: Utc::now(),
        }
    }

    /// Check if the run merged a snapshot.
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    /// Check if the run was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped { .. })
    }

    /// Rows written, zero unless completed.
    pub fn updated_count(&self) -> usize {
        match self {
            RunOutcome::Completed { updated_count, .. } => *updated_count,
            _ => 0,
        }
    }

    /// Error kind of a failed run.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            RunOutcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Flat report shape used by operator tooling.
    pub fn report(&self) -> RunReport {
        match self {
            RunOutcome::Completed {
                run_id,
                updated_count,
                inserted_count,
                currency_count,
                timestamp,
            } => RunReport {
                success: true,
                run_id: Some(*run_id),
                updated_count: Some(*updated_count),
                inserted_count: Some(*inserted_count),
                currency_count: Some(*currency_count),
                timestamp: *timestamp,
                ..RunReport::empty(*timestamp)
            },
            RunOutcome::Skipped {
                reason,
                wait_remaining,
                timestamp,
            } => RunReport {
                skipped: true,
                reason: Some(reason.describe().to_string()),
                wait_remaining: wait_remaining.map(whole_minutes),
                ..RunReport::empty(*timestamp)
            },
            RunOutcome::Failed {
                run_id,
                kind,
                message,
                timestamp,
            } => RunReport {
                run_id: Some(*run_id),
                error: Some(message.clone()),
                error_kind: Some(*kind),
                ..RunReport::empty(*timestamp)
            },
        }
    }
}

impl Serialize for RunOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.report().serialize(serializer)
    }
}

/// Flat JSON form of a [`RunOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub success: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Minutes until the gate permits the next fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_remaining: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_count: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

impl RunReport {
    fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            success: false,
            skipped: false,
            run_id: None,
            reason: None,
            wait_remaining: None,
            error: None,
            error_kind: None,
            updated_count: None,
            inserted_count: None,
            currency_count: None,
            timestamp,
        }
    }
}
