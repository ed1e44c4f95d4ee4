//! Metrics collection for refresh monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Refresh run metrics.
pub struct Metrics {
    /// Runs that acquired the run guard.
    pub runs_total: AtomicU64,
    /// Runs that merged a snapshot.
    pub runs_success: AtomicU64,
    /// Runs that ended on an error.
    pub runs_failed: AtomicU64,
    /// Runs denied by the refresh gate.
    pub runs_skipped: AtomicU64,
    /// Runs rejected because another run was in flight.
    pub runs_busy: AtomicU64,
    /// Gate checks that failed open on a storage error.
    pub gate_fail_open: AtomicU64,
    /// Cache invalidations that failed.
    pub cache_invalidation_failures: AtomicU64,
    /// Rate rows written.
    pub rates_written: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            runs_total: AtomicU64::new(0),
            runs_success: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            runs_skipped: AtomicU64::new(0),
            runs_busy: AtomicU64::new(0),
            gate_fail_open: AtomicU64::new(0),
            cache_invalidation_failures: AtomicU64::new(0),
            rates_written: AtomicU64::new(0),
        }
    }

    pub fn run_started(&self) {
        self.runs_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn run_succeeded(&self, written: usize) {
        self.runs_success.fetch_add(1, Ordering::Relaxed);
        self.rates_written.fetch_add(written as u64, Ordering::Relaxed);
    }

    pub fn run_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn run_skipped(&self) {
        self.runs_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn run_busy(&self) {
        self.runs_busy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn gate_failed_open(&self) {
        self.gate_fail_open.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_invalidation_failed(&self) {
        self.cache_invalidation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_total: self.runs_total.load(Ordering::Relaxed),
            runs_success: self.runs_success.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_skipped: self.runs_skipped.load(Ordering::Relaxed),
            runs_busy: self.runs_busy.load(Ordering::Relaxed),
            gate_fail_open: self.gate_fail_open.load(Ordering::Relaxed),
            cache_invalidation_failures: self.cache_invalidation_failures.load(Ordering::Relaxed),
            rates_written: self.rates_written.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub runs_total: u64,
    pub runs_success: u64,
    pub runs_failed: u64,
    pub runs_skipped: u64,
    pub runs_busy: u64,
    pub gate_fail_open: u64,
    pub cache_invalidation_failures: u64,
    pub rates_written: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
