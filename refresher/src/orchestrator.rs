//! Refresh orchestrator: gate, fetch, merge, invalidate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use ratekeeper_common::{whole_minutes, MergeSummary, RatekeeperError, RunId, Snapshot};
use ratekeeper_fx::{FreshnessCache, RateSource, RefreshDecision, RefreshGate};
use ratekeeper_store::RateStore;

use crate::metrics::SharedMetrics;
use crate::outcome::{RunOutcome, SkipReason};
use crate::state::RefreshPhase;

/// Runs one refresh at a time against the injected store, source and cache.
pub struct Orchestrator {
    store: Arc<dyn RateStore>,
    source: Arc<dyn RateSource>,
    cache: FreshnessCache,
    gate: RefreshGate,
    metrics: SharedMetrics,
    /// Held for the duration of a run.
    run_lock: Mutex<()>,
    /// Mirrors `run_lock` for observers that must not contend on it.
    in_flight: AtomicBool,
    phase: RwLock<RefreshPhase>,
}

/// Clears the in-flight flag when a run ends or is cancelled.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Orchestrator {
    /// Create an orchestrator.
    pub fn new(
        store: Arc<dyn RateStore>,
        source: Arc<dyn RateSource>,
        cache: FreshnessCache,
        gate: RefreshGate,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            store,
            source,
            cache,
            gate,
            metrics,
            run_lock: Mutex::new(()),
            in_flight: AtomicBool::new(false),
            phase: RwLock::new(RefreshPhase::Idle),
        }
    }

    /// Run the pipeline once. `force` bypasses the refresh gate.
    ///
    /// Never returns an error: every failure is reported in the outcome. A
    /// request arriving while another run is in flight is skipped as busy.
    #[instrument(skip(self), fields(source = %self.source.name()))]
    pub async fn refresh(&self, force: bool) -> RunOutcome {
        let Ok(_guard) = self.run_lock.try_lock() else {
            info!("Refresh already in progress, skipping");
            self.metrics.run_busy();
            return RunOutcome::busy();
        };

        let _in_flight = InFlight::enter(&self.in_flight);
        let run_id = RunId::new();
        self.metrics.run_started();
        *self.phase.write() = RefreshPhase::Idle;

        self.run(run_id, force).await
    }

    /// Wait until no run is in flight.
    pub async fn wait_idle(&self) {
        let _guard = self.run_lock.lock().await;
    }

    /// Check if a run is in flight. Does not touch the run guard.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Phase of the current or last run.
    pub fn phase(&self) -> RefreshPhase {
        *self.phase.read()
    }

    /// Get metrics.
    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    async fn run(&self, run_id: RunId, force: bool) -> RunOutcome {
        if force {
            info!(run_id = %run_id, "Forced refresh, bypassing rate limit");
        } else {
            self.transition(RefreshPhase::GateCheck);
            let now = Utc::now();
            if let RefreshDecision::Denied { wait_remaining } = self.check_gate(now).await {
                info!(
                    run_id = %run_id,
                    wait_minutes = whole_minutes(wait_remaining),
                    "Rate limiting: skipping update"
                );
                self.transition(RefreshPhase::Done);
                self.metrics.run_skipped();
                return RunOutcome::Skipped {
                    reason: SkipReason::RateLimited,
                    wait_remaining: Some(wait_remaining),
                    timestamp: now,
                };
            }
        }

        self.transition(RefreshPhase::Fetching);
        let snapshot = match self.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => return self.fail(run_id, e),
        };

        self.transition(RefreshPhase::Merging);
        let merged_at = Utc::now();
        let summary = match self.store.merge_snapshot(&snapshot, merged_at).await {
            Ok(summary) => summary,
            Err(e) => return self.fail(run_id, e),
        };

        self.transition(RefreshPhase::Invalidating);
        self.invalidate(&summary).await;

        self.transition(RefreshPhase::Done);
        self.metrics.run_succeeded(summary.written());

        info!(
            run_id = %run_id,
            updated = summary.updated,
            inserted = summary.inserted,
            currencies = snapshot.len(),
            "Rates update completed successfully"
        );

        RunOutcome::Completed {
            run_id,
            updated_count: summary.written(),
            inserted_count: summary.inserted,
            currency_count: snapshot.len(),
            timestamp: merged_at,
        }
    }

    /// Gate decision; a storage error fails open.
    async fn check_gate(&self, now: DateTime<Utc>) -> RefreshDecision {
        match self.store.latest_update().await {
            Ok(last_update) => {
                let decision = self.gate.decide(now, last_update);
                if decision.is_permitted() {
                    debug!(
                        last_update = ?last_update,
                        "Rate limiting check passed"
                    );
                }
                decision
            }
            Err(e) => {
                warn!(error = %e, "Rate limit check failed, permitting refresh");
                self.metrics.gate_failed_open();
                RefreshDecision::Permitted
            }
        }
    }

    async fn fetch(&self) -> Result<Snapshot, RatekeeperError> {
        let snapshot = self.source.fetch().await?;
        if snapshot.is_empty() {
            return Err(RatekeeperError::FormatError(
                "provider returned no convertible rates".to_string(),
            ));
        }
        Ok(snapshot)
    }

    /// Drop dependent cache entries. Failures only degrade freshness.
    async fn invalidate(&self, summary: &MergeSummary) {
        if let Err(e) = self.cache.invalidate_rates().await {
            warn!(error = %e, "Failed to clear rates cache, readers may see stale rates until TTL expiry");
            self.metrics.cache_invalidation_failed();
        }

        if summary.codes_changed() {
            if let Err(e) = self.cache.invalidate_names().await {
                warn!(error = %e, "Failed to clear currency names cache");
                self.metrics.cache_invalidation_failed();
            }
        }
    }

    fn fail(&self, run_id: RunId, error: RatekeeperError) -> RunOutcome {
        error!(
            run_id = %run_id,
            error = %error,
            code = error.error_code(),
            retryable = error.is_retryable(),
            "Rates update failed"
        );
        self.transition(RefreshPhase::Failed);
        self.metrics.run_failed();
        RunOutcome::failed(run_id, &error)
    }

    fn transition(&self, next: RefreshPhase) {
        let mut phase = self.phase.write();
        debug_assert!(
            phase.can_transition_to(next),
            "invalid phase transition {:?} -> {:?}",
            *phase,
            next
        );
        *phase = next;
    }
}
