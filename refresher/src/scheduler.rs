//! Periodic and one-shot refresh triggers.
//!
//! The scheduler never forces a run: every tick goes through the refresh
//! gate, so the check cadence may be shorter than the minimum refresh
//! interval without spending upstream budget.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use ratekeeper_common::JobId;

use crate::config::SchedulerConfig;
use crate::metrics::MetricsSnapshot;
use crate::orchestrator::Orchestrator;
use crate::outcome::RunOutcome;
use crate::state::{RefreshPhase, SchedulerState};

/// Id of the periodic check job.
pub const CHECK_JOB_ID: &str = "check_rates";

/// Id of the one-shot warm-up job.
pub const INITIAL_JOB_ID: &str = "initial_update_rates";

/// A registered trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub id: JobId,
    pub name: String,
    pub next_run: Option<DateTime<Utc>>,
    pub trigger_description: String,
}

/// Scheduler status for operator tooling.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub state: SchedulerState,
    pub refresh_in_flight: bool,
    pub last_phase: RefreshPhase,
    pub scheduled_jobs: Vec<JobStatus>,
    pub metrics: MetricsSnapshot,
}

type JobTable = Arc<RwLock<Vec<JobStatus>>>;

/// Completes the transition to `Stopped` once the shutdown signal is sent.
struct StoppedOnDrop<'a> {
    state: &'a RwLock<SchedulerState>,
    jobs: &'a JobTable,
}

impl Drop for StoppedOnDrop<'_> {
    fn drop(&mut self) {
        self.jobs.write().clear();
        *self.state.write() = SchedulerState::Stopped;
    }
}

/// Drives the orchestrator from timers.
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    config: SchedulerConfig,
    state: RwLock<SchedulerState>,
    jobs: JobTable,
    /// Dropping the sender signals every task to exit.
    shutdown_tx: Mutex<Option<watch::Sender<()>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a stopped scheduler.
    pub fn new(orchestrator: Arc<Orchestrator>, config: SchedulerConfig) -> Self {
        Self {
            orchestrator,
            config,
            state: RwLock::new(SchedulerState::Stopped),
            jobs: Arc::new(RwLock::new(Vec::new())),
            shutdown_tx: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Register the periodic check and the warm-up run.
    ///
    /// A second call while running only logs a warning. Must be called from
    /// within a Tokio runtime.
    #[instrument(skip(self))]
    pub fn start(&self) {
        {
            let mut state = self.state.write();
            if *state != SchedulerState::Stopped {
                warn!(state = ?*state, "Scheduler already running");
                return;
            }
            *state = SchedulerState::Running;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let check_interval = self.config.check_interval;
        let initial_delay = self.config.initial_delay;
        let started_at = Utc::now();
        let initial_at = after(started_at, initial_delay);

        *self.jobs.write() = vec![
            JobStatus {
                id: JobId::from(CHECK_JOB_ID),
                name: "Check and update exchange rates".to_string(),
                next_run: after(started_at, check_interval),
                trigger_description: format!("interval[{}s]", check_interval.as_secs()),
            },
            JobStatus {
                id: JobId::from(INITIAL_JOB_ID),
                name: "Initial exchange rates update".to_string(),
                next_run: initial_at,
                trigger_description: format!(
                    "date[{}]",
                    initial_at.map(|at| at.to_rfc3339()).unwrap_or_default()
                ),
            },
        ];

        let check = tokio::spawn(run_check_job(
            self.orchestrator.clone(),
            self.jobs.clone(),
            check_interval,
            shutdown_rx.clone(),
        ));
        let initial = tokio::spawn(run_initial_job(
            self.orchestrator.clone(),
            self.jobs.clone(),
            initial_delay,
            shutdown_rx,
        ));
        self.handles.lock().extend([check, initial]);

        info!(
            check_interval_secs = check_interval.as_secs(),
            initial_delay_secs = initial_delay.as_secs(),
            "Rates scheduler started"
        );
    }

    /// Cancel pending triggers and wait for any in-flight run.
    ///
    /// If the returned future is dropped before completion the triggers stay
    /// cancelled and the scheduler is left `Stopped`; only the wait for the
    /// in-flight run is abandoned.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        {
            let mut state = self.state.write();
            if *state != SchedulerState::Running {
                debug!(state = ?*state, "Scheduler not running");
                return;
            }
            *state = SchedulerState::ShuttingDown;
        }

        let _stopped = StoppedOnDrop {
            state: &self.state,
            jobs: &self.jobs,
        };
        self.shutdown_tx.lock().take();

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Scheduler task ended abnormally");
            }
        }

        self.orchestrator.wait_idle().await;

        info!("Rates scheduler stopped");
    }

    /// Run the pipeline immediately, outside the timers.
    pub async fn refresh_now(&self, force: bool) -> RunOutcome {
        info!(force, "Manual rates update triggered");
        self.orchestrator.refresh(force).await
    }

    /// Current state.
    pub fn state(&self) -> SchedulerState {
        *self.state.read()
    }

    /// Check if triggers are registered.
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Registered jobs and run metrics.
    pub fn status(&self) -> SchedulerStatus {
        let state = self.state();
        SchedulerStatus {
            running: state.is_running(),
            state,
            refresh_in_flight: self.orchestrator.is_busy(),
            last_phase: self.orchestrator.phase(),
            scheduled_jobs: self.jobs.read().clone(),
            metrics: self.orchestrator.metrics().snapshot(),
        }
    }
}

async fn run_check_job(
    orchestrator: Arc<Orchestrator>,
    jobs: JobTable,
    period: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    let Some(first_tick) = Instant::now().checked_add(period) else {
        warn!(job = CHECK_JOB_ID, "Check interval out of range, job disabled");
        return;
    };
    let mut ticker = tokio::time::interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                set_next_run(&jobs, CHECK_JOB_ID, after(Utc::now(), period));
                let outcome = orchestrator.refresh(false).await;
                log_outcome(CHECK_JOB_ID, &outcome);
            }
        }
    }

    debug!(job = CHECK_JOB_ID, "Job stopped");
}

async fn run_initial_job(
    orchestrator: Arc<Orchestrator>,
    jobs: JobTable,
    delay: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    tokio::select! {
        _ = shutdown.changed() => {
            debug!(job = INITIAL_JOB_ID, "Job cancelled before firing");
        }
        _ = tokio::time::sleep(delay) => {
            jobs.write().retain(|job| job.id.as_str() != INITIAL_JOB_ID);
            let outcome = orchestrator.refresh(false).await;
            log_outcome(INITIAL_JOB_ID, &outcome);
        }
    }
}

fn set_next_run(jobs: &JobTable, id: &str, next_run: Option<DateTime<Utc>>) {
    if let Some(job) = jobs.write().iter_mut().find(|job| job.id.as_str() == id) {
        job.next_run = next_run;
    }
}

fn log_outcome(job: &str, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed { updated_count, .. } => {
            info!(job, updated_count, "Scheduled rates update completed");
        }
        RunOutcome::Skipped { reason, .. } => {
            debug!(job, reason = reason.describe(), "Scheduled rates update skipped");
        }
        RunOutcome::Failed { message, .. } => {
            warn!(job, error = %message, "Scheduled rates update failed");
        }
    }
}

fn after(start: DateTime<Utc>, duration: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| start.checked_add_signed(d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use ratekeeper_fx::{CacheConfig, FreshnessCache, MemoryCache, MockRateSource, RefreshGate};
    use ratekeeper_store::MemoryRateStore;
    use rust_decimal_macros::dec;

    fn scheduler(config: SchedulerConfig) -> (Scheduler, Arc<MockRateSource>) {
        let source = Arc::new(MockRateSource::new("mock"));
        source.set_rates(&[("USD", dec!(0.011))]);
        let orchestrator = Orchestrator::new(
            Arc::new(MemoryRateStore::new()),
            source.clone(),
            FreshnessCache::new(Arc::new(MemoryCache::new()), CacheConfig::default()),
            RefreshGate::new(chrono::Duration::minutes(60)),
            Arc::new(Metrics::new()),
        );
        (Scheduler::new(Arc::new(orchestrator), config), source)
    }

    #[tokio::test]
    async fn test_start_registers_both_jobs() {
        let (scheduler, _) = scheduler(SchedulerConfig {
            check_interval: Duration::from_secs(3600),
            initial_delay: Duration::from_secs(3600),
        });

        scheduler.start();
        let status = scheduler.status();

        assert!(status.running);
        let ids: Vec<_> = status.scheduled_jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec![CHECK_JOB_ID, INITIAL_JOB_ID]);
        assert!(status.scheduled_jobs.iter().all(|j| j.next_run.is_some()));

        scheduler.stop().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(scheduler.status().scheduled_jobs.is_empty());
    }

    #[tokio::test]
    async fn test_initial_job_fires_once_and_unregisters() {
        let (scheduler, source) = scheduler(SchedulerConfig {
            check_interval: Duration::from_secs(3600),
            initial_delay: Duration::from_millis(10),
        });

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(source.calls(), 1);
        let status = scheduler.status();
        assert_eq!(status.scheduled_jobs.len(), 1);
        assert_eq!(status.scheduled_jobs[0].id.as_str(), CHECK_JOB_ID);
        assert_eq!(status.metrics.runs_success, 1);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_double_start_is_noop() {
        let (scheduler, _) = scheduler(SchedulerConfig {
            check_interval: Duration::from_secs(3600),
            initial_delay: Duration::from_secs(3600),
        });

        scheduler.start();
        scheduler.start();

        assert_eq!(scheduler.status().scheduled_jobs.len(), 2);
        assert_eq!(scheduler.handles.lock().len(), 2);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let (scheduler, _) = scheduler(SchedulerConfig::default());
        scheduler.stop().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_abandoned_stop_leaves_scheduler_restartable() {
        let (scheduler, source) = scheduler(SchedulerConfig {
            check_interval: Duration::from_secs(3600),
            initial_delay: Duration::from_millis(5),
        });
        source.set_delay(Duration::from_millis(300));

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(scheduler.status().refresh_in_flight);

        let abandoned = tokio::time::timeout(Duration::from_millis(20), scheduler.stop()).await;
        assert!(abandoned.is_err());
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(scheduler.status().scheduled_jobs.is_empty());

        scheduler.start();
        assert!(scheduler.is_running());
        scheduler.stop().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }
}
