//! Ratekeeper Refresher
//!
//! Keeps the rate store current and the freshness cache coherent with it.
//! The orchestrator runs one refresh at a time (gate, fetch, merge,
//! invalidate); the scheduler drives it from a periodic check and a one-shot
//! warm-up, and operators can trigger it directly.

pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod outcome;
pub mod scheduler;
pub mod state;
pub mod view;

pub use config::{RefresherConfig, SchedulerConfig};
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
pub use orchestrator::Orchestrator;
pub use outcome::{RunOutcome, RunReport, SkipReason};
pub use scheduler::{JobStatus, Scheduler, SchedulerStatus};
pub use state::{RefreshPhase, SchedulerState};
pub use view::RatesView;
