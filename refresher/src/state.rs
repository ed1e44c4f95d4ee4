//! Refresh run and scheduler state definitions.

use serde::{Deserialize, Serialize};

/// Phase of a single orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPhase {
    /// No run in progress.
    Idle,
    /// Consulting the refresh gate.
    GateCheck,
    /// Calling the upstream provider.
    Fetching,
    /// Writing the snapshot into the rate store.
    Merging,
    /// Deleting dependent cache entries.
    Invalidating,
    /// Run finished, successfully or skipped.
    Done,
    /// Run aborted on error.
    Failed,
}

impl RefreshPhase {
    /// Check if this is a final state of a run.
    pub fn is_final(&self) -> bool {
        matches!(self, RefreshPhase::Done | RefreshPhase::Failed)
    }

    /// Get valid next phases.
    pub fn valid_transitions(&self) -> &[RefreshPhase] {
        match self {
            RefreshPhase::Idle => &[
                RefreshPhase::GateCheck,
                RefreshPhase::Fetching,
                RefreshPhase::Failed,
            ],
            RefreshPhase::GateCheck => &[
                RefreshPhase::Fetching,
                RefreshPhase::Done,
                RefreshPhase::Failed,
            ],
            RefreshPhase::Fetching => &[RefreshPhase::Merging, RefreshPhase::Failed],
            RefreshPhase::Merging => &[RefreshPhase::Invalidating, RefreshPhase::Failed],
            RefreshPhase::Invalidating => &[RefreshPhase::Done, RefreshPhase::Failed],
            RefreshPhase::Done | RefreshPhase::Failed => &[RefreshPhase::Idle],
        }
    }

    /// Check if transition to `next` is valid.
    pub fn can_transition_to(&self, next: RefreshPhase) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Scheduler operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Created, triggers not registered.
    Stopped,
    /// Triggers registered and firing.
    Running,
    /// Stop requested, waiting for in-flight work.
    ShuttingDown,
}

impl SchedulerState {
    /// Check if the scheduler is firing ticks.
    pub fn is_running(&self) -> bool {
        matches!(self, SchedulerState::Running)
    }
}
