//! Submitted jobs and their lifecycle.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use scalekit_core::point::ScalingPoint;
use scalekit_core::types::Timestamp;
use scalekit_core::workload::WorkloadSize;

use crate::backend::RemoteStatus;

/// Lifecycle of a job: `Pending -> Running -> {Succeeded, Failed, TimedOut}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::TimedOut)
    }

    /// Transitions allowed by the lifecycle. Staying put is always allowed.
    pub fn can_transition_to(self, next: JobState) -> bool {
        if self == next {
            return true;
        }
        match self {
            JobState::Pending => next != JobState::Pending,
            JobState::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl From<RemoteStatus> for JobState {
    fn from(status: RemoteStatus) -> Self {
        match status {
            RemoteStatus::Queued => JobState::Pending,
            RemoteStatus::Running => JobState::Running,
            RemoteStatus::Done => JobState::Succeeded,
            RemoteStatus::Failed => JobState::Failed,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One submitted unit of work on a named host.
///
/// Serialized as-is into the persisted job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Backend job id.
    pub id: String,
    pub host: String,
    pub point: ScalingPoint,
    /// Repeat index of this point within the sweep.
    pub repeat: u32,
    /// Workload size the job ran with.
    pub size: WorkloadSize,
    pub submit_time: Timestamp,
    pub state: JobState,
    pub working_dir: PathBuf,
    pub log_path: PathBuf,
}

impl Job {
    /// Move to `next` if the lifecycle allows it. Returns whether the
    /// state changed.
    pub fn transition(&mut self, next: JobState) -> bool {
        if self.state == next || !self.state.can_transition_to(next) {
            return false;
        }
        tracing::debug!(
            job_id = %self.id,
            host = %self.host,
            from = %self.state,
            to = %next,
            "Job state changed",
        );
        self.state = next;
        true
    }
}
