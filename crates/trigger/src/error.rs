use mirror_gate_common::{RunId, RunStatus};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a job runner
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    #[error("Mirror job not found: {0}")]
    JobNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Throttled: {0}")]
    Throttled(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Job runner unavailable: {0}")]
    Unavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl RunnerError {
    /// Whether trying again later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Throttled(_) | Self::Unavailable(_) | Self::Transport(_)
        )
    }
}

impl From<reqwest::Error> for RunnerError {
    fn from(err: reqwest::Error) -> Self {
        RunnerError::Transport(err.to_string())
    }
}

/// Why a trigger invocation did not succeed
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("Job runner rejected start of {job_name}: {source}")]
    Rejected {
        job_name: String,
        #[source]
        source: RunnerError,
    },

    #[error("Mirror run {run_id} finished with status {status}")]
    RunFailed { run_id: RunId, status: RunStatus },

    #[error("Mirror run {run_id} did not finish within {timeout:?}")]
    TimedOut { run_id: RunId, timeout: Duration },

    #[error("Polling mirror run {run_id} failed: {source}")]
    Polling {
        run_id: RunId,
        #[source]
        source: RunnerError,
    },
}

impl TriggerError {
    /// True when the run was never started
    pub fn is_start_failure(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}
