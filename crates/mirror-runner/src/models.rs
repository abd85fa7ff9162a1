//! Data models for the mirror job runner

use chrono::{DateTime, Utc};
use mirror_gate_common::{RunId, RunStatus};
use serde::{Deserialize, Serialize};

/// One execution of a mirror job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    /// Unique run identifier
    pub run_id: RunId,

    /// Name of the mirror job being executed
    pub job_name: String,

    /// Current status
    pub status: RunStatus,

    /// When the start request was accepted
    pub created_at: DateTime<Utc>,

    /// When a worker picked the run up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the run reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Digest the destination registry holds after the push
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pushed_digest: Option<String>,

    /// Step that aborted the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobRun {
    /// Create a queued run
    pub fn new(job_name: String) -> Self {
        Self {
            run_id: RunId::generate(),
            job_name,
            status: RunStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            pushed_digest: None,
            failed_step: None,
            error: None,
        }
    }

    /// Mark run as picked up by a worker
    pub fn mark_in_progress(&mut self) {
        self.status = RunStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    /// Mark run as succeeded
    pub fn mark_succeeded(&mut self, pushed_digest: String) {
        self.status = RunStatus::Succeeded;
        self.completed_at = Some(Utc::now());
        self.pushed_digest = Some(pushed_digest);
    }

    /// Mark run as failed
    pub fn mark_failed(&mut self, error: String, failed_step: Option<&str>) {
        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error);
        self.failed_step = failed_step.map(str::to_string);
    }
}

/// Response to an accepted start request
#[derive(Debug, Serialize, Deserialize)]
pub struct StartRunResponse {
    pub run_id: RunId,
    pub job_name: String,
    pub status: RunStatus,
}

/// Response with run status
#[derive(Debug, Serialize, Deserialize)]
pub struct RunStatusResponse {
    /// The run details
    pub run: JobRun,
}

/// Counters per run status
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub queued: i64,
    pub in_progress: i64,
    pub succeeded: i64,
    pub failed: i64,
}
