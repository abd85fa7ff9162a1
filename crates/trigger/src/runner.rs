//! Job runner seam

use async_trait::async_trait;
use mirror_gate_common::{RunId, RunStatus};
use std::sync::Arc;

use crate::error::RunnerError;

/// A service that can start named jobs
///
/// Starting is fast and a refused start is reported synchronously; the job
/// itself runs asynchronously.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Start one run of `job_name` without waiting for it
    async fn start_run(&self, job_name: &str) -> Result<RunId, RunnerError>;

    /// Current status of a run
    async fn run_status(&self, run_id: &RunId) -> Result<RunStatus, RunnerError>;
}

#[async_trait]
impl<T: JobRunner + ?Sized> JobRunner for Arc<T> {
    async fn start_run(&self, job_name: &str) -> Result<RunId, RunnerError> {
        (**self).start_run(job_name).await
    }

    async fn run_status(&self, run_id: &RunId) -> Result<RunStatus, RunnerError> {
        (**self).run_status(run_id).await
    }
}
