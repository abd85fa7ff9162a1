//! Mirror worker - executes queued runs

use crate::storage::Storage;
use crate::models::JobRun;
use anyhow::{Context, Result};
use mirror_gate_common::RunStatus;
use mirror_job::{ExecutionContext, JobCatalog, MirrorError, MirrorExecutor, MirrorReport};
use std::sync::Arc;
use tracing::{error, info};

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long one blocking pop waits before looping
    pub poll_timeout_secs: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: 5.0,
        }
    }
}

/// Mirror worker
pub struct Worker {
    config: WorkerConfig,
    storage: Storage,
    catalog: Arc<JobCatalog>,
    executor: MirrorExecutor,
}

impl Worker {
    /// Create a new worker
    pub fn new(
        config: WorkerConfig,
        storage: Storage,
        catalog: Arc<JobCatalog>,
        executor: MirrorExecutor,
    ) -> Self {
        Self {
            config,
            storage,
            catalog,
            executor,
        }
    }

    /// Start the worker loop
    pub async fn run(&mut self) -> Result<()> {
        info!("Mirror worker started, waiting for runs...");

        loop {
            match self.storage.pop_run(self.config.poll_timeout_secs).await {
                Ok(Some(mut run)) => {
                    info!("Processing run {} of job {}", run.run_id, run.job_name);

                    run.mark_in_progress();
                    if let Err(e) = self.storage.update_run(&run, RunStatus::Queued).await {
                        error!("Failed to update run status: {}", e);
                    }

                    match self.process_run(&run).await {
                        Ok(report) => {
                            info!(
                                "Run {} completed: {} -> {}",
                                run.run_id, report.destination, report.pushed_digest
                            );
                            run.mark_succeeded(report.pushed_digest);
                        }
                        Err(e) => {
                            error!("Run {} failed: {:#}", run.run_id, e);
                            let step = e
                                .downcast_ref::<MirrorError>()
                                .and_then(MirrorError::failed_step);
                            run.mark_failed(format!("{:#}", e), step);
                        }
                    }

                    if let Err(e) = self.storage.update_run(&run, RunStatus::InProgress).await {
                        error!("Failed to update run status: {}", e);
                    }
                }
                Ok(None) => {
                    // Timeout, continue loop
                }
                Err(e) => {
                    error!("Error popping run from queue: {}", e);
                    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Execute the mirror job of one run
    async fn process_run(&self, run: &JobRun) -> Result<MirrorReport> {
        let job = self
            .catalog
            .require(&run.job_name)
            .context("Run refers to a job this runner does not know")?;

        // The region is a property of where the job executes, so it is read here
        let context = ExecutionContext::from_env()?;

        let report = self.executor.run(job, &context).await?;
        Ok(report)
    }
}
