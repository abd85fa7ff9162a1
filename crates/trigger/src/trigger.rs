//! Starts a mirror job and, depending on the wait mode, follows it to the end

use chrono::{DateTime, Utc};
use mirror_gate_common::{RunId, RunStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::{TriggerConfig, WaitMode};
use crate::error::TriggerError;
use crate::runner::JobRunner;

/// Acknowledgement of an accepted start request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartAck {
    pub job_name: String,
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    /// Terminal status, when the invocation waited for it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_status: Option<RunStatus>,
}

/// Invocable unit that starts one run of a configured mirror job
#[derive(Clone)]
pub struct JobTrigger {
    runner: Arc<dyn JobRunner>,
    config: TriggerConfig,
}

impl JobTrigger {
    pub fn new(runner: Arc<dyn JobRunner>, config: TriggerConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Start one run of the configured job
    ///
    /// Every invocation issues a fresh start request; there is no
    /// deduplication across invocations.
    pub async fn invoke(&self) -> Result<StartAck, TriggerError> {
        let job_name = self.config.job_name.as_str();
        info!("Starting mirror job {}", job_name);

        let run_id = self
            .config
            .retry
            .retry("Start request", || self.runner.start_run(job_name))
            .await
            .map_err(|source| {
                error!("Job runner rejected start of {}: {}", job_name, source);
                TriggerError::Rejected {
                    job_name: job_name.to_string(),
                    source,
                }
            })?;

        let started_at = Utc::now();
        info!("Mirror job {} started with run ID: {}", job_name, run_id);

        let final_status = match self.config.wait {
            WaitMode::StartOnly => None,
            WaitMode::UntilComplete {
                poll_interval,
                timeout,
            } => Some(self.wait_for(&run_id, poll_interval, timeout).await?),
        };

        Ok(StartAck {
            job_name: job_name.to_string(),
            run_id,
            started_at,
            final_status,
        })
    }

    /// Poll a run until it reaches a terminal status or `timeout` passes
    async fn wait_for(
        &self,
        run_id: &RunId,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<RunStatus, TriggerError> {
        let polling = async {
            loop {
                let status = match self
                    .config
                    .retry
                    .retry("Status request", || self.runner.run_status(run_id))
                    .await
                {
                    Ok(status) => status,
                    Err(source) => {
                        return Err(TriggerError::Polling {
                            run_id: run_id.clone(),
                            source,
                        })
                    }
                };

                if status.is_terminal() {
                    return Ok(status);
                }

                debug!("Run {} is {}, checking again in {:?}", run_id, status, poll_interval);
                tokio::time::sleep(poll_interval).await;
            }
        };

        let status = match tokio::time::timeout(timeout, polling).await {
            Ok(result) => result?,
            Err(_) => {
                error!("Run {} did not finish within {:?}", run_id, timeout);
                return Err(TriggerError::TimedOut {
                    run_id: run_id.clone(),
                    timeout,
                });
            }
        };

        if status.is_success() {
            info!("Run {} completed successfully", run_id);
            Ok(status)
        } else {
            error!("Run {} finished with status {}", run_id, status);
            Err(TriggerError::RunFailed {
                run_id: run_id.clone(),
                status,
            })
        }
    }
}
