//! Runs a mirror job step by step

use mirror_gate_common::{partition, ImageReference};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::definition::{MirrorJob, MirrorStep};
use crate::error::{MirrorError, Result};
use crate::tooling::{ContainerTooling, Digest};

/// Facts about the environment a job runs in, read when it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub region: String,
}

impl ExecutionContext {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }

    /// Read the region of the running environment
    pub fn from_env() -> Result<Self> {
        ["AWS_REGION", "AWS_DEFAULT_REGION"]
            .iter()
            .filter_map(|key| env::var(key).ok())
            .find(|value| !value.trim().is_empty())
            .map(|region| Self::new(region.trim()))
            .ok_or(MirrorError::MissingRegion)
    }
}

/// Outcome of a successful mirror job execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorReport {
    pub job_name: String,
    pub account_id: String,
    pub registry_host: String,
    pub destination: ImageReference,
    pub source_digest: Digest,
    pub pushed_digest: Digest,
    pub completed_steps: Vec<String>,
}

#[derive(Default)]
struct Progress {
    account_id: Option<String>,
    registry_host: Option<String>,
    source_digest: Option<Digest>,
    pushed_digest: Option<Digest>,
    completed_steps: Vec<String>,
}

/// Executes mirror jobs against container tooling
#[derive(Clone)]
pub struct MirrorExecutor {
    tooling: Arc<dyn ContainerTooling>,
}

impl MirrorExecutor {
    pub fn new(tooling: Arc<dyn ContainerTooling>) -> Self {
        Self { tooling }
    }

    /// Run every step of `job` in order, stopping at the first failure
    pub async fn run(&self, job: &MirrorJob, context: &ExecutionContext) -> Result<MirrorReport> {
        info!(
            "Mirroring {} to {} (job: {}, region: {})",
            job.source, job.destination, job.name, context.region
        );

        let mut progress = Progress::default();

        for step in job.steps() {
            debug!("Job {}: {}", job.name, step);

            if let Err(e) = self.run_step(&step, job, context, &mut progress).await {
                error!("Job {} aborted at step {}: {}", job.name, step.name(), e);
                return Err(MirrorError::StepFailed {
                    step: step.name(),
                    source: Box::new(e),
                });
            }

            progress.completed_steps.push(step.name().to_string());
        }

        let report = MirrorReport {
            job_name: job.name.clone(),
            account_id: progress.account_id.unwrap_or_default(),
            registry_host: progress.registry_host.unwrap_or_default(),
            destination: job.destination.clone(),
            source_digest: progress.source_digest.unwrap_or_default(),
            pushed_digest: progress.pushed_digest.unwrap_or_default(),
            completed_steps: progress.completed_steps,
        };

        info!(
            "Pushed {} ({}) for job {}",
            report.destination, report.pushed_digest, report.job_name
        );

        Ok(report)
    }

    async fn run_step(
        &self,
        step: &MirrorStep,
        job: &MirrorJob,
        context: &ExecutionContext,
        progress: &mut Progress,
    ) -> Result<()> {
        match step {
            MirrorStep::ResolveIdentity => {
                progress.account_id = Some(self.tooling.caller_identity().await?);
            }
            MirrorStep::DeriveRegistrySuffix => {
                let account_id = progress.account_id.as_deref().ok_or(MirrorError::OutOfOrder {
                    step: "derive_registry_suffix",
                    requires: "resolve_identity",
                })?;
                let host = partition::private_registry_host(account_id, &context.region);
                debug!(
                    "Region {} uses registry suffix '{}'",
                    context.region,
                    partition::registry_url_suffix(&context.region)
                );
                progress.registry_host = Some(host);
            }
            MirrorStep::Authenticate => {
                let host = progress.registry_host.as_deref().ok_or(MirrorError::OutOfOrder {
                    step: "authenticate",
                    requires: "derive_registry_suffix",
                })?;
                self.tooling
                    .login(host, &job.credentials, &context.region)
                    .await?;
            }
            MirrorStep::Pull(image) => {
                progress.source_digest = Some(self.tooling.pull(image).await?);
            }
            MirrorStep::Tag {
                source,
                destination,
            } => {
                self.tooling.tag(source, destination).await?;
            }
            MirrorStep::Push(image) => {
                progress.pushed_digest = Some(self.tooling.push(image).await?);
            }
        }

        Ok(())
    }
}
