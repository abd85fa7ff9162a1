//! Completion gate
//!
//! A lifecycle hook that starts the mirror job whenever its resource is
//! created or updated. It reports a fresh physical id on every success, so
//! resources depending on it are re-evaluated in the same pass.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mirror_gate_common::RunId;
use mirror_trigger::{JobTrigger, StartAck, WaitMode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::hook::{LifecycleHook, PhysicalId, RefreshPolicy};

/// Strictly increasing timestamp identities
///
/// Two calls within the same millisecond still yield distinct ids.
#[derive(Debug, Default)]
pub struct PhysicalIdSource {
    last: AtomicI64,
}

impl PhysicalIdSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time in milliseconds, bumped past the last id handed out
    pub fn next(&self) -> PhysicalId {
        let now = Utc::now().timestamp_millis();
        let previous = match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            }) {
            Ok(previous) | Err(previous) => previous,
        };
        PhysicalId(now.max(previous + 1).to_string())
    }
}

/// Progress of the gate within the current pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Pending,
    Succeeded,
    Failed,
}

/// What the last firing of the gate observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum GateOutcome {
    /// The runner accepted the start; the copy proceeds out of band
    Started { run_id: RunId },
    /// The run was followed to a successful end
    Completed { run_id: RunId },
    /// The runner refused the start
    FailedToStart { reason: String },
    /// The run started but did not succeed in time
    RunFailed { reason: String },
}

/// One firing of the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerInvocation {
    pub job: String,
    pub invoked_at: DateTime<Utc>,
    /// Set when the invocation succeeded
    pub physical_id: Option<PhysicalId>,
}

#[derive(Debug)]
struct GateProgress {
    state: GateState,
    outcome: Option<GateOutcome>,
    invocations: Vec<TriggerInvocation>,
}

pub struct CompletionGate {
    logical_id: String,
    trigger: JobTrigger,
    refresh: RefreshPolicy,
    ids: PhysicalIdSource,
    progress: Mutex<GateProgress>,
}

impl CompletionGate {
    /// Gate that fires on every pass
    pub fn new(logical_id: impl Into<String>, trigger: JobTrigger) -> Self {
        Self {
            logical_id: logical_id.into(),
            trigger,
            refresh: RefreshPolicy::EveryPass,
            ids: PhysicalIdSource::new(),
            progress: Mutex::new(GateProgress {
                state: GateState::Pending,
                outcome: None,
                invocations: Vec::new(),
            }),
        }
    }

    /// Only fire when the gate's own properties change
    pub fn with_refresh_policy(mut self, refresh: RefreshPolicy) -> Self {
        self.refresh = refresh;
        self
    }

    pub async fn state(&self) -> GateState {
        self.progress.lock().await.state
    }

    pub async fn last_outcome(&self) -> Option<GateOutcome> {
        self.progress.lock().await.outcome.clone()
    }

    pub async fn invocations(&self) -> Vec<TriggerInvocation> {
        self.progress.lock().await.invocations.clone()
    }

    /// Invoke the trigger and translate the result
    async fn fire(&self) -> anyhow::Result<PhysicalId> {
        let invoked_at = Utc::now();
        self.progress.lock().await.state = GateState::Pending;

        let job = self.trigger.config().job_name.clone();
        let result = self.trigger.invoke().await;

        let mut progress = self.progress.lock().await;
        match result {
            Ok(ack) => {
                let physical_id = self.ids.next();
                info!(
                    "Completion gate {} passed (run {}), physical id {}",
                    self.logical_id, ack.run_id, physical_id
                );

                progress.state = GateState::Succeeded;
                progress.outcome = Some(outcome_of(ack));
                progress.invocations.push(TriggerInvocation {
                    job,
                    invoked_at,
                    physical_id: Some(physical_id.clone()),
                });
                Ok(physical_id)
            }
            Err(e) => {
                error!("Completion gate {} failed: {}", self.logical_id, e);

                let reason = e.to_string();
                progress.state = GateState::Failed;
                progress.outcome = Some(if e.is_start_failure() {
                    GateOutcome::FailedToStart { reason }
                } else {
                    GateOutcome::RunFailed { reason }
                });
                progress.invocations.push(TriggerInvocation {
                    job,
                    invoked_at,
                    physical_id: None,
                });
                Err(e).with_context(|| format!("Completion gate {} failed", self.logical_id))
            }
        }
    }
}

fn outcome_of(ack: StartAck) -> GateOutcome {
    match ack.final_status {
        Some(_) => GateOutcome::Completed { run_id: ack.run_id },
        None => GateOutcome::Started { run_id: ack.run_id },
    }
}

#[async_trait]
impl LifecycleHook for CompletionGate {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }

    fn properties(&self) -> serde_json::Value {
        let config = self.trigger.config();
        let wait = match config.wait {
            WaitMode::StartOnly => serde_json::json!("start_only"),
            WaitMode::UntilComplete { timeout, .. } => serde_json::json!({
                "until_complete": { "timeout_secs": timeout.as_secs() }
            }),
        };
        serde_json::json!({
            "job_name": config.job_name,
            "runner_url": config.runner_url,
            "wait": wait,
        })
    }

    fn refresh_policy(&self) -> RefreshPolicy {
        self.refresh
    }

    async fn on_create(&self) -> anyhow::Result<PhysicalId> {
        self.fire().await
    }

    async fn on_update(&self, _previous: &PhysicalId) -> anyhow::Result<PhysicalId> {
        self.fire().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_gate_common::RunStatus;
    use mirror_trigger::{JobRunner, RetryPolicy, RunnerError, TriggerConfig};
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_physical_ids_strictly_increase() {
        let source = PhysicalIdSource::new();
        let ids: Vec<i64> = (0..1000)
            .map(|_| source.next().as_str().parse().unwrap())
            .collect();

        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        let distinct: HashSet<i64> = ids.iter().copied().collect();
        assert_eq!(distinct.len(), ids.len());
    }

    /// Runner that accepts or refuses every start
    struct FixedRunner {
        accept: bool,
        starts: AtomicUsize,
    }

    #[async_trait]
    impl JobRunner for FixedRunner {
        async fn start_run(&self, _job_name: &str) -> Result<RunId, RunnerError> {
            let n = self.starts.fetch_add(1, Ordering::SeqCst);
            if self.accept {
                Ok(RunId(format!("run-{}", n)))
            } else {
                Err(RunnerError::PermissionDenied("not allowed".into()))
            }
        }

        async fn run_status(&self, _run_id: &RunId) -> Result<RunStatus, RunnerError> {
            Ok(RunStatus::Succeeded)
        }
    }

    fn gate(accept: bool, wait: WaitMode) -> (Arc<FixedRunner>, CompletionGate) {
        let runner = Arc::new(FixedRunner {
            accept,
            starts: AtomicUsize::new(0),
        });
        let config = TriggerConfig::new("mirror-app")
            .with_wait(wait)
            .with_retry(RetryPolicy::none());
        let trigger = JobTrigger::new(runner.clone(), config);
        (runner, CompletionGate::new("MirrorGate", trigger))
    }

    #[tokio::test]
    async fn test_create_and_update_both_fire() {
        let (runner, gate) = gate(true, WaitMode::StartOnly);

        let first = gate.on_create().await.unwrap();
        let second = gate.on_update(&first).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(runner.starts.load(Ordering::SeqCst), 2);
        assert_eq!(gate.state().await, GateState::Succeeded);
        assert_eq!(
            gate.last_outcome().await,
            Some(GateOutcome::Started {
                run_id: RunId("run-1".into())
            })
        );
        assert_eq!(gate.invocations().await.len(), 2);
        assert_eq!(gate.refresh_policy(), RefreshPolicy::EveryPass);
    }

    #[tokio::test]
    async fn test_waiting_gate_reports_completion() {
        let (_runner, gate) = gate(
            true,
            WaitMode::UntilComplete {
                poll_interval: Duration::from_millis(1),
                timeout: Duration::from_secs(1),
            },
        );

        gate.on_create().await.unwrap();
        assert!(matches!(
            gate.last_outcome().await,
            Some(GateOutcome::Completed { .. })
        ));
    }

    #[tokio::test]
    async fn test_refused_start_fails_the_gate() {
        let (_runner, gate) = gate(false, WaitMode::StartOnly);

        let err = gate.on_create().await.unwrap_err();

        assert!(err.to_string().contains("MirrorGate"));
        assert_eq!(gate.state().await, GateState::Failed);
        assert!(matches!(
            gate.last_outcome().await,
            Some(GateOutcome::FailedToStart { .. })
        ));
        let invocations = gate.invocations().await;
        assert_eq!(invocations.len(), 1);
        assert!(invocations[0].physical_id.is_none());
    }
}
