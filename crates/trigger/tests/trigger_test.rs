//! Trigger invocations against the in-process runner

use async_trait::async_trait;
use mirror_gate_common::{partition, ImageReference, RunId, RunStatus};
use mirror_job::{ExecutionContext, InMemoryRegistry, JobCatalog, MirrorJob};
use mirror_trigger::{
    handle_invocation, JobRunner, JobTrigger, LocalJobRunner, RetryPolicy, RunnerError,
    TriggerConfig, TriggerError, WaitMode,
};
use std::sync::Arc;
use std::time::Duration;

const ACCOUNT: &str = "123456789012";
const REGION: &str = "us-east-1";
const JOB: &str = "mirror-app";

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

fn until_complete() -> WaitMode {
    WaitMode::UntilComplete {
        poll_interval: Duration::from_millis(5),
        timeout: Duration::from_secs(5),
    }
}

fn source() -> ImageReference {
    ImageReference::new("public-registry", "app", "v1")
}

fn destination() -> ImageReference {
    source().with_registry(partition::private_registry_host(ACCOUNT, REGION))
}

async fn setup(publish_source: bool) -> (InMemoryRegistry, LocalJobRunner) {
    let registry = InMemoryRegistry::new(ACCOUNT);
    if publish_source {
        registry.publish(&source(), b"app v1 layers").await;
    }

    let catalog = JobCatalog::from_jobs([MirrorJob::new(JOB, source(), destination())]).unwrap();
    let runner = LocalJobRunner::new(
        catalog,
        Arc::new(registry.clone()),
        ExecutionContext::new(REGION),
    );

    (registry, runner)
}

fn trigger(runner: &LocalJobRunner, job_name: &str, wait: WaitMode) -> JobTrigger {
    let config = TriggerConfig::new(job_name)
        .with_wait(wait)
        .with_retry(fast_retry());
    JobTrigger::new(Arc::new(runner.clone()), config)
}

#[tokio::test]
async fn test_start_only_returns_before_run_finishes() {
    let (registry, runner) = setup(true).await;

    let ack = trigger(&runner, JOB, WaitMode::StartOnly)
        .invoke()
        .await
        .unwrap();

    assert_eq!(ack.job_name, JOB);
    assert!(ack.final_status.is_none());
    assert_eq!(runner.started_runs(), 1);

    runner.wait_idle().await;
    assert_eq!(runner.status_of(&ack.run_id).await, Some(RunStatus::Succeeded));
    assert_eq!(
        registry.digest_of(&destination()).await,
        registry.digest_of(&source()).await
    );
}

#[tokio::test]
async fn test_until_complete_waits_for_success() {
    let (registry, runner) = setup(true).await;

    let ack = trigger(&runner, JOB, until_complete()).invoke().await.unwrap();

    assert_eq!(ack.final_status, Some(RunStatus::Succeeded));
    assert!(registry.digest_of(&destination()).await.is_some());
}

#[tokio::test]
async fn test_failed_run_is_reported_when_waiting() {
    let (_registry, runner) = setup(false).await;

    let err = trigger(&runner, JOB, until_complete())
        .invoke()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TriggerError::RunFailed {
            status: RunStatus::Failed,
            ..
        }
    ));
    assert!(!err.is_start_failure());
}

#[tokio::test]
async fn test_failed_run_is_not_seen_in_start_only_mode() {
    let (_registry, runner) = setup(false).await;

    let response = handle_invocation(&trigger(&runner, JOB, WaitMode::StartOnly)).await;

    assert_eq!(response.status_code, 200);
    assert!(response.body.starts_with("Mirror run started: "));
}

#[tokio::test]
async fn test_rejected_start_fails_invocation() {
    let (_registry, runner) = setup(true).await;
    runner
        .reject_next(RunnerError::PermissionDenied("not allowed".into()))
        .await;

    let err = trigger(&runner, JOB, WaitMode::StartOnly)
        .invoke()
        .await
        .unwrap_err();

    assert!(err.is_start_failure());
    assert_eq!(runner.start_requests(), 1);
    assert_eq!(runner.started_runs(), 0);
}

#[tokio::test]
async fn test_throttled_start_is_retried() {
    let (_registry, runner) = setup(true).await;
    runner
        .reject_next(RunnerError::Throttled("too many runs".into()))
        .await;

    let ack = trigger(&runner, JOB, WaitMode::StartOnly)
        .invoke()
        .await
        .unwrap();

    assert_eq!(runner.start_requests(), 2);
    assert_eq!(runner.started_runs(), 1);
    runner.wait_idle().await;
    assert_eq!(runner.status_of(&ack.run_id).await, Some(RunStatus::Succeeded));
}

#[tokio::test]
async fn test_unknown_job_is_not_retried() {
    let (_registry, runner) = setup(true).await;

    let response = handle_invocation(&trigger(&runner, "no-such-job", WaitMode::StartOnly)).await;

    assert_eq!(response.status_code, 500);
    assert!(response.body.contains("no-such-job"));
    assert_eq!(runner.start_requests(), 1);
}

#[tokio::test]
async fn test_each_invocation_starts_a_new_run() {
    let (registry, runner) = setup(true).await;
    let trigger = trigger(&runner, JOB, until_complete());

    let first = trigger.invoke().await.unwrap();
    let second = trigger.invoke().await.unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(runner.started_runs(), 2);
    assert_eq!(registry.push_count().await, 2);
}

/// Runner whose runs never finish
struct StuckRunner;

#[async_trait]
impl JobRunner for StuckRunner {
    async fn start_run(&self, _job_name: &str) -> Result<RunId, RunnerError> {
        Ok(RunId::from("stuck-run".to_string()))
    }

    async fn run_status(&self, _run_id: &RunId) -> Result<RunStatus, RunnerError> {
        Ok(RunStatus::InProgress)
    }
}

#[tokio::test]
async fn test_wait_times_out() {
    let config = TriggerConfig::new(JOB)
        .with_wait(WaitMode::UntilComplete {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(50),
        })
        .with_retry(fast_retry());
    let trigger = JobTrigger::new(Arc::new(StuckRunner), config);

    let err = trigger.invoke().await.unwrap_err();

    assert!(matches!(err, TriggerError::TimedOut { .. }));
    let response = handle_invocation(&trigger).await;
    assert_eq!(response.status_code, 500);
}
