//! In-process job runner
//!
//! Executes accepted runs on detached tasks, so a start returns before the
//! mirror job finishes, like the remote runner.

use async_trait::async_trait;
use mirror_gate_common::{RunId, RunStatus};
use mirror_job::{ContainerTooling, ExecutionContext, JobCatalog, MirrorExecutor};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::RunnerError;
use crate::runner::JobRunner;

struct LocalState {
    catalog: JobCatalog,
    executor: MirrorExecutor,
    context: ExecutionContext,
    runs: Mutex<HashMap<RunId, RunStatus>>,
    rejections: Mutex<VecDeque<RunnerError>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    start_requests: AtomicUsize,
    started_runs: AtomicUsize,
}

/// Job runner executing mirror jobs in this process
#[derive(Clone)]
pub struct LocalJobRunner {
    inner: Arc<LocalState>,
}

impl LocalJobRunner {
    pub fn new(
        catalog: JobCatalog,
        tooling: Arc<dyn ContainerTooling>,
        context: ExecutionContext,
    ) -> Self {
        Self {
            inner: Arc::new(LocalState {
                catalog,
                executor: MirrorExecutor::new(tooling),
                context,
                runs: Mutex::new(HashMap::new()),
                rejections: Mutex::new(VecDeque::new()),
                tasks: Mutex::new(Vec::new()),
                start_requests: AtomicUsize::new(0),
                started_runs: AtomicUsize::new(0),
            }),
        }
    }

    /// Refuse the next start request with `error`
    pub async fn reject_next(&self, error: RunnerError) {
        self.inner.rejections.lock().await.push_back(error);
    }

    /// Start requests received, accepted or not
    pub fn start_requests(&self) -> usize {
        self.inner.start_requests.load(Ordering::SeqCst)
    }

    /// Start requests that produced a run
    pub fn started_runs(&self) -> usize {
        self.inner.started_runs.load(Ordering::SeqCst)
    }

    pub async fn status_of(&self, run_id: &RunId) -> Option<RunStatus> {
        self.inner.runs.lock().await.get(run_id).copied()
    }

    /// Wait until every accepted run has finished
    pub async fn wait_idle(&self) {
        let tasks = std::mem::take(&mut *self.inner.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                error!("Mirror run task aborted: {}", e);
            }
        }
    }
}

#[async_trait]
impl JobRunner for LocalJobRunner {
    async fn start_run(&self, job_name: &str) -> Result<RunId, RunnerError> {
        self.inner.start_requests.fetch_add(1, Ordering::SeqCst);

        if let Some(rejection) = self.inner.rejections.lock().await.pop_front() {
            return Err(rejection);
        }

        let job = self
            .inner
            .catalog
            .get(job_name)
            .cloned()
            .ok_or_else(|| RunnerError::JobNotFound(job_name.to_string()))?;

        let run_id = RunId::generate();
        self.inner
            .runs
            .lock()
            .await
            .insert(run_id.clone(), RunStatus::Queued);
        self.inner.started_runs.fetch_add(1, Ordering::SeqCst);

        let state = Arc::clone(&self.inner);
        let task_run_id = run_id.clone();
        let task = tokio::spawn(async move {
            state
                .runs
                .lock()
                .await
                .insert(task_run_id.clone(), RunStatus::InProgress);

            let status = match state.executor.run(&job, &state.context).await {
                Ok(report) => {
                    info!("Run {} pushed {}", task_run_id, report.pushed_digest);
                    RunStatus::Succeeded
                }
                Err(e) => {
                    error!("Run {} failed: {}", task_run_id, e);
                    RunStatus::Failed
                }
            };

            state.runs.lock().await.insert(task_run_id, status);
        });
        self.inner.tasks.lock().await.push(task);

        Ok(run_id)
    }

    async fn run_status(&self, run_id: &RunId) -> Result<RunStatus, RunnerError> {
        self.status_of(run_id)
            .await
            .ok_or_else(|| RunnerError::RunNotFound(run_id.clone()))
    }
}
