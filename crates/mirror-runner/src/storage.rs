//! Redis storage for the mirror run queue

use crate::models::{JobRun, RunStats};
use anyhow::{Context, Result};
use mirror_gate_common::RunStatus;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::{debug, info};

const QUEUE_KEY: &str = "mirror:queue";
const STATS_KEY: &str = "mirror:stats";

fn run_key(run_id: &str) -> String {
    format!("mirror:run:{}", run_id)
}

fn job_index_key(job_name: &str) -> String {
    format!("mirror:job:{}", job_name)
}

fn pending_key(job_name: &str) -> String {
    format!("mirror:pending:{}", job_name)
}

/// Storage backend for job runs
pub struct Storage {
    conn: ConnectionManager,
}

impl Storage {
    /// Create a new storage instance
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    /// Queue a new run
    pub async fn queue_run(&mut self, run: &JobRun) -> Result<()> {
        let json = serde_json::to_string(run)
            .context("Failed to serialize run")?;

        let _: () = self.conn.set(run_key(run.run_id.as_str()), &json).await?;
        let _: () = self.conn.rpush(QUEUE_KEY, run.run_id.as_str()).await?;
        let _: () = self
            .conn
            .sadd(job_index_key(&run.job_name), run.run_id.as_str())
            .await?;
        let _: i64 = self.conn.incr(pending_key(&run.job_name), 1).await?;
        self.count_status(RunStatus::Queued, 1).await?;

        info!("Queued run {} of job {}", run.run_id, run.job_name);
        Ok(())
    }

    /// Get a run by ID
    pub async fn get_run(&mut self, run_id: &str) -> Result<Option<JobRun>> {
        let json: Option<String> = self.conn.get(run_key(run_id)).await?;

        match json {
            Some(data) => {
                let run: JobRun = serde_json::from_str(&data)
                    .context("Failed to deserialize run")?;
                Ok(Some(run))
            }
            None => Ok(None),
        }
    }

    /// Persist a status change of a run
    pub async fn update_run(&mut self, run: &JobRun, previous: RunStatus) -> Result<()> {
        let json = serde_json::to_string(run)
            .context("Failed to serialize run")?;

        let _: () = self.conn.set(run_key(run.run_id.as_str()), json).await?;

        if previous != run.status {
            self.count_status(previous, -1).await?;
            self.count_status(run.status, 1).await?;
        }

        debug!("Updated run {} status: {}", run.run_id, run.status);
        Ok(())
    }

    /// Pop next run from the queue (blocking)
    pub async fn pop_run(&mut self, timeout_secs: f64) -> Result<Option<JobRun>> {
        let result: Option<(String, String)> = self
            .conn
            .blpop(QUEUE_KEY, timeout_secs)
            .await?;

        let Some((_, run_id)) = result else {
            return Ok(None);
        };

        debug!("Popped run from queue: {}", run_id);
        let run = self.get_run(&run_id).await?;

        if let Some(run) = &run {
            let _: i64 = self.conn.decr(pending_key(&run.job_name), 1).await?;
        }

        Ok(run)
    }

    /// Runs accepted for a job that no worker has picked up yet
    pub async fn pending_runs(&mut self, job_name: &str) -> Result<usize> {
        let pending: Option<i64> = self.conn.get(pending_key(job_name)).await?;
        Ok(pending.unwrap_or(0).max(0) as usize)
    }

    /// Get all runs of a job, newest first
    pub async fn get_job_runs(&mut self, job_name: &str) -> Result<Vec<JobRun>> {
        let run_ids: Vec<String> = self.conn.smembers(job_index_key(job_name)).await?;

        let mut runs = Vec::new();
        for run_id in run_ids {
            if let Some(run) = self.get_run(&run_id).await? {
                runs.push(run);
            }
        }

        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(runs)
    }

    /// Get queue length
    pub async fn queue_length(&mut self) -> Result<usize> {
        let len: usize = self.conn.llen(QUEUE_KEY).await?;
        Ok(len)
    }

    /// Get counts by status
    pub async fn get_stats(&mut self) -> Result<RunStats> {
        let counts: HashMap<String, i64> = self.conn.hgetall(STATS_KEY).await?;
        let count = |status: RunStatus| counts.get(status.as_str()).copied().unwrap_or(0);

        Ok(RunStats {
            queued: count(RunStatus::Queued),
            in_progress: count(RunStatus::InProgress),
            succeeded: count(RunStatus::Succeeded),
            failed: count(RunStatus::Failed),
        })
    }

    async fn count_status(&mut self, status: RunStatus, delta: i64) -> Result<()> {
        let _: i64 = self.conn.hincr(STATS_KEY, status.as_str(), delta).await?;
        Ok(())
    }
}
