//! Configuration for the trigger
//!
//! The job name and runner location are bound at deployment time through
//! environment variables.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Whether an invocation returns at start acceptance or at run completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Report success once the runner accepts the start
    StartOnly,
    /// Poll the run until it reaches a terminal status
    UntilComplete {
        poll_interval: Duration,
        timeout: Duration,
    },
}

impl Default for WaitMode {
    fn default() -> Self {
        WaitMode::UntilComplete {
            poll_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(900),
        }
    }
}

/// Parse an optional variable, falling back to `default` when unset
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", key)),
        None => Ok(default),
    }
}

/// Trigger configuration
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Name of the mirror job to start
    pub job_name: String,

    /// Base URL of the job runner service
    pub runner_url: String,

    /// Bearer token presented to the runner
    pub runner_token: Option<String>,

    pub wait: WaitMode,

    /// Retries of transient start and status failures
    pub retry: RetryPolicy,
}

impl TriggerConfig {
    /// Configuration for `job_name` with default settings
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            runner_url: "http://127.0.0.1:8086".to_string(),
            runner_token: None,
            wait: WaitMode::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_wait(mut self, wait: WaitMode) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let job_name = lookup("MIRROR_JOB_NAME")
            .filter(|name| !name.trim().is_empty())
            .context("MIRROR_JOB_NAME is required")?;

        let wait_for_completion: bool = lookup("TRIGGER_WAIT_FOR_COMPLETION")
            .unwrap_or_else(|| "true".to_string())
            .parse()
            .context("Invalid TRIGGER_WAIT_FOR_COMPLETION")?;

        let wait = if wait_for_completion {
            WaitMode::UntilComplete {
                poll_interval: Duration::from_secs(parse_var(&lookup, "TRIGGER_POLL_INTERVAL_SECS", 10)?),
                timeout: Duration::from_secs(parse_var(&lookup, "TRIGGER_TIMEOUT_SECS", 900)?),
            }
        } else {
            WaitMode::StartOnly
        };

        let retry = RetryPolicy {
            max_attempts: parse_var(&lookup, "TRIGGER_START_MAX_ATTEMPTS", 3)?,
            initial_backoff: Duration::from_millis(parse_var(&lookup, "TRIGGER_START_BACKOFF_MS", 500)?),
            ..RetryPolicy::default()
        };

        let config = TriggerConfig {
            job_name,
            runner_url: lookup("MIRROR_RUNNER_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8086".to_string()),
            runner_token: lookup("MIRROR_RUNNER_TOKEN").filter(|token| !token.is_empty()),
            wait,
            retry,
        };

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            anyhow::bail!("TRIGGER_START_MAX_ATTEMPTS must be greater than 0");
        }

        if let WaitMode::UntilComplete { poll_interval, timeout } = self.wait {
            if poll_interval.is_zero() {
                anyhow::bail!("TRIGGER_POLL_INTERVAL_SECS must be greater than 0");
            }
            if timeout < poll_interval {
                anyhow::bail!("TRIGGER_TIMEOUT_SECS must not be shorter than the poll interval");
            }
        }

        Ok(())
    }
}
