//! Configuration management for the mirror job runner
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL
    pub redis_url: String,

    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    /// JSON file with the mirror job definitions this runner can start
    pub jobs_file: PathBuf,

    /// Start requests beyond this many pending runs of one job are throttled
    pub max_queued_runs: usize,

    /// Bearer token required on start requests, if set
    pub api_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Config {
            redis_url: lookup("REDIS_URL")
                .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),

            api_host: lookup("RUNNER_HOST")
                .unwrap_or_else(|| "0.0.0.0".to_string()),

            api_port: lookup("RUNNER_PORT")
                .unwrap_or_else(|| "8086".to_string())
                .parse()
                .context("Invalid RUNNER_PORT")?,

            jobs_file: lookup("MIRROR_JOBS_FILE")
                .context("MIRROR_JOBS_FILE is required")?
                .into(),

            max_queued_runs: lookup("RUNNER_MAX_QUEUED_RUNS")
                .unwrap_or_else(|| "16".to_string())
                .parse()
                .context("Invalid RUNNER_MAX_QUEUED_RUNS")?,

            api_token: lookup("RUNNER_API_TOKEN").filter(|token| !token.is_empty()),
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("RUNNER_PORT must be greater than 0");
        }

        if self.max_queued_runs == 0 {
            anyhow::bail!("RUNNER_MAX_QUEUED_RUNS must be greater than 0");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup(&[("MIRROR_JOBS_FILE", "/etc/mirror/jobs.json")]))
            .expect("Failed to load config");

        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.api_address(), "0.0.0.0:8086");
        assert_eq!(config.jobs_file, PathBuf::from("/etc/mirror/jobs.json"));
        assert_eq!(config.max_queued_runs, 16);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_jobs_file_required() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_lookup(lookup(&[
            ("MIRROR_JOBS_FILE", "jobs.json"),
            ("RUNNER_PORT", "0"),
        ]))
        .is_err());

        assert!(Config::from_lookup(lookup(&[
            ("MIRROR_JOBS_FILE", "jobs.json"),
            ("RUNNER_MAX_QUEUED_RUNS", "many"),
        ]))
        .is_err());
    }

    #[test]
    fn test_empty_token_means_no_auth() {
        let config = Config::from_lookup(lookup(&[
            ("MIRROR_JOBS_FILE", "jobs.json"),
            ("RUNNER_API_TOKEN", ""),
        ]))
        .unwrap();
        assert!(config.api_token.is_none());
    }
}
