//! HTTP client for the mirror job runner service

use async_trait::async_trait;
use mirror_gate_common::{RunId, RunStatus};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::RunnerError;
use crate::runner::JobRunner;

/// Job runner reached over HTTP
pub struct HttpJobRunner {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct StartRunResponse {
    run_id: RunId,
}

#[derive(Debug, Deserialize)]
struct RunView {
    status: RunStatus,
}

#[derive(Debug, Deserialize)]
struct RunStatusResponse {
    run: RunView,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpJobRunner {
    /// Create a new runner client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            client: reqwest::Client::new(),
        }
    }

    /// Send a bearer token with every request
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Check if the runner is healthy
    pub async fn health_check(&self) -> Result<bool, RunnerError> {
        let url = self.endpoint(&["health"])?;
        let response = self.client.get(url).send().await?;
        Ok(response.status().is_success())
    }

    /// Runner URL with `segments` appended, each percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, RunnerError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| RunnerError::Invalid(format!("Invalid runner URL {}: {}", self.base_url, e)))?;

        url.path_segments_mut()
            .map_err(|_| RunnerError::Invalid(format!("Runner URL cannot take a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Map a non-success response onto the runner's error vocabulary
async fn rejection(response: reqwest::Response, not_found: impl FnOnce(String) -> RunnerError) -> RunnerError {
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };

    match status {
        StatusCode::NOT_FOUND => not_found(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RunnerError::PermissionDenied(message),
        StatusCode::TOO_MANY_REQUESTS => RunnerError::Throttled(message),
        s if s.is_server_error() => RunnerError::Unavailable(message),
        _ => RunnerError::Invalid(message),
    }
}

#[async_trait]
impl JobRunner for HttpJobRunner {
    async fn start_run(&self, job_name: &str) -> Result<RunId, RunnerError> {
        let url = self.endpoint(&["api", "jobs", job_name, "runs"])?;

        debug!("Requesting run start: {}", url);

        let response = self.authorized(self.client.post(url)).send().await?;

        if !response.status().is_success() {
            let job_name = job_name.to_string();
            return Err(rejection(response, move |_| RunnerError::JobNotFound(job_name)).await);
        }

        let started: StartRunResponse = response
            .json()
            .await
            .map_err(|e| RunnerError::Invalid(format!("Failed to parse start response: {}", e)))?;

        Ok(started.run_id)
    }

    async fn run_status(&self, run_id: &RunId) -> Result<RunStatus, RunnerError> {
        let url = self.endpoint(&["api", "runs", run_id.as_str()])?;

        debug!("Fetching run status: {}", url);

        let response = self.authorized(self.client.get(url)).send().await?;

        if !response.status().is_success() {
            let run_id = run_id.clone();
            return Err(rejection(response, move |_| RunnerError::RunNotFound(run_id)).await);
        }

        let status: RunStatusResponse = response
            .json()
            .await
            .map_err(|e| RunnerError::Invalid(format!("Failed to parse run status: {}", e)))?;

        Ok(status.run.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_client_creation() {
        let client = HttpJobRunner::new("http://localhost:8086/");
        assert_eq!(client.base_url, "http://localhost:8086");
        assert!(client.token.is_none());
    }

    #[test]
    fn test_job_name_is_a_single_path_segment() {
        let client = HttpJobRunner::new("http://localhost:8086/");

        let url = client.endpoint(&["api", "jobs", "team/app?x#y", "runs"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8086/api/jobs/team%2Fapp%3Fx%23y/runs"
        );
    }

    #[test]
    fn test_base_path_is_kept() {
        let client = HttpJobRunner::new("http://localhost:8086/runner");

        let url = client.endpoint(&["api", "runs", "run-1"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8086/runner/api/runs/run-1");
    }
}
