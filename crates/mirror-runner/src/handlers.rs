//! API handlers for the mirror job runner

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mirror_job::JobCatalog;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    models::{JobRun, RunStatusResponse, StartRunResponse},
    storage::Storage,
};

/// Shared application state
pub struct AppState {
    pub storage: Mutex<Storage>,
    pub catalog: Arc<JobCatalog>,
    pub max_queued_runs: usize,
    pub api_token: Option<String>,
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

/// Check the bearer token of a start request
pub fn authorize(headers: &HeaderMap, api_token: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = api_token else {
        return Ok(());
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if provided == Some(expected) {
        Ok(())
    } else {
        Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "Not permitted to start mirror jobs",
        ))
    }
}

/// Health check
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "mirror-runner"
    }))
}

/// Start a run of a named mirror job
///
/// Returns as soon as the run is queued; the copy happens in the worker.
pub async fn start_run_handler(
    State(state): State<Arc<AppState>>,
    Path(job_name): Path<String>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<StartRunResponse>), ApiError> {
    authorize(&headers, state.api_token.as_deref())?;

    if state.catalog.get(&job_name).is_none() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("Mirror job not found: {}", job_name),
        ));
    }

    let mut storage = state.storage.lock().await;

    let pending = storage.pending_runs(&job_name).await?;
    if pending >= state.max_queued_runs {
        warn!("Throttling start of {}: {} runs pending", job_name, pending);
        return Err(ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            format!("{} runs of {} already pending", pending, job_name),
        ));
    }

    let run = JobRun::new(job_name);
    storage.queue_run(&run).await?;

    info!("Started run {} of job {}", run.run_id, run.job_name);

    Ok((
        StatusCode::ACCEPTED,
        Json(StartRunResponse {
            run_id: run.run_id,
            job_name: run.job_name,
            status: run.status,
        }),
    ))
}

/// Get run status
pub async fn get_run_handler(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Json<RunStatusResponse>, ApiError> {
    let mut storage = state.storage.lock().await;
    let run = storage.get_run(&run_id).await?;

    match run {
        Some(run) => Ok(Json(RunStatusResponse { run })),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("Run not found: {}", run_id),
        )),
    }
}

/// Get all runs of a job
pub async fn get_job_runs_handler(
    State(state): State<Arc<AppState>>,
    Path(job_name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.catalog.get(&job_name).is_none() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("Mirror job not found: {}", job_name),
        ));
    }

    let mut storage = state.storage.lock().await;
    let runs = storage.get_job_runs(&job_name).await?;

    Ok(Json(serde_json::json!({
        "job_name": job_name,
        "runs": runs,
        "total": runs.len()
    })))
}

/// Get service stats
pub async fn get_stats_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut storage = state.storage.lock().await;
    let stats = storage.get_stats().await?;
    let queue_len = storage.queue_length().await?;

    Ok(Json(serde_json::json!({
        "service": "mirror-runner",
        "jobs": state.catalog.names().collect::<Vec<_>>(),
        "queue_length": queue_len,
        "stats": stats
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_authorize_without_token_configured() {
        assert!(authorize(&HeaderMap::new(), None).is_ok());
    }

    #[test]
    fn test_authorize_checks_bearer_token() {
        let mut headers = HeaderMap::new();
        let err = authorize(&headers, Some("secret")).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"));
        assert!(authorize(&headers, Some("secret")).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        assert!(authorize(&headers, Some("secret")).is_ok());
    }
}
