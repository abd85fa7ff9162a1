//! Mirror Runner
//!
//! Job runner for mirror jobs. Accepts start requests over REST, queues runs
//! in Redis and executes them in a background worker.

pub mod config;
pub mod handlers;
pub mod models;
pub mod storage;
pub mod worker;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use handlers::AppState;
pub use models::{JobRun, RunStatusResponse, StartRunResponse};
pub use storage::Storage;
pub use worker::{Worker, WorkerConfig};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/stats", get(handlers::get_stats_handler))
        .route(
            "/api/jobs/{job_name}/runs",
            post(handlers::start_run_handler).get(handlers::get_job_runs_handler),
        )
        .route("/api/runs/{run_id}", get(handlers::get_run_handler))
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
