//! Mirror Runner
//!
//! REST API for starting mirror runs + background worker for executing them

use anyhow::{Context, Result};
use mirror_job::{DockerCli, JobCatalog, MirrorExecutor};
use mirror_runner::{create_router, AppState, Config, Storage, Worker, WorkerConfig};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mirror_runner=debug,mirror_job=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    info!("Starting Mirror Runner");
    info!("Redis URL: {}", config.redis_url);
    info!("Jobs file: {}", config.jobs_file.display());

    let catalog = Arc::new(
        JobCatalog::from_file(&config.jobs_file).context("Failed to load mirror jobs")?,
    );

    // Initialize storage for API
    let api_storage = Storage::new(&config.redis_url)
        .await
        .context("Failed to initialize API storage")?;

    // Initialize storage for worker
    let worker_storage = Storage::new(&config.redis_url)
        .await
        .context("Failed to initialize worker storage")?;

    let state = AppState {
        storage: Mutex::new(api_storage),
        catalog: Arc::clone(&catalog),
        max_queued_runs: config.max_queued_runs,
        api_token: config.api_token.clone(),
    };

    let app = create_router(state);

    // Spawn worker task
    let executor = MirrorExecutor::new(Arc::new(DockerCli::new()));
    let worker_handle = tokio::spawn(async move {
        let mut worker = Worker::new(WorkerConfig::default(), worker_storage, catalog, executor);
        if let Err(e) = worker.run().await {
            tracing::error!("Worker error: {}", e);
        }
    });

    let addr = config.api_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Mirror Runner API running on http://{}", addr);

    // Run server (worker runs in background)
    axum::serve(listener, app)
        .await
        .context("Server error")?;

    worker_handle.await?;

    Ok(())
}
