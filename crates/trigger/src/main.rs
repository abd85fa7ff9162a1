//! Mirror Trigger
//!
//! Starts one run of the configured mirror job and prints the response envelope

use anyhow::{Context, Result};
use clap::Parser;
use mirror_trigger::{handle_invocation, HttpJobRunner, JobTrigger, TriggerConfig, WaitMode};
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mirror-trigger")]
#[command(about = "Start a mirror job run and report the outcome")]
struct Cli {
    /// Mirror job to start (overrides MIRROR_JOB_NAME)
    #[arg(short, long)]
    job_name: Option<String>,

    /// Job runner base URL (overrides MIRROR_RUNNER_URL)
    #[arg(short, long)]
    runner_url: Option<String>,

    /// Return once the run is accepted instead of waiting for it
    #[arg(long)]
    start_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mirror_trigger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let mut config = TriggerConfig::from_lookup(|key| match key {
        "MIRROR_JOB_NAME" => cli.job_name.clone().or_else(|| env::var(key).ok()),
        "MIRROR_RUNNER_URL" => cli.runner_url.clone().or_else(|| env::var(key).ok()),
        _ => env::var(key).ok(),
    })
    .context("Failed to load configuration")?;

    if cli.start_only {
        config.wait = WaitMode::StartOnly;
    }

    info!("Job runner: {}", config.runner_url);

    let runner = HttpJobRunner::new(config.runner_url.clone()).with_token(config.runner_token.clone());
    let trigger = JobTrigger::new(Arc::new(runner), config);

    let response = handle_invocation(&trigger).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.is_success() {
        anyhow::bail!("{}", response.body);
    }

    Ok(())
}
