//! Orchestrator process entry point.
//!
//! Loads configuration, connects to the compute runtime (C5) and relational
//! store (C2), then serves the `/distil/*` REST surface and `/ws` control
//! channel until SIGINT/SIGTERM or an operator-triggered abort/export (spec
//! §6). Exits 1 if a required dependency cannot be reached at startup.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use distil_orchestrator::catalog::InMemoryCatalogue;
use distil_orchestrator::compute::ComputeClient;
use distil_orchestrator::config::{Config, LoggingConfig};
use distil_orchestrator::engine::SolutionRequestEngine;
use distil_orchestrator::progress::ProgressBus;
use distil_orchestrator::protocol::rest;
use distil_orchestrator::protocol::AppState;
use distil_orchestrator::storage::postgres::PostgresGateway;

/// Bounded startup retry policy for reaching the compute runtime and the
/// relational store (spec §6 exit code 1: "cannot reach required dependency
/// after bounded retries").
const STARTUP_RETRIES: u32 = 5;
const STARTUP_RETRY_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::new(&logging.level);
    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing::info!("orchestrator starting up");

    let store = Arc::new(
        connect_with_retries("relational store", || {
            PostgresGateway::connect(&config.store.database_url, config.store.max_connections)
        })
        .await?,
    );

    let compute = Arc::new(connect_with_retries("compute runtime", || ComputeClient::connect(&config.compute)).await?);

    // C3 has no HTTP-fetch client in scope yet (DESIGN.md); starts with an
    // empty catalogue that the primary metadata store at `config.metadata.endpoint`
    // is expected to populate out of band until that integration lands.
    tracing::warn!(endpoint = %config.metadata.endpoint, "metadata catalogue starting empty; no fetch client wired yet");
    let metadata = Arc::new(InMemoryCatalogue::new(Vec::new()));

    let progress = Arc::new(ProgressBus::new());
    let cancellation_grace = Duration::from_secs(config.compute.pull_timeout_secs);
    let engine = Arc::new(SolutionRequestEngine::new(
        metadata.clone(),
        store.clone(),
        compute,
        progress.clone(),
        config.scratch.clone(),
        cancellation_grace,
    ));

    let ws_connections = config.http.max_ws_connections.map(|limit| Arc::new(Semaphore::new(limit)));

    let state = AppState {
        metadata,
        store,
        engine,
        progress,
        scratch: config.scratch.clone(),
        ws_connections,
        shutdown: Arc::new(Notify::new()),
    };

    rest::serve(state, &config.http).await?;
    tracing::info!("orchestrator shut down cleanly");
    Ok(())
}

async fn connect_with_retries<T, E, F, Fut>(name: &str, mut connect: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match connect().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < STARTUP_RETRIES => {
                attempt += 1;
                tracing::warn!(dependency = name, attempt, error = %e, "retrying connection");
                tokio::time::sleep(STARTUP_RETRY_DELAY).await;
            }
            Err(e) => {
                tracing::error!(dependency = name, attempts = STARTUP_RETRIES, error = %e, "exhausted startup retries");
                return Err(e);
            }
        }
    }
}
