//! `/distil/*` router construction and graceful-shutdown-aware serving.
//!
//! Routes are thin: every handler below deserializes its body, calls one
//! C2/C3/C6 method, and serializes the result (spec §6). No business logic
//! lives in this module.

pub mod dto;
pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Notify;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};

use crate::config::HttpConfig;
use crate::protocol::AppState;

use self::handlers::{admin, data, datasets, variables, ws};

/// Request bodies are small JSON filter/solution specs; 16 MiB leaves
/// generous headroom without letting a misbehaving client exhaust memory.
const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/distil/datasets", get(datasets::list_datasets))
        .route("/distil/datasets/:ds", get(datasets::get_dataset))
        .route(
            "/distil/variables/:ds",
            get(variables::list_variables).post(variables::set_variable_type),
        )
        .route("/distil/variable-summary/:ds/:var", post(data::variable_summary))
        .route("/distil/data/:ds/:invert", post(data::fetch_data))
        .route("/distil/results/:ds/:solution_id", post(data::fetch_results))
        .route("/distil/predicted-summary/:ds/:target/:result_id", post(data::predicted_summary))
        .route("/distil/residuals-summary/:ds/:target/:result_id", post(data::residuals_summary))
        .route("/distil/correctness-summary/:ds/:result_id", post(data::correctness_summary))
        .route("/distil/abort", get(admin::abort))
        .route("/distil/export/:solution_id", get(admin::export))
        .route("/health", get(admin::health))
        .route("/ws", get(ws::upgrade))
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .with_state(state)
}

/// Serves `app` until SIGINT/SIGTERM or `state.shutdown` fires, then waits
/// up to `config.shutdown_deadline_secs` for in-flight requests to drain
/// (spec §6 exit codes).
pub async fn serve(state: AppState, config: &HttpConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state.clone());
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http server listening");

    let deadline = Duration::from_secs(config.shutdown_deadline_secs);
    let shutdown = state.shutdown.clone();
    let serving = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown));

    match tokio::time::timeout(deadline, serving).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            warn!(deadline_secs = config.shutdown_deadline_secs, "graceful shutdown deadline exceeded");
            Ok(())
        }
    }
}

async fn shutdown_signal(shutdown: Arc<Notify>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => { info!("received SIGINT, shutting down"); }
            _ = sigterm.recv() => { info!("received SIGTERM, shutting down"); }
            () = shutdown.notified() => { info!("received abort/export request, shutting down"); }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = ctrl_c => { info!("received SIGINT, shutting down"); }
            () = shutdown.notified() => { info!("received abort/export request, shutting down"); }
        }
    }
}
