//! Orchestration Protocol
//!
//! The `/distil/*` REST surface and the `/ws` progress/control channel are
//! thin adapters over the core engine (C6) and its gateways (C2/C3): they
//! deserialize a request, call into the core, and serialize the result.
//! None of the orchestration logic lives here (spec §6).
//!
//! # Module Structure
//!
//! - `rest` - router construction, handlers, DTOs, and error mapping

pub mod rest;

use std::sync::Arc;

use tokio::sync::{Notify, Semaphore};

use crate::catalog::MetadataGateway;
use crate::config::ScratchConfig;
use crate::engine::SolutionRequestEngine;
use crate::progress::ProgressBus;
use crate::storage::gateway::DataStoreGateway;

/// Shared state handed to every handler via [`axum::extract::State`].
#[derive(Clone)]
pub struct AppState {
    pub metadata: Arc<dyn MetadataGateway>,
    pub store: Arc<dyn DataStoreGateway>,
    pub engine: Arc<SolutionRequestEngine>,
    pub progress: Arc<ProgressBus>,
    pub scratch: ScratchConfig,
    /// Caps concurrent `/ws` sockets (`HttpConfig::max_ws_connections`); `None` is unbounded.
    pub ws_connections: Option<Arc<Semaphore>>,
    /// Tripped by `GET /distil/abort` and by a fitted-solution export; `main`
    /// awaits this alongside the OS signal futures to start graceful drain.
    pub shutdown: Arc<Notify>,
}
