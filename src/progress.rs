//! Progress Bus / Subscriptions (C8)
//!
//! Every [`crate::model::Request`] and [`crate::model::Solution`] owns a
//! single-slot, always-latest status channel (spec §5): publishing never
//! blocks the engine on a slow subscriber, and a subscriber that attaches
//! after the fact immediately observes the current state rather than
//! waiting for the next transition. `tokio::sync::watch` already has exactly
//! this contract, so the bus is a thin registry over one `watch` pair per
//! request and per solution.
//!
//! The engine must persist a state transition before calling `publish_*`
//! (spec §5 "persist-before-publish"); this module only distributes events,
//! it does not itself durably store anything.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;

use crate::error::ErrorKind;
use crate::model::Progress;

/// One status update, shaped to match the `/ws` server push envelope from
/// spec §6 once a `type` discriminant is layered on by the protocol module.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub request_id: String,
    pub solution_id: Option<String>,
    pub progress: Progress,
    pub result_id: Option<String>,
    pub error: Option<ErrorKind>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn for_request(request_id: impl Into<String>, progress: Progress, error: Option<ErrorKind>) -> Self {
        ProgressEvent { request_id: request_id.into(), solution_id: None, progress, result_id: None, error, timestamp: Utc::now() }
    }

    pub fn for_solution(
        request_id: impl Into<String>,
        solution_id: impl Into<String>,
        progress: Progress,
        result_id: Option<String>,
        error: Option<ErrorKind>,
    ) -> Self {
        ProgressEvent {
            request_id: request_id.into(),
            solution_id: Some(solution_id.into()),
            progress,
            result_id,
            error,
            timestamp: Utc::now(),
        }
    }
}

/// Distributes [`ProgressEvent`]s for in-flight requests and solutions.
/// A request-level subscriber also wants every solution spawned under that
/// request, so the bus keeps a registry mapping request id to the solution
/// ids seen so far (spec §9: "a registry of solution ids mapped to
/// capability handles; solutions never hold a back-pointer to the request").
pub struct ProgressBus {
    requests: DashMap<String, watch::Sender<ProgressEvent>>,
    solutions: DashMap<String, watch::Sender<ProgressEvent>>,
    request_solutions: DashMap<String, RwLock<Vec<String>>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        ProgressBus { requests: DashMap::new(), solutions: DashMap::new(), request_solutions: DashMap::new() }
    }

    /// Publishes a request-level transition, creating the channel on first use.
    pub fn publish_request(&self, event: ProgressEvent) {
        match self.requests.entry(event.request_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let _ = entry.get().send(event);
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let (sender, _) = watch::channel(event);
                entry.insert(sender);
            }
        }
    }

    pub fn subscribe_request(&self, request_id: &str) -> Option<watch::Receiver<ProgressEvent>> {
        self.requests.get(request_id).map(|sender| sender.subscribe())
    }

    /// Registers a solution under its owning request and publishes its
    /// first (`pending`) transition.
    pub fn publish_solution(&self, event: ProgressEvent) {
        let solution_id = event.solution_id.clone().expect("solution event must carry a solution_id");
        match self.solutions.entry(solution_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let _ = entry.get().send(event);
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                self.request_solutions
                    .entry(event.request_id.clone())
                    .or_insert_with(|| RwLock::new(Vec::new()))
                    .write()
                    .push(solution_id);
                let (sender, _) = watch::channel(event);
                entry.insert(sender);
            }
        }
    }

    pub fn subscribe_solution(&self, solution_id: &str) -> Option<watch::Receiver<ProgressEvent>> {
        self.solutions.get(solution_id).map(|sender| sender.subscribe())
    }

    /// Solution ids published so far for a request, in publish order; used
    /// by a request-level `/ws` subscriber to fan out to each solution's
    /// own channel as they appear.
    pub fn solutions_for_request(&self, request_id: &str) -> Vec<String> {
        self.request_solutions.get(request_id).map(|ids| ids.read().clone()).unwrap_or_default()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}
