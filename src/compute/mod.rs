//! Compute Client (C5)
//!
//! Thin wrapper over the generated `ModelDiscovery` gRPC client. Every
//! streaming RPC is driven through [`crate::execution::pull_loop`] so the
//! `pull_max`/`pull_timeout` stall policy is applied uniformly; unary RPCs
//! are called directly.
//!
//! `tonic`'s generated client is cheap to clone (it wraps a shared `Channel`
//! and multiplexes concurrent calls over HTTP/2), so [`ComputeClient`] clones
//! its inner client per call rather than serializing access behind a lock.

pub mod generated;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tonic::transport::Channel;
use tonic::Streaming;

use crate::config::ComputeConfig;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::execution::{pull_loop, CancelHandle, PullOutcome};
use generated::model_discovery_client::ModelDiscoveryClient;
use generated::{
    EndSearchSolutionsRequest, FitSolutionRequest, HelloRequest, HelloResponse, ProblemDescription,
    ProduceSolutionRequest, ScoreSolutionRequest, SearchSolutionsRequest, StopSearchSolutionsRequest,
};

/// A per-solution callback boxed so [`ComputeBackend`] stays object-safe
/// (generic trait methods can't be called through a `dyn` reference, which
/// is what lets `SolutionRequestEngine` swap in a stub for scenario tests).
pub type SolutionHandler = Box<dyn FnMut(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

const CLIENT_API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parameters for opening a new search, already shaped for the wire; the
/// engine computes `target_column_index` and `pipeline_description` before
/// calling this (spec §4.6 steps 1-5).
pub struct SearchSpec {
    pub train_uri: String,
    pub test_uri: String,
    pub target_name: String,
    pub target_column_index: i32,
    pub task: &'static str,
    pub sub_task: String,
    pub metrics: Vec<String>,
    pub pipeline_description: Option<Vec<u8>>,
    pub max_solutions: u32,
    pub max_time_seconds: u64,
}

/// A search opened on the compute runtime: the assigned `search_id`, and a
/// way to drain its solution stream. Boxed as `dyn` so test scenarios can
/// hand the engine a scripted session instead of a live gRPC stream.
#[async_trait]
pub trait SearchSession: Send {
    fn search_id(&self) -> &str;

    /// Drains the search's solution stream, spawning `handler` as its own
    /// task for every solution id. Returns the pull loop's outcome alongside
    /// the [`JoinSet`] of spawned handler tasks; the caller decides how long
    /// to wait on them (unbounded on a clean end of stream, bounded by
    /// `pull_timeout` after a cancellation — spec §4.6 steps 8-9).
    async fn get_search_solutions(&mut self, cancel: &CancelHandle, handler: SolutionHandler) -> (OrchestrationResult<()>, JoinSet<()>);
}

/// [`SearchSession`] backed by a live `search_solutions` response stream,
/// with the first response's solution id held back until
/// [`GrpcSearchSession::get_search_solutions`] drains it.
struct GrpcSearchSession {
    search_id: String,
    pending_first: Option<String>,
    stream: Streaming<generated::SearchSolutionsResponse>,
    pull_max: u32,
    pull_timeout: Duration,
}

#[async_trait]
impl SearchSession for GrpcSearchSession {
    fn search_id(&self) -> &str {
        &self.search_id
    }

    async fn get_search_solutions(&mut self, cancel: &CancelHandle, mut handler: SolutionHandler) -> (OrchestrationResult<()>, JoinSet<()>) {
        let mut tasks = JoinSet::new();
        if let Some(solution_id) = self.pending_first.take() {
            tasks.spawn(handler(solution_id));
        }
        let stream = &mut self.stream;
        let result = pull_loop(
            || async {
                match stream.message().await {
                    Ok(Some(response)) => Ok(PullOutcome::Item(response.solution_id)),
                    Ok(None) => Ok(PullOutcome::EndOfStream),
                    Err(status) => Err(OrchestrationError::from(status)),
                }
            },
            self.pull_max,
            self.pull_timeout,
            cancel,
            |solution_id| {
                tasks.spawn(handler(solution_id));
            },
        )
        .await;
        (result, tasks)
    }
}

#[derive(Clone)]
pub struct ComputeClient {
    inner: ModelDiscoveryClient<Channel>,
    pull_max: u32,
    pull_timeout: Duration,
}

impl ComputeClient {
    /// Connects to the runtime and performs the initial handshake. A
    /// `runtime_version` mismatch is logged, not rejected (spec §4.5).
    pub async fn connect(config: &ComputeConfig) -> OrchestrationResult<Self> {
        let inner = ModelDiscoveryClient::connect(config.endpoint.clone())
            .await
            .map_err(|e| OrchestrationError::TransportError(e.to_string()))?;
        let client =
            Self { inner, pull_max: config.pull_max, pull_timeout: Duration::from_secs(config.pull_timeout_secs) };
        client.hello().await?;
        Ok(client)
    }

    pub async fn hello(&self) -> OrchestrationResult<HelloResponse> {
        let mut client = self.inner.clone();
        let response =
            client.hello(HelloRequest { client_version: CLIENT_API_VERSION.to_string() }).await?.into_inner();
        if response.runtime_version != CLIENT_API_VERSION {
            tracing::warn!(
                client_version = CLIENT_API_VERSION,
                runtime_version = %response.runtime_version,
                "model-discovery runtime reports a different API version"
            );
        }
        tracing::info!(
            allowed_value_types = ?response.allowed_value_types,
            extensions = ?response.extensions,
            "model-discovery runtime handshake complete"
        );
        Ok(response)
    }

    /// Opens a search and blocks for its first response, which carries the
    /// `search_id` every subsequent call needs. `pull_timeout` bounds this
    /// first receive the same as every later one.
    async fn start_search(&self, spec: SearchSpec) -> OrchestrationResult<GrpcSearchSession> {
        let mut client = self.inner.clone();
        let request = SearchSolutionsRequest {
            train_uri: spec.train_uri,
            test_uri: spec.test_uri,
            problem: Some(ProblemDescription {
                target_name: spec.target_name,
                target_column_index: spec.target_column_index,
                task: spec.task.to_string(),
                sub_task: spec.sub_task,
                metrics: spec.metrics,
            }),
            pipeline_description: spec.pipeline_description,
            max_solutions: i64::from(spec.max_solutions),
            time_bound_seconds: spec.max_time_seconds as i64,
        };
        let mut stream = client.search_solutions(request).await?.into_inner();
        let first = tokio::time::timeout(self.pull_timeout, stream.message())
            .await
            .map_err(|_| OrchestrationError::Timeout(self.pull_timeout))?
            .map_err(OrchestrationError::from)?
            .ok_or_else(|| OrchestrationError::TransportError("search stream closed before any solution".into()))?;
        Ok(GrpcSearchSession {
            search_id: first.search_id,
            pending_first: Some(first.solution_id),
            stream,
            pull_max: self.pull_max,
            pull_timeout: self.pull_timeout,
        })
    }

    pub async fn stop_search(&self, search_id: &str) -> OrchestrationResult<()> {
        let mut client = self.inner.clone();
        client.stop_search_solutions(StopSearchSolutionsRequest { search_id: search_id.to_string() }).await?;
        Ok(())
    }

    pub async fn end_search(&self, search_id: &str) -> OrchestrationResult<()> {
        let mut client = self.inner.clone();
        client.end_search_solutions(EndSearchSolutionsRequest { search_id: search_id.to_string() }).await?;
        Ok(())
    }

    /// A solution may score against several metrics across several response
    /// messages; callers keep every response rather than picking one (spec
    /// §4.6 "all are stored").
    pub async fn score_solution(
        &self,
        solution_id: &str,
        metrics: Vec<String>,
        cancel: &CancelHandle,
    ) -> OrchestrationResult<Vec<std::collections::HashMap<String, f64>>> {
        let mut client = self.inner.clone();
        let request = ScoreSolutionRequest { solution_id: solution_id.to_string(), metrics };
        let stream = client.score_solution(request).await?.into_inner();
        let responses = self.drain_stream(stream, cancel).await?;
        Ok(responses.into_iter().map(|r| r.scores).collect())
    }

    pub async fn fit_solution(&self, solution_id: &str, cancel: &CancelHandle) -> OrchestrationResult<String> {
        let mut client = self.inner.clone();
        let request = FitSolutionRequest { solution_id: solution_id.to_string() };
        let stream = client.fit_solution(request).await?.into_inner();
        let responses = self.drain_stream(stream, cancel).await?;
        responses
            .into_iter()
            .last()
            .map(|r| r.fitted_solution_id)
            .ok_or_else(|| OrchestrationError::TransportError(format!("fit_solution({solution_id}) produced no response")))
    }

    pub async fn produce_solution(
        &self,
        fitted_solution_id: &str,
        inputs_uri: &str,
        cancel: &CancelHandle,
    ) -> OrchestrationResult<String> {
        let mut client = self.inner.clone();
        let request =
            ProduceSolutionRequest { fitted_solution_id: fitted_solution_id.to_string(), inputs_uri: inputs_uri.to_string() };
        let stream = client.produce_solution(request).await?.into_inner();
        let responses = self.drain_stream(stream, cancel).await?;
        responses.into_iter().last().map(|r| r.result_uri).ok_or_else(|| {
            OrchestrationError::TransportError(format!("produce_solution({fitted_solution_id}) produced no response"))
        })
    }

    async fn drain_stream<T>(&self, mut stream: Streaming<T>, cancel: &CancelHandle) -> OrchestrationResult<Vec<T>> {
        let mut items = Vec::new();
        pull_loop(
            || async {
                match stream.message().await {
                    Ok(Some(item)) => Ok(PullOutcome::Item(item)),
                    Ok(None) => Ok(PullOutcome::EndOfStream),
                    Err(status) => Err(OrchestrationError::from(status)),
                }
            },
            self.pull_max,
            self.pull_timeout,
            cancel,
            |item| items.push(item),
        )
        .await?;
        Ok(items)
    }
}

/// The subset of [`ComputeClient`] that `SolutionRequestEngine` dispatches
/// against, pulled out so test scenarios can swap in a stub runtime instead
/// of a live gRPC channel.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    async fn start_search(&self, spec: SearchSpec) -> OrchestrationResult<Box<dyn SearchSession>>;

    async fn stop_search(&self, search_id: &str) -> OrchestrationResult<()>;

    async fn end_search(&self, search_id: &str) -> OrchestrationResult<()>;

    async fn score_solution(
        &self,
        solution_id: &str,
        metrics: Vec<String>,
        cancel: &CancelHandle,
    ) -> OrchestrationResult<Vec<HashMap<String, f64>>>;

    async fn fit_solution(&self, solution_id: &str, cancel: &CancelHandle) -> OrchestrationResult<String>;

    async fn produce_solution(
        &self,
        fitted_solution_id: &str,
        inputs_uri: &str,
        cancel: &CancelHandle,
    ) -> OrchestrationResult<String>;
}

#[async_trait]
impl ComputeBackend for ComputeClient {
    async fn start_search(&self, spec: SearchSpec) -> OrchestrationResult<Box<dyn SearchSession>> {
        let session = ComputeClient::start_search(self, spec).await?;
        Ok(Box::new(session))
    }

    async fn stop_search(&self, search_id: &str) -> OrchestrationResult<()> {
        ComputeClient::stop_search(self, search_id).await
    }

    async fn end_search(&self, search_id: &str) -> OrchestrationResult<()> {
        ComputeClient::end_search(self, search_id).await
    }

    async fn score_solution(
        &self,
        solution_id: &str,
        metrics: Vec<String>,
        cancel: &CancelHandle,
    ) -> OrchestrationResult<Vec<HashMap<String, f64>>> {
        ComputeClient::score_solution(self, solution_id, metrics, cancel).await
    }

    async fn fit_solution(&self, solution_id: &str, cancel: &CancelHandle) -> OrchestrationResult<String> {
        ComputeClient::fit_solution(self, solution_id, cancel).await
    }

    async fn produce_solution(
        &self,
        fitted_solution_id: &str,
        inputs_uri: &str,
        cancel: &CancelHandle,
    ) -> OrchestrationResult<String> {
        ComputeClient::produce_solution(self, fitted_solution_id, inputs_uri, cancel).await
    }
}
