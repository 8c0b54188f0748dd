//! Solution Request Engine (C6)
//!
//! Turns a caller's [`SolutionRequestSpec`] into a running search on the
//! compute client, fans each discovered solution out to its own
//! score/fit/produce/persist task, and drives the per-Request and
//! per-Solution state machines (spec §4.6, §9). The engine owns no state of
//! its own beyond the in-memory repository ([`store`]) and the active-search
//! registry needed to service `stop_solution_request`.

mod dataset_io;
pub mod store;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::catalog::MetadataGateway;
use crate::compute::{ComputeBackend, SearchSession, SearchSpec, SolutionHandler};
use crate::config::ScratchConfig;
use crate::error::{ErrorKind, OrchestrationError, OrchestrationResult};
use crate::execution::CancelHandle;
use crate::ingest;
use crate::model::{Filter, FilterParams, Progress, Request, Solution, SolutionResult, Task, Variable};
use crate::pipeline::build_user_dataset_pipeline;
use crate::progress::{ProgressBus, ProgressEvent};
use crate::storage::gateway::DataStoreGateway;

use store::{RequestStore, SolutionStore};

/// Caller-supplied inputs for a new solution search; everything the engine
/// itself computes (target column index, pipeline bytes, file splits) stays
/// out of this type.
#[derive(Debug, Clone)]
pub struct SolutionRequestSpec {
    pub dataset_id: String,
    pub target: String,
    pub task: Task,
    pub sub_task: String,
    pub metrics: Vec<String>,
    pub max_solutions: u32,
    pub max_time_seconds: u64,
    pub filters: FilterParams,
}

/// Tracks the pieces `stop_solution_request` needs for an in-flight request:
/// its cancellation switch and, once known, the compute-side search id.
struct ActiveRequest {
    cancel: CancelHandle,
    search_id: Mutex<Option<String>>,
}

pub struct SolutionRequestEngine {
    metadata: Arc<dyn MetadataGateway>,
    store_gateway: Arc<dyn DataStoreGateway>,
    compute: Arc<dyn ComputeBackend>,
    progress: Arc<ProgressBus>,
    scratch: ScratchConfig,
    /// Bound on the post-cancellation wait for in-flight solution tasks;
    /// mirrors `ComputeConfig::pull_timeout_secs` (spec §4.6 step 9).
    cancellation_grace: Duration,
    requests: RequestStore,
    solutions: SolutionStore,
    active: dashmap::DashMap<String, Arc<ActiveRequest>>,
}

impl SolutionRequestEngine {
    pub fn new(
        metadata: Arc<dyn MetadataGateway>,
        store_gateway: Arc<dyn DataStoreGateway>,
        compute: Arc<dyn ComputeBackend>,
        progress: Arc<ProgressBus>,
        scratch: ScratchConfig,
        cancellation_grace: Duration,
    ) -> Self {
        SolutionRequestEngine {
            metadata,
            store_gateway,
            compute,
            progress,
            scratch,
            cancellation_grace,
            requests: RequestStore::new(),
            solutions: SolutionStore::new(),
            active: dashmap::DashMap::new(),
        }
    }

    pub fn get_request(&self, request_id: &str) -> Option<Request> {
        self.requests.get(request_id)
    }

    pub fn get_solution(&self, solution_id: &str) -> Option<Solution> {
        self.solutions.get(solution_id)
    }

    pub fn solutions_for_request(&self, request_id: &str) -> Vec<Solution> {
        self.solutions.for_request(request_id)
    }

    /// Finds the solution that produced `result_id`, for the REST result
    /// endpoints that identify a result without naming its solution.
    pub fn get_solution_by_result_id(&self, result_id: &str) -> Option<Solution> {
        self.solutions.get_by_result_id(result_id)
    }

    /// Persists the request as `pending`, spawns the dispatch task, and
    /// returns its id immediately; progress is observed through
    /// [`ProgressBus`] subscriptions, not this call's return value.
    pub fn submit(self: &Arc<Self>, spec: SolutionRequestSpec) -> String {
        let request_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let request = Request {
            request_id: request_id.clone(),
            dataset_id: spec.dataset_id.clone(),
            target: spec.target.clone(),
            task: spec.task,
            sub_task: spec.sub_task.clone(),
            metrics: spec.metrics.clone(),
            max_solutions: spec.max_solutions,
            max_time_seconds: spec.max_time_seconds,
            filters: spec.filters.clone(),
            progress: Progress::Pending,
            created_at: now,
            last_updated_at: now,
        };
        self.persist_and_publish_request(request.clone());

        let cancel = CancelHandle::new();
        self.active.insert(request_id.clone(), Arc::new(ActiveRequest { cancel: cancel.clone(), search_id: Mutex::new(None) }));

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = engine.dispatch(request, spec, cancel).await;
            engine.active.remove(&request_id);
        });
        request_id
    }

    /// Cancels a running request: trips its cancel switch, asks the compute
    /// runtime to stop the search, and lets already-spawned solution tasks
    /// keep running (spec §4.6 step 9). Returns `false` if the request is
    /// not (or no longer) active.
    pub async fn stop_solution_request(&self, request_id: &str) -> bool {
        let Some(active) = self.active.get(request_id).map(|a| Arc::clone(&a)) else {
            return false;
        };
        active.cancel.cancel();
        if let Some(search_id) = active.search_id.lock().clone() {
            if let Err(e) = self.compute.stop_search(&search_id).await {
                tracing::warn!(request_id, error = %e, "stop_search failed during cancellation");
            }
        }
        true
    }

    async fn dispatch(self: &Arc<Self>, mut request: Request, spec: SolutionRequestSpec, cancel: CancelHandle) -> OrchestrationResult<()> {
        match self.run_dispatch(&mut request, &spec, &cancel).await {
            Ok(()) => {
                self.transition_request(&mut request, Progress::Completed, None);
                Ok(())
            }
            Err(e) => {
                self.transition_request(&mut request, Progress::Errored, Some(e.kind()));
                Err(e)
            }
        }
    }

    async fn run_dispatch(
        self: &Arc<Self>,
        request: &mut Request,
        spec: &SolutionRequestSpec,
        cancel: &CancelHandle,
    ) -> OrchestrationResult<()> {
        // Step 1: resolve the dataset and confirm the target variable exists.
        let dataset = self.metadata.get_dataset(&spec.dataset_id).await?;
        dataset
            .variable(&spec.target)
            .ok_or_else(|| OrchestrationError::InvalidRequest(format!("unknown target variable '{}'", spec.target)))?;

        // Step 2: expand the filter projection to every user-visible variable.
        let expanded = FilterParams {
            size: spec.filters.size,
            variables: dataset.variables.iter().filter(|v| v.is_user_visible()).map(|v: &Variable| v.key.clone()).collect(),
            filters: spec.filters.filters.clone(),
        };

        // Every variable this request reads is locked against `set_type`
        // for the request's lifetime (spec §4.3); unlocked unconditionally
        // once `run_dispatch_locked` returns, success or failure.
        self.metadata.lock_variables(&spec.dataset_id, &expanded.variables).await;
        let result = self.run_dispatch_locked(request, spec, cancel, &dataset, &expanded).await;
        self.metadata.unlock_variables(&spec.dataset_id, &expanded.variables).await;
        result
    }

    async fn run_dispatch_locked(
        self: &Arc<Self>,
        request: &mut Request,
        spec: &SolutionRequestSpec,
        cancel: &CancelHandle,
        dataset: &crate::model::Dataset,
        expanded: &FilterParams,
    ) -> OrchestrationResult<()> {
        // Step 3: locate the target's column index in the expanded projection.
        let target_column_index = expanded
            .variables
            .iter()
            .position(|key| key == &spec.target)
            .ok_or_else(|| OrchestrationError::InvalidRequest("target variable dropped from projection".into()))? as i32;

        // Step 4: fetch the filtered rows and write the train/test split.
        let rows = self.store_gateway.fetch_rows(dataset, expanded, false).await?;
        let split = dataset_io::write_train_test_split(&self.scratch.base_path, &request.request_id, &rows).await?;

        // Step 5: synthesize the preprocessing pipeline unless disabled.
        let pipeline_description = if self.scratch.skip_preprocessing {
            None
        } else {
            let has_row_filters = spec.filters.filters.iter().any(|f| matches!(f, Filter::Row { .. }));
            let pipeline = build_user_dataset_pipeline(&spec.filters.variables, &[], has_row_filters)?;
            Some(serde_json::to_vec(&pipeline).map_err(|e| OrchestrationError::InvalidRequest(e.to_string()))?)
        };

        // Step 6: open the search; the request moves to running once the
        // search id is known.
        let search_spec = SearchSpec {
            train_uri: split.train_uri,
            test_uri: split.test_uri.clone(),
            target_name: spec.target.clone(),
            target_column_index,
            task: spec.task.as_str(),
            sub_task: spec.sub_task.clone(),
            metrics: spec.metrics.clone(),
            pipeline_description,
            max_solutions: spec.max_solutions,
            max_time_seconds: spec.max_time_seconds,
        };
        let mut session = self.compute.start_search(search_spec).await?;
        if let Some(active) = self.active.get(&request.request_id) {
            *active.search_id.lock() = Some(session.search_id().to_string());
        }
        self.transition_request(request, Progress::Running, None);

        // Step 7/8: fan each solution out to its own task; wait for all of
        // them before declaring the request done.
        let engine = Arc::clone(self);
        let request_id = request.request_id.clone();
        let target = spec.target.clone();
        let metrics = spec.metrics.clone();
        let test_uri = split.test_uri;
        let dataset_for_persist = dataset.clone();

        let handler: SolutionHandler = Box::new(move |solution_id: String| {
            let engine = Arc::clone(&engine);
            let request_id = request_id.clone();
            let target = target.clone();
            let metrics = metrics.clone();
            let test_uri = test_uri.clone();
            let dataset = dataset_for_persist.clone();
            Box::pin(async move {
                engine.handle_solution(request_id, solution_id, target, metrics, test_uri, dataset).await;
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let (pull_result, mut tasks) = session.get_search_solutions(cancel, handler).await;

        match pull_result {
            Ok(()) => {
                while tasks.join_next().await.is_some() {}
                if let Err(e) = self.compute.end_search(session.search_id()).await {
                    tracing::warn!(request_id = %request.request_id, error = %e, "end_search failed after a clean search completion");
                }
                Ok(())
            }
            Err(OrchestrationError::Cancelled) => {
                let pull_timeout = self.compute_pull_timeout();
                let _ = tokio::time::timeout(pull_timeout, async { while tasks.join_next().await.is_some() {} }).await;
                tasks.abort_all();
                self.force_error_incomplete_solutions(&request.request_id, ErrorKind::Cancelled);
                Err(OrchestrationError::Cancelled)
            }
            Err(e) => {
                while tasks.join_next().await.is_some() {}
                Err(e)
            }
        }
    }

    fn compute_pull_timeout(&self) -> Duration {
        // Matches the pull_timeout baked into the shared ComputeClient; kept
        // here rather than threading the config through twice.
        Duration::from_secs(30)
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_solution(
        self: Arc<Self>,
        request_id: String,
        solution_id: String,
        target: String,
        metrics: Vec<String>,
        test_uri: String,
        dataset: crate::model::Dataset,
    ) {
        let now = Utc::now();
        let mut solution = Solution {
            solution_id: solution_id.clone(),
            request_id: request_id.clone(),
            progress: Progress::Pending,
            created_at: now,
            scores: Vec::new(),
            fitted_solution_id: None,
            result: None,
        };
        self.persist_and_publish_solution(solution.clone());

        // Solution RPCs run to completion even if the owning request is
        // cancelled mid-search (spec §4.6 step 9); they get their own,
        // never-cancelled handle.
        let cancel = CancelHandle::new();

        if let Err(e) = self.run_solution(&mut solution, &target, &metrics, &test_uri, &dataset, &cancel).await {
            solution.progress = Progress::Errored;
            self.persist_and_publish_solution_with_error(solution, e.kind());
        }
    }

    async fn run_solution(
        &self,
        solution: &mut Solution,
        target: &str,
        metrics: &[String],
        test_uri: &str,
        dataset: &crate::model::Dataset,
        cancel: &CancelHandle,
    ) -> OrchestrationResult<()> {
        solution.progress = Progress::Running;
        self.persist_and_publish_solution(solution.clone());

        let score_responses = self.compute.score_solution(&solution.solution_id, metrics.to_vec(), cancel).await?;
        solution.scores = score_responses.into_iter().flat_map(|m| m.into_iter()).collect();

        let fitted_solution_id = self.compute.fit_solution(&solution.solution_id, cancel).await?;
        solution.fitted_solution_id = Some(fitted_solution_id.clone());

        let result_uri = self.compute.produce_solution(&fitted_solution_id, test_uri, cancel).await?;
        let canonical_uri = ingest::canonical_path(&result_uri).to_string();
        let result_id = hex::encode(Sha1::digest(canonical_uri.as_bytes()));

        self.store_gateway.persist_result(dataset, &canonical_uri, &result_id).await?;

        let result = SolutionResult {
            result_id,
            solution_id: solution.solution_id.clone(),
            fitted_solution_id,
            result_uri: canonical_uri,
            progress: Progress::Completed,
            created_at: Utc::now(),
            predicted_key: SolutionResult::predicted_key(target, &solution.solution_id),
            error_key: SolutionResult::error_key(target, &solution.solution_id),
        };
        let result_id_for_event = result.result_id.clone();
        solution.result = Some(result);
        solution.progress = Progress::Completed;
        self.persist_and_publish_solution_with_result(solution.clone(), result_id_for_event);
        Ok(())
    }

    fn force_error_incomplete_solutions(&self, request_id: &str, cause: ErrorKind) {
        for mut solution in self.solutions.for_request(request_id) {
            if matches!(solution.progress, Progress::Pending | Progress::Running) {
                solution.progress = Progress::Errored;
                self.persist_and_publish_solution_with_error(solution, cause);
            }
        }
    }

    fn transition_request(&self, request: &mut Request, progress: Progress, error: Option<ErrorKind>) {
        request.progress = progress;
        request.last_updated_at = Utc::now();
        self.persist_and_publish_request_with_error(request.clone(), error);
    }

    fn persist_and_publish_request(&self, request: Request) {
        self.persist_and_publish_request_with_error(request, None);
    }

    fn persist_and_publish_request_with_error(&self, request: Request, error: Option<ErrorKind>) {
        let event = ProgressEvent::for_request(request.request_id.clone(), request.progress, error);
        self.requests.upsert(request);
        self.progress.publish_request(event);
    }

    fn persist_and_publish_solution(&self, solution: Solution) {
        self.persist_and_publish_solution_with_error(solution, None);
    }

    fn persist_and_publish_solution_with_error(&self, solution: Solution, error: Option<ErrorKind>) {
        let event = ProgressEvent::for_solution(solution.request_id.clone(), solution.solution_id.clone(), solution.progress, None, error);
        self.solutions.upsert(solution);
        self.progress.publish_solution(event);
    }

    fn persist_and_publish_solution_with_result(&self, solution: Solution, result_id: String) {
        let event =
            ProgressEvent::for_solution(solution.request_id.clone(), solution.solution_id.clone(), solution.progress, Some(result_id), None);
        self.solutions.upsert(solution);
        self.progress.publish_solution(event);
    }
}
