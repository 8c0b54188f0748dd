//! Shared test doubles for the black-box scenario tests (spec §8's S1-S6).
//!
//! `ScriptedComputeBackend`/`ScriptedSession` implement the `ComputeBackend`/
//! `SearchSession` seam from `compute::mod` with no networking at all, and
//! `InMemoryStoreGateway` implements `DataStoreGateway` over plain
//! `Vec`/`HashMap` state instead of Postgres. Every scenario file builds its
//! own dataset fixture and wires these into a real `SolutionRequestEngine`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinSet;

use distil_orchestrator::catalog::InMemoryCatalogue;
use distil_orchestrator::compute::{ComputeBackend, SearchSession, SearchSpec, SolutionHandler};
use distil_orchestrator::config::ScratchConfig;
use distil_orchestrator::engine::SolutionRequestEngine;
use distil_orchestrator::error::{OrchestrationError, OrchestrationResult};
use distil_orchestrator::execution::CancelHandle;
use distil_orchestrator::filter::{compile_result_filter, result_filter_target, split_result_filters, to_column_selection};
use distil_orchestrator::ingest;
use distil_orchestrator::model::{Dataset, Filter, FilterMode, FilterParams, Variable};
use distil_orchestrator::progress::ProgressBus;
use distil_orchestrator::storage::{Bucket, DataStoreGateway, EqualityFilter, Extrema, FilteredData, Histogram, StorageError, StorageResult};
use serde_json::Value;

/// A `SearchSession` driven by a pre-scripted list of solution ids rather
/// than a live stream. `hang_after_exhausted` models a search that is still
/// open on the runtime side (needed to give S3's cancellation a window to
/// land before the session would otherwise end cleanly).
pub struct ScriptedSession {
    search_id: String,
    solutions: Mutex<std::vec::IntoIter<String>>,
    emit_delay: Duration,
    hang_after_exhausted: bool,
}

impl ScriptedSession {
    pub fn new(search_id: impl Into<String>, solutions: Vec<String>, emit_delay: Duration, hang_after_exhausted: bool) -> Self {
        ScriptedSession {
            search_id: search_id.into(),
            solutions: Mutex::new(solutions.into_iter()),
            emit_delay,
            hang_after_exhausted,
        }
    }
}

#[async_trait]
impl SearchSession for ScriptedSession {
    fn search_id(&self) -> &str {
        &self.search_id
    }

    async fn get_search_solutions(&mut self, cancel: &CancelHandle, mut handler: SolutionHandler) -> (OrchestrationResult<()>, JoinSet<()>) {
        let mut tasks = JoinSet::new();
        loop {
            if cancel.is_cancelled() {
                return (Err(OrchestrationError::Cancelled), tasks);
            }
            let next = self.solutions.lock().next();
            match next {
                Some(solution_id) => {
                    tasks.spawn(handler(solution_id));
                    if !self.emit_delay.is_zero() {
                        tokio::time::sleep(self.emit_delay).await;
                    }
                }
                None => {
                    if !self.hang_after_exhausted {
                        return (Ok(()), tasks);
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// A `ComputeBackend` that hands out a [`ScriptedSession`] and answers
/// score/fit/produce with canned values, writing each produced CSV to its
/// own scratch directory so `SolutionRequestEngine::run_solution` can
/// ingest it exactly as it would a real runtime's output file.
pub struct ScriptedComputeBackend {
    search_id: String,
    solution_ids: Vec<String>,
    emit_delay: Duration,
    hang_after_exhausted: bool,
    metric_name: String,
    score_value: f64,
    produced_csv: HashMap<String, String>,
    default_csv: String,
    output_dir: tempfile::TempDir,
    pub stop_called: Arc<AtomicBool>,
    pub end_called: Arc<AtomicBool>,
}

impl ScriptedComputeBackend {
    pub fn new(search_id: impl Into<String>, solution_ids: Vec<String>, metric_name: impl Into<String>, score_value: f64, default_csv: impl Into<String>) -> Self {
        ScriptedComputeBackend {
            search_id: search_id.into(),
            solution_ids,
            emit_delay: Duration::ZERO,
            hang_after_exhausted: false,
            metric_name: metric_name.into(),
            score_value,
            produced_csv: HashMap::new(),
            default_csv: default_csv.into(),
            output_dir: tempfile::tempdir().expect("tempdir"),
            stop_called: Arc::new(AtomicBool::new(false)),
            end_called: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_emit_delay(mut self, delay: Duration) -> Self {
        self.emit_delay = delay;
        self
    }

    pub fn hang_after_exhausted(mut self) -> Self {
        self.hang_after_exhausted = true;
        self
    }

    pub fn with_produced_csv(mut self, solution_id: impl Into<String>, csv: impl Into<String>) -> Self {
        self.produced_csv.insert(solution_id.into(), csv.into());
        self
    }
}

#[async_trait]
impl ComputeBackend for ScriptedComputeBackend {
    async fn start_search(&self, _spec: SearchSpec) -> OrchestrationResult<Box<dyn SearchSession>> {
        Ok(Box::new(ScriptedSession::new(self.search_id.clone(), self.solution_ids.clone(), self.emit_delay, self.hang_after_exhausted)))
    }

    async fn stop_search(&self, _search_id: &str) -> OrchestrationResult<()> {
        self.stop_called.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn end_search(&self, _search_id: &str) -> OrchestrationResult<()> {
        self.end_called.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn score_solution(&self, _solution_id: &str, metrics: Vec<String>, _cancel: &CancelHandle) -> OrchestrationResult<Vec<HashMap<String, f64>>> {
        let mut scores = HashMap::new();
        for metric in metrics {
            let value = if metric == self.metric_name { self.score_value } else { self.score_value };
            scores.insert(metric, value);
        }
        Ok(vec![scores])
    }

    async fn fit_solution(&self, solution_id: &str, _cancel: &CancelHandle) -> OrchestrationResult<String> {
        Ok(format!("{solution_id}-fitted"))
    }

    async fn produce_solution(&self, fitted_solution_id: &str, _inputs_uri: &str, _cancel: &CancelHandle) -> OrchestrationResult<String> {
        let solution_id = fitted_solution_id.strip_suffix("-fitted").unwrap_or(fitted_solution_id);
        let content = self.produced_csv.get(solution_id).cloned().unwrap_or_else(|| self.default_csv.clone());
        let path = self.output_dir.path().join(format!("{solution_id}.csv"));
        tokio::fs::write(&path, content).await.map_err(|e| OrchestrationError::TransportError(e.to_string()))?;
        Ok(format!("file://{}", path.display()))
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn numeric_filter_matches(filter: &Filter, value: f64) -> bool {
    match filter {
        Filter::Numerical { mode, min, max, .. } => match mode {
            FilterMode::Include => value >= *min && value <= *max,
            FilterMode::Exclude => value < *min || value > *max,
        },
        _ => true,
    }
}

fn text_filter_matches(filter: &Filter, value: &str) -> bool {
    match filter {
        Filter::Categorical { mode, category, .. } => {
            let hit = category.iter().any(|c| c == value);
            match mode {
                FilterMode::Include => hit,
                FilterMode::Exclude => !hit,
            }
        }
        _ => true,
    }
}

/// Evaluates the conjunction of every generic filter against one row, the
/// in-memory stand-in for `crate::filter::compile_where`'s compiled SQL.
fn row_matches_filters(row: &HashMap<String, Value>, index_key: &str, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match filter {
        Filter::Categorical { key, mode, category } => {
            let value = row.get(key).map(value_to_text).unwrap_or_default();
            let hit = category.iter().any(|c| c == &value);
            match mode {
                FilterMode::Include => hit,
                FilterMode::Exclude => !hit,
            }
        }
        Filter::Numerical { key, mode, min, max } => {
            let Some(value) = row.get(key).and_then(value_as_f64) else { return false };
            match mode {
                FilterMode::Include => value >= *min && value <= *max,
                FilterMode::Exclude => value < *min || value > *max,
            }
        }
        Filter::Row { mode, indices } => {
            let Some(index) = row.get(index_key).and_then(Value::as_i64) else { return false };
            let hit = indices.contains(&index);
            match mode {
                FilterMode::Include => hit,
                FilterMode::Exclude => !hit,
            }
        }
        Filter::Feature { key, mode, category } => {
            let value = row.get(key).map(value_to_text).unwrap_or_default().to_lowercase();
            let hit = category.iter().any(|c| c.to_lowercase() == value);
            match mode {
                FilterMode::Include => hit,
                FilterMode::Exclude => !hit,
            }
        }
        Filter::Text { key, mode, substring } => {
            let value = row.get(key).map(value_to_text).unwrap_or_default();
            let hit = substring.iter().any(|s| value.contains(s.as_str()));
            match mode {
                FilterMode::Include => hit,
                FilterMode::Exclude => !hit,
            }
        }
        Filter::Bivariate { .. } => true,
    })
}

/// `DataStoreGateway` over plain in-process state: a fixed row set plus a
/// `result_id -> ResultRow` map populated by `persist_result`, mirroring
/// `PostgresGateway`'s `<storage_name>`/`<storage_name>_result` split without
/// a database.
pub struct InMemoryStoreGateway {
    rows: Vec<HashMap<String, Value>>,
    index_key: String,
    results: Mutex<HashMap<String, Vec<ingest::ResultRow>>>,
}

impl InMemoryStoreGateway {
    pub fn new(index_key: impl Into<String>, rows: Vec<HashMap<String, Value>>) -> Self {
        InMemoryStoreGateway { rows, index_key: index_key.into(), results: Mutex::new(HashMap::new()) }
    }

    /// Rows persisted under `result_id`, for assertions that don't go
    /// through a `fetch_*` query (e.g. S4's exact `ResultRow` check).
    pub fn result_rows(&self, result_id: &str) -> Vec<ingest::ResultRow> {
        self.results.lock().get(result_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl DataStoreGateway for InMemoryStoreGateway {
    async fn fetch_rows(&self, dataset: &Dataset, filter_params: &FilterParams, invert: bool) -> StorageResult<FilteredData> {
        let columns = if filter_params.variables.is_empty() {
            to_column_selection(&filter_params.filters, dataset)
        } else {
            filter_params.variables.clone()
        };
        if invert && filter_params.filters.is_empty() {
            return Ok(FilteredData { columns, rows: Vec::new() });
        }
        let mut rows: Vec<Vec<Value>> = Vec::new();
        for row in &self.rows {
            let is_match = row_matches_filters(row, &self.index_key, &filter_params.filters);
            let keep = if invert { !is_match } else { is_match };
            if !keep {
                continue;
            }
            rows.push(columns.iter().map(|c| row.get(c).cloned().unwrap_or(Value::Null)).collect());
        }
        rows.truncate(filter_params.size);
        Ok(FilteredData { columns, rows })
    }

    async fn fetch_num_rows(&self, _table: &str, equality_filters: &[EqualityFilter]) -> StorageResult<i64> {
        let count = self
            .rows
            .iter()
            .filter(|row| {
                equality_filters.iter().all(|f| match (row.get(&f.column), &f.value) {
                    (Some(v), distil_orchestrator::filter::SqlParam::Text(s)) => value_to_text(v) == *s,
                    (Some(v), distil_orchestrator::filter::SqlParam::Float(n)) => value_as_f64(v) == Some(*n),
                    (Some(v), distil_orchestrator::filter::SqlParam::Int(n)) => v.as_i64() == Some(*n),
                    (None, _) => false,
                })
            })
            .count();
        Ok(count as i64)
    }

    async fn fetch_variable_summary(
        &self,
        _dataset: &Dataset,
        variable: &Variable,
        _filter_params: &FilterParams,
        _result_uri: Option<&str>,
    ) -> StorageResult<Histogram> {
        if variable.semantic_type.is_numeric() {
            let values: Vec<f64> = self.rows.iter().filter_map(|r| r.get(&variable.key).and_then(value_as_f64)).collect();
            numeric_histogram(&values)
        } else {
            let mut counts: HashMap<String, u64> = HashMap::new();
            for row in &self.rows {
                if let Some(v) = row.get(&variable.key) {
                    *counts.entry(value_to_text(v)).or_insert(0) += 1;
                }
            }
            Ok(Histogram::Categorical { buckets: named_counts(counts) })
        }
    }

    async fn fetch_extrema(&self, _dataset: &Dataset, variable: &Variable, _result_uri: Option<&str>) -> StorageResult<Extrema> {
        let values: Vec<f64> = self.rows.iter().filter_map(|r| r.get(&variable.key).and_then(value_as_f64)).collect();
        if values.is_empty() {
            return Err(StorageError::NoData);
        }
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Ok(Extrema { min, max })
    }

    async fn persist_result(&self, _dataset: &Dataset, result_uri: &str, result_id: &str) -> StorageResult<u64> {
        let parsed = ingest::parse_result_csv(result_uri).await?;
        let mut results = self.results.lock();
        let entry = results.entry(result_id.to_string()).or_default();
        let mut inserted = 0u64;
        for row in parsed.rows {
            if !entry.iter().any(|existing| existing.row_index == row.row_index) {
                entry.push(row);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn fetch_results(&self, dataset: &Dataset, result_id: &str, filter_params: &FilterParams) -> StorageResult<FilteredData> {
        let split = split_result_filters(&filter_params.filters).map_err(|e| StorageError::Other(e.to_string()))?;
        let generic: Vec<Filter> = split.generic.into_iter().cloned().collect();
        let columns = if filter_params.variables.is_empty() {
            to_column_selection(&generic, dataset)
        } else {
            filter_params.variables.clone()
        };
        let result_rows = self.results.lock().get(result_id).cloned().unwrap_or_default();

        let mut out_rows = Vec::new();
        for row in &self.rows {
            let Some(index) = row.get(&self.index_key).and_then(Value::as_i64) else { continue };
            if !row_matches_filters(row, &self.index_key, &generic) {
                continue;
            }
            let Some(result_row) = result_rows.iter().find(|r| r.row_index == index) else { continue };

            if let Some(filter) = split.residual {
                let target_key = result_filter_target(filter).unwrap_or_default();
                let truth = row.get(target_key).and_then(value_as_f64).unwrap_or(0.0);
                let predicted: f64 = result_row.value.parse().unwrap_or(0.0);
                if !numeric_filter_matches(filter, predicted - truth) {
                    continue;
                }
            }
            if let Some(filter) = split.predicted {
                if !text_filter_matches(filter, &result_row.value) {
                    continue;
                }
            }
            if let Some(filter) = split.correctness {
                let target_key = result_filter_target(filter).unwrap_or_default();
                let truth_text = row.get(target_key).map(value_to_text).unwrap_or_default();
                let correctness = if result_row.value == truth_text { "correct" } else { "incorrect" };
                if !text_filter_matches(filter, correctness) {
                    continue;
                }
            }

            let mut record: Vec<Value> = columns.iter().map(|c| row.get(c).cloned().unwrap_or(Value::Null)).collect();
            record.push(Value::String(result_row.value.clone()));
            out_rows.push(record);
        }
        let mut out_columns = columns;
        out_columns.push("value".to_string());
        Ok(FilteredData { columns: out_columns, rows: out_rows })
    }

    async fn fetch_predicted_summary(&self, _dataset: &Dataset, target: &Variable, result_id: &str, _filter_params: &FilterParams) -> StorageResult<Histogram> {
        let result_rows = self.results.lock().get(result_id).cloned().unwrap_or_default();
        if target.semantic_type.is_numeric() {
            let values: Vec<f64> = result_rows.iter().filter_map(|r| r.value.parse().ok()).collect();
            numeric_histogram(&values)
        } else {
            let mut counts: HashMap<String, u64> = HashMap::new();
            for row in &result_rows {
                *counts.entry(row.value.clone()).or_insert(0) += 1;
            }
            Ok(Histogram::Categorical { buckets: named_counts(counts) })
        }
    }

    async fn fetch_residual_summary(&self, dataset: &Dataset, target: &Variable, result_id: &str, _filter_params: &FilterParams) -> StorageResult<Histogram> {
        let result_rows = self.results.lock().get(result_id).cloned().unwrap_or_default();
        let index_key = self.index_key.clone();
        let values: Vec<f64> = result_rows
            .iter()
            .filter_map(|r| {
                let truth = self.rows.iter().find(|row| row.get(&index_key).and_then(Value::as_i64) == Some(r.row_index))?.get(&target.key).and_then(value_as_f64)?;
                let predicted: f64 = r.value.parse().ok()?;
                Some(predicted - truth)
            })
            .collect();
        let _ = dataset;
        numeric_histogram(&values)
    }

    async fn fetch_correctness_summary(&self, _dataset: &Dataset, target: &Variable, result_id: &str, _filter_params: &FilterParams) -> StorageResult<Histogram> {
        let result_rows = self.results.lock().get(result_id).cloned().unwrap_or_default();
        let mut correct = 0u64;
        let mut incorrect = 0u64;
        for r in &result_rows {
            let truth = self
                .rows
                .iter()
                .find(|row| row.get(&self.index_key).and_then(Value::as_i64) == Some(r.row_index))
                .and_then(|row| row.get(&target.key))
                .map(value_to_text)
                .unwrap_or_default();
            if r.value == truth {
                correct += 1;
            } else {
                incorrect += 1;
            }
        }
        Ok(Histogram::Categorical { buckets: vec![Bucket { key: "correct".to_string(), count: correct }, Bucket { key: "incorrect".to_string(), count: incorrect }] })
    }
}

fn named_counts(counts: HashMap<String, u64>) -> Vec<Bucket> {
    let mut buckets: Vec<Bucket> = counts.into_iter().map(|(key, count)| Bucket { key, count }).collect();
    buckets.sort_by(|a, b| b.count.cmp(&a.count).then(a.key.cmp(&b.key)));
    buckets
}

fn numeric_histogram(values: &[f64]) -> StorageResult<Histogram> {
    if values.is_empty() {
        return Ok(Histogram::Empty);
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return Ok(Histogram::Numerical { buckets: vec![Bucket { key: min.to_string(), count: 0 }], interval: 0.0, min, max });
    }
    let interval = distil_orchestrator::storage::snap_interval(min, max);
    let (bucket_min, bucket_max, count) = distil_orchestrator::storage::bucket_domain(min, max, interval);
    let mut buckets = vec![0u64; count as usize];
    for value in values {
        let idx = (((value - bucket_min) / interval).floor() as i64).clamp(0, count as i64 - 1) as usize;
        buckets[idx] += 1;
    }
    let named = buckets.into_iter().enumerate().map(|(i, count)| Bucket { key: format!("{}", bucket_min + interval * i as f64), count }).collect();
    Ok(Histogram::Numerical { buckets: named, interval, min: bucket_min, max: bucket_max })
}

/// Builds a fully-wired engine over an in-memory catalogue/store/compute
/// trio for one test's dataset and compute backend, with a tempdir-backed
/// scratch directory (kept alive by the returned guard).
pub fn build_engine(dataset: Dataset, compute: Arc<dyn ComputeBackend>, store: Arc<InMemoryStoreGateway>) -> (Arc<SolutionRequestEngine>, Arc<ProgressBus>, tempfile::TempDir, Arc<InMemoryStoreGateway>) {
    let catalogue: Arc<dyn distil_orchestrator::catalog::MetadataGateway> = Arc::new(InMemoryCatalogue::new(vec![dataset]));
    let progress = Arc::new(ProgressBus::new());
    let scratch_dir = tempfile::tempdir().expect("tempdir");
    let scratch = ScratchConfig { base_path: scratch_dir.path().to_path_buf(), skip_preprocessing: true };
    let engine = Arc::new(SolutionRequestEngine::new(catalogue, store.clone(), compute, progress.clone(), scratch, Duration::from_millis(200)));
    (engine, progress, scratch_dir, store)
}

/// Polls `get_request` until its progress matches `target` or `attempts`
/// polls elapse, for scenarios that need to observe an intermediate state
/// (S3's `running`) before acting.
pub async fn wait_for_request_progress(engine: &SolutionRequestEngine, request_id: &str, target: distil_orchestrator::model::Progress, attempts: u32) -> bool {
    for _ in 0..attempts {
        if let Some(request) = engine.get_request(request_id) {
            if request.progress == target {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Polls until `get_request`'s progress is terminal (`completed`/`errored`).
pub async fn wait_for_request_terminal(engine: &SolutionRequestEngine, request_id: &str, attempts: u32) -> Option<distil_orchestrator::model::Request> {
    for _ in 0..attempts {
        if let Some(request) = engine.get_request(request_id) {
            if matches!(request.progress, distil_orchestrator::model::Progress::Completed | distil_orchestrator::model::Progress::Errored) {
                return Some(request);
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    engine.get_request(request_id)
}

/// Builds an index + a handful of user-visible data variables; enough shape
/// for every scenario's dataset fixture.
pub fn index_variable(key: &str) -> Variable {
    Variable {
        key: key.to_string(),
        display_label: key.to_string(),
        semantic_type: distil_orchestrator::model::SemanticType::Integer,
        importance: 0.0,
        role: distil_orchestrator::model::VariableRole::Index,
    }
}

pub fn data_variable(key: &str, semantic_type: distil_orchestrator::model::SemanticType) -> Variable {
    Variable { key: key.to_string(), display_label: key.to_string(), semantic_type, importance: 1.0, role: distil_orchestrator::model::VariableRole::Data }
}
