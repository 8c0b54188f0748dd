//! Data Store Gateway (C2)
//!
//! Typed access to the relational store. Modelled as a narrow capability
//! interface so the orchestration core stays agnostic to the concrete
//! backend (Postgres here; re-architecture note in DESIGN.md covers the
//! teacher source's dynamic-dispatch-over-backends pattern this replaces).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::filter::SqlParam;
use crate::model::{Dataset, FilterParams, Variable};
use crate::storage::error::StorageResult;
use crate::storage::histogram::Histogram;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilteredData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Extrema {
    pub min: f64,
    pub max: f64,
}

/// An equality predicate used by `fetch_num_rows`: `column = value`.
#[derive(Debug, Clone)]
pub struct EqualityFilter {
    pub column: String,
    pub value: SqlParam,
}

#[async_trait]
pub trait DataStoreGateway: Send + Sync {
    /// Rows deterministically ordered by the index column. When `invert` is
    /// set and `filter_params.filters` is empty, returns an empty set (not
    /// the complement of the universe).
    async fn fetch_rows(
        &self,
        dataset: &Dataset,
        filter_params: &FilterParams,
        invert: bool,
    ) -> StorageResult<FilteredData>;

    async fn fetch_num_rows(&self, table: &str, equality_filters: &[EqualityFilter]) -> StorageResult<i64>;

    /// Branches on `variable.semantic_type`: numerical variables use the
    /// bucket-interval algorithm; categorical/ordinal/boolean variables use
    /// a top-10 `GROUP BY`.
    async fn fetch_variable_summary(
        &self,
        dataset: &Dataset,
        variable: &Variable,
        filter_params: &FilterParams,
        result_uri: Option<&str>,
    ) -> StorageResult<Histogram>;

    /// Errors with `StorageError::NoData` when both aggregates are null.
    async fn fetch_extrema(
        &self,
        dataset: &Dataset,
        variable: &Variable,
        result_uri: Option<&str>,
    ) -> StorageResult<Extrema>;

    /// Parses `result_uri`'s produced CSV (delegating to the result
    /// ingestor) and inserts rows into `<storage_name>_result`. Idempotent
    /// per `result_id`: re-running with the same id must not duplicate rows.
    async fn persist_result(&self, dataset: &Dataset, result_uri: &str, result_id: &str) -> StorageResult<u64>;

    /// Joins `<storage_name>` to `<storage_name>_result` on the index
    /// column; generic filters apply to the data side, result-derived
    /// filters (predicted/residual/correctness) to the joined side.
    async fn fetch_results(
        &self,
        dataset: &Dataset,
        result_id: &str,
        filter_params: &FilterParams,
    ) -> StorageResult<FilteredData>;

    /// Histogram over the joined result's predicted value for `target`
    /// (categorical top-N if `target` is non-numeric, bucketed if numeric).
    async fn fetch_predicted_summary(
        &self,
        dataset: &Dataset,
        target: &Variable,
        result_id: &str,
        filter_params: &FilterParams,
    ) -> StorageResult<Histogram>;

    /// Histogram over `cast(value AS double) - cast(truth AS double)`;
    /// `target` must be numeric (spec §4.2).
    async fn fetch_residual_summary(
        &self,
        dataset: &Dataset,
        target: &Variable,
        result_id: &str,
        filter_params: &FilterParams,
    ) -> StorageResult<Histogram>;

    /// Exactly two buckets, `correct`/`incorrect`, computed directly from the
    /// join — no intermediate correctness column is materialised.
    async fn fetch_correctness_summary(
        &self,
        dataset: &Dataset,
        target: &Variable,
        result_id: &str,
        filter_params: &FilterParams,
    ) -> StorageResult<Histogram>;
}
