//! C2-backed endpoints: raw/filtered data, variable and result summaries.

use axum::extract::{Path, State};
use axum::Json;

use crate::model::FilterParams;
use crate::protocol::rest::dto::{ApiResponse, RowsDto};
use crate::protocol::rest::error::RestError;
use crate::protocol::AppState;
use crate::storage::histogram::Histogram;

async fn target_variable(
    state: &AppState,
    dataset_id: &str,
    target: &str,
) -> Result<(crate::model::Dataset, crate::model::Variable), RestError> {
    let dataset = state.metadata.get_dataset(dataset_id).await?;
    let variable = dataset
        .variable(target)
        .cloned()
        .ok_or_else(|| RestError::bad_request(format!("unknown variable '{target}' on dataset '{dataset_id}'")))?;
    Ok((dataset, variable))
}

pub async fn variable_summary(
    State(state): State<AppState>,
    Path((dataset_id, variable_key)): Path<(String, String)>,
    Json(filter_params): Json<FilterParams>,
) -> Result<Json<ApiResponse<Histogram>>, RestError> {
    let (dataset, variable) = target_variable(&state, &dataset_id, &variable_key).await?;
    let histogram = state
        .store
        .fetch_variable_summary(&dataset, &variable, &filter_params, None)
        .await?;
    Ok(Json(ApiResponse::success(histogram)))
}

pub async fn fetch_data(
    State(state): State<AppState>,
    Path((dataset_id, invert)): Path<(String, bool)>,
    Json(filter_params): Json<FilterParams>,
) -> Result<Json<ApiResponse<RowsDto>>, RestError> {
    let dataset = state.metadata.get_dataset(&dataset_id).await?;
    let data = state.store.fetch_rows(&dataset, &filter_params, invert).await?;
    Ok(Json(ApiResponse::success(RowsDto { columns: data.columns, rows: data.rows })))
}

pub async fn fetch_results(
    State(state): State<AppState>,
    Path((dataset_id, solution_id)): Path<(String, String)>,
    Json(filter_params): Json<FilterParams>,
) -> Result<Json<ApiResponse<RowsDto>>, RestError> {
    let dataset = state.metadata.get_dataset(&dataset_id).await?;
    let result_id = resolve_result_id(&state, &solution_id)?;
    let data = state.store.fetch_results(&dataset, &result_id, &filter_params).await?;
    Ok(Json(ApiResponse::success(RowsDto { columns: data.columns, rows: data.rows })))
}

pub async fn predicted_summary(
    State(state): State<AppState>,
    Path((dataset_id, target, result_id)): Path<(String, String, String)>,
    Json(filter_params): Json<FilterParams>,
) -> Result<Json<ApiResponse<Histogram>>, RestError> {
    let (dataset, variable) = target_variable(&state, &dataset_id, &target).await?;
    let histogram = state
        .store
        .fetch_predicted_summary(&dataset, &variable, &result_id, &filter_params)
        .await?;
    Ok(Json(ApiResponse::success(histogram)))
}

pub async fn residuals_summary(
    State(state): State<AppState>,
    Path((dataset_id, target, result_id)): Path<(String, String, String)>,
    Json(filter_params): Json<FilterParams>,
) -> Result<Json<ApiResponse<Histogram>>, RestError> {
    let (dataset, variable) = target_variable(&state, &dataset_id, &target).await?;
    if !variable.semantic_type.is_numeric() {
        return Err(RestError::bad_request(format!("residuals require a numeric target, '{target}' is not")));
    }
    let histogram = state
        .store
        .fetch_residual_summary(&dataset, &variable, &result_id, &filter_params)
        .await?;
    Ok(Json(ApiResponse::success(histogram)))
}

pub async fn correctness_summary(
    State(state): State<AppState>,
    Path((dataset_id, result_id)): Path<(String, String)>,
    Json(filter_params): Json<FilterParams>,
) -> Result<Json<ApiResponse<Histogram>>, RestError> {
    let dataset = state.metadata.get_dataset(&dataset_id).await?;
    let target_key = state
        .engine
        .get_solution_by_result_id(&result_id)
        .and_then(|s| s.result)
        .map(|r| r.predicted_key)
        .ok_or_else(|| RestError::not_found(format!("no result for '{result_id}'")))?;
    let variable = dataset
        .variable(&target_key)
        .cloned()
        .ok_or_else(|| RestError::bad_request(format!("unknown variable '{target_key}' on dataset '{dataset_id}'")))?;
    let histogram = state
        .store
        .fetch_correctness_summary(&dataset, &variable, &result_id, &filter_params)
        .await?;
    Ok(Json(ApiResponse::success(histogram)))
}

fn resolve_result_id(state: &AppState, solution_id: &str) -> Result<String, RestError> {
    state
        .engine
        .get_solution(solution_id)
        .and_then(|s| s.result)
        .map(|r| r.result_id)
        .ok_or_else(|| RestError::not_found(format!("no result for solution '{solution_id}'")))
}
