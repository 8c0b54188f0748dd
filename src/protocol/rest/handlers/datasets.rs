//! `GET /distil/datasets`, `GET /distil/datasets/:ds`

use axum::extract::{Path, State};
use axum::Json;

use crate::protocol::rest::dto::{ApiResponse, DatasetListDto};
use crate::protocol::rest::error::RestError;
use crate::protocol::AppState;

pub async fn list_datasets(State(state): State<AppState>) -> Result<Json<ApiResponse<DatasetListDto>>, RestError> {
    let datasets = state.metadata.list_datasets().await?;
    Ok(Json(ApiResponse::success(DatasetListDto { datasets })))
}

pub async fn get_dataset(
    State(state): State<AppState>,
    Path(dataset_id): Path<String>,
) -> Result<Json<ApiResponse<crate::model::Dataset>>, RestError> {
    let dataset = state.metadata.get_dataset(&dataset_id).await?;
    Ok(Json(ApiResponse::success(dataset)))
}
