//! `GET/POST /distil/variables/:ds`

use axum::extract::{Path, State};
use axum::Json;

use crate::protocol::rest::dto::{ApiResponse, SetVariableTypeDto, VariableListDto};
use crate::protocol::rest::error::RestError;
use crate::protocol::AppState;

pub async fn list_variables(
    State(state): State<AppState>,
    Path(dataset_id): Path<String>,
) -> Result<Json<ApiResponse<VariableListDto>>, RestError> {
    let variables = state.metadata.list_variables(&dataset_id).await?;
    Ok(Json(ApiResponse::success(VariableListDto { variables })))
}

pub async fn set_variable_type(
    State(state): State<AppState>,
    Path(dataset_id): Path<String>,
    Json(body): Json<SetVariableTypeDto>,
) -> Result<Json<ApiResponse<()>>, RestError> {
    state.metadata.set_type(&dataset_id, &body.variable_key, body.semantic_type).await?;
    Ok(Json(ApiResponse::success(())))
}
