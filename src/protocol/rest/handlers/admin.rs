//! `GET /distil/abort`, `GET /distil/export/:solution-id`.

use axum::extract::{Path, State};
use axum::Json;

use crate::protocol::rest::dto::{ApiResponse, HealthDto};
use crate::protocol::rest::error::RestError;
use crate::protocol::AppState;

pub async fn health() -> Json<ApiResponse<HealthDto>> {
    Json(ApiResponse::success(HealthDto {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

pub async fn abort(State(state): State<AppState>) -> Json<ApiResponse<()>> {
    state.shutdown.notify_waiters();
    Json(ApiResponse::success(()))
}

/// Writes the solution's fitted-solution id to `<scratch>/export/<solution-id>.txt`
/// then trips the same shutdown signal as `/distil/abort` (spec §6).
pub async fn export(
    State(state): State<AppState>,
    Path(solution_id): Path<String>,
) -> Result<Json<ApiResponse<()>>, RestError> {
    let solution = state
        .engine
        .get_solution(&solution_id)
        .ok_or_else(|| RestError::not_found(format!("no solution '{solution_id}'")))?;
    let fitted_solution_id = solution
        .fitted_solution_id
        .ok_or_else(|| RestError::bad_request(format!("solution '{solution_id}' has no fitted solution yet")))?;

    let export_dir = state.scratch.base_path.join("export");
    tokio::fs::create_dir_all(&export_dir)
        .await
        .map_err(|e| RestError::internal(format!("failed to create export directory: {e}")))?;
    let export_path = export_dir.join(format!("{solution_id}.txt"));
    tokio::fs::write(&export_path, fitted_solution_id)
        .await
        .map_err(|e| RestError::internal(format!("failed to write export file: {e}")))?;

    state.shutdown.notify_waiters();
    Ok(Json(ApiResponse::success(())))
}
