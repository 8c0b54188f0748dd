//! HTTP API Data Transfer Objects
//!
//! Request/response shapes for the `/distil/*` surface. Handlers deserialize
//! into these, call into C2/C3/C6, and serialize the result back out; no
//! business logic lives here.

use serde::{Deserialize, Serialize};

use crate::engine::SolutionRequestSpec;
use crate::model::{Dataset, FilterParams, SemanticType, Variable};

/// JSON envelope: `{ success, data?, error? }`, matching
/// [`crate::protocol::rest::error::RestError`]'s own shape.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { success: true, data: Some(data) }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct DatasetListDto {
    pub datasets: Vec<Dataset>,
}

#[derive(Debug, Deserialize)]
pub struct SetVariableTypeDto {
    pub variable_key: String,
    pub semantic_type: SemanticType,
}

#[derive(Debug, Serialize)]
pub struct VariableListDto {
    pub variables: Vec<Variable>,
}

#[derive(Debug, Serialize)]
pub struct RowsDto {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Body for `POST /distil/solutions` (spec §6 names this via the `/ws`
/// `CREATE_SOLUTIONS` command; this mirrors the same shape over plain HTTP
/// for callers that do not want a websocket).
#[derive(Debug, Deserialize)]
pub struct SolutionRequestDto {
    pub dataset_id: String,
    pub target: String,
    pub task: crate::model::Task,
    pub sub_task: String,
    pub metrics: Vec<String>,
    pub max_solutions: u32,
    pub max_time_seconds: u64,
    pub filters: FilterParams,
}

impl From<SolutionRequestDto> for SolutionRequestSpec {
    fn from(dto: SolutionRequestDto) -> Self {
        SolutionRequestSpec {
            dataset_id: dto.dataset_id,
            target: dto.target,
            task: dto.task,
            sub_task: dto.sub_task,
            metrics: dto.metrics,
            max_solutions: dto.max_solutions,
            max_time_seconds: dto.max_time_seconds,
            filters: dto.filters,
        }
    }
}

/// Websocket command envelope (spec §6): `{type, request_id?, payload}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum WsCommand {
    #[serde(rename = "CREATE_SOLUTIONS")]
    CreateSolutions { payload: SolutionRequestDto },
    #[serde(rename = "STOP_SOLUTION")]
    StopSolution { payload: StopSolutionPayload },
    #[serde(rename = "GET_SESSION")]
    GetSession,
}

#[derive(Debug, Deserialize)]
pub struct StopSolutionPayload {
    pub request_id: String,
}

/// Websocket server push envelope (spec §6): `{type, request_id?,
/// solution_id?, progress, result_id?, error?, timestamp}`.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum WsPush {
    #[serde(rename = "PROGRESS")]
    Progress(crate::progress::ProgressEvent),
    #[serde(rename = "ACK")]
    Ack { request_id: String },
    #[serde(rename = "ERROR")]
    Error { message: String },
}
