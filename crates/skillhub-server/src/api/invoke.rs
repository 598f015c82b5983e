//! Invocation and execution-status handlers.

use crate::api::response::{status_for_code, ApiError};
use crate::api::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use skillhub_core::engine::InvokeReply;
use skillhub_core::{ExecutionRecord, ProtocolError};

#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub skill_id: String,
    #[serde(default)]
    pub inputs: Value,
    /// Caller timeout, seconds; the effective deadline is the smaller of
    /// this and the skill's own limit.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub is_async: bool,
}

/// POST /skill/invoke
pub async fn invoke_skill(
    State(state): State<AppState>,
    Json(payload): Json<InvokeRequest>,
) -> Result<Response, ApiError> {
    let reply = state
        .core
        .scheduler
        .invoke(&payload.skill_id, payload.inputs, payload.timeout, payload.is_async)
        .await?;

    match reply {
        InvokeReply::Accepted { execution_id } => {
            let status_url = format!(
                "{}/skill/status/{}",
                state.config.api_prefix, execution_id
            );
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({
                    "status": "pending",
                    "execution_id": execution_id,
                    "status_url": status_url,
                    "message": "execution accepted",
                })),
            )
                .into_response())
        }
        InvokeReply::Completed(record) => Ok(terminal_response(record)),
    }
}

/// A terminal record as a sync response: 200 with the result, or the
/// mapped error status with the record's error.
fn terminal_response(record: ExecutionRecord) -> Response {
    match (&record.result, &record.error) {
        (Some(result), None) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "execution_id": record.execution_id,
                "result": result,
                "execution_time": record.elapsed_seconds(),
            })),
        )
            .into_response(),
        (_, Some(error)) => (
            status_for_code(&error.code),
            Json(json!({
                "status": "error",
                "execution_id": record.execution_id,
                "message": error.kind,
                "execution_time": record.elapsed_seconds(),
                "error": {
                    "code": error.code,
                    "details": error.details,
                }
            })),
        )
            .into_response(),
        _ => ApiError(ProtocolError::InvocationInternal(
            "terminal record carries neither result nor error".into(),
        ))
        .into_response(),
    }
}

/// GET /skill/status/{execution_id}
///
/// `exec_wf_` ids resolve against the orchestrator, plain `exec_` ids
/// against the scheduler.
pub async fn execution_status(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if execution_id.starts_with("exec_wf_") {
        let run = state
            .core
            .orchestrator
            .status(&execution_id)
            .ok_or(ProtocolError::ExecutionNotFound(execution_id))?;
        return Ok(Json(json!({"status": "success", "execution": run})));
    }

    let record = state
        .core
        .scheduler
        .status(&execution_id)
        .ok_or(ProtocolError::ExecutionNotFound(execution_id))?;
    Ok(Json(json!({"status": "success", "execution": record})))
}
