//! Workflow orchestration handler.

use crate::api::response::{status_for_code, ApiError};
use crate::api::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use skillhub_core::{Workflow, WorkflowRunState};

/// POST /skill/orchestrate
///
/// Validation problems (unknown endpoints, cycles, forward references)
/// surface as protocol errors. A node failure returns the failing node's
/// error together with the partial results of everything that completed.
pub async fn orchestrate(
    State(state): State<AppState>,
    Json(workflow): Json<Workflow>,
) -> Result<Response, ApiError> {
    let run = state.core.orchestrator.execute(workflow).await?;

    match run.state {
        WorkflowRunState::Failed => {
            let error = run.error.clone();
            let status = error
                .as_ref()
                .map(|e| status_for_code(&e.code))
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

            Ok((
                status,
                Json(json!({
                    "status": "error",
                    "execution_id": run.execution_id,
                    "failed_node": run.failed_node,
                    "results": run.results,
                    "execution_time": run.elapsed_seconds(),
                    "message": error.as_ref().map(|e| e.kind.clone()),
                    "error": error.map(|e| json!({"code": e.code, "details": e.details})),
                })),
            )
                .into_response())
        }
        _ => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "execution_id": run.execution_id,
                "results": run.results,
                "execution_time": run.elapsed_seconds(),
                "message": "workflow completed",
            })),
        )
            .into_response()),
    }
}
