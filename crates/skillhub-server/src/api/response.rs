//! Response envelope and protocol error mapping.
//!
//! Every body carries a top-level `status` of `"success"` or `"error"`;
//! errors add `message` and `error.{code, details}`. Stack traces never
//! cross this boundary — `ProtocolError` already strips them.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use skillhub_core::ProtocolError;

/// A protocol error leaving through HTTP.
#[derive(Debug)]
pub struct ApiError(pub ProtocolError);

impl From<ProtocolError> for ApiError {
    fn from(error: ProtocolError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "status": "error",
            "message": self.0.kind(),
            "error": {
                "code": self.0.code(),
                "details": self.0.details(),
            }
        }));
        (status, body).into_response()
    }
}

/// HTTP status for a stored execution error code (used when a terminal
/// record or failed workflow run is translated into a response).
pub fn status_for_code(code: &str) -> StatusCode {
    match code {
        "SKILL_REG_001" => StatusCode::CONFLICT,
        "SKILL_REG_002" | "SKILL_INV_002" | "SKILL_ORC_001" => StatusCode::UNPROCESSABLE_ENTITY,
        "SKILL_REG_003" | "SKILL_ORC_002" => StatusCode::BAD_REQUEST,
        "SKILL_INV_001" => StatusCode::NOT_FOUND,
        "SKILL_INV_003" => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_table_round_trips_through_status_for_code() {
        assert_eq!(status_for_code("SKILL_INV_003"), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for_code("SKILL_ORC_002"), StatusCode::BAD_REQUEST);
        assert_eq!(status_for_code("SKILL_INV_999"), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for_code("SKILL_INV_001"), StatusCode::NOT_FOUND);
    }
}
