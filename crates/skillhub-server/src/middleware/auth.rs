//! API-key authentication.
//!
//! Keys arrive in the configured header (default `X-API-Key`) and are held
//! in memory only as SHA-256 digests. Health and the root banner stay
//! public. When auth is disabled, or no keys are configured, requests pass
//! through untouched.

use crate::api::state::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct ApiKeyManager {
    hashes: HashSet<String>,
}

impl ApiKeyManager {
    pub fn from_keys(keys: &[String]) -> Self {
        Self {
            hashes: keys.iter().map(|key| hash_key(key)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn validate(&self, key: &str) -> bool {
        self.hashes.contains(&hash_key(key))
    }
}

fn hash_key(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

pub async fn auth_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let path = req.uri().path();
    if is_public(&state, path) {
        return next.run(req).await;
    }

    if !state.config.auth_required || state.keys.is_empty() {
        return next.run(req).await;
    }

    let presented = req
        .headers()
        .get(state.config.auth_header.as_str())
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(key) if state.keys.validate(key) => next.run(req).await,
        _ => unauthorized(),
    }
}

fn is_public(state: &AppState, path: &str) -> bool {
    path == "/"
        || path == "/health"
        || path == format!("{}/health", state.config.api_prefix)
        || !path.starts_with(state.config.api_prefix.as_str())
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "status": "error",
            "message": "missing or invalid API key"
        })),
    )
        .into_response()
}
