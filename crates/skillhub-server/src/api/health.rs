//! Liveness and backend snapshot.

use crate::api::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub dependencies: HashMap<&'static str, &'static str>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let storage_ok = state.core.storage.ping();

    let mut dependencies = HashMap::new();
    dependencies.insert("storage", if storage_ok { "ok" } else { "error" });
    dependencies.insert("sandbox", "ok");

    Json(HealthResponse {
        status: if storage_ok { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
        dependencies,
    })
}

#[derive(Serialize)]
pub struct RootResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        name: "skillhub",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}
