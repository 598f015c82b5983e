//! Discovery handler.

use crate::api::response::ApiError;
use crate::api::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use skillhub_core::registry::discovery::{DiscoveryQuery, SortKey, DEFAULT_PAGE_SIZE};

#[derive(Debug, Deserialize)]
pub struct DiscoveryParams {
    pub q: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub author: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub sort: SortKey,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// GET /skill/discovery
pub async fn discover_skills(
    State(state): State<AppState>,
    Query(params): Query<DiscoveryParams>,
) -> Result<Json<Value>, ApiError> {
    let query = DiscoveryQuery {
        q: params.q,
        category: params.category,
        language: params.language,
        author: params.author,
        page: params.page,
        page_size: params.page_size,
        sort: params.sort,
    };

    let page = state.core.registry.discover(&query)?;

    Ok(Json(json!({
        "status": "success",
        "skills": page.skills,
        "total": page.total,
        "total_pages": page.total_pages,
        "page": query.page.max(1),
        "page_size": query.page_size,
    })))
}
