//! Skill registration, detail and deletion handlers.

use crate::api::response::ApiError;
use crate::api::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use skillhub_core::registry::RegisterSkill;
use skillhub_core::Skill;

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub status: &'static str,
    pub skill_id: String,
    pub version: String,
    pub registration_time: String,
    pub message: &'static str,
}

/// POST /skill/register
pub async fn register_skill(
    State(state): State<AppState>,
    Json(payload): Json<RegisterSkill>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let skill = state.core.registry.register(payload)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            status: "success",
            skill_id: skill.skill_id,
            version: skill.version,
            registration_time: rfc3339(skill.created_at),
            message: "skill registered",
        }),
    ))
}

#[derive(Deserialize)]
pub struct DetailQuery {
    pub version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SkillDetailResponse {
    pub status: &'static str,
    pub skill: Skill,
    pub success_rate: f64,
}

/// GET /skill/{skill_id}
pub async fn get_skill(
    State(state): State<AppState>,
    Path(skill_id): Path<String>,
    Query(query): Query<DetailQuery>,
) -> Result<Json<SkillDetailResponse>, ApiError> {
    let skill = state
        .core
        .registry
        .get(&skill_id, query.version.as_deref())?;

    Ok(Json(SkillDetailResponse {
        status: "success",
        success_rate: skill.stats.success_rate(),
        skill,
    }))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
    pub message: String,
}

/// DELETE /skill/{skill_id} — succeeds whether or not the skill existed.
pub async fn delete_skill(
    State(state): State<AppState>,
    Path(skill_id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.core.registry.delete(&skill_id)?;

    Ok(Json(DeleteResponse {
        status: "success",
        message: format!("skill {skill_id} deleted"),
    }))
}

pub(crate) fn rfc3339(timestamp_millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_millis)
        .unwrap_or_default()
        .to_rfc3339()
}
