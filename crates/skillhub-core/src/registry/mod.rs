//! Skill registry: validated, immutable-per-version skill storage.

pub mod discovery;

use crate::error::ProtocolError;
use crate::models::{skill::TIMEOUT_RANGE, Skill, SkillLanguage, UsageStats};
use crate::schema;
use crate::storage::Storage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// A registration request as it arrives at the boundary. The code is
/// base64; the language is a raw string so the unsupported-language case is
/// a protocol validation error rather than a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSkill {
    pub skill_id: String,
    pub skill_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub version: String,
    pub language: String,
    /// Base64-encoded source.
    pub code: String,
    #[serde(default)]
    pub dependencies: Option<Vec<String>>,
    #[serde(default)]
    pub input_schema: Option<Value>,
    #[serde(default)]
    pub output_schema: Option<Value>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

fn default_timeout() -> u64 {
    30
}

pub struct SkillRegistry {
    storage: Arc<Storage>,
}

impl SkillRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Validate and persist a new skill version. Metadata and blob land in
    /// one transaction; a duplicate `(skill_id, version)` is rejected even
    /// when the submitted code differs.
    pub fn register(&self, request: RegisterSkill) -> Result<Skill, ProtocolError> {
        for (field, value) in [
            ("skill_id", &request.skill_id),
            ("skill_name", &request.skill_name),
            ("version", &request.version),
        ] {
            if value.trim().is_empty() {
                return Err(ProtocolError::ValidationFailed(format!(
                    "{field} must not be empty"
                )));
            }
        }

        let language: SkillLanguage = request
            .language
            .parse()
            .map_err(ProtocolError::ValidationFailed)?;

        semver::Version::parse(&request.version).map_err(|e| {
            ProtocolError::ValidationFailed(format!(
                "version {:?} is not a semantic version: {e}",
                request.version
            ))
        })?;

        if !TIMEOUT_RANGE.contains(&request.timeout_seconds) {
            return Err(ProtocolError::ValidationFailed(format!(
                "timeout_seconds must be within {}..={}, got {}",
                TIMEOUT_RANGE.start(),
                TIMEOUT_RANGE.end(),
                request.timeout_seconds
            )));
        }

        let code = STANDARD
            .decode(request.code.as_bytes())
            .map_err(|e| ProtocolError::InvalidCode(format!("base64 decode failed: {e}")))?;
        if code.is_empty() {
            return Err(ProtocolError::InvalidCode(
                "decoded code is empty".to_string(),
            ));
        }

        for (name, doc) in [
            ("input_schema", &request.input_schema),
            ("output_schema", &request.output_schema),
        ] {
            if let Some(doc) = doc {
                schema::check_schema(doc).map_err(|e| {
                    ProtocolError::ValidationFailed(format!("{name} is not a valid schema: {e}"))
                })?;
            }
        }

        let now = chrono::Utc::now().timestamp_millis();
        let skill = Skill {
            skill_id: request.skill_id,
            skill_name: request.skill_name,
            description: request.description,
            version: request.version,
            language,
            timeout_seconds: request.timeout_seconds,
            dependencies: request.dependencies,
            input_schema: request.input_schema,
            output_schema: request.output_schema,
            author: request.author,
            license: request.license,
            category: request.category,
            stats: UsageStats::default(),
            created_at: now,
            updated_at: now,
        };

        let inserted = self
            .storage
            .skills
            .insert_new(&skill, &code)
            .map_err(|e| ProtocolError::RegistryInternal(e.to_string()))?;

        if !inserted {
            warn!(skill_id = %skill.skill_id, version = %skill.version, "Duplicate registration rejected");
            return Err(ProtocolError::DuplicateSkill(format!(
                "{}@{}",
                skill.skill_id, skill.version
            )));
        }

        info!(skill_id = %skill.skill_id, version = %skill.version, language = %skill.language, "Skill registered");
        Ok(skill)
    }

    /// Fetch a skill: exact version when given, latest semver otherwise.
    pub fn get(&self, skill_id: &str, version: Option<&str>) -> Result<Skill, ProtocolError> {
        let found = match version {
            Some(version) => self.storage.skills.get_exact(skill_id, version),
            None => self.storage.skills.get_latest(skill_id),
        }
        .map_err(|e| ProtocolError::RegistryInternal(e.to_string()))?;

        found.ok_or_else(|| ProtocolError::SkillNotFound(skill_id.to_string()))
    }

    /// Code blob for a resolved skill.
    pub fn get_code(&self, skill: &Skill) -> Result<Vec<u8>, ProtocolError> {
        self.storage
            .skills
            .get_blob(&skill.skill_id, &skill.version)
            .map_err(|e| ProtocolError::RegistryInternal(e.to_string()))?
            .ok_or_else(|| ProtocolError::SkillNotFound(skill.skill_id.clone()))
    }

    /// Remove all versions of a skill. Succeeds whether or not anything
    /// existed; deletes after the first are no-ops.
    pub fn delete(&self, skill_id: &str) -> Result<(), ProtocolError> {
        let removed = self
            .storage
            .skills
            .delete_all(skill_id)
            .map_err(|e| ProtocolError::RegistryInternal(e.to_string()))?;

        if removed > 0 {
            info!(skill_id, versions = removed, "Skill deleted");
        }
        Ok(())
    }

    /// Paginated metadata search.
    pub fn discover(
        &self,
        query: &discovery::DiscoveryQuery,
    ) -> Result<discovery::DiscoveryPage, ProtocolError> {
        discovery::search(&self.storage, query)
    }

    /// Bump usage counters after a terminal invocation.
    pub fn record_invocation(&self, skill_id: &str, version: &str, success: bool) {
        if let Err(e) = self.storage.skills.record_invocation(skill_id, version, success) {
            warn!(skill_id, version, error = %e, "Failed to update usage stats");
        }
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }
}
