//! Skill metadata model.
//!
//! A skill is one immutable `(skill_id, version)` artifact. The code blob
//! lives in the blob store; everything else is carried here. Only the
//! usage counters mutate after registration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use skillhub_sandbox::GuestLanguage;

/// Valid range for a skill's default timeout, in seconds.
pub const TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=600;

/// Source language of a skill artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLanguage {
    Python,
    TypeScript,
    Go,
}

impl SkillLanguage {
    /// The sandbox guest runtime for this language.
    pub fn guest(&self) -> GuestLanguage {
        match self {
            SkillLanguage::Python => GuestLanguage::Python,
            SkillLanguage::TypeScript => GuestLanguage::TypeScript,
            SkillLanguage::Go => GuestLanguage::Go,
        }
    }
}

impl std::fmt::Display for SkillLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkillLanguage::Python => write!(f, "python"),
            SkillLanguage::TypeScript => write!(f, "typescript"),
            SkillLanguage::Go => write!(f, "go"),
        }
    }
}

impl std::str::FromStr for SkillLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(SkillLanguage::Python),
            "typescript" => Ok(SkillLanguage::TypeScript),
            "go" => Ok(SkillLanguage::Go),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// Per-skill usage counters, updated after each terminal invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_calls: u64,
    pub success_count: u64,
    pub popularity: u64,
}

impl UsageStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.success_count as f64 / self.total_calls as f64
        }
    }
}

/// One registered skill version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub skill_id: String,
    pub skill_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Semantic version string; parsed and ordered via `semver`.
    pub version: String,
    pub language: SkillLanguage,
    /// Default wall-clock budget, seconds. Always within [`TIMEOUT_RANGE`].
    pub timeout_seconds: u64,
    /// Language-specific dependency manifest, opaque to the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    /// JSON Schema for inputs; absent or `{}` means permissive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    /// JSON Schema for outputs; absent or `{}` means permissive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub stats: UsageStats,
    /// Milliseconds since epoch.
    pub created_at: i64,
    pub updated_at: i64,
}

impl Skill {
    /// Storage key shared by the metadata and blob tables.
    pub fn storage_key(&self) -> String {
        storage_key(&self.skill_id, &self.version)
    }

    pub fn parsed_version(&self) -> Option<semver::Version> {
        semver::Version::parse(&self.version).ok()
    }

    /// Projection used by discovery listings.
    pub fn summary(&self) -> SkillSummary {
        SkillSummary {
            skill_id: self.skill_id.clone(),
            skill_name: self.skill_name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            language: self.language,
            category: self.category.clone(),
            author: self.author.clone(),
            total_calls: self.stats.total_calls,
            popularity: self.stats.popularity,
            created_at: self.created_at,
        }
    }
}

/// Key under which a `(skill_id, version)` pair is stored.
pub fn storage_key(skill_id: &str, version: &str) -> String {
    format!("{skill_id}@{version}")
}

/// Metadata projection returned by discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillSummary {
    pub skill_id: String,
    pub skill_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: String,
    pub language: SkillLanguage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub total_calls: u64,
    pub popularity: u64,
    pub created_at: i64,
}
