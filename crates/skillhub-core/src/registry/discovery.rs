//! Discovery: paginated search over skill metadata.
//!
//! A linear scan over the metadata store, which is also the contractual
//! fallback when no external search backend is configured. Each skill
//! appears once, represented by its latest version.

use crate::error::ProtocolError;
use crate::models::{Skill, SkillSummary};
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Lexicographic ascending on `skill_name`.
    Name,
    /// Newest first.
    #[default]
    Date,
    /// Most invoked first.
    Popularity,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryQuery {
    /// Free text; every whitespace token must match name or description.
    pub q: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub author: Option<String>,
    /// 1-indexed.
    pub page: usize,
    pub page_size: usize,
    pub sort: SortKey,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryPage {
    pub skills: Vec<SkillSummary>,
    pub total: usize,
    pub total_pages: usize,
}

pub fn search(storage: &Storage, query: &DiscoveryQuery) -> Result<DiscoveryPage, ProtocolError> {
    let page = query.page.max(1);
    let page_size = if query.page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        query.page_size.min(MAX_PAGE_SIZE)
    };

    let all = storage
        .skills
        .list_all()
        .map_err(|e| ProtocolError::RegistryInternal(e.to_string()))?;

    let mut matched: Vec<Skill> = latest_per_skill(all)
        .into_iter()
        .filter(|skill| matches(skill, query))
        .collect();

    match query.sort {
        SortKey::Name => matched.sort_by(|a, b| a.skill_name.cmp(&b.skill_name)),
        SortKey::Date => matched.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortKey::Popularity => matched.sort_by(|a, b| b.stats.popularity.cmp(&a.stats.popularity)),
    }

    let total = matched.len();
    let total_pages = total.div_ceil(page_size);
    let skills = matched
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .map(|skill| skill.summary())
        .collect();

    Ok(DiscoveryPage {
        skills,
        total,
        total_pages,
    })
}

/// Collapse versions down to the newest per skill id.
fn latest_per_skill(all: Vec<Skill>) -> Vec<Skill> {
    let mut latest: HashMap<String, Skill> = HashMap::new();
    for skill in all {
        match latest.get(&skill.skill_id) {
            Some(existing) if existing.parsed_version() >= skill.parsed_version() => {}
            _ => {
                latest.insert(skill.skill_id.clone(), skill);
            }
        }
    }
    latest.into_values().collect()
}

fn matches(skill: &Skill, query: &DiscoveryQuery) -> bool {
    if let Some(category) = &query.category {
        if skill.category.as_deref() != Some(category.as_str()) {
            return false;
        }
    }
    if let Some(language) = &query.language {
        if skill.language.to_string() != *language {
            return false;
        }
    }
    if let Some(author) = &query.author {
        if skill.author.as_deref() != Some(author.as_str()) {
            return false;
        }
    }
    if let Some(q) = &query.q {
        let haystack = format!(
            "{} {}",
            skill.skill_name,
            skill.description.as_deref().unwrap_or_default()
        )
        .to_lowercase();
        for token in q.split_whitespace() {
            if !haystack.contains(&token.to_lowercase()) {
                return false;
            }
        }
    }
    true
}
