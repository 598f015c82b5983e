//! Skill metadata and blob tables.
//!
//! Metadata and code are keyed identically (`skill_id@version`) and always
//! written in the same transaction, so a skill is either fully registered
//! or absent. Metadata is write-once apart from the usage counters, which
//! are read-modify-written inside a single write transaction.

use crate::models::{skill::storage_key, Skill};
use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use std::sync::Arc;

const SKILLS: TableDefinition<&str, &[u8]> = TableDefinition::new("skills");
const BLOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("skill_blobs");

#[derive(Clone)]
pub struct SkillStore {
    db: Arc<Database>,
}

impl SkillStore {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        // Create tables up front so read transactions never miss them.
        let txn = db.begin_write()?;
        {
            txn.open_table(SKILLS)?;
            txn.open_table(BLOBS)?;
        }
        txn.commit()?;
        Ok(Self { db })
    }

    /// Insert metadata and blob atomically. Returns `false` without writing
    /// anything if the `(skill_id, version)` pair already exists.
    pub fn insert_new(&self, skill: &Skill, code: &[u8]) -> Result<bool> {
        let key = skill.storage_key();
        let data = serde_json::to_vec(skill)?;

        let txn = self.db.begin_write()?;
        {
            let mut skills = txn.open_table(SKILLS)?;
            if skills.get(key.as_str())?.is_some() {
                return Ok(false);
            }
            skills.insert(key.as_str(), data.as_slice())?;

            let mut blobs = txn.open_table(BLOBS)?;
            blobs.insert(key.as_str(), code)?;
        }
        txn.commit()?;
        Ok(true)
    }

    /// Exact `(skill_id, version)` lookup.
    pub fn get_exact(&self, skill_id: &str, version: &str) -> Result<Option<Skill>> {
        let key = storage_key(skill_id, version);
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SKILLS)?;
        match table.get(key.as_str())? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// All registered versions of one skill.
    pub fn versions_of(&self, skill_id: &str) -> Result<Vec<Skill>> {
        let prefix = format!("{skill_id}@");
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SKILLS)?;

        let mut skills = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            if key.value().starts_with(prefix.as_str()) {
                skills.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(skills)
    }

    /// Latest version of a skill by semantic-version ordering.
    pub fn get_latest(&self, skill_id: &str) -> Result<Option<Skill>> {
        let mut versions = self.versions_of(skill_id)?;
        versions.sort_by_cached_key(|s| s.parsed_version());
        Ok(versions.pop())
    }

    /// Every registered skill version.
    pub fn list_all(&self) -> Result<Vec<Skill>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SKILLS)?;

        let mut skills = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            skills.push(serde_json::from_slice(value.value())?);
        }
        Ok(skills)
    }

    /// Code blob for one skill version.
    pub fn get_blob(&self, skill_id: &str, version: &str) -> Result<Option<Vec<u8>>> {
        let key = storage_key(skill_id, version);
        let txn = self.db.begin_read()?;
        let table = txn.open_table(BLOBS)?;
        Ok(table.get(key.as_str())?.map(|guard| guard.value().to_vec()))
    }

    /// Remove every version of a skill, metadata and blobs alike. Returns
    /// the number of versions removed; zero is not an error.
    pub fn delete_all(&self, skill_id: &str) -> Result<usize> {
        let keys: Vec<String> = self
            .versions_of(skill_id)?
            .iter()
            .map(Skill::storage_key)
            .collect();

        let txn = self.db.begin_write()?;
        {
            let mut skills = txn.open_table(SKILLS)?;
            let mut blobs = txn.open_table(BLOBS)?;
            for key in &keys {
                skills.remove(key.as_str())?;
                blobs.remove(key.as_str())?;
            }
        }
        txn.commit()?;
        Ok(keys.len())
    }

    /// Atomically bump the usage counters of one skill version.
    pub fn record_invocation(&self, skill_id: &str, version: &str, success: bool) -> Result<()> {
        let key = storage_key(skill_id, version);
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SKILLS)?;
            let mut skill: Skill = match table.get(key.as_str())? {
                Some(guard) => serde_json::from_slice(guard.value())?,
                // The skill was deleted while an execution was in flight;
                // nothing to count against.
                None => return Ok(()),
            };

            skill.stats.total_calls += 1;
            skill.stats.popularity += 1;
            if success {
                skill.stats.success_count += 1;
            }
            skill.updated_at = chrono::Utc::now().timestamp_millis();

            let data = serde_json::to_vec(&skill).context("re-encode skill stats")?;
            table.insert(key.as_str(), data.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }
}
