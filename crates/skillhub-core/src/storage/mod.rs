pub mod skill;

use anyhow::Result;
use redb::Database;
use std::sync::Arc;

pub use skill::SkillStore;

/// Persistent state shared by the registry and discovery.
///
/// One redb database holds skill metadata, code blobs, and usage counters.
/// Execution records are deliberately absent: async execution state is
/// process-local and dies with the process.
pub struct Storage {
    db: Arc<Database>,
    pub skills: SkillStore,
}

impl Storage {
    pub fn new(path: &str) -> Result<Self> {
        let db = Arc::new(Database::create(path)?);
        let skills = SkillStore::new(db.clone())?;
        Ok(Self { db, skills })
    }

    /// Cheap connectivity probe for the health endpoint.
    pub fn ping(&self) -> bool {
        self.db.begin_read().is_ok()
    }
}
