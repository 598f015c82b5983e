//! SkillHub core: skill registry, schema validation, invocation scheduling
//! and DAG orchestration.
//!
//! Skills, blobs and usage stats persist in redb; execution records are
//! process-local. If the server restarts, in-flight asynchronous
//! executions are forgotten — callers relying on `status` must treat an
//! unknown execution id after a restart as lost.

pub mod engine;
pub mod error;
pub mod models;
pub mod registry;
pub mod schema;
pub mod storage;

pub use error::ProtocolError;
pub use models::*;

use engine::{Orchestrator, Scheduler, SchedulerConfig};
use registry::SkillRegistry;
use skillhub_sandbox::{ProcessSandbox, SandboxHost};
use std::sync::Arc;
use storage::Storage;
use tracing::info;

/// Core application state shared by every server surface.
pub struct AppCore {
    pub storage: Arc<Storage>,
    pub registry: Arc<SkillRegistry>,
    pub scheduler: Arc<Scheduler>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppCore {
    /// Production wiring: redb at `db_path`, subprocess sandbox.
    pub fn new(db_path: &str, config: SchedulerConfig) -> anyhow::Result<Self> {
        Self::with_sandbox(db_path, config, Arc::new(ProcessSandbox::new()))
    }

    /// Wiring with an explicit sandbox host; tests use in-process stubs.
    pub fn with_sandbox(
        db_path: &str,
        config: SchedulerConfig,
        sandbox: Arc<dyn SandboxHost>,
    ) -> anyhow::Result<Self> {
        let storage = Arc::new(Storage::new(db_path)?);
        let registry = Arc::new(SkillRegistry::new(storage.clone()));
        let scheduler = Arc::new(Scheduler::new(registry.clone(), sandbox, config.clone()));
        let orchestrator = Arc::new(Orchestrator::new(scheduler.clone()));

        info!(
            max_concurrent = config.max_concurrent,
            "Initializing SkillHub core"
        );

        Ok(Self {
            storage,
            registry,
            scheduler,
            orchestrator,
        })
    }
}
