pub mod execution;
pub mod skill;
pub mod workflow;

pub use execution::{ExecutionError, ExecutionRecord, ExecutionState};
pub use skill::{Skill, SkillLanguage, SkillSummary, UsageStats};
pub use workflow::{Edge, Workflow, WorkflowNode, WorkflowRun, WorkflowRunState};
