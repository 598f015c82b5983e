//! Workflow definition and run models.

use crate::models::{ExecutionError, ExecutionRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Reserved node name resolving to the workflow's global inputs in
/// placeholder references (`${workflow.field}`).
pub const GLOBAL_INPUTS_NODE: &str = "workflow";

/// One node of a workflow: a skill invocation with an inputs template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub node_id: String,
    pub skill_id: String,
    /// Inputs template; `${node}` / `${node.field}` placeholders are
    /// substituted from upstream results before invocation.
    #[serde(default = "empty_object")]
    pub inputs: Value,
}

/// Directed dependency edge between two node ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// A DAG of skill invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_id: String,
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default = "empty_object")]
    pub global_inputs: Value,
    /// Whole-workflow wall-clock budget, seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunState {
    Running,
    Completed,
    Failed,
}

/// The orchestrator-owned record of one workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub execution_id: String,
    pub workflow_id: String,
    pub state: WorkflowRunState,
    /// Results of completed nodes, keyed by node id. On failure this holds
    /// the partial results gathered before the first failing node.
    pub results: HashMap<String, Value>,
    /// Child execution ids, keyed by node id, for status drill-down.
    pub node_executions: HashMap<String, String>,
    /// Failing node id and its error, set iff `state == Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl WorkflowRun {
    pub fn new(workflow_id: String) -> Self {
        Self {
            execution_id: format!("exec_wf_{}", Uuid::new_v4().simple()),
            workflow_id,
            state: WorkflowRunState::Running,
            results: HashMap::new(),
            node_executions: HashMap::new(),
            failed_node: None,
            error: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            completed_at: None,
        }
    }

    pub fn record_node(&mut self, node_id: &str, record: &ExecutionRecord) {
        self.node_executions
            .insert(node_id.to_string(), record.execution_id.clone());
    }

    pub fn complete(&mut self) {
        self.state = WorkflowRunState::Completed;
        self.completed_at = Some(chrono::Utc::now().timestamp_millis());
    }

    pub fn fail(&mut self, node_id: String, error: ExecutionError) {
        self.state = WorkflowRunState::Failed;
        self.failed_node = Some(node_id);
        self.error = Some(error);
        self.completed_at = Some(chrono::Utc::now().timestamp_millis());
    }

    pub fn elapsed_seconds(&self) -> Option<f64> {
        self.completed_at
            .map(|end| (end - self.created_at).max(0) as f64 / 1000.0)
    }
}
