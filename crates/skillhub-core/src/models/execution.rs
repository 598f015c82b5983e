//! Execution records.
//!
//! One record per invocation, owned by the scheduler. State transitions
//! follow `pending -> running -> {completed, failed, timed_out, cancelled}`
//! and terminal states are sticky; the transition methods enforce this so
//! no call site can rewind a record.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed
                | ExecutionState::Failed
                | ExecutionState::TimedOut
                | ExecutionState::Cancelled
        )
    }
}

/// Structured failure carried by a terminal record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionError {
    pub code: String,
    pub kind: String,
    pub details: String,
}

/// One invocation of one skill version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub skill_id: String,
    /// Version resolved at scheduling time.
    pub skill_version: String,
    pub state: ExecutionState,
    /// Snapshot of the inputs the execution ran against.
    pub inputs: Value,
    /// Set iff `state == Completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Set iff the record is terminal and not `Completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    /// Milliseconds since epoch.
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl ExecutionRecord {
    pub fn new(skill_id: String, skill_version: String, inputs: Value) -> Self {
        Self {
            execution_id: format!("exec_{}", Uuid::new_v4().simple()),
            skill_id,
            skill_version,
            state: ExecutionState::Pending,
            inputs,
            result: None,
            error: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Pending -> Running. No-op on any other state.
    pub fn start(&mut self) {
        if self.state == ExecutionState::Pending {
            self.state = ExecutionState::Running;
            self.started_at = Some(chrono::Utc::now().timestamp_millis());
        }
    }

    /// Running -> Completed with a result. No-op once terminal.
    pub fn complete(&mut self, result: Value) {
        if self.state.is_terminal() {
            return;
        }
        self.state = ExecutionState::Completed;
        self.result = Some(result);
        self.completed_at = Some(chrono::Utc::now().timestamp_millis());
    }

    /// Running -> one of the terminal failure states. No-op once terminal.
    /// A record cancelled while still queued passes through `Running` so
    /// its state sequence stays on the machine's single path.
    pub fn finish_with(&mut self, state: ExecutionState, error: ExecutionError) {
        debug_assert!(state.is_terminal() && state != ExecutionState::Completed);
        if self.state.is_terminal() {
            return;
        }
        if self.state == ExecutionState::Pending {
            self.start();
        }
        self.state = state;
        self.error = Some(error);
        self.completed_at = Some(chrono::Utc::now().timestamp_millis());
    }

    /// Wall-clock seconds between start and completion, if both happened.
    pub fn elapsed_seconds(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).max(0) as f64 / 1000.0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fault(kind: &str) -> ExecutionError {
        ExecutionError {
            code: "SKILL_INV_004".into(),
            kind: kind.into(),
            details: "test".into(),
        }
    }

    #[test]
    fn fresh_record_is_pending_with_exec_prefix() {
        let record = ExecutionRecord::new("s".into(), "1.0.0".into(), json!({}));
        assert_eq!(record.state, ExecutionState::Pending);
        assert!(record.execution_id.starts_with("exec_"));
        assert!(record.result.is_none());
        assert!(record.error.is_none());
    }

    #[test]
    fn happy_path_transitions() {
        let mut record = ExecutionRecord::new("s".into(), "1.0.0".into(), json!({}));
        record.start();
        assert_eq!(record.state, ExecutionState::Running);
        assert!(record.started_at.is_some());

        record.complete(json!({"result": 25}));
        assert_eq!(record.state, ExecutionState::Completed);
        assert_eq!(record.result, Some(json!({"result": 25})));
        assert!(record.elapsed_seconds().is_some());
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut record = ExecutionRecord::new("s".into(), "1.0.0".into(), json!({}));
        record.start();
        record.finish_with(ExecutionState::TimedOut, fault("timed_out"));
        assert_eq!(record.state, ExecutionState::TimedOut);

        record.complete(json!({"late": true}));
        assert_eq!(record.state, ExecutionState::TimedOut);
        assert!(record.result.is_none());

        record.finish_with(ExecutionState::Failed, fault("execution_failed"));
        assert_eq!(record.state, ExecutionState::TimedOut);
    }

    #[test]
    fn start_does_not_resurrect_terminal_records() {
        let mut record = ExecutionRecord::new("s".into(), "1.0.0".into(), json!({}));
        record.start();
        record.finish_with(ExecutionState::Cancelled, fault("cancelled"));
        record.start();
        assert_eq!(record.state, ExecutionState::Cancelled);
    }

    #[test]
    fn result_and_error_are_mutually_exclusive() {
        let mut ok = ExecutionRecord::new("s".into(), "1.0.0".into(), json!({}));
        ok.start();
        ok.complete(json!(1));
        assert!(ok.result.is_some() && ok.error.is_none());

        let mut bad = ExecutionRecord::new("s".into(), "1.0.0".into(), json!({}));
        bad.start();
        bad.finish_with(ExecutionState::Failed, fault("execution_failed"));
        assert!(bad.result.is_none() && bad.error.is_some());
    }
}
