//! Protocol error taxonomy.
//!
//! Every fallible protocol operation surfaces one of these variants. The
//! stable `SKILL_*` codes and kind strings are part of the wire contract;
//! the HTTP status lives here too so the server maps responses from one
//! table. Internal variants deliberately carry only a message, never a
//! source chain, so nothing leaks across the boundary.

use crate::models::ExecutionError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProtocolError {
    // Registration
    #[error("skill already exists: {0}")]
    DuplicateSkill(String),
    #[error("skill validation failed: {0}")]
    ValidationFailed(String),
    #[error("skill code is invalid: {0}")]
    InvalidCode(String),
    #[error("registry error: {0}")]
    RegistryInternal(String),

    // Invocation
    #[error("skill not found: {0}")]
    SkillNotFound(String),
    #[error("inputs rejected by schema: {0}")]
    InvalidInputs(String),
    #[error("execution timed out after {0}s")]
    ExecutionTimeout(u64),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("outputs rejected by schema: {0}")]
    OutputSchemaViolation(String),
    #[error("execution refused: worker pool saturated")]
    Overloaded,
    #[error("execution cancelled")]
    Cancelled,
    #[error("execution not found: {0}")]
    ExecutionNotFound(String),
    #[error("scheduler error: {0}")]
    InvocationInternal(String),

    // Orchestration
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),
    #[error("workflow contains a cycle: {0}")]
    CyclicWorkflow(String),
    #[error("orchestrator error: {0}")]
    OrchestrationInternal(String),
}

impl ProtocolError {
    /// Stable protocol code.
    pub fn code(&self) -> &'static str {
        use ProtocolError::*;
        match self {
            DuplicateSkill(_) => "SKILL_REG_001",
            ValidationFailed(_) => "SKILL_REG_002",
            InvalidCode(_) => "SKILL_REG_003",
            RegistryInternal(_) => "SKILL_REG_999",
            SkillNotFound(_) | ExecutionNotFound(_) => "SKILL_INV_001",
            InvalidInputs(_) => "SKILL_INV_002",
            ExecutionTimeout(_) => "SKILL_INV_003",
            ExecutionFailed(_) | OutputSchemaViolation(_) | Overloaded | Cancelled => {
                "SKILL_INV_004"
            }
            InvocationInternal(_) => "SKILL_INV_999",
            InvalidWorkflow(_) => "SKILL_ORC_001",
            CyclicWorkflow(_) => "SKILL_ORC_002",
            OrchestrationInternal(_) => "SKILL_ORC_999",
        }
    }

    /// Stable kind string.
    pub fn kind(&self) -> &'static str {
        use ProtocolError::*;
        match self {
            DuplicateSkill(_) => "duplicate_skill",
            ValidationFailed(_) => "validation_failed",
            InvalidCode(_) => "invalid_code",
            SkillNotFound(_) => "skill_not_found",
            ExecutionNotFound(_) => "execution_not_found",
            InvalidInputs(_) => "invalid_inputs",
            ExecutionTimeout(_) => "execution_timeout",
            ExecutionFailed(_) => "execution_failed",
            OutputSchemaViolation(_) => "output_schema_violation",
            Overloaded => "overloaded",
            Cancelled => "cancelled",
            InvalidWorkflow(_) => "invalid_workflow",
            CyclicWorkflow(_) => "cyclic_workflow",
            RegistryInternal(_) | InvocationInternal(_) | OrchestrationInternal(_) => {
                "internal_error"
            }
        }
    }

    /// HTTP status for the code table.
    pub fn http_status(&self) -> u16 {
        use ProtocolError::*;
        match self {
            DuplicateSkill(_) => 409,
            ValidationFailed(_) | InvalidInputs(_) | InvalidWorkflow(_) => 422,
            InvalidCode(_) | CyclicWorkflow(_) => 400,
            SkillNotFound(_) | ExecutionNotFound(_) => 404,
            ExecutionTimeout(_) => 504,
            _ => 500,
        }
    }

    /// Detail string carried in the error body.
    pub fn details(&self) -> String {
        self.to_string()
    }

    /// The execution-record form of this error.
    pub fn as_execution_error(&self) -> ExecutionError {
        ExecutionError {
            code: self.code().to_string(),
            kind: self.kind().to_string(),
            details: self.details(),
        }
    }
}
