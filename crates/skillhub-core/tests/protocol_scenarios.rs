//! End-to-end scenarios against `AppCore` with an in-process sandbox stub,
//! so they run without any guest interpreter installed. The stub dispatches
//! on the registered code body the way the real runtime dispatches on the
//! staged skill file.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use skillhub_core::engine::{InvokeReply, SchedulerConfig};
use skillhub_core::registry::RegisterSkill;
use skillhub_core::{AppCore, Edge, ExecutionState, Workflow, WorkflowNode, WorkflowRunState};
use skillhub_sandbox::{GuestFailure, GuestLanguage, ResourceCaps, SandboxHost};
use std::sync::Arc;
use std::time::Duration;

struct InterpreterStub;

#[async_trait]
impl SandboxHost for InterpreterStub {
    async fn launch(
        &self,
        _language: GuestLanguage,
        blob: &[u8],
        input: &Value,
        caps: &ResourceCaps,
    ) -> Result<Value, GuestFailure> {
        let code = String::from_utf8_lossy(blob);

        if code.contains("time.sleep") {
            tokio::time::sleep(Duration::from_secs(caps.max_wall_seconds)).await;
            return Err(GuestFailure::TimedOut(caps.max_wall_seconds));
        }

        if code.contains("a + b") {
            let a = input.get("a").and_then(Value::as_i64).unwrap_or(0);
            let b = input.get("b").and_then(Value::as_i64).unwrap_or(0);
            return Ok(json!({"result": a + b}));
        }

        if code.contains("** 2") {
            let value = input.get("value").and_then(Value::as_i64).unwrap_or(0);
            return Ok(json!({"result": value * value}));
        }

        Err(GuestFailure::ExecutionFailed {
            traceback: "unknown test skill".into(),
        })
    }
}

fn app() -> (AppCore, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let core = AppCore::with_sandbox(
        tmp.path().join("test.db").to_str().unwrap(),
        SchedulerConfig::default(),
        Arc::new(InterpreterStub),
    )
    .unwrap();
    (core, tmp)
}

fn register(core: &AppCore, skill_id: &str, code: &str, input_schema: Option<Value>, timeout: u64) {
    core.registry
        .register(RegisterSkill {
            skill_id: skill_id.into(),
            skill_name: skill_id.into(),
            description: None,
            version: "1.0.0".into(),
            language: "python".into(),
            code: STANDARD.encode(code),
            dependencies: None,
            input_schema,
            output_schema: None,
            timeout_seconds: timeout,
            author: None,
            license: None,
            category: None,
        })
        .unwrap();
}

const SQUARE: &str = "def execute(i):\n    return {\"result\": i[\"value\"] ** 2}\n";
const ADD: &str = "def execute(i):\n    return {\"result\": i[\"a\"] + i[\"b\"]}\n";
const SLEEPER: &str = "import time\n\ndef execute(i):\n    time.sleep(10)\n    return {}\n";

// S1: register skill_square, invoke {"value": 5} sync -> {"result": 25}.
#[tokio::test]
async fn s1_square_invocation_completes() {
    let (core, _tmp) = app();
    register(&core, "skill_square", SQUARE, None, 30);

    let reply = core
        .scheduler
        .invoke("skill_square", json!({"value": 5}), None, false)
        .await
        .unwrap();

    let InvokeReply::Completed(record) = reply else {
        panic!("sync invoke must return a terminal record");
    };
    assert_eq!(record.state, ExecutionState::Completed);
    assert_eq!(record.result, Some(json!({"result": 25})));
}

// S2: input schema requires "value"; invoking {} is SKILL_INV_002.
#[tokio::test]
async fn s2_missing_required_input_is_rejected() {
    let (core, _tmp) = app();
    register(
        &core,
        "skill_square",
        SQUARE,
        Some(json!({"type": "object", "required": ["value"]})),
        30,
    );

    let err = core
        .scheduler
        .invoke("skill_square", json!({}), None, false)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SKILL_INV_002");
    assert_eq!(err.http_status(), 422);
}

// S3: a sleeping skill with timeout=2 times out within ~2.5s.
#[tokio::test]
async fn s3_sleeping_skill_times_out_promptly() {
    let (core, _tmp) = app();
    register(&core, "skill_sleeper", SLEEPER, None, 2);

    let started = std::time::Instant::now();
    let reply = core
        .scheduler
        .invoke("skill_sleeper", json!({}), None, false)
        .await
        .unwrap();

    let InvokeReply::Completed(record) = reply else {
        panic!("sync invoke must return a terminal record");
    };
    assert_eq!(record.state, ExecutionState::TimedOut);
    let error = record.error.unwrap();
    assert_eq!(error.code, "SKILL_INV_003");
    assert!(
        started.elapsed() < Duration::from_millis(3500),
        "timeout detection took {:?}",
        started.elapsed()
    );
}

// S4: node1, node2 -> node3 with ${...} references; node3 adds 25 + 9.
#[tokio::test]
async fn s4_workflow_fan_in_adds_upstream_results() {
    let (core, _tmp) = app();
    register(&core, "skill_square", SQUARE, None, 30);
    register(&core, "skill_add", ADD, None, 30);

    let wf = Workflow {
        workflow_id: "wf_s4".into(),
        nodes: vec![
            WorkflowNode {
                node_id: "node1".into(),
                skill_id: "skill_square".into(),
                inputs: json!({"value": 5}),
            },
            WorkflowNode {
                node_id: "node2".into(),
                skill_id: "skill_square".into(),
                inputs: json!({"value": 3}),
            },
            WorkflowNode {
                node_id: "node3".into(),
                skill_id: "skill_add".into(),
                inputs: json!({"a": "${node1.result}", "b": "${node2.result}"}),
            },
        ],
        edges: vec![
            Edge {
                from: "node1".into(),
                to: "node3".into(),
            },
            Edge {
                from: "node2".into(),
                to: "node3".into(),
            },
        ],
        global_inputs: json!({}),
        timeout_seconds: Some(60),
    };

    let run = core.orchestrator.execute(wf).await.unwrap();
    assert_eq!(run.state, WorkflowRunState::Completed);
    assert_eq!(run.results["node3"], json!({"result": 34}));
}

// S5: edges A->B and B->A are a cycle, SKILL_ORC_002.
#[tokio::test]
async fn s5_cyclic_workflow_is_rejected() {
    let (core, _tmp) = app();
    register(&core, "skill_square", SQUARE, None, 30);

    let wf = Workflow {
        workflow_id: "wf_s5".into(),
        nodes: vec![
            WorkflowNode {
                node_id: "A".into(),
                skill_id: "skill_square".into(),
                inputs: json!({}),
            },
            WorkflowNode {
                node_id: "B".into(),
                skill_id: "skill_square".into(),
                inputs: json!({}),
            },
        ],
        edges: vec![
            Edge {
                from: "A".into(),
                to: "B".into(),
            },
            Edge {
                from: "B".into(),
                to: "A".into(),
            },
        ],
        global_inputs: json!({}),
        timeout_seconds: None,
    };

    let err = core.orchestrator.execute(wf).await.unwrap_err();
    assert_eq!(err.code(), "SKILL_ORC_002");
    assert_eq!(err.http_status(), 400);
}

// S6: invoking a skill that was never registered is SKILL_INV_001.
#[tokio::test]
async fn s6_unknown_skill_is_not_found() {
    let (core, _tmp) = app();

    let err = core
        .scheduler
        .invoke("skill_foo", json!({}), None, false)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SKILL_INV_001");
    assert_eq!(err.http_status(), 404);
}

// Round-trip law: sync invoke then immediate status returns the same
// terminal record.
#[tokio::test]
async fn invoke_then_status_round_trips() {
    let (core, _tmp) = app();
    register(&core, "skill_square", SQUARE, None, 30);

    let reply = core
        .scheduler
        .invoke("skill_square", json!({"value": 4}), None, false)
        .await
        .unwrap();
    let InvokeReply::Completed(record) = reply else {
        panic!("sync invoke must return a terminal record");
    };

    let status = core.scheduler.status(&record.execution_id).unwrap();
    assert_eq!(status.state, record.state);
    assert_eq!(status.result, record.result);
    assert_eq!(status.completed_at, record.completed_at);
}

// Deletion: in-flight state is unaffected, new invocations 404.
#[tokio::test]
async fn delete_blocks_new_invocations() {
    let (core, _tmp) = app();
    register(&core, "skill_square", SQUARE, None, 30);

    core.registry.delete("skill_square").unwrap();
    let err = core
        .scheduler
        .invoke("skill_square", json!({"value": 2}), None, false)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SKILL_INV_001");
}
