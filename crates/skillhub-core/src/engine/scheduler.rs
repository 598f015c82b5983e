//! Invocation scheduler.
//!
//! Binds an invocation to a concrete skill version, drives it through the
//! sandbox, and tracks it in the execution-record table. The table is
//! process-local by contract: a restart forgets in-flight executions.
//!
//! Admission is a semaphore sized `max_concurrent`. Synchronous calls use
//! `try_acquire` and are refused when the pool is saturated; asynchronous
//! calls park in the semaphore's FIFO, bounded by `max_queue_size`.
//! Records are mutated only here — callers see snapshots.

use crate::error::ProtocolError;
use crate::models::{ExecutionError, ExecutionRecord, ExecutionState, Skill};
use crate::registry::SkillRegistry;
use crate::schema;
use dashmap::DashMap;
use serde_json::{Map, Value};
use skillhub_sandbox::{GuestFailure, ResourceCaps, SandboxHost};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Extra wall-clock slack granted to the sandbox before the scheduler
/// declares a timeout on its own authority.
const DEADLINE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Worker-pool size; also the admission cap.
    pub max_concurrent: usize,
    /// Upper bound on parked asynchronous invocations.
    pub max_queue_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 100,
            max_queue_size: 10_000,
        }
    }
}

/// What `invoke` hands back.
#[derive(Debug)]
pub enum InvokeReply {
    /// Synchronous mode: the terminal record.
    Completed(ExecutionRecord),
    /// Asynchronous mode: the execution was accepted and can be polled.
    Accepted { execution_id: String },
}

/// Cheap-to-clone handle; all state lives behind one Arc so spawned
/// workers share it.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    registry: Arc<SkillRegistry>,
    sandbox: Arc<dyn SandboxHost>,
    records: DashMap<String, ExecutionRecord>,
    cancels: DashMap<String, CancellationToken>,
    permits: Arc<Semaphore>,
    queued: AtomicUsize,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        registry: Arc<SkillRegistry>,
        sandbox: Arc<dyn SandboxHost>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                registry,
                sandbox,
                records: DashMap::new(),
                cancels: DashMap::new(),
                permits: Arc::new(Semaphore::new(config.max_concurrent)),
                queued: AtomicUsize::new(0),
                config,
            }),
        }
    }

    /// Invoke a skill. Resolution, input validation, and admission all
    /// happen before any record exists, so validation failures leave no
    /// trace in the table.
    pub async fn invoke(
        &self,
        skill_id: &str,
        inputs: Value,
        caller_timeout: Option<u64>,
        run_async: bool,
    ) -> Result<InvokeReply, ProtocolError> {
        let (skill, code, inputs, deadline) = self.prepare(skill_id, inputs, caller_timeout)?;

        if run_async {
            if self.inner.queued.load(Ordering::Relaxed) >= self.inner.config.max_queue_size {
                return Err(ProtocolError::Overloaded);
            }

            let record = self.admit(&skill, inputs.clone());
            let execution_id = record.execution_id.clone();
            let token = self.token_for(&execution_id);

            self.inner.queued.fetch_add(1, Ordering::Relaxed);
            let scheduler = self.clone();
            let id = execution_id.clone();
            tokio::spawn(async move {
                let acquired = tokio::select! {
                    acquired = scheduler.inner.permits.clone().acquire_owned() => acquired,
                    _ = token.cancelled() => {
                        scheduler.inner.queued.fetch_sub(1, Ordering::Relaxed);
                        scheduler.finish(
                            &id,
                            ExecutionState::Cancelled,
                            ProtocolError::Cancelled.as_execution_error(),
                        );
                        return;
                    }
                };
                scheduler.inner.queued.fetch_sub(1, Ordering::Relaxed);
                let _permit = acquired.expect("scheduler semaphore closed");
                scheduler
                    .run_one(&id, &skill, &code, inputs, deadline, token)
                    .await;
            });

            Ok(InvokeReply::Accepted { execution_id })
        } else {
            let permit = self
                .inner
                .permits
                .clone()
                .try_acquire_owned()
                .map_err(|_| ProtocolError::Overloaded)?;

            let record = self.admit(&skill, inputs.clone());
            let execution_id = record.execution_id.clone();
            let token = self.token_for(&execution_id);

            self.run_one(&execution_id, &skill, &code, inputs, deadline, token)
                .await;
            drop(permit);

            let record = self
                .status(&execution_id)
                .ok_or_else(|| ProtocolError::InvocationInternal("record vanished".into()))?;
            Ok(InvokeReply::Completed(record))
        }
    }

    /// Execute one workflow node to a terminal record. Children wait for a
    /// permit instead of being refused, and the workflow's remaining budget
    /// caps their deadline on top of the per-skill value.
    pub(crate) async fn invoke_child(
        &self,
        skill_id: &str,
        inputs: Value,
        budget_cap: Option<u64>,
        token: CancellationToken,
    ) -> Result<ExecutionRecord, ProtocolError> {
        let (skill, code, inputs, deadline) = self.prepare(skill_id, inputs, budget_cap)?;

        let record = self.admit(&skill, inputs.clone());
        let execution_id = record.execution_id.clone();
        self.inner
            .cancels
            .insert(execution_id.clone(), token.clone());

        let _permit = tokio::select! {
            acquired = self.inner.permits.clone().acquire_owned() => {
                acquired.map_err(|_| ProtocolError::InvocationInternal("semaphore closed".into()))?
            }
            _ = token.cancelled() => {
                self.finish(
                    &execution_id,
                    ExecutionState::Cancelled,
                    ProtocolError::Cancelled.as_execution_error(),
                );
                return self
                    .status(&execution_id)
                    .ok_or_else(|| ProtocolError::InvocationInternal("record vanished".into()));
            }
        };

        self.run_one(&execution_id, &skill, &code, inputs, deadline, token)
            .await;

        self.status(&execution_id)
            .ok_or_else(|| ProtocolError::InvocationInternal("record vanished".into()))
    }

    /// Point-in-time snapshot of a record.
    pub fn status(&self, execution_id: &str) -> Option<ExecutionRecord> {
        self.inner.records.get(execution_id).map(|r| r.clone())
    }

    /// Request cancellation of an execution. Returns whether a live token
    /// was found; the record turns terminal shortly after.
    pub fn cancel(&self, execution_id: &str) -> bool {
        match self.inner.cancels.get(execution_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Executions currently holding a worker permit.
    pub fn running_count(&self) -> usize {
        self.inner
            .config
            .max_concurrent
            .saturating_sub(self.inner.permits.available_permits())
    }

    // ─── internals ──────────────────────────────────────────────────────

    /// Resolve, validate, and compute the effective deadline.
    fn prepare(
        &self,
        skill_id: &str,
        inputs: Value,
        caller_timeout: Option<u64>,
    ) -> Result<(Skill, Vec<u8>, Value, u64), ProtocolError> {
        let skill = self.inner.registry.get(skill_id, None)?;

        // Null inputs are legal and behave as an empty object.
        let inputs = if inputs.is_null() {
            Value::Object(Map::new())
        } else {
            inputs
        };

        schema::validate(&inputs, skill.input_schema.as_ref())
            .map_err(|violations| ProtocolError::InvalidInputs(schema::describe(&violations)))?;

        let deadline = match caller_timeout {
            Some(caller) => caller.min(skill.timeout_seconds),
            None => skill.timeout_seconds,
        };

        let code = self.inner.registry.get_code(&skill)?;
        Ok((skill, code, inputs, deadline))
    }

    fn admit(&self, skill: &Skill, inputs: Value) -> ExecutionRecord {
        let record = ExecutionRecord::new(skill.skill_id.clone(), skill.version.clone(), inputs);
        self.inner
            .records
            .insert(record.execution_id.clone(), record.clone());
        debug!(execution_id = %record.execution_id, skill_id = %skill.skill_id, "Execution admitted");
        record
    }

    fn token_for(&self, execution_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.inner
            .cancels
            .insert(execution_id.to_string(), token.clone());
        token
    }

    /// Drive one admitted execution to a terminal state. The only writer
    /// of the record from here on.
    async fn run_one(
        &self,
        execution_id: &str,
        skill: &Skill,
        code: &[u8],
        inputs: Value,
        deadline: u64,
        token: CancellationToken,
    ) {
        if let Some(mut record) = self.inner.records.get_mut(execution_id) {
            record.start();
        }

        let caps = ResourceCaps::with_deadline(deadline);
        let launch = self
            .inner
            .sandbox
            .launch(skill.language.guest(), code, &inputs, &caps);

        // The sandbox owns the deadline; the outer timeout is the
        // scheduler's guarantee that a record turns terminal even if a
        // sandbox implementation fails to enforce its cap. Dropping the
        // launch future kills the guest (kill-on-drop).
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!(execution_id, "Execution cancelled");
                self.finish(
                    execution_id,
                    ExecutionState::Cancelled,
                    ProtocolError::Cancelled.as_execution_error(),
                );
                self.settle(skill, false);
                return;
            }
            outcome = tokio::time::timeout(Duration::from_secs(deadline) + DEADLINE_GRACE, launch) => outcome,
        };

        match outcome {
            Err(_elapsed) => {
                warn!(execution_id, deadline, "Sandbox overran its deadline");
                self.finish(
                    execution_id,
                    ExecutionState::TimedOut,
                    ProtocolError::ExecutionTimeout(deadline).as_execution_error(),
                );
                self.settle(skill, false);
            }
            Ok(Err(GuestFailure::TimedOut(secs))) => {
                self.finish(
                    execution_id,
                    ExecutionState::TimedOut,
                    ProtocolError::ExecutionTimeout(secs).as_execution_error(),
                );
                self.settle(skill, false);
            }
            Ok(Err(failure)) => {
                // Sandbox taxonomy survives as the error kind under the
                // invocation failure code.
                self.finish(
                    execution_id,
                    ExecutionState::Failed,
                    ExecutionError {
                        code: "SKILL_INV_004".to_string(),
                        kind: failure.kind().to_string(),
                        details: failure.detail(),
                    },
                );
                self.settle(skill, false);
            }
            Ok(Ok(value)) => match schema::validate(&value, skill.output_schema.as_ref()) {
                Ok(()) => {
                    if let Some(mut record) = self.inner.records.get_mut(execution_id) {
                        record.complete(value);
                    }
                    self.inner.cancels.remove(execution_id);
                    info!(execution_id, skill_id = %skill.skill_id, "Execution completed");
                    self.settle(skill, true);
                }
                Err(violations) => {
                    self.finish(
                        execution_id,
                        ExecutionState::Failed,
                        ProtocolError::OutputSchemaViolation(schema::describe(&violations))
                            .as_execution_error(),
                    );
                    self.settle(skill, false);
                }
            },
        }
    }

    fn finish(&self, execution_id: &str, state: ExecutionState, error: ExecutionError) {
        if let Some(mut record) = self.inner.records.get_mut(execution_id) {
            record.finish_with(state, error);
        }
        self.inner.cancels.remove(execution_id);
    }

    fn settle(&self, skill: &Skill, success: bool) {
        self.inner
            .registry
            .record_invocation(&skill.skill_id, &skill.version, success);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegisterSkill;
    use crate::storage::Storage;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::json;
    use skillhub_sandbox::GuestLanguage;
    use tempfile::tempdir;

    /// In-process sandbox stub: squares `value`, honours a configurable
    /// latency, and fails on request via a magic input key.
    struct StubSandbox {
        latency: Duration,
    }

    impl StubSandbox {
        fn instant() -> Arc<Self> {
            Arc::new(Self {
                latency: Duration::ZERO,
            })
        }

        fn slow(latency: Duration) -> Arc<Self> {
            Arc::new(Self { latency })
        }
    }

    #[async_trait]
    impl SandboxHost for StubSandbox {
        async fn launch(
            &self,
            _language: GuestLanguage,
            _blob: &[u8],
            input: &Value,
            caps: &ResourceCaps,
        ) -> Result<Value, GuestFailure> {
            if !self.latency.is_zero() {
                let wall = Duration::from_secs(caps.max_wall_seconds);
                if self.latency > wall {
                    tokio::time::sleep(wall).await;
                    return Err(GuestFailure::TimedOut(caps.max_wall_seconds));
                }
                tokio::time::sleep(self.latency).await;
            }

            if input.get("explode").is_some() {
                return Err(GuestFailure::ExecutionFailed {
                    traceback: "Traceback: ValueError: explode".into(),
                });
            }

            let value = input.get("value").and_then(Value::as_i64).unwrap_or(0);
            Ok(json!({"result": value * value}))
        }
    }

    fn scheduler_with(
        sandbox: Arc<dyn SandboxHost>,
        config: SchedulerConfig,
    ) -> (Scheduler, Arc<SkillRegistry>, tempfile::TempDir) {
        let tmp = tempdir().unwrap();
        let storage =
            Arc::new(Storage::new(tmp.path().join("test.db").to_str().unwrap()).unwrap());
        let registry = Arc::new(SkillRegistry::new(storage));
        let scheduler = Scheduler::new(registry.clone(), sandbox, config);
        (scheduler, registry, tmp)
    }

    fn register_square(registry: &SkillRegistry, timeout_seconds: u64) {
        registry
            .register(RegisterSkill {
                skill_id: "skill_square".into(),
                skill_name: "Square".into(),
                description: None,
                version: "1.0.0".into(),
                language: "python".into(),
                code: STANDARD.encode("def execute(i): return {'result': i['value'] ** 2}"),
                dependencies: None,
                input_schema: Some(json!({"type": "object", "required": ["value"]})),
                output_schema: Some(json!({
                    "type": "object",
                    "required": ["result"],
                    "properties": {"result": {"type": "number"}}
                })),
                timeout_seconds,
                author: None,
                license: None,
                category: None,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn sync_invoke_completes_with_result() {
        let (scheduler, registry, _tmp) =
            scheduler_with(StubSandbox::instant(), SchedulerConfig::default());
        register_square(&registry, 30);

        let reply = scheduler
            .invoke("skill_square", json!({"value": 5}), None, false)
            .await
            .unwrap();

        match reply {
            InvokeReply::Completed(record) => {
                assert_eq!(record.state, ExecutionState::Completed);
                assert_eq!(record.result, Some(json!({"result": 25})));
                assert!(record.error.is_none());
                assert!(record.elapsed_seconds().is_some());

                // Status right after returns the same terminal record.
                let status = scheduler.status(&record.execution_id).unwrap();
                assert_eq!(status.state, ExecutionState::Completed);
                assert_eq!(status.result, record.result);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_skill_is_not_found_before_any_record() {
        let (scheduler, _registry, _tmp) =
            scheduler_with(StubSandbox::instant(), SchedulerConfig::default());

        let err = scheduler
            .invoke("skill_foo", json!({}), None, false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SKILL_INV_001");
    }

    #[tokio::test]
    async fn schema_rejects_inputs_before_dispatch() {
        let (scheduler, registry, _tmp) =
            scheduler_with(StubSandbox::instant(), SchedulerConfig::default());
        register_square(&registry, 30);

        let err = scheduler
            .invoke("skill_square", json!({}), None, false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SKILL_INV_002");
    }

    #[tokio::test]
    async fn guest_failure_becomes_failed_record() {
        let (scheduler, registry, _tmp) =
            scheduler_with(StubSandbox::instant(), SchedulerConfig::default());
        register_square(&registry, 30);

        let reply = scheduler
            .invoke("skill_square", json!({"value": 1, "explode": true}), None, false)
            .await
            .unwrap();

        match reply {
            InvokeReply::Completed(record) => {
                assert_eq!(record.state, ExecutionState::Failed);
                let error = record.error.unwrap();
                assert_eq!(error.code, "SKILL_INV_004");
                assert_eq!(error.kind, "execution_failed");
                assert!(error.details.contains("ValueError"));
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_guest_times_out_within_grace() {
        let (scheduler, registry, _tmp) = scheduler_with(
            StubSandbox::slow(Duration::from_secs(10)),
            SchedulerConfig::default(),
        );
        register_square(&registry, 1);

        let started = std::time::Instant::now();
        let reply = scheduler
            .invoke("skill_square", json!({"value": 2}), Some(1), false)
            .await
            .unwrap();

        match reply {
            InvokeReply::Completed(record) => {
                assert_eq!(record.state, ExecutionState::TimedOut);
                assert_eq!(record.error.unwrap().code, "SKILL_INV_003");
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_millis(2500));
    }

    #[tokio::test]
    async fn effective_deadline_is_min_of_caller_and_skill() {
        let (scheduler, registry, _tmp) = scheduler_with(
            StubSandbox::slow(Duration::from_secs(10)),
            SchedulerConfig::default(),
        );
        // Skill allows 600s but the caller only grants 1s.
        register_square(&registry, 600);

        let reply = scheduler
            .invoke("skill_square", json!({"value": 2}), Some(1), false)
            .await
            .unwrap();

        match reply {
            InvokeReply::Completed(record) => {
                assert_eq!(record.state, ExecutionState::TimedOut);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn async_invoke_returns_immediately_and_settles() {
        let (scheduler, registry, _tmp) = scheduler_with(
            StubSandbox::slow(Duration::from_millis(100)),
            SchedulerConfig::default(),
        );
        register_square(&registry, 30);

        let reply = scheduler
            .invoke("skill_square", json!({"value": 3}), None, true)
            .await
            .unwrap();

        let execution_id = match reply {
            InvokeReply::Accepted { execution_id } => execution_id,
            other => panic!("expected Accepted, got {other:?}"),
        };

        let mut settled = false;
        for _ in 0..50 {
            let record = scheduler.status(&execution_id).unwrap();
            if record.state.is_terminal() {
                settled = true;
                assert_eq!(record.state, ExecutionState::Completed);
                assert_eq!(record.result, Some(json!({"result": 9})));
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(settled, "async execution never settled");
    }

    #[tokio::test]
    async fn saturated_pool_refuses_sync_but_queues_async() {
        let config = SchedulerConfig {
            max_concurrent: 1,
            max_queue_size: 10,
        };
        let (scheduler, registry, _tmp) =
            scheduler_with(StubSandbox::slow(Duration::from_millis(300)), config);
        register_square(&registry, 30);

        // Occupy the single permit.
        let occupant = scheduler
            .invoke("skill_square", json!({"value": 1}), None, true)
            .await
            .unwrap();
        let occupant_id = match occupant {
            InvokeReply::Accepted { execution_id } => execution_id,
            other => panic!("expected Accepted, got {other:?}"),
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Sync is refused outright.
        let err = scheduler
            .invoke("skill_square", json!({"value": 2}), None, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "overloaded");

        // Async parks and eventually completes.
        let queued = scheduler
            .invoke("skill_square", json!({"value": 4}), None, true)
            .await
            .unwrap();
        let queued_id = match queued {
            InvokeReply::Accepted { execution_id } => execution_id,
            other => panic!("expected Accepted, got {other:?}"),
        };

        for _ in 0..100 {
            let a = scheduler.status(&occupant_id).unwrap();
            let b = scheduler.status(&queued_id).unwrap();
            if a.state.is_terminal() && b.state.is_terminal() {
                assert_eq!(b.result, Some(json!({"result": 16})));
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("queued async execution never completed");
    }

    #[tokio::test]
    async fn output_schema_violation_fails_the_record() {
        let (scheduler, registry, _tmp) =
            scheduler_with(StubSandbox::instant(), SchedulerConfig::default());
        registry
            .register(RegisterSkill {
                skill_id: "skill_bad_output".into(),
                skill_name: "Bad Output".into(),
                description: None,
                version: "1.0.0".into(),
                language: "python".into(),
                code: STANDARD.encode("def execute(i): return {'result': 1}"),
                dependencies: None,
                input_schema: None,
                // The stub returns {"result": n}; demand a string field it
                // never produces.
                output_schema: Some(json!({
                    "type": "object",
                    "required": ["label"],
                    "properties": {"label": {"type": "string"}}
                })),
                timeout_seconds: 30,
                author: None,
                license: None,
                category: None,
            })
            .unwrap();

        let reply = scheduler
            .invoke("skill_bad_output", json!({"value": 2}), None, false)
            .await
            .unwrap();

        match reply {
            InvokeReply::Completed(record) => {
                assert_eq!(record.state, ExecutionState::Failed);
                let error = record.error.unwrap();
                assert_eq!(error.code, "SKILL_INV_004");
                assert_eq!(error.kind, "output_schema_violation");
                assert!(record.result.is_none());
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn usage_stats_update_on_terminal_states() {
        let (scheduler, registry, _tmp) =
            scheduler_with(StubSandbox::instant(), SchedulerConfig::default());
        register_square(&registry, 30);

        scheduler
            .invoke("skill_square", json!({"value": 2}), None, false)
            .await
            .unwrap();
        scheduler
            .invoke("skill_square", json!({"value": 2, "explode": true}), None, false)
            .await
            .unwrap();

        let skill = registry.get("skill_square", None).unwrap();
        assert_eq!(skill.stats.total_calls, 2);
        assert_eq!(skill.stats.success_count, 1);
        assert_eq!(skill.stats.popularity, 2);
    }

    #[tokio::test]
    async fn cancel_turns_queued_execution_terminal() {
        let config = SchedulerConfig {
            max_concurrent: 1,
            max_queue_size: 10,
        };
        let (scheduler, registry, _tmp) =
            scheduler_with(StubSandbox::slow(Duration::from_millis(400)), config);
        register_square(&registry, 30);

        let _occupant = scheduler
            .invoke("skill_square", json!({"value": 1}), None, true)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let queued = scheduler
            .invoke("skill_square", json!({"value": 2}), None, true)
            .await
            .unwrap();
        let queued_id = match queued {
            InvokeReply::Accepted { execution_id } => execution_id,
            other => panic!("expected Accepted, got {other:?}"),
        };

        assert!(scheduler.cancel(&queued_id));

        for _ in 0..100 {
            let record = scheduler.status(&queued_id).unwrap();
            if record.state.is_terminal() {
                assert_eq!(record.state, ExecutionState::Cancelled);
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("cancelled execution never settled");
    }

    #[tokio::test]
    async fn status_of_unknown_execution_is_none() {
        let (scheduler, _registry, _tmp) =
            scheduler_with(StubSandbox::instant(), SchedulerConfig::default());
        assert!(scheduler.status("exec_missing").is_none());
    }
}
