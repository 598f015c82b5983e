//! DAG orchestrator.
//!
//! Validates a workflow (declared endpoints, acyclicity, upstream-only
//! references), then executes it as a wavefront: every node whose
//! dependencies are complete runs concurrently in a `JoinSet`, its results
//! feeding downstream placeholders. The first node failure cancels
//! in-flight children, skips everything not yet started, and returns the
//! partial results gathered so far.

use crate::engine::context::{referenced_nodes, WorkflowContext};
use crate::engine::graph::WorkflowGraph;
use crate::engine::scheduler::Scheduler;
use crate::error::ProtocolError;
use crate::models::workflow::GLOBAL_INPUTS_NODE;
use crate::models::{ExecutionError, ExecutionRecord, ExecutionState, Workflow, WorkflowRun};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Whole-workflow budget when the request does not set one, seconds.
const DEFAULT_WORKFLOW_TIMEOUT: u64 = 300;

pub struct Orchestrator {
    scheduler: Arc<Scheduler>,
    runs: DashMap<String, WorkflowRun>,
}

impl Orchestrator {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            runs: DashMap::new(),
        }
    }

    /// Snapshot of a workflow run.
    pub fn status(&self, execution_id: &str) -> Option<WorkflowRun> {
        self.runs.get(execution_id).map(|r| r.clone())
    }

    /// Validate and execute a workflow to completion. Validation failures
    /// are errors; node failures are reported through the returned run.
    pub async fn execute(&self, workflow: Workflow) -> Result<WorkflowRun, ProtocolError> {
        let graph = WorkflowGraph::from_workflow(&workflow)?;

        if let Some(cycle) = graph.find_cycle() {
            return Err(ProtocolError::CyclicWorkflow(cycle.join(" -> ")));
        }

        for node_id in graph.node_ids() {
            let node = graph.node(node_id).expect("listed node exists");
            let upstream = graph.upstream_of(node_id);
            for referenced in referenced_nodes(&node.inputs) {
                if referenced == GLOBAL_INPUTS_NODE {
                    continue;
                }
                if !upstream.contains(&referenced) {
                    return Err(ProtocolError::InvalidWorkflow(format!(
                        "node {node_id:?} references ${{{referenced}}} which is not upstream of it"
                    )));
                }
            }
        }

        let mut run = WorkflowRun::new(workflow.workflow_id.clone());
        self.runs.insert(run.execution_id.clone(), run.clone());
        info!(
            execution_id = %run.execution_id,
            workflow_id = %workflow.workflow_id,
            nodes = graph.node_count(),
            "Workflow started"
        );

        let budget = workflow.timeout_seconds.unwrap_or(DEFAULT_WORKFLOW_TIMEOUT);
        let deadline = Instant::now() + Duration::from_secs(budget);
        let token = CancellationToken::new();

        let mut context = WorkflowContext::new();
        context.set_result(GLOBAL_INPUTS_NODE, workflow.global_inputs.clone());

        let mut in_degree = graph.in_degrees();
        let mut ready: VecDeque<String> = {
            let mut ids: Vec<&String> = graph.node_ids().collect();
            ids.sort();
            ids.into_iter()
                .filter(|id| in_degree[*id] == 0)
                .cloned()
                .collect()
        };

        let mut inflight: JoinSet<(String, Result<ExecutionRecord, ProtocolError>)> =
            JoinSet::new();
        let mut completed = 0usize;
        let mut failure: Option<(String, ExecutionError)> = None;

        'schedule: loop {
            while let Some(node_id) = ready.pop_front() {
                let node = graph.node(&node_id).expect("ready node exists").clone();

                // Resolution failures surface before the node launches.
                let inputs = match context.resolve(&node.inputs) {
                    Ok(inputs) => inputs,
                    Err(missing) => {
                        failure = Some((
                            node_id,
                            ExecutionError {
                                code: ProtocolError::InvalidWorkflow(String::new())
                                    .code()
                                    .to_string(),
                                kind: "reference_missing".to_string(),
                                details: missing.to_string(),
                            },
                        ));
                        break 'schedule;
                    }
                };

                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    failure = Some((
                        node_id,
                        ProtocolError::ExecutionTimeout(budget).as_execution_error(),
                    ));
                    break 'schedule;
                }

                debug!(node_id = %node_id, skill_id = %node.skill_id, "Scheduling node");
                let scheduler = self.scheduler.clone();
                let child_token = token.child_token();
                inflight.spawn(async move {
                    let record = scheduler
                        .invoke_child(
                            &node.skill_id,
                            inputs,
                            Some(remaining.as_secs().max(1)),
                            child_token,
                        )
                        .await;
                    (node.node_id, record)
                });
            }

            let Some(joined) = inflight.join_next().await else {
                break;
            };

            let (node_id, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    return Err(ProtocolError::OrchestrationInternal(format!(
                        "node task join error: {e}"
                    )));
                }
            };

            match outcome {
                Ok(record) if record.state == ExecutionState::Completed => {
                    let result = record.result.clone().unwrap_or_default();
                    run.record_node(&node_id, &record);
                    run.results.insert(node_id.clone(), result.clone());
                    context.set_result(node_id.clone(), result);
                    completed += 1;

                    for dependent in graph.dependents(&node_id) {
                        let degree = in_degree.get_mut(dependent).expect("known node");
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push_back(dependent.clone());
                        }
                    }
                }
                Ok(record) => {
                    run.record_node(&node_id, &record);
                    let error = record.error.clone().unwrap_or_else(|| {
                        ProtocolError::ExecutionFailed("node failed without detail".into())
                            .as_execution_error()
                    });
                    failure = Some((node_id, error));
                    break;
                }
                Err(protocol_error) => {
                    failure = Some((node_id, protocol_error.as_execution_error()));
                    break;
                }
            }
        }

        if let Some((failed_node, error)) = failure {
            warn!(
                execution_id = %run.execution_id,
                node_id = %failed_node,
                kind = %error.kind,
                "Workflow failed; cancelling in-flight nodes"
            );
            token.cancel();
            // Drain the in-flight children; they settle as cancelled.
            while let Some(joined) = inflight.join_next().await {
                if let Ok((node_id, Ok(record))) = joined {
                    run.record_node(&node_id, &record);
                }
            }
            run.fail(failed_node, error);
        } else {
            debug_assert_eq!(completed, graph.node_count());
            run.complete();
            info!(execution_id = %run.execution_id, nodes = completed, "Workflow completed");
        }

        self.runs.insert(run.execution_id.clone(), run.clone());
        Ok(run)
    }
}
