//! The cyclic directed-graph engine underlying the workflow runner.
//!
//! Generalizes the acyclic, wave-scheduled execution `dag::DagScheduler`
//! performs over a fixed phase list into a graph that supports loops (the
//! task subgraph, the fixer subgraph, retry edges), conditional routing,
//! fan-out/fan-in, durable checkpoints, and human interrupts. State is a
//! `serde_json::Value` object so arbitrary node libraries can read and
//! write named fields without the engine knowing their shapes; [`merge`]
//! defines how concurrent writers are reduced back into one state.

pub mod assembly;
pub mod merge;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::GraphError;
use crate::orchestrator::events::{Event, EventEmitter, EventPriority};
use crate::orchestrator::repository::{Checkpoint, Repository};

/// A single step in the graph. Nodes are pure over their input state:
/// given `state`, produce the partial state to merge in, or raise an
/// error the retry policy and router can react to.
#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError>;
}

#[derive(Debug, Clone)]
pub enum NodeOutcome {
    /// Normal completion; `state` is the partial state to merge.
    Done(Value),
    /// The node is suspending the graph at this point until a human
    /// supplies `input` via `GraphRunner::resume`.
    Interrupt { state: Value, payload: Value },
}

/// One parallel dispatch target: a destination node name and the state
/// slice it should see. Multiple records from one router call fan out.
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub destination: String,
    pub state: Value,
}

impl DispatchRecord {
    pub fn new(destination: impl Into<String>, state: Value) -> Self {
        Self {
            destination: destination.into(),
            state,
        }
    }
}

pub type Router = Arc<dyn Fn(&Value) -> Vec<DispatchRecord> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::from_millis(200),
            backoff_factor: 2.0,
        }
    }
}

pub const TERMINAL: &str = "__terminal__";

/// A compiled node + its conditional edge, plus the retry policy applied
/// to the node function (not to the edge itself — exhausted retries are
/// surfaced to the router as part of the merged state, not bypassed).
struct CompiledNode {
    node: Arc<dyn Node>,
    router: Router,
    retry: RetryPolicy,
}

pub struct GraphBuilder {
    nodes: HashMap<String, CompiledNode>,
    start: Option<String>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            start: None,
        }
    }

    pub fn add_node(mut self, node: Arc<dyn Node>, router: Router) -> Self {
        self.add_node_with_retry(node, router, RetryPolicy::default())
    }

    pub fn add_node_with_retry(mut self, node: Arc<dyn Node>, router: Router, retry: RetryPolicy) -> Self {
        let name = node.name().to_string();
        self.nodes.insert(
            name,
            CompiledNode {
                node,
                router,
                retry,
            },
        );
        self
    }

    pub fn with_start(mut self, name: impl Into<String>) -> Self {
        self.start = Some(name.into());
        self
    }

    pub fn build(self, recursion_limit: u32) -> Result<CompiledGraph, GraphError> {
        let start = self
            .start
            .ok_or_else(|| GraphError::UnknownNode("<no start node configured>".to_string()))?;
        if !self.nodes.contains_key(&start) {
            return Err(GraphError::UnknownNode(start));
        }
        Ok(CompiledGraph {
            nodes: self.nodes,
            start,
            recursion_limit,
        })
    }
}

pub struct CompiledGraph {
    nodes: HashMap<String, CompiledNode>,
    start: String,
    recursion_limit: u32,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub thread_id: String,
    pub final_state: Value,
    pub completed: bool,
    pub interrupted: bool,
    pub interrupt_payload: Option<Value>,
}

/// Drives a [`CompiledGraph`] against a [`Repository`] for checkpointing.
pub struct GraphRunner {
    graph: CompiledGraph,
    repository: Arc<dyn Repository>,
    pause_requested: AtomicBool,
    event_emitter: Option<Arc<EventEmitter>>,
}

impl GraphRunner {
    pub fn new(graph: CompiledGraph, repository: Arc<dyn Repository>) -> Self {
        Self {
            graph,
            repository,
            pause_requested: AtomicBool::new(false),
            event_emitter: None,
        }
    }

    /// Attach the emitter that reports `workflow_complete` when a `run`/
    /// `resume` call reaches the graph's terminal node. Node-level events
    /// (`ralph_iteration`, `task_complete`) are reported by the nodes
    /// themselves via their own emitter handle, not by the runner.
    pub fn with_event_emitter(mut self, emitter: Arc<EventEmitter>) -> Self {
        self.event_emitter = Some(emitter);
        self
    }

    pub fn request_pause(&self) {
        self.pause_requested.store(true, Ordering::SeqCst);
    }

    pub async fn run(&self, thread_id: &str, initial_state: Value) -> Result<RunOutcome, GraphError> {
        self.drive(thread_id, vec![self.graph.start.clone()], initial_state, None)
            .await
    }

    /// Resume a thread previously suspended by an interrupt or a pause.
    /// `human_input` becomes the resuming node's completion value, merged
    /// into state under the `human_input` key before re-entry.
    pub async fn resume(&self, thread_id: &str, human_input: Option<Value>) -> Result<RunOutcome, GraphError> {
        let checkpoint = self.repository.latest_checkpoint(thread_id).await?;
        if !checkpoint.interrupted && checkpoint.pending_next_nodes.is_empty() {
            return Err(GraphError::NoPendingInterrupt(thread_id.to_string()));
        }
        let mut state = checkpoint.state_snapshot;
        if let Some(input) = human_input {
            if let Value::Object(ref mut map) = state {
                map.insert("human_input".to_string(), input);
            }
        }
        let next = if checkpoint.pending_next_nodes.is_empty() {
            vec![self.graph.start.clone()]
        } else {
            checkpoint.pending_next_nodes
        };
        self.drive(thread_id, next, state, Some(checkpoint.checkpoint_id))
            .await
    }

    async fn drive(
        &self,
        thread_id: &str,
        mut pending: Vec<String>,
        mut state: Value,
        mut previous_checkpoint_id: Option<String>,
    ) -> Result<RunOutcome, GraphError> {
        let mut executions = 0u32;

        loop {
            if pending.iter().any(|n| n == TERMINAL) || pending.is_empty() {
                if let Some(emitter) = &self.event_emitter {
                    let project_name = state
                        .get("config")
                        .and_then(|c| c.get("project_name"))
                        .and_then(|v| v.as_str())
                        .unwrap_or("default")
                        .to_string();
                    let event = Event::new("workflow_complete", project_name, EventPriority::High)
                        .with_data("thread_id", Value::String(thread_id.to_string()));
                    emitter.emit_now(event).await;
                }
                return Ok(RunOutcome {
                    thread_id: thread_id.to_string(),
                    final_state: state,
                    completed: true,
                    interrupted: false,
                    interrupt_payload: None,
                });
            }

            if self.pause_requested.swap(false, Ordering::SeqCst) {
                let checkpoint_id = self
                    .write_checkpoint(thread_id, previous_checkpoint_id.clone(), state.clone(), pending.clone(), false, None, true)
                    .await?;
                previous_checkpoint_id = Some(checkpoint_id);
                return Ok(RunOutcome {
                    thread_id: thread_id.to_string(),
                    final_state: state,
                    completed: false,
                    interrupted: false,
                    interrupt_payload: None,
                });
            }

            executions += 1;
            if executions > self.graph.recursion_limit {
                return Err(GraphError::RecursionLimitExceeded {
                    limit: self.graph.recursion_limit,
                    node: pending.join(","),
                });
            }

            // Fan-out: run every pending destination concurrently against
            // its own state slice, then reduce.
            let mut handles = Vec::with_capacity(pending.len());
            for dest in &pending {
                let compiled = self
                    .graph
                    .nodes
                    .get(dest)
                    .ok_or_else(|| GraphError::UnknownNode(dest.clone()))?;
                let node = compiled.node.clone();
                let input = state.clone();
                let retry = compiled.retry.clone();
                handles.push(async move { run_with_retry(node, input, retry).await });
            }
            let results = futures::future::join_all(handles).await;

            let mut partials = Vec::with_capacity(results.len());
            let mut interrupt: Option<(Value, Value)> = None;
            for result in results {
                match result? {
                    NodeOutcome::Done(partial) => partials.push(partial),
                    NodeOutcome::Interrupt { state: partial, payload } => {
                        partials.push(partial);
                        interrupt = Some((state.clone(), payload));
                    }
                }
            }
            state = merge::merge_all(std::iter::once(state.clone()).chain(partials).collect());

            if let Some((_, payload)) = interrupt {
                let checkpoint_id = self
                    .write_checkpoint(thread_id, previous_checkpoint_id.clone(), state.clone(), pending.clone(), true, Some(payload.clone()), false)
                    .await?;
                info!(thread_id, checkpoint_id, "graph suspended on interrupt");
                return Ok(RunOutcome {
                    thread_id: thread_id.to_string(),
                    final_state: state,
                    completed: false,
                    interrupted: true,
                    interrupt_payload: Some(payload),
                });
            }

            // All destinations ran the same router logic family; take the
            // first compiled node's router as the join's routing function,
            // since a fan-in join is itself a single named node.
            let router_source = pending[0].clone();
            let router = self
                .graph
                .nodes
                .get(&router_source)
                .map(|c| c.router.clone())
                .ok_or_else(|| GraphError::UnknownNode(router_source))?;
            let dispatch = router(&state);
            let next_names: Vec<String> = dispatch.iter().map(|d| d.destination.clone()).collect();

            let checkpoint_id = self
                .write_checkpoint(thread_id, previous_checkpoint_id.clone(), state.clone(), next_names.clone(), false, None, false)
                .await?;
            previous_checkpoint_id = Some(checkpoint_id);
            pending = if next_names.is_empty() {
                vec![TERMINAL.to_string()]
            } else {
                next_names
            };
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_checkpoint(
        &self,
        thread_id: &str,
        previous_id: Option<String>,
        state_snapshot: Value,
        pending_next_nodes: Vec<String>,
        interrupted: bool,
        interrupt_payload: Option<Value>,
        paused: bool,
    ) -> Result<String, GraphError> {
        let checkpoint_id = Uuid::new_v4().to_string();
        let checkpoint = Checkpoint {
            thread_id: thread_id.to_string(),
            previous_id,
            checkpoint_id: checkpoint_id.clone(),
            state_snapshot,
            pending_next_nodes,
            timestamp: chrono::Utc::now(),
            interrupted,
            interrupt_payload,
            paused,
        };
        self.repository.save_checkpoint(checkpoint).await?;
        Ok(checkpoint_id)
    }
}

async fn run_with_retry(
    node: Arc<dyn Node>,
    input: Value,
    retry: RetryPolicy,
) -> Result<NodeOutcome, GraphError> {
    let mut attempt = 0u32;
    let mut interval = retry.initial_interval;
    loop {
        attempt += 1;
        match node.run(input.clone()).await {
            Ok(outcome) => return Ok(outcome),
            Err(err) if attempt < retry.max_attempts => {
                warn!(node = node.name(), attempt, error = %err, "node failed, retrying");
                sleep(interval).await;
                interval = interval.mul_f64(retry.backoff_factor);
            }
            Err(err) => {
                debug!(node = node.name(), attempt, "node exhausted retries");
                return Err(GraphError::NodeRetriesExhausted {
                    node: node.name().to_string(),
                    source: anyhow::anyhow!(err),
                });
            }
        }
    }
}
