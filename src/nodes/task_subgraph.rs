//! The task subgraph: `select_task -> write_tests? -> implement_task ->
//! verify_task -> {select_task | fix_bug}`.
//!
//! A single `implement_task`/`verify_task` node handles one task id at a
//! time; batched parallel execution isn't a separate node, it's
//! `select_task`'s router fanning out one `DispatchRecord` per runnable
//! task, each carrying a state slice narrowed to that one task — the graph
//! engine's own fan-out/fan-in does the rest, with `graph::merge`
//! reconciling the shared `tasks` map by key afterward.
//!
//! Grounded on `orchestrator::iterative_loop::run_task_loop` for the
//! implement/verify cycle and `nodes::worktree` for parallel isolation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::decomposition::types::{DecompositionTask, TaskStatus};
use crate::errors::GraphError;
use crate::graph::{DispatchRecord, Node, NodeOutcome, Router, TERMINAL};
use crate::nodes::worktree;
use crate::orchestrator::agent_runner::{self, AgentInvocation};
use crate::orchestrator::events::EventEmitter;
use crate::orchestrator::iterative_loop::{
    run_task_loop, BudgetPolicy, LoopConfig, PreviousIterationContext,
};

pub const ESCALATE_NODE: &str = "escalate";
pub const BUILD_VERIFICATION_NODE: &str = "build_verification";
pub const SELECT_TASK_NODE: &str = "select_task";
pub const WRITE_TESTS_NODE: &str = "write_tests";
pub const IMPLEMENT_TASK_NODE: &str = "implement_task";
pub const VERIFY_TASK_NODE: &str = "verify_task";
pub const FIX_BUG_NODE: &str = "fix_bug";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSubgraphConfig {
    pub project_dir: String,
    pub base_branch: String,
    #[serde(default)]
    pub claude_cmd: String,
    #[serde(default)]
    pub claude_flags: Vec<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_timeout_secs")]
    pub iteration_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub test_timeout_secs: u64,
    #[serde(default = "default_max_parallel")]
    pub max_parallel_tasks: usize,
    #[serde(default = "default_max_fix_attempts")]
    pub max_fix_attempts: u32,
    #[serde(default)]
    pub isolate_parallel_tasks: bool,
    #[serde(default)]
    pub enable_test_writer: bool,
    #[serde(default = "default_test_writer_binary")]
    pub test_writer_binary: String,
    /// Project-level fallback test command, used verbatim when a task
    /// declares tests but no framework should be auto-detected.
    #[serde(default)]
    pub test_command: Option<String>,
    /// `None` disables budget enforcement for every task in this run.
    #[serde(default)]
    pub budget_limit: Option<f64>,
    #[serde(default = "default_budget_hard_limit")]
    pub budget_hard_limit: f64,
    #[serde(default = "default_budget_fallback_ratio")]
    pub budget_fallback_ratio: f64,
    #[serde(default = "default_estimated_iteration_cost")]
    pub estimated_iteration_cost: f64,
    /// Identifies this run's events in the store; carried in state rather
    /// than inferred from `project_dir` so a project can be renamed without
    /// orphaning its event history.
    #[serde(default)]
    pub project_name: String,
}

fn default_test_writer_binary() -> String {
    "claude".to_string()
}

fn default_max_iterations() -> u32 {
    10
}
fn default_timeout_secs() -> u64 {
    600
}
fn default_max_parallel() -> usize {
    1
}
fn default_max_fix_attempts() -> u32 {
    2
}
fn default_budget_hard_limit() -> f64 {
    f64::MAX
}
fn default_budget_fallback_ratio() -> f64 {
    0.5
}
fn default_estimated_iteration_cost() -> f64 {
    0.05
}

/// Builds the per-iteration budget policy from subgraph config, or `None`
/// when the run has no `budget_limit` configured.
fn budget_policy(cfg: &TaskSubgraphConfig, initial_spend: f64) -> Option<BudgetPolicy> {
    cfg.budget_limit.map(|limit| BudgetPolicy {
        limit,
        hard_limit: cfg.budget_hard_limit,
        fallback_ratio: cfg.budget_fallback_ratio,
        estimated_iteration_cost: cfg.estimated_iteration_cost,
        initial_spend,
    })
}

/// Iterations actually run before `run_task_loop` stopped, used to charge
/// the task's cumulative `budget_spent` regardless of how the loop ended.
fn iterations_attempted(outcome: &Result<crate::orchestrator::iterative_loop::IterationOutcome, crate::errors::LoopError>) -> u32 {
    use crate::errors::LoopError;
    match outcome {
        Ok(o) => o.context.iteration,
        Err(LoopError::MaxIterationsReached { max_iterations, .. }) => *max_iterations,
        Err(LoopError::BudgetExhausted { iteration, .. }) => iteration.saturating_sub(1),
        Err(LoopError::HookBlocked { iteration, .. }) => iteration.saturating_sub(1),
        Err(LoopError::StoppedByHook { iteration, .. }) => *iteration,
        Err(LoopError::IterationTimeout { iteration, .. }) => *iteration,
        Err(LoopError::TestCommandTimeout { iteration, .. }) => *iteration,
        Err(LoopError::Agent(_)) => 0,
    }
}

pub(crate) fn parse_config(state: &Value) -> TaskSubgraphConfig {
    state
        .get("config")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or(TaskSubgraphConfig {
            project_dir: ".".to_string(),
            base_branch: "main".to_string(),
            claude_cmd: "claude".to_string(),
            claude_flags: Vec::new(),
            max_iterations: default_max_iterations(),
            iteration_timeout_secs: default_timeout_secs(),
            test_timeout_secs: default_timeout_secs(),
            max_parallel_tasks: default_max_parallel(),
            max_fix_attempts: default_max_fix_attempts(),
            isolate_parallel_tasks: false,
            enable_test_writer: false,
            test_writer_binary: default_test_writer_binary(),
            test_command: None,
            budget_limit: None,
            budget_hard_limit: default_budget_hard_limit(),
            budget_fallback_ratio: default_budget_fallback_ratio(),
            estimated_iteration_cost: default_estimated_iteration_cost(),
            project_name: "default".to_string(),
        })
}

fn parse_tasks(state: &Value) -> HashMap<String, DecompositionTask> {
    state
        .get("tasks")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

fn current_task_id(state: &Value) -> Option<String> {
    state
        .get("current_task_ids")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|v| v.as_str())
        .map(String::from)
}

fn done_with_task(task: DecompositionTask) -> NodeOutcome {
    let mut tasks_patch = serde_json::Map::new();
    tasks_patch.insert(task.id.clone(), serde_json::to_value(&task).unwrap_or(Value::Null));
    NodeOutcome::Done(json!({ "tasks": Value::Object(tasks_patch) }))
}

fn build_task_prompt(task: &DecompositionTask, ctx: &PreviousIterationContext) -> String {
    let mut prompt = format!("# Task {}: {}\n\n{}\n", task.id, task.name, task.description);
    if let Some(story) = &task.user_story {
        prompt.push_str(&format!("\nUser story: {story}\n"));
    }
    if !task.acceptance_criteria.is_empty() {
        prompt.push_str("\nAcceptance criteria:\n");
        for criterion in &task.acceptance_criteria {
            prompt.push_str(&format!("- {criterion}\n"));
        }
    }
    let carried = ctx.to_prompt_section();
    if !carried.is_empty() {
        prompt.push('\n');
        prompt.push_str(&carried);
    }
    prompt
}

/// Picks the next runnable task(s): `pending` status with every dependency
/// `completed`, lowest id first. Escalates on a dependency deadlock;
/// signals completion when nothing pending remains.
pub struct SelectTask;

#[async_trait]
impl Node for SelectTask {
    fn name(&self) -> &str {
        SELECT_TASK_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let tasks = parse_tasks(&state);
        let cfg = parse_config(&state);

        let mut runnable: Vec<&str> = tasks
            .values()
            .filter(|t| {
                t.status == TaskStatus::Pending
                    && t.depends_on.iter().all(|dep| {
                        tasks
                            .get(dep)
                            .map(|d| d.status == TaskStatus::Completed)
                            .unwrap_or(false)
                    })
            })
            .map(|t| t.id.as_str())
            .collect();

        if runnable.is_empty() {
            let pending_remains = tasks.values().any(|t| !t.status.is_terminal());
            if pending_remains {
                return Ok(NodeOutcome::Done(json!({
                    "escalate": { "reason": "dependency deadlock" }
                })));
            }
            return Ok(NodeOutcome::Done(json!({
                "task_breakdown_complete": true,
                "current_task_ids": []
            })));
        }

        runnable.sort_unstable();
        let width = cfg.max_parallel_tasks.max(1);
        let batch: Vec<String> = runnable.into_iter().take(width).map(String::from).collect();
        Ok(NodeOutcome::Done(json!({ "current_task_ids": batch })))
    }
}

/// `select_task`'s router: escalate, advance to build verification, or fan
/// out one `implement_task` dispatch per selected id (each narrowed to a
/// single-element `current_task_ids`, so a batch of N becomes N concurrent
/// single-task runs rather than a separate "parallel" node type).
pub fn select_task_router() -> Router {
    Arc::new(|state: &Value| {
        if state.get("escalate").is_some() {
            return vec![DispatchRecord::new(ESCALATE_NODE, state.clone())];
        }
        if state.get("task_breakdown_complete").and_then(|v| v.as_bool()) == Some(true) {
            return vec![DispatchRecord::new(BUILD_VERIFICATION_NODE, state.clone())];
        }
        let Some(ids) = state.get("current_task_ids").and_then(|v| v.as_array()) else {
            return vec![];
        };
        let cfg = parse_config(state);
        let destination = if cfg.enable_test_writer {
            WRITE_TESTS_NODE
        } else {
            IMPLEMENT_TASK_NODE
        };
        ids.iter()
            .filter_map(|id| id.as_str())
            .map(|id| {
                let mut slice = state.clone();
                if let Some(obj) = slice.as_object_mut() {
                    obj.insert("current_task_ids".to_string(), json!([id]));
                }
                DispatchRecord::new(destination, slice)
            })
            .collect()
    })
}

/// Invokes a test-writer agent to produce failing tests for the selected
/// task before implementation starts. Best-effort: a test-writer failure
/// is logged into the task's error field but doesn't block the task —
/// `implement_task` still runs against whatever tests already exist.
pub struct WriteTests;

#[async_trait]
impl Node for WriteTests {
    fn name(&self) -> &str {
        WRITE_TESTS_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let cfg = parse_config(&state);
        let tasks = parse_tasks(&state);
        let Some(task_id) = current_task_id(&state) else {
            return Err(GraphError::UnknownNode("write_tests: no current task id in state".to_string()));
        };
        let Some(mut task) = tasks.get(&task_id).cloned() else {
            return Err(GraphError::UnknownNode(format!("write_tests: unknown task '{task_id}'")));
        };

        let prompt = format!(
            "Write failing tests that capture the acceptance criteria for task {}: {}\n\n{}",
            task.id, task.name, task.description
        );
        let env = HashMap::new();
        let result = agent_runner::invoke(AgentInvocation {
            agent_kind: &cfg.test_writer_binary,
            prompt: &prompt,
            allowed_tools: &[],
            max_turns: None,
            timeout: Duration::from_secs(cfg.iteration_timeout_secs),
            env_overrides: &env,
            cwd: std::path::Path::new(&cfg.project_dir),
        })
        .await;

        if !result.success {
            task.error = Some(format!(
                "test-writer agent did not complete successfully: {}",
                result.error.unwrap_or_default()
            ));
        } else if let Some(files) = agent_runner::extract_json(&result.stdout)
            .and_then(|v| v.get("test_files").cloned())
            .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
        {
            task.test_files = files;
        }

        Ok(done_with_task(task))
    }
}

pub fn write_tests_router() -> Router {
    Arc::new(|state: &Value| vec![DispatchRecord::new(IMPLEMENT_TASK_NODE, state.clone())])
}

/// Runs the selected task through `run_task_loop`. Isolated in its own
/// worktree when the config asks for it (always true in a real batch; the
/// flag also lets a single-task run skip the overhead).
///
/// `event_emitter` is shared with every other node in the graph that
/// observes agent activity (`FixBug`), constructed once by whoever calls
/// `build_workflow_graph` rather than per-node, so events accumulate into
/// one batch/timer rather than one per node instance.
#[derive(Clone, Default)]
pub struct ImplementTask {
    pub event_emitter: Option<Arc<EventEmitter>>,
}

#[async_trait]
impl Node for ImplementTask {
    fn name(&self) -> &str {
        IMPLEMENT_TASK_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let cfg = parse_config(&state);
        let tasks = parse_tasks(&state);
        let Some(task_id) = current_task_id(&state) else {
            return Err(GraphError::UnknownNode("implement_task: no current task id in state".to_string()));
        };
        let Some(mut task) = tasks.get(&task_id).cloned() else {
            return Err(GraphError::UnknownNode(format!("implement_task: unknown task '{task_id}'")));
        };

        let base_dir = PathBuf::from(&cfg.project_dir);
        let project_dir = if cfg.isolate_parallel_tasks {
            match worktree::create(&base_dir, &task_id, &cfg.base_branch).await {
                Ok(w) => w.path,
                Err(err) => {
                    task.status = TaskStatus::Failed;
                    task.error = Some(err.to_string());
                    return Ok(done_with_task(task));
                }
            }
        } else {
            base_dir
        };

        let loop_config = LoopConfig {
            task_id: task_id.clone(),
            project_dir,
            claude_cmd: cfg.claude_cmd.clone(),
            claude_flags: cfg.claude_flags.clone(),
            max_iterations: cfg.max_iterations,
            iteration_timeout: Duration::from_secs(cfg.iteration_timeout_secs),
            test_timeout: Duration::from_secs(cfg.test_timeout_secs),
            test_files: task.test_files.clone(),
            test_command: cfg.test_command.clone(),
            budget: budget_policy(&cfg, task.budget_spent),
            event_emitter: self.event_emitter.clone(),
            project_name: cfg.project_name.clone(),
        };

        let prompt_task = task.clone();
        let outcome = run_task_loop(&loop_config, move |ctx| build_task_prompt(&prompt_task, ctx)).await;
        task.budget_spent += iterations_attempted(&outcome) as f64 * cfg.estimated_iteration_cost;
        match outcome {
            Ok(outcome) => {
                task.status = TaskStatus::Completed;
                task.iterations_used = outcome.context.iteration;
                task.error = None;
            }
            Err(err) => {
                task.status = TaskStatus::Failed;
                task.error = Some(err.to_string());
            }
        }
        Ok(done_with_task(task))
    }
}

/// Router shared by both `implement_task` and `fix_bug`: a `completed` task
/// goes to `verify_task`, a `failed` one goes straight to error-dispatch
/// (verification would be redundant — the loop already exhausted its
/// iterations without a passing run).
pub fn implement_task_router() -> Router {
    Arc::new(|state: &Value| {
        let Some(task_id) = current_task_id(state) else {
            return vec![];
        };
        let tasks = parse_tasks(state);
        let Some(task) = tasks.get(&task_id) else {
            return vec![];
        };
        match task.status {
            TaskStatus::Completed => vec![DispatchRecord::new(VERIFY_TASK_NODE, state.clone())],
            _ => vec![DispatchRecord::new(ESCALATE_NODE, state.clone())],
        }
    })
}

/// Re-runs the task's tests as a final, independent confirmation that the
/// implementation loop's own passing run wasn't a fluke (e.g. flaky setup
/// that happened to pass once).
pub struct VerifyTask;

#[async_trait]
impl Node for VerifyTask {
    fn name(&self) -> &str {
        VERIFY_TASK_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let cfg = parse_config(&state);
        let tasks = parse_tasks(&state);
        let Some(task_id) = current_task_id(&state) else {
            return Err(GraphError::UnknownNode("verify_task: no current task id in state".to_string()));
        };
        let Some(mut task) = tasks.get(&task_id).cloned() else {
            return Err(GraphError::UnknownNode(format!("verify_task: unknown task '{task_id}'")));
        };

        let project_dir = PathBuf::from(&cfg.project_dir);
        let plan = crate::orchestrator::iterative_loop::resolve_test_plan(
            &project_dir,
            &task.test_files,
            cfg.test_command.as_deref(),
        );
        let (passed, _output) = crate::orchestrator::iterative_loop::run_planned_test_command(
            &plan,
            &project_dir,
            Duration::from_secs(cfg.test_timeout_secs),
            task.iterations_used,
        )
        .await
        .map_err(|err| GraphError::NodeRetriesExhausted {
            node: VERIFY_TASK_NODE.to_string(),
            source: anyhow::anyhow!(err),
        })?;

        if !passed {
            task.status = TaskStatus::Failed;
            task.error = Some("verification re-run failed".to_string());
        }
        Ok(done_with_task(task))
    }
}

/// A verified task returns to `select_task` for the next pick; a failure
/// routes to `fix_bug`, capped at the configured fix-attempt ceiling.
pub fn verify_task_router() -> Router {
    Arc::new(|state: &Value| {
        let Some(task_id) = current_task_id(state) else {
            return vec![];
        };
        let tasks = parse_tasks(state);
        let Some(task) = tasks.get(&task_id) else {
            return vec![];
        };
        if task.status == TaskStatus::Completed {
            return vec![DispatchRecord::new(SELECT_TASK_NODE, state.clone())];
        }

        let attempts = state
            .get("fix_attempts")
            .and_then(|v| v.get(&task_id))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let cfg = parse_config(state);
        if attempts >= cfg.max_fix_attempts as u64 {
            return vec![DispatchRecord::new(ESCALATE_NODE, state.clone())];
        }
        vec![DispatchRecord::new(FIX_BUG_NODE, state.clone())]
    })
}

/// Reuses the iterative loop once more with the prior failure folded into
/// the prompt, bumping the per-task fix-attempt counter.
#[derive(Clone, Default)]
pub struct FixBug {
    pub event_emitter: Option<Arc<EventEmitter>>,
}

#[async_trait]
impl Node for FixBug {
    fn name(&self) -> &str {
        FIX_BUG_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let cfg = parse_config(&state);
        let tasks = parse_tasks(&state);
        let Some(task_id) = current_task_id(&state) else {
            return Err(GraphError::UnknownNode("fix_bug: no current task id in state".to_string()));
        };
        let Some(mut task) = tasks.get(&task_id).cloned() else {
            return Err(GraphError::UnknownNode(format!("fix_bug: unknown task '{task_id}'")));
        };

        let prior_error = task.error.clone().unwrap_or_default();
        let project_dir = PathBuf::from(&cfg.project_dir);
        let loop_config = LoopConfig {
            task_id: task_id.clone(),
            project_dir,
            claude_cmd: cfg.claude_cmd.clone(),
            claude_flags: cfg.claude_flags.clone(),
            max_iterations: cfg.max_iterations,
            iteration_timeout: Duration::from_secs(cfg.iteration_timeout_secs),
            test_timeout: Duration::from_secs(cfg.test_timeout_secs),
            test_files: task.test_files.clone(),
            test_command: cfg.test_command.clone(),
            budget: budget_policy(&cfg, task.budget_spent),
            event_emitter: self.event_emitter.clone(),
            project_name: cfg.project_name.clone(),
        };

        let prompt_task = task.clone();
        let prior_error_for_prompt = prior_error.clone();
        let outcome = run_task_loop(&loop_config, move |ctx| {
            let mut prompt = build_task_prompt(&prompt_task, ctx);
            prompt.push_str(&format!(
                "\n## Prior verification failure\n\n{prior_error_for_prompt}\n"
            ));
            prompt
        })
        .await;

        task.budget_spent += iterations_attempted(&outcome) as f64 * cfg.estimated_iteration_cost;
        match outcome {
            Ok(result) => {
                task.status = TaskStatus::Completed;
                task.iterations_used += result.context.iteration;
                task.error = None;
            }
            Err(err) => {
                task.status = TaskStatus::Failed;
                task.error = Some(err.to_string());
            }
        }

        let attempts = state
            .get("fix_attempts")
            .and_then(|v| v.get(&task_id))
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
            + 1;

        let mut tasks_patch = serde_json::Map::new();
        tasks_patch.insert(task.id.clone(), serde_json::to_value(&task).unwrap_or(Value::Null));
        let mut fix_attempts_patch = serde_json::Map::new();
        fix_attempts_patch.insert(task_id, json!(attempts));

        Ok(NodeOutcome::Done(json!({
            "tasks": Value::Object(tasks_patch),
            "fix_attempts": Value::Object(fix_attempts_patch),
        })))
    }
}

/// `fix_bug` always routes back to `verify_task`; the attempt-ceiling
/// check that decides escalation lives in `verify_task_router`, not here,
/// so a fix that happens to pass still gets the same independent re-check
/// every first-pass implementation does.
pub fn fix_bug_router() -> Router {
    Arc::new(|state: &Value| vec![DispatchRecord::new(VERIFY_TASK_NODE, state.clone())])
}

/// `build_verification`/`escalate` are terminal sinks for this subgraph in
/// isolation; a caller wiring the full engine routes them onward (build
/// verification, the fixer subgraph, human escalation) instead.
pub fn terminal_router() -> Router {
    Arc::new(|_state: &Value| vec![DispatchRecord::new(TERMINAL, Value::Null)])
}

/// Runs once all tasks report complete: a final full test-suite pass, plus
/// the decomposition's optional integration task if one was planned. Folds
/// a failure into `escalate` rather than failing the node outright, so the
/// fixer subgraph gets a crack at it the same way a single task's failure
/// would.
pub struct BuildVerification;

#[async_trait]
impl Node for BuildVerification {
    fn name(&self) -> &str {
        BUILD_VERIFICATION_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let cfg = parse_config(&state);
        let project_dir = PathBuf::from(&cfg.project_dir);
        let framework = crate::orchestrator::iterative_loop::detect_test_framework(&project_dir);
        let (passed, output) = crate::orchestrator::iterative_loop::run_test_command(
            &project_dir,
            framework,
            Duration::from_secs(cfg.test_timeout_secs),
            0,
        )
        .await
        .map_err(|err| GraphError::NodeRetriesExhausted {
            node: BUILD_VERIFICATION_NODE.to_string(),
            source: anyhow::anyhow!(err),
        })?;

        if passed {
            Ok(NodeOutcome::Done(json!({ "build_verified": true })))
        } else {
            Ok(NodeOutcome::Done(json!({
                "build_verified": false,
                "escalate": {
                    "type": "verification_failed",
                    "reason": format!("final build verification failed: {}", truncate(&output, 500)),
                }
            })))
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max])
    }
}

/// A verified build moves on to `quality_gates` rather than `TERMINAL`
/// directly — the security/coverage/approval checks still get a say before
/// the run is considered done.
pub fn build_verification_router() -> Router {
    Arc::new(|state: &Value| {
        if state.get("escalate").is_some() {
            vec![DispatchRecord::new(ESCALATE_NODE, state.clone())]
        } else {
            vec![DispatchRecord::new(crate::nodes::gates::QUALITY_GATES_NODE, state.clone())]
        }
    })
}
