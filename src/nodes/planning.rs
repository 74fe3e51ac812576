//! The planning node.
//!
//! Invokes a planner agent once, expecting a structured plan envelope —
//! reusing `decomposition::types::DecompositionResult` rather than
//! inventing a parallel "Plan" type, since a plan's shape (tasks +
//! optional integration task + analysis) is exactly that type's shape.
//! Retries on parse/execution failure up to `max_attempts`, escalating
//! only once attempts are exhausted.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::decomposition::types::DecompositionResult;
use crate::errors::GraphError;
use crate::graph::{DispatchRecord, Node, NodeOutcome, Router};
use crate::orchestrator::agent_runner::{self, AgentInvocation};

pub const PLANNING_NODE: &str = "planning";
pub const TASK_BREAKDOWN_NODE: &str = "task_breakdown";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningConfig {
    pub planner_binary: String,
    pub project_dir: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    600
}

fn parse_config(state: &Value) -> PlanningConfig {
    state
        .get("planning_config")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or(PlanningConfig {
            planner_binary: "claude".to_string(),
            project_dir: ".".to_string(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
        })
}

pub struct Planning;

#[async_trait]
impl Node for Planning {
    fn name(&self) -> &str {
        PLANNING_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let cfg = parse_config(&state);
        let prompt = state
            .get("plan_prompt")
            .and_then(|v| v.as_str())
            .unwrap_or("Produce a task breakdown plan for this project.")
            .to_string();

        let mut last_error = String::new();
        let env = HashMap::new();

        for attempt in 1..=cfg.max_attempts {
            let result = agent_runner::invoke(AgentInvocation {
                agent_kind: &cfg.planner_binary,
                prompt: &prompt,
                allowed_tools: &[],
                max_turns: None,
                timeout: Duration::from_secs(cfg.timeout_secs),
                env_overrides: &env,
                cwd: Path::new(&cfg.project_dir),
            })
            .await;

            if !result.success {
                last_error = result.error.unwrap_or_else(|| "planner agent failed".to_string());
                continue;
            }

            let Some(parsed) = agent_runner::extract_json(&result.stdout) else {
                last_error = format!("attempt {attempt}: planner output had no parseable JSON plan");
                continue;
            };

            match serde_json::from_value::<DecompositionResult>(parsed) {
                Ok(plan) => return Ok(NodeOutcome::Done(plan_into_state(plan))),
                Err(err) => {
                    last_error = format!("attempt {attempt}: plan envelope failed to parse: {err}");
                }
            }
        }

        Ok(NodeOutcome::Done(json!({
            "escalate": {
                "reason": format!("planning failed after {} attempts", cfg.max_attempts),
                "error": last_error,
            }
        })))
    }
}

/// Fold the plan's tasks into the id-keyed `tasks` map the task subgraph
/// expects, alongside the raw `plan` for anything that wants the
/// integration task or analysis text.
fn plan_into_state(plan: DecompositionResult) -> Value {
    let mut tasks_map = serde_json::Map::new();
    for task in plan.all_tasks() {
        tasks_map.insert(task.id.clone(), serde_json::to_value(&task).unwrap_or(Value::Null));
    }
    json!({
        "plan": plan,
        "tasks": Value::Object(tasks_map),
    })
}

/// Escalate on failure; otherwise hand off to `task_breakdown`, which
/// derives the ordered task sequence (already folded into `tasks` here,
/// so `task_breakdown` mainly exists as the named seam the fixer subgraph
/// and human escalation route back to after a planning retry).
pub fn planning_router() -> Router {
    Arc::new(|state: &Value| {
        if state.get("escalate").is_some() {
            return vec![DispatchRecord::new(crate::nodes::task_subgraph::ESCALATE_NODE, state.clone())];
        }
        vec![DispatchRecord::new(TASK_BREAKDOWN_NODE, state.clone())]
    })
}
