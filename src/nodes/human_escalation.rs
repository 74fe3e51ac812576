//! Human escalation, the terminal sink every escalating router in the
//! fixer subgraph and the task subgraph falls back to.
//!
//! Interactive runs suspend here: the node returns `NodeOutcome::Interrupt`
//! carrying an `EscalationPayload`, and `GraphRunner::resume` re-enters with
//! whatever `HumanResponse` the caller supplies. Autonomous runs never
//! suspend — `make_autonomous_decision` picks retry, skip-forward, or abort
//! from the error type and how many times this phase has already retried,
//! and the router below translates that decision into the next dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::GraphError;
use crate::graph::{DispatchRecord, Node, NodeOutcome, Router, TERMINAL};
use crate::nodes::task_subgraph::SELECT_TASK_NODE;
use crate::orchestrator::escalation::{
    make_autonomous_decision, AutonomousDecision, EscalationPayload, ExecutionMode,
};

pub const HUMAN_ESCALATION_NODE: &str = "human_escalation";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanEscalationConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub current_phase: u8,
}

fn default_mode() -> String {
    "interactive".to_string()
}

fn parse_config(state: &Value) -> HumanEscalationConfig {
    state
        .get("escalation_config")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or(HumanEscalationConfig {
            mode: default_mode(),
            project: String::new(),
            current_phase: 0,
        })
}

fn execution_mode(cfg: &HumanEscalationConfig) -> ExecutionMode {
    if cfg.mode == "autonomous" {
        ExecutionMode::Autonomous
    } else {
        ExecutionMode::Interactive
    }
}

fn escalate_kind(state: &Value) -> (String, String) {
    let kind = state
        .get("escalate")
        .and_then(|e| e.get("type"))
        .and_then(|v| v.as_str())
        .or_else(|| state.get("escalate").and_then(|e| e.get("reason")).and_then(|v| v.as_str()))
        .unwrap_or("unknown_error")
        .to_string();
    let message = state
        .get("escalate")
        .and_then(|e| e.get("reason"))
        .and_then(|v| v.as_str())
        .unwrap_or("unspecified error")
        .to_string();
    (kind, message)
}

/// In interactive mode, suspends the thread with a structured payload. In
/// autonomous mode, applies the fixed retry/skip/abort ladder and folds the
/// resulting decision into state for the router to act on — no suspension.
pub struct HumanEscalation;

#[async_trait]
impl Node for HumanEscalation {
    fn name(&self) -> &str {
        HUMAN_ESCALATION_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let cfg = parse_config(&state);
        let (error_type, message) = escalate_kind(&state);
        let retry_count = state.get("phase_retry_count").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        let has_pending_clarification =
            state.get("pending_clarification").map(|v| !v.is_null()).unwrap_or(false);

        match execution_mode(&cfg) {
            ExecutionMode::Interactive => {
                let payload = EscalationPayload::new(
                    cfg.project.clone(),
                    cfg.current_phase,
                    message.clone(),
                    crate::orchestrator::escalation::suggested_actions_for(&error_type),
                    message.clone(),
                );
                Ok(NodeOutcome::Interrupt {
                    state: state.clone(),
                    payload: serde_json::to_value(payload).unwrap_or(Value::Null),
                })
            }
            ExecutionMode::Autonomous => {
                let decision =
                    make_autonomous_decision(&error_type, retry_count, cfg.current_phase, has_pending_clarification);
                Ok(NodeOutcome::Done(json!({
                    "autonomous_decision": decision,
                    "phase_retry_count": retry_count + 1,
                })))
            }
        }
    }
}

/// Translates an `AutonomousDecision` into the next dispatch. `Retry` and
/// `BestGuessRetry` both resume task selection — the distinction between
/// them is only meaningful to the prompt the retried task gets, which
/// `select_task`/`implement_task` read off `autonomous_decision` directly.
/// `SkipForward` and `Abort` both end the thread: a skip records
/// `review_skipped` for the handoff brief to surface, an abort records the
/// reason.
pub fn human_escalation_router() -> Router {
    Arc::new(|state: &Value| {
        let decision = state
            .get("autonomous_decision")
            .cloned()
            .and_then(|v| serde_json::from_value::<AutonomousDecision>(v).ok());

        match decision {
            None => vec![DispatchRecord::new(TERMINAL, state.clone())],
            Some(AutonomousDecision::Retry) | Some(AutonomousDecision::BestGuessRetry) => {
                vec![DispatchRecord::new(SELECT_TASK_NODE, state.clone())]
            }
            Some(AutonomousDecision::SkipForward { .. }) | Some(AutonomousDecision::Abort { .. }) => {
                vec![DispatchRecord::new(TERMINAL, state.clone())]
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn interactive_mode_suspends_with_an_escalation_payload() {
        let state = json!({
            "escalate": {"type": "implementation_error", "reason": "task t1 failed"},
            "escalation_config": {"mode": "interactive", "project": "demo", "current_phase": 2},
        });
        let outcome = HumanEscalation.run(state).await.unwrap();
        match outcome {
            NodeOutcome::Interrupt { payload, .. } => {
                assert_eq!(payload["project"], "demo");
                assert_eq!(payload["issue"], "task t1 failed");
            }
            NodeOutcome::Done(_) => panic!("expected an interrupt in interactive mode"),
        }
    }

    #[tokio::test]
    async fn autonomous_mode_retries_without_suspending() {
        let state = json!({
            "escalate": {"type": "planning_error", "reason": "plan envelope unparseable"},
            "escalation_config": {"mode": "autonomous", "project": "demo", "current_phase": 1},
            "phase_retry_count": 0,
        });
        let outcome = HumanEscalation.run(state).await.unwrap();
        let NodeOutcome::Done(patch) = outcome else { panic!("expected Done in autonomous mode") };
        assert_eq!(patch["autonomous_decision"]["action"], "retry");
        assert_eq!(patch["phase_retry_count"], 1);
    }

    #[tokio::test]
    async fn autonomous_mode_aborts_once_retries_are_exhausted() {
        let state = json!({
            "escalate": {"type": "implementation_error", "reason": "task t1 failed repeatedly"},
            "escalation_config": {"mode": "autonomous", "project": "demo", "current_phase": 2},
            "phase_retry_count": 3,
        });
        let outcome = HumanEscalation.run(state).await.unwrap();
        let NodeOutcome::Done(patch) = outcome else { panic!("expected Done") };
        assert_eq!(patch["autonomous_decision"]["action"], "abort");
    }

    #[test]
    fn router_sends_retry_and_best_guess_back_to_select_task() {
        let router = human_escalation_router();
        let retry_state = json!({"autonomous_decision": {"action": "retry"}});
        assert_eq!(router(&retry_state)[0].destination, SELECT_TASK_NODE);

        let best_guess_state = json!({"autonomous_decision": {"action": "best_guess_retry"}});
        assert_eq!(router(&best_guess_state)[0].destination, SELECT_TASK_NODE);
    }

    #[test]
    fn router_terminates_on_skip_forward_abort_or_interactive_suspension() {
        let router = human_escalation_router();
        let skip_state = json!({"autonomous_decision": {"action": "skip_forward", "target_phase": 3, "review_skipped": true}});
        assert_eq!(router(&skip_state)[0].destination, TERMINAL);

        let abort_state = json!({"autonomous_decision": {"action": "abort", "reason": "gave up"}});
        assert_eq!(router(&abort_state)[0].destination, TERMINAL);

        let no_decision_state = json!({});
        assert_eq!(router(&no_decision_state)[0].destination, TERMINAL);
    }
}
