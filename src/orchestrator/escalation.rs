//! Human escalation.
//!
//! Reached whenever a node's router emits `escalate`. In interactive mode
//! this suspends the graph at an interrupt carrying a structured payload;
//! in autonomous mode a deterministic decision ladder (keyed on the error
//! type and the phase's retry count) decides retry, skip-forward, or abort
//! without a human in the loop.

use serde::{Deserialize, Serialize};

use crate::errors::ErrorTaxonomy;

/// Exhausting retries in autonomous mode without a human present stops
/// rather than looping forever.
pub const AUTONOMOUS_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Interactive,
    Autonomous,
}

/// The decision an autonomous run reaches without asking a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AutonomousDecision {
    Retry,
    SkipForward {
        target_phase: u8,
        review_skipped: bool,
    },
    Abort {
        reason: String,
    },
    BestGuessRetry,
}

/// Suspension payload for interactive escalation (§6 human interrupt).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub project: String,
    pub phase: u8,
    pub issue: String,
    pub suggested_actions: Vec<String>,
    pub message: String,
    #[serde(default)]
    pub fixer_diagnosis: Option<String>,
    #[serde(default)]
    pub fixer_result: Option<String>,
    #[serde(default)]
    pub clarifications: Option<Vec<String>>,
}

impl EscalationPayload {
    pub fn new(
        project: impl Into<String>,
        phase: u8,
        issue: impl Into<String>,
        suggested_actions: Vec<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: "escalation".to_string(),
            project: project.into(),
            phase,
            issue: issue.into(),
            suggested_actions,
            message: message.into(),
            fixer_diagnosis: None,
            fixer_result: None,
            clarifications: None,
        }
    }
}

/// The human's (or simulated human's) response to an `EscalationPayload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HumanResponse {
    Retry,
    Skip { target_phase: u8 },
    Continue,
    AnswerClarification { answers: Vec<String> },
    Abort,
}

/// Make the best-effort decision an autonomous run applies for a given
/// error type, given how many times this phase has already retried.
///
/// Grounded precisely on the source's per-error-type autonomous ladder:
/// `planning_error` and `implementation_error` (without a pending
/// clarification) abort once retries are exhausted; `validation_failed`
/// and `verification_failed` instead skip forward with `review_skipped`
/// set, since there is no human to make the call and forward progress
/// with a flagged warning beats stalling forever.
pub fn make_autonomous_decision(
    error_type: &str,
    retry_count: u32,
    current_phase: u8,
    has_pending_clarification: bool,
) -> AutonomousDecision {
    if error_type == "implementation_error" && has_pending_clarification {
        return AutonomousDecision::BestGuessRetry;
    }

    let exhausted = retry_count >= AUTONOMOUS_MAX_RETRIES;

    match error_type {
        "planning_error" => {
            if exhausted {
                AutonomousDecision::Abort {
                    reason: "planning failed after exhausting autonomous retries".to_string(),
                }
            } else {
                AutonomousDecision::Retry
            }
        }
        "validation_failed" => {
            if exhausted {
                AutonomousDecision::SkipForward {
                    target_phase: 3,
                    review_skipped: true,
                }
            } else {
                AutonomousDecision::Retry
            }
        }
        "implementation_error" => {
            if exhausted {
                AutonomousDecision::Abort {
                    reason: "implementation failed after exhausting autonomous retries"
                        .to_string(),
                }
            } else {
                AutonomousDecision::Retry
            }
        }
        "verification_failed" => {
            if exhausted {
                AutonomousDecision::SkipForward {
                    target_phase: 5,
                    review_skipped: true,
                }
            } else {
                AutonomousDecision::Retry
            }
        }
        _ => {
            if retry_count >= 1 {
                AutonomousDecision::Abort {
                    reason: format!("unrecognized error type '{error_type}' after one retry"),
                }
            } else {
                let _ = current_phase;
                AutonomousDecision::Retry
            }
        }
    }
}

/// Build the suggested-actions list shown to a human for a given error type.
pub fn suggested_actions_for(error_type: &str) -> Vec<String> {
    match error_type {
        "planning_error" => vec![
            "Retry planning with adjusted constraints".to_string(),
            "Edit the plan manually and continue".to_string(),
        ],
        "validation_failed" => vec![
            "Address reviewer-flagged blocking issues".to_string(),
            "Skip validation and proceed to implementation".to_string(),
        ],
        "implementation_error" => vec![
            "Answer the implementer's clarifying question".to_string(),
            "Retry the task".to_string(),
            "Mark the task failed and continue".to_string(),
        ],
        "verification_failed" => vec![
            "Inspect the failing build output".to_string(),
            "Retry verification".to_string(),
            "Accept with warnings and complete".to_string(),
        ],
        _ => vec!["Abort the run".to_string()],
    }
}

/// Dispatch an escalation given the run's execution mode. Returns `None`
/// when interactive mode requires the graph to suspend on an interrupt —
/// the caller is responsible for constructing the payload via
/// `EscalationPayload::new` and raising it.
pub fn dispatch(
    mode: ExecutionMode,
    error_type: &str,
    retry_count: u32,
    current_phase: u8,
    has_pending_clarification: bool,
) -> Option<AutonomousDecision> {
    match mode {
        ExecutionMode::Interactive => None,
        ExecutionMode::Autonomous => Some(make_autonomous_decision(
            error_type,
            retry_count,
            current_phase,
            has_pending_clarification,
        )),
    }
}

/// Convenience: derive the taxonomy string an `ErrorTaxonomy` implementer
/// maps to, so callers holding a typed error can escalate without manually
/// restating its string form.
pub fn error_type_of<E: ErrorTaxonomy>(err: &E) -> &'static str {
    err.error_type()
}
