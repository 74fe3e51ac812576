//! Quality and security gates, run once `build_verification` reports a
//! passing build. Reads the `quality`/`security`/`workflow_features`
//! sections `workflow_config::WorkflowConfig::to_initial_state` seeds into
//! the graph's initial state and decides whether the run may proceed,
//! needs to escalate, or needs a human to sign off before the next phase.
//!
//! The security check is grounded on `review::dispatcher`'s existing
//! `SecuritySentinel` gating specialist (the same one the sequential phase
//! runner dispatches via `orchestrator::review_integration`), pointed at the
//! files every completed task touched. The approval suspension reuses
//! `orchestrator::escalation::EscalationPayload`, the same envelope
//! `human_escalation` suspends with, tagged with a different `type` so a
//! resuming caller can tell a sign-off request apart from an error.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::decomposition::types::{DecompositionTask, TaskStatus};
use crate::errors::GraphError;
use crate::graph::{DispatchRecord, Node, NodeOutcome, Router, TERMINAL};
use crate::nodes::task_subgraph::{parse_config, ESCALATE_NODE};
use crate::orchestrator::escalation::EscalationPayload;
use crate::review::{
    DispatcherConfig, FindingSeverity, PhaseReviewConfig, ReviewDispatcher, ReviewSpecialist, SpecialistType,
};
use crate::workflow_config::{QualitySection, SecuritySection, WorkflowFeaturesSection};

pub const QUALITY_GATES_NODE: &str = "quality_gates";

fn parse_section<T: serde::de::DeserializeOwned + Default>(state: &Value, key: &str) -> T {
    state.get(key).cloned().and_then(|v| serde_json::from_value(v).ok()).unwrap_or_default()
}

/// Every file a completed task reported creating or modifying, deduplicated.
/// Tasks still pending or in progress contribute nothing yet; a fix-bug
/// pass revisits the same files and they're already in the set.
fn changed_files(state: &Value) -> Vec<String> {
    let mut files: HashSet<String> = HashSet::new();
    if let Some(tasks) = state.get("tasks").and_then(|v| v.as_object()) {
        for raw in tasks.values() {
            let Ok(task) = serde_json::from_value::<DecompositionTask>(raw.clone()) else {
                continue;
            };
            if task.status != TaskStatus::Completed {
                continue;
            }
            files.extend(task.files.iter().cloned());
            files.extend(task.files_to_create.iter().cloned());
            files.extend(task.files_to_modify.iter().cloned());
        }
    }
    files.into_iter().collect()
}

/// Maps a config severity name (`"critical"`, `"high"`, `"medium"`,
/// `"low"`) onto the finding severities the review system actually
/// produces. `FindingSeverity` has no critical/high split of its own, so
/// both map to `Error` — the only severity this codebase treats as
/// blocking on its own.
fn severity_blocks(severity: FindingSeverity, blocking: &[String]) -> bool {
    blocking.iter().any(|name| {
        matches!(
            (name.to_lowercase().as_str(), severity),
            ("critical", FindingSeverity::Error)
                | ("high", FindingSeverity::Error)
                | ("medium", FindingSeverity::Warning)
                | ("low", FindingSeverity::Info)
                | ("info", FindingSeverity::Info)
                | ("note", FindingSeverity::Note)
        )
    })
}

async fn run_security_scan(
    project_dir: &str,
    claude_cmd: &str,
    files: Vec<String>,
    security: &SecuritySection,
) -> Result<Option<String>, GraphError> {
    let dispatcher_config = DispatcherConfig::default().with_claude_cmd(claude_cmd).with_working_dir(PathBuf::from(project_dir));
    let dispatcher = ReviewDispatcher::new(dispatcher_config);
    let review_config = PhaseReviewConfig::new("quality_gates", "security scan")
        .add_specialist(ReviewSpecialist::gating(SpecialistType::SecuritySentinel))
        .with_files_changed(files);

    let result = dispatcher.dispatch(review_config).await.map_err(|source| GraphError::NodeRetriesExhausted {
        node: QUALITY_GATES_NODE.to_string(),
        source,
    })?;

    let blocking_finding = result
        .aggregation
        .reports
        .iter()
        .flat_map(|report| report.findings.iter())
        .find(|finding| severity_blocks(finding.severity(), &security.blocking_severities));

    Ok(blocking_finding.map(|finding| format!("{}: {}", finding.file(), finding.issue())))
}

/// Runs after `build_verification`. Three independent checks, each gated
/// on its own `workflow.features.*` flag: a quality check (build result
/// plus, when configured, a coverage floor), a security scan dispatched
/// through the same specialist the sequential runner uses, and an
/// approval suspension when the run has just finished a phase named in
/// `workflow.approval_phases`.
pub struct QualityGates;

#[async_trait]
impl Node for QualityGates {
    fn name(&self) -> &str {
        QUALITY_GATES_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let features: WorkflowFeaturesSection = parse_section(&state, "workflow_features");
        let quality: QualitySection = parse_section(&state, "quality");
        let security: SecuritySection = parse_section(&state, "security");

        if features.coverage_check && quality.coverage_blocking {
            if let Some(coverage) = state.get("coverage_percent").and_then(|v| v.as_f64())
                && coverage < quality.coverage_threshold
            {
                return Ok(NodeOutcome::Done(json!({
                    "gates_passed": false,
                    "escalate": {
                        "type": "quality_gate_failed",
                        "reason": format!(
                            "coverage {:.1}% is below the required {:.1}%",
                            coverage, quality.coverage_threshold
                        ),
                    }
                })));
            }
        }

        if features.security_scan && security.enabled {
            let cfg = parse_config(&state);
            let files = changed_files(&state);
            if !files.is_empty() {
                if let Some(finding) = run_security_scan(&cfg.project_dir, &cfg.claude_cmd, files, &security).await? {
                    return Ok(NodeOutcome::Done(json!({
                        "gates_passed": false,
                        "escalate": {
                            "type": "quality_gate_failed",
                            "reason": format!("security scan blocked on: {}", finding),
                        }
                    })));
                }
            }
        }

        if features.approval_gates {
            let current_phase = state.get("current_phase").and_then(|v| v.as_u64()).unwrap_or(0) as u8;
            if features_approval_phase(&features, current_phase) {
                let payload = EscalationPayload {
                    kind: "approval_gate".to_string(),
                    ..EscalationPayload::new(
                        state.get("config").and_then(|c| c.get("project_name")).and_then(|v| v.as_str()).unwrap_or("").to_string(),
                        current_phase,
                        format!("phase {} requires sign-off before continuing", current_phase),
                        vec!["approve".to_string(), "reject".to_string()],
                        "build and gate checks passed; awaiting approval to continue".to_string(),
                    )
                };
                return Ok(NodeOutcome::Interrupt {
                    state: state.clone(),
                    payload: serde_json::to_value(payload).unwrap_or(Value::Null),
                });
            }
        }

        Ok(NodeOutcome::Done(json!({ "gates_passed": true })))
    }
}

fn features_approval_phase(features: &WorkflowFeaturesSection, current_phase: u8) -> bool {
    features.approval_phases.contains(&current_phase)
}

/// A clean pass routes to `TERMINAL` (a caller wiring the full engine
/// routes that onward); a gate failure routes to `escalate`, same as
/// `build_verification_router`.
pub fn quality_gates_router() -> Router {
    Arc::new(|state: &Value| {
        if state.get("escalate").is_some() {
            vec![DispatchRecord::new(ESCALATE_NODE, state.clone())]
        } else {
            vec![DispatchRecord::new(TERMINAL, state.clone())]
        }
    })
}
