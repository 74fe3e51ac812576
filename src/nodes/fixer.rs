//! The fixer subgraph.
//!
//! `error_dispatch` (registered under the graph as node name `"escalate"`,
//! [`crate::nodes::task_subgraph::ESCALATE_NODE`]) is the single entry
//! point every escalating node routes to. Its router decides whether the
//! error enters the fixer (`fixer_enabled`, circuit breaker closed, error
//! type auto-fixable) or goes straight to human escalation.
//!
//! Fixer topology: `triage -> diagnose -> {apply | validate -> apply |
//! research -> validate -> apply} -> verify -> {resume | escalate}`.
//! `diagnose` picks the path; risky fixes (security-sensitive edits) route
//! through `validate` before `apply`. A run of consecutive fixer failures
//! trips the circuit breaker, after which `error_dispatch` stops offering
//! the fixer at all.
//!
//! Grounded on `orchestrator::errors_aggregator::ErrorAggregator` for
//! dedup/fingerprint/resolution bookkeeping and `orchestrator::escalation`
//! for the human-escalation handoff this subgraph falls back to.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::GraphError;
use crate::graph::{DispatchRecord, Node, NodeOutcome, Router};
use crate::nodes::task_subgraph::{ESCALATE_NODE, SELECT_TASK_NODE};
use crate::orchestrator::agent_runner::{self, AgentInvocation};
use crate::orchestrator::errors_aggregator::{AggregatedError, ErrorAggregator, ErrorSource};

pub const HUMAN_ESCALATION_NODE: &str = "human_escalation";
pub const FIXER_TRIAGE_NODE: &str = "fixer_triage";
pub const FIXER_DIAGNOSE_NODE: &str = "fixer_diagnose";
pub const FIXER_RESEARCH_NODE: &str = "fixer_research";
pub const FIXER_VALIDATE_NODE: &str = "fixer_validate";
pub const FIXER_APPLY_NODE: &str = "fixer_apply";
pub const FIXER_VERIFY_NODE: &str = "fixer_verify";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixerConfig {
    #[serde(default)]
    pub fixer_enabled: bool,
    #[serde(default = "default_auto_fixable")]
    pub auto_fixable_error_types: Vec<String>,
    #[serde(default = "default_risky_types")]
    pub risky_error_types: Vec<String>,
    #[serde(default = "default_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    #[serde(default = "default_fixer_binary")]
    pub fixer_binary: String,
    #[serde(default)]
    pub project_dir: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_auto_fixable() -> Vec<String> {
    vec!["test_failure".to_string(), "implementation_error".to_string()]
}

fn default_risky_types() -> Vec<String> {
    vec!["security".to_string(), "auth".to_string(), "credentials".to_string()]
}

fn default_breaker_threshold() -> u32 {
    3
}

fn default_fixer_binary() -> String {
    "claude".to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

fn parse_config(state: &Value) -> FixerConfig {
    state
        .get("fixer_config")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or(FixerConfig {
            fixer_enabled: false,
            auto_fixable_error_types: default_auto_fixable(),
            risky_error_types: default_risky_types(),
            circuit_breaker_threshold: default_breaker_threshold(),
            fixer_binary: default_fixer_binary(),
            project_dir: ".".to_string(),
            timeout_secs: default_timeout_secs(),
        })
}

/// `errors` is an object keyed by fingerprint, not an array — the graph's
/// merge policy appends plain arrays (right for independent event logs,
/// wrong for a record that gets updated in place, e.g. marked resolved).
/// Keying by fingerprint gets correct last-write-wins-per-field merge for
/// free from `graph::merge`'s recursive object handling, same rationale as
/// keying `tasks` by task id.
fn load_errors(state: &Value) -> ErrorAggregator {
    let errors: Vec<AggregatedError> = state
        .get("errors")
        .and_then(|v| v.as_object())
        .map(|obj| obj.values().filter_map(|raw| serde_json::from_value(raw.clone()).ok()).collect())
        .unwrap_or_default();
    ErrorAggregator::from_errors(errors)
}

fn errors_to_value(aggregator: &ErrorAggregator) -> Value {
    let mut map = serde_json::Map::new();
    for err in aggregator.get_all_errors() {
        map.insert(err.fingerprint.clone(), serde_json::to_value(err).unwrap_or(Value::Null));
    }
    Value::Object(map)
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

/// Records every escalation into the durable error list, then hands off to
/// either the fixer or human escalation. The decision itself lives in
/// `error_dispatch_router` since it's pure routing logic over already-merged
/// state, not work the node needs to perform.
pub struct ErrorDispatch;

#[async_trait]
impl Node for ErrorDispatch {
    fn name(&self) -> &str {
        ESCALATE_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let (error_type, message) = escalate_kind(&state);
        let mut aggregator = load_errors(&state);
        aggregator.add_error(&error_type, &message, ErrorSource::Graph, None, None, None, None);
        Ok(NodeOutcome::Done(json!({ "errors": errors_to_value(&aggregator) })))
    }
}

pub fn error_dispatch_router() -> Router {
    Arc::new(|state: &Value| {
        let cfg = parse_config(state);
        let (error_type, _) = escalate_kind(state);
        let breaker_open = state.get("circuit_breaker_open").and_then(|v| v.as_bool()).unwrap_or(false);
        let auto_fixable = cfg.auto_fixable_error_types.iter().any(|t| t == &error_type);

        if cfg.fixer_enabled && !breaker_open && auto_fixable {
            vec![DispatchRecord::new(FIXER_TRIAGE_NODE, state.clone())]
        } else {
            vec![DispatchRecord::new(HUMAN_ESCALATION_NODE, state.clone())]
        }
    })
}

/// Classifies the error and records the plain-text diagnosis context the
/// rest of the fixer reads; always proceeds to `diagnose`.
pub struct FixerTriage;

#[async_trait]
impl Node for FixerTriage {
    fn name(&self) -> &str {
        FIXER_TRIAGE_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let (error_type, message) = escalate_kind(&state);
        Ok(NodeOutcome::Done(json!({
            "fixer_triage": { "error_type": error_type, "message": message }
        })))
    }
}

pub fn fixer_triage_router() -> Router {
    Arc::new(|state: &Value| vec![DispatchRecord::new(FIXER_DIAGNOSE_NODE, state.clone())])
}

/// Invokes the fixer agent to produce a diagnosis and a proposed fix plan,
/// then routes by risk: risky error types go through `validate` (directly
/// risky fixes) or `research` first when the diagnosis itself is
/// low-confidence, before `validate`; everything else applies directly.
pub struct FixerDiagnose;

#[async_trait]
impl Node for FixerDiagnose {
    fn name(&self) -> &str {
        FIXER_DIAGNOSE_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let cfg = parse_config(&state);
        let triage = state.get("fixer_triage").cloned().unwrap_or(Value::Null);
        let prompt = format!(
            "Diagnose this failure and propose a fix.\n\n{}",
            serde_json::to_string_pretty(&triage).unwrap_or_default()
        );
        let env = HashMap::new();
        let result = agent_runner::invoke(AgentInvocation {
            agent_kind: &cfg.fixer_binary,
            prompt: &prompt,
            allowed_tools: &[],
            max_turns: None,
            timeout: Duration::from_secs(cfg.timeout_secs),
            env_overrides: &env,
            cwd: Path::new(&cfg.project_dir),
        })
        .await;

        let diagnosis = agent_runner::extract_json(&result.stdout).unwrap_or(json!({
            "confidence": "low",
            "summary": result.stdout,
        }));
        Ok(NodeOutcome::Done(json!({ "fixer_diagnosis": diagnosis })))
    }
}

pub fn fixer_diagnose_router() -> Router {
    Arc::new(|state: &Value| {
        let cfg = parse_config(state);
        let (error_type, _) = escalate_kind(state);
        let is_risky = cfg.risky_error_types.iter().any(|t| error_type.contains(t.as_str()));
        let low_confidence = state
            .get("fixer_diagnosis")
            .and_then(|d| d.get("confidence"))
            .and_then(|v| v.as_str())
            .map(|c| c == "low")
            .unwrap_or(false);

        if low_confidence {
            vec![DispatchRecord::new(FIXER_RESEARCH_NODE, state.clone())]
        } else if is_risky {
            vec![DispatchRecord::new(FIXER_VALIDATE_NODE, state.clone())]
        } else {
            vec![DispatchRecord::new(FIXER_APPLY_NODE, state.clone())]
        }
    })
}

/// Gathers extra context (a codebase search, prior fix history) for a
/// low-confidence diagnosis before validation/apply.
pub struct FixerResearch;

#[async_trait]
impl Node for FixerResearch {
    fn name(&self) -> &str {
        FIXER_RESEARCH_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let cfg = parse_config(&state);
        let diagnosis = state.get("fixer_diagnosis").cloned().unwrap_or(Value::Null);
        let prompt = format!(
            "Research additional context to raise confidence in this diagnosis before a fix is applied.\n\n{}",
            serde_json::to_string_pretty(&diagnosis).unwrap_or_default()
        );
        let env = HashMap::new();
        let result = agent_runner::invoke(AgentInvocation {
            agent_kind: &cfg.fixer_binary,
            prompt: &prompt,
            allowed_tools: &[],
            max_turns: None,
            timeout: Duration::from_secs(cfg.timeout_secs),
            env_overrides: &env,
            cwd: Path::new(&cfg.project_dir),
        })
        .await;
        Ok(NodeOutcome::Done(json!({ "fixer_research": result.stdout })))
    }
}

pub fn fixer_research_router() -> Router {
    Arc::new(|state: &Value| vec![DispatchRecord::new(FIXER_VALIDATE_NODE, state.clone())])
}

/// A second-opinion check on the proposed fix before it touches the
/// workspace, for security-sensitive or otherwise risky edits.
pub struct FixerValidate;

#[async_trait]
impl Node for FixerValidate {
    fn name(&self) -> &str {
        FIXER_VALIDATE_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let cfg = parse_config(&state);
        let diagnosis = state.get("fixer_diagnosis").cloned().unwrap_or(Value::Null);
        let prompt = format!(
            "Review this proposed fix for safety before it is applied. Respond with JSON {{\"safe\": bool, \"concerns\": [string]}}.\n\n{}",
            serde_json::to_string_pretty(&diagnosis).unwrap_or_default()
        );
        let env = HashMap::new();
        let result = agent_runner::invoke(AgentInvocation {
            agent_kind: &cfg.fixer_binary,
            prompt: &prompt,
            allowed_tools: &[],
            max_turns: None,
            timeout: Duration::from_secs(cfg.timeout_secs),
            env_overrides: &env,
            cwd: Path::new(&cfg.project_dir),
        })
        .await;
        let verdict = agent_runner::extract_json(&result.stdout).unwrap_or(json!({"safe": false}));
        Ok(NodeOutcome::Done(json!({ "fixer_validation": verdict })))
    }
}

pub fn fixer_validate_router() -> Router {
    Arc::new(|state: &Value| {
        let safe = state
            .get("fixer_validation")
            .and_then(|v| v.get("safe"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if safe {
            vec![DispatchRecord::new(FIXER_APPLY_NODE, state.clone())]
        } else {
            vec![DispatchRecord::new(HUMAN_ESCALATION_NODE, state.clone())]
        }
    })
}

/// Applies the diagnosed fix via the iterative loop's single-iteration
/// primitive (one agent invocation against the project), then routes to
/// `verify`.
pub struct FixerApply;

#[async_trait]
impl Node for FixerApply {
    fn name(&self) -> &str {
        FIXER_APPLY_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let cfg = parse_config(&state);
        let diagnosis = state.get("fixer_diagnosis").cloned().unwrap_or(Value::Null);
        let prompt = format!(
            "Apply this fix to the project.\n\n{}",
            serde_json::to_string_pretty(&diagnosis).unwrap_or_default()
        );
        let env = HashMap::new();
        let result = agent_runner::invoke(AgentInvocation {
            agent_kind: &cfg.fixer_binary,
            prompt: &prompt,
            allowed_tools: &[],
            max_turns: None,
            timeout: Duration::from_secs(cfg.timeout_secs),
            env_overrides: &env,
            cwd: Path::new(&cfg.project_dir),
        })
        .await;
        Ok(NodeOutcome::Done(json!({ "fixer_applied": result.success })))
    }
}

pub fn fixer_apply_router() -> Router {
    Arc::new(|state: &Value| vec![DispatchRecord::new(FIXER_VERIFY_NODE, state.clone())])
}

/// Re-runs the project's tests after the fix. Success resolves the error
/// and resets the consecutive-failure counter; failure bumps the counter
/// and trips the circuit breaker once the configured threshold is hit.
pub struct FixerVerify;

#[async_trait]
impl Node for FixerVerify {
    fn name(&self) -> &str {
        FIXER_VERIFY_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let cfg = parse_config(&state);
        let project_dir = std::path::PathBuf::from(&cfg.project_dir);
        let framework = crate::orchestrator::iterative_loop::detect_test_framework(&project_dir);
        let (passed, _output) = crate::orchestrator::iterative_loop::run_test_command(
            &project_dir,
            framework,
            Duration::from_secs(cfg.timeout_secs),
            0,
        )
        .await
        .map_err(|err| GraphError::NodeRetriesExhausted {
            node: FIXER_VERIFY_NODE.to_string(),
            source: anyhow::anyhow!(err),
        })?;

        let mut aggregator = load_errors(&state);
        let (error_type, message) = escalate_kind(&state);
        let fingerprint = AggregatedError::fingerprint(&error_type, &message, None, None, None);

        let consecutive_failures = state
            .get("consecutive_fixer_failures")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        if passed {
            aggregator.resolve_error(&fingerprint, "fixer applied a fix and verification passed");
            Ok(NodeOutcome::Done(json!({
                "errors": errors_to_value(&aggregator),
                "consecutive_fixer_failures": 0,
                "circuit_breaker_open": false,
                "escalate": Value::Null,
            })))
        } else {
            let failures = consecutive_failures + 1;
            let breaker_open = failures >= cfg.circuit_breaker_threshold as u64;
            Ok(NodeOutcome::Done(json!({
                "errors": errors_to_value(&aggregator),
                "consecutive_fixer_failures": failures,
                "circuit_breaker_open": breaker_open,
            })))
        }
    }
}

pub fn fixer_verify_router() -> Router {
    Arc::new(|state: &Value| {
        let passed = state.get("consecutive_fixer_failures").and_then(|v| v.as_u64()) == Some(0)
            && state.get("escalate").map(|v| v.is_null()).unwrap_or(false);
        if passed {
            vec![DispatchRecord::new(SELECT_TASK_NODE, state.clone())]
        } else {
            vec![DispatchRecord::new(HUMAN_ESCALATION_NODE, state.clone())]
        }
    })
}
