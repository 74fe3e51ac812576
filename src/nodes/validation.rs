//! Dual-reviewer validation and verification nodes.
//!
//! Two reviewer agents run in parallel via the graph's own fan-out rather
//! than a hand-rolled `tokio::join!` here — each reviewer is registered as
//! its own node so a reviewer timeout shows up in the checkpoint trail the
//! same way any other node failure would. `run_dual_review` is the shared
//! decision logic both the Phase 2 validation node and the Phase 4
//! verification node call with their own thresholds.
//!
//! Grounded on `review::dispatcher`'s specialist fan-out plus
//! `review::arbiter`'s escalate/fix/proceed vocabulary, generalized from
//! named review specialists to the two-named-agent, penalty-on-fallback
//! protocol described for this engine.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::GraphError;
use crate::graph::{DispatchRecord, Node, NodeOutcome, Router};
use crate::orchestrator::agent_runner::{self, AgentInvocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingleAgentPreference {
    Any,
    Cursor,
    Gemini,
}

#[derive(Debug, Clone)]
pub struct DualReviewConfig {
    pub reviewer_a_binary: String,
    pub reviewer_b_binary: String,
    pub per_reviewer_timeout: Duration,
    pub allow_single_agent_approval: bool,
    pub single_agent_score_penalty: f64,
    pub single_agent_minimum_score: f64,
    pub single_agent_preference: SingleAgentPreference,
}

impl DualReviewConfig {
    /// Reviewers score on a 0-10 scale (see `ReviewerVerdict`), so the
    /// single-agent fallback's penalty and floor are scaled to match: a
    /// penalty of 1.0 point and a floor of 6.0 roughly mirror the old
    /// 0-1-scale defaults (0.15 / 0.7) without being trivially cleared by
    /// any non-zero score.
    pub fn new(reviewer_a_binary: impl Into<String>, reviewer_b_binary: impl Into<String>) -> Self {
        Self {
            reviewer_a_binary: reviewer_a_binary.into(),
            reviewer_b_binary: reviewer_b_binary.into(),
            per_reviewer_timeout: Duration::from_secs(300),
            allow_single_agent_approval: true,
            single_agent_score_penalty: 1.0,
            single_agent_minimum_score: 6.0,
            single_agent_preference: SingleAgentPreference::Any,
        }
    }
}

/// A reviewer's structured verdict, parsed out of its stdout. `score` is on
/// a 0-10 scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerVerdict {
    pub approved: bool,
    #[serde(default = "default_score")]
    pub score: f64,
    #[serde(default)]
    pub blocking_issues: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

fn default_score() -> f64 {
    10.0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DualReviewVerdict {
    Approved,
    RetryPlanning,
    Escalate,
}

#[derive(Debug, Clone)]
pub struct DualReviewOutcome {
    pub verdict: DualReviewVerdict,
    pub summary: String,
    pub blocking_issues: Vec<String>,
}

async fn call_reviewer(binary: &str, prompt: &str, cwd: &Path, timeout: Duration) -> Option<ReviewerVerdict> {
    let env = HashMap::new();
    let result = agent_runner::invoke(AgentInvocation {
        agent_kind: binary,
        prompt,
        allowed_tools: &[],
        max_turns: None,
        timeout,
        env_overrides: &env,
        cwd,
    })
    .await;

    if !result.success {
        return None;
    }
    agent_runner::extract_json(&result.stdout).and_then(|v| serde_json::from_value(v).ok())
}

/// Run both reviewers in parallel, apply the single-agent fallback policy
/// on a timeout/error, and return a verdict the caller routes on.
pub async fn run_dual_review(config: &DualReviewConfig, prompt: &str, cwd: &Path, retry_ceiling_exhausted: bool) -> DualReviewOutcome {
    let (verdict_a, verdict_b) = tokio::join!(
        call_reviewer(&config.reviewer_a_binary, prompt, cwd, config.per_reviewer_timeout),
        call_reviewer(&config.reviewer_b_binary, prompt, cwd, config.per_reviewer_timeout),
    );

    match (verdict_a, verdict_b) {
        (Some(a), Some(b)) => {
            let mut blocking = a.blocking_issues.clone();
            blocking.extend(b.blocking_issues.clone());
            if a.approved && b.approved && blocking.is_empty() {
                DualReviewOutcome {
                    verdict: DualReviewVerdict::Approved,
                    summary: format!("both reviewers approved: {} / {}", a.summary, b.summary),
                    blocking_issues: Vec::new(),
                }
            } else if retry_ceiling_exhausted {
                DualReviewOutcome {
                    verdict: DualReviewVerdict::Escalate,
                    summary: "dual review rejected and the retry ceiling is exhausted".to_string(),
                    blocking_issues: blocking,
                }
            } else {
                DualReviewOutcome {
                    verdict: DualReviewVerdict::RetryPlanning,
                    summary: format!("reviewer rejection: {} / {}", a.summary, b.summary),
                    blocking_issues: blocking,
                }
            }
        }
        (single, other) if single.is_some() || other.is_some() => {
            let (verdict, is_a) = match single {
                Some(v) => (v, true),
                None => (other.unwrap(), false),
            };
            single_agent_fallback(config, verdict, is_a)
        }
        (None, None) => DualReviewOutcome {
            verdict: DualReviewVerdict::Escalate,
            summary: "both reviewers timed out or errored".to_string(),
            blocking_issues: Vec::new(),
        },
    }
}

fn single_agent_fallback(config: &DualReviewConfig, verdict: ReviewerVerdict, from_reviewer_a: bool) -> DualReviewOutcome {
    if !config.allow_single_agent_approval {
        return DualReviewOutcome {
            verdict: DualReviewVerdict::Escalate,
            summary: "one reviewer failed and single-agent approval is disabled".to_string(),
            blocking_issues: verdict.blocking_issues,
        };
    }

    let preferred = matches!(
        (config.single_agent_preference, from_reviewer_a),
        (SingleAgentPreference::Any, _) | (SingleAgentPreference::Cursor, true) | (SingleAgentPreference::Gemini, false)
    );

    let penalized_score = verdict.score - config.single_agent_score_penalty;
    if verdict.approved && penalized_score >= config.single_agent_minimum_score {
        let mut summary = format!(
            "[Single-agent review, score penalty applied] {}",
            verdict.summary
        );
        if !preferred {
            summary.push_str(" (fallback to non-preferred reviewer)");
        }
        DualReviewOutcome {
            verdict: DualReviewVerdict::Approved,
            summary,
            blocking_issues: Vec::new(),
        }
    } else {
        DualReviewOutcome {
            verdict: DualReviewVerdict::Escalate,
            summary: format!(
                "single surviving reviewer's penalized score {penalized_score:.2} fell below the minimum {:.2}",
                config.single_agent_minimum_score
            ),
            blocking_issues: verdict.blocking_issues,
        }
    }
}

/// Plan-level review node, registered as `nodes::planning::TASK_BREAKDOWN_NODE`
/// ("task_breakdown") — the hop `planning_router` sends a successful plan
/// through before task selection begins. Retries planning on rejection up
/// to `max_plan_review_attempts`, then escalates once that ceiling is hit.
pub struct PlanReview;

fn parse_dual_review_config(state: &Value) -> (DualReviewConfig, u32) {
    let max_attempts = state
        .get("plan_review_config")
        .and_then(|c| c.get("max_attempts"))
        .and_then(|v| v.as_u64())
        .unwrap_or(3) as u32;

    let config = state
        .get("plan_review_config")
        .map(|c| DualReviewConfig {
            reviewer_a_binary: c.get("reviewer_a_binary").and_then(|v| v.as_str()).unwrap_or("cursor-agent").to_string(),
            reviewer_b_binary: c.get("reviewer_b_binary").and_then(|v| v.as_str()).unwrap_or("gemini").to_string(),
            per_reviewer_timeout: Duration::from_secs(
                c.get("per_reviewer_timeout_secs").and_then(|v| v.as_u64()).unwrap_or(300),
            ),
            allow_single_agent_approval: c.get("allow_single_agent_approval").and_then(|v| v.as_bool()).unwrap_or(true),
            single_agent_score_penalty: c.get("single_agent_score_penalty").and_then(|v| v.as_f64()).unwrap_or(1.0),
            single_agent_minimum_score: c.get("single_agent_minimum_score").and_then(|v| v.as_f64()).unwrap_or(6.0),
            single_agent_preference: SingleAgentPreference::Any,
        })
        .unwrap_or_else(|| DualReviewConfig::new("cursor-agent", "gemini"));

    (config, max_attempts)
}

#[async_trait]
impl Node for PlanReview {
    fn name(&self) -> &str {
        crate::nodes::planning::TASK_BREAKDOWN_NODE
    }

    async fn run(&self, state: Value) -> Result<NodeOutcome, GraphError> {
        let (config, max_attempts) = parse_dual_review_config(&state);
        let attempts = state.get("plan_review_attempts").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        let project_dir = state
            .get("plan_review_config")
            .and_then(|c| c.get("project_dir"))
            .and_then(|v| v.as_str())
            .unwrap_or(".");
        let plan = state.get("plan").cloned().unwrap_or(Value::Null);
        let prompt = format!(
            "Review this task breakdown plan for soundness before implementation begins.\n\n{}",
            serde_json::to_string_pretty(&plan).unwrap_or_default()
        );

        let outcome = run_dual_review(&config, &prompt, Path::new(project_dir), attempts >= max_attempts).await;

        match outcome.verdict {
            DualReviewVerdict::Approved => Ok(NodeOutcome::Done(json!({
                "plan_review": { "approved": true, "summary": outcome.summary },
            }))),
            DualReviewVerdict::RetryPlanning => Ok(NodeOutcome::Done(json!({
                "plan_review": { "approved": false, "summary": outcome.summary, "blocking_issues": outcome.blocking_issues },
                "plan_review_attempts": attempts + 1,
            }))),
            DualReviewVerdict::Escalate => Ok(NodeOutcome::Done(json!({
                "escalate": { "type": "validation_failed", "reason": outcome.summary },
                "plan_review": { "approved": false, "summary": outcome.summary, "blocking_issues": outcome.blocking_issues },
            }))),
        }
    }
}

pub fn plan_review_router() -> Router {
    Arc::new(|state: &Value| {
        if state.get("escalate").is_some() {
            return vec![DispatchRecord::new(crate::nodes::task_subgraph::ESCALATE_NODE, state.clone())];
        }
        let approved = state.get("plan_review").and_then(|r| r.get("approved")).and_then(|v| v.as_bool()).unwrap_or(false);
        if approved {
            vec![DispatchRecord::new(crate::nodes::task_subgraph::SELECT_TASK_NODE, state.clone())]
        } else {
            vec![DispatchRecord::new(crate::nodes::planning::PLANNING_NODE, state.clone())]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(approved: bool, score: f64) -> ReviewerVerdict {
        ReviewerVerdict {
            approved,
            score,
            blocking_issues: Vec::new(),
            summary: "ok".to_string(),
        }
    }

    #[test]
    fn single_agent_fallback_approves_when_penalized_score_clears_the_minimum() {
        let config = DualReviewConfig::new("cursor", "gemini");
        let outcome = single_agent_fallback(&config, verdict(true, 9.0), true);
        assert_eq!(outcome.verdict, DualReviewVerdict::Approved);
        assert!(outcome.summary.contains("Single-agent review"));
    }

    #[test]
    fn single_agent_fallback_escalates_when_penalized_score_misses_the_minimum() {
        let config = DualReviewConfig::new("cursor", "gemini");
        let outcome = single_agent_fallback(&config, verdict(true, 6.5), true);
        assert_eq!(outcome.verdict, DualReviewVerdict::Escalate);
    }

    #[test]
    fn single_agent_fallback_escalates_when_disabled() {
        let mut config = DualReviewConfig::new("cursor", "gemini");
        config.allow_single_agent_approval = false;
        let outcome = single_agent_fallback(&config, verdict(true, 10.0), true);
        assert_eq!(outcome.verdict, DualReviewVerdict::Escalate);
    }

    #[test]
    fn single_agent_fallback_notes_non_preferred_reviewer() {
        let mut config = DualReviewConfig::new("cursor", "gemini");
        config.single_agent_preference = SingleAgentPreference::Cursor;
        let outcome = single_agent_fallback(&config, verdict(true, 9.5), false);
        assert_eq!(outcome.verdict, DualReviewVerdict::Approved);
        assert!(outcome.summary.contains("fallback to non-preferred reviewer"));
    }

    #[tokio::test]
    async fn run_dual_review_escalates_when_both_reviewers_are_unreachable() {
        let config = DualReviewConfig::new("definitely-not-a-real-reviewer-a", "definitely-not-a-real-reviewer-b");
        let cwd = std::env::temp_dir();
        let outcome = run_dual_review(&config, "review this plan", &cwd, false).await;
        assert_eq!(outcome.verdict, DualReviewVerdict::Escalate);
    }

    #[tokio::test]
    async fn plan_review_escalates_when_reviewers_are_unreachable_and_attempts_are_exhausted() {
        let state = json!({
            "plan": {"tasks": []},
            "plan_review_config": {
                "reviewer_a_binary": "definitely-not-a-real-reviewer-a",
                "reviewer_b_binary": "definitely-not-a-real-reviewer-b",
                "project_dir": std::env::temp_dir().to_str().unwrap(),
                "max_attempts": 2,
            },
            "plan_review_attempts": 2,
        });
        let outcome = PlanReview.run(state).await.unwrap();
        let NodeOutcome::Done(patch) = outcome else { panic!("expected Done") };
        assert_eq!(patch["escalate"]["type"], "validation_failed");
    }

    #[test]
    fn plan_review_router_sends_an_approved_plan_to_select_task() {
        let router = plan_review_router();
        let state = json!({"plan_review": {"approved": true}});
        assert_eq!(router(&state)[0].destination, crate::nodes::task_subgraph::SELECT_TASK_NODE);
    }

    #[test]
    fn plan_review_router_retries_planning_when_not_yet_escalated() {
        let router = plan_review_router();
        let state = json!({"plan_review": {"approved": false}});
        assert_eq!(router(&state)[0].destination, crate::nodes::planning::PLANNING_NODE);
    }

    #[test]
    fn plan_review_router_escalates_when_state_carries_an_escalation() {
        let router = plan_review_router();
        let state = json!({"escalate": {"type": "validation_failed"}, "plan_review": {"approved": false}});
        assert_eq!(router(&state)[0].destination, crate::nodes::task_subgraph::ESCALATE_NODE);
    }
}
