//! Layered configuration for the graph engine, read from
//! `.workflow/config.toml`.
//!
//! Mirrors `forge_config::ForgeToml`'s shape and layering exactly (file ->
//! environment -> CLI, narrowest scope wins) but covers the graph engine's
//! own sections rather than the sequential phase runner's: validation
//! thresholds, quality gates, security scanning, feature toggles, retry
//! policy, dual-review tuning, budget, and logging. `WorkflowConfig::new`
//! reads the file if present and falls back to built-in defaults the same
//! way `ForgeConfig::new` does for `forge.toml`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::graph::RetryPolicy;
use crate::nodes::validation::{DualReviewConfig, SingleAgentPreference};
use crate::orchestrator::budget::BudgetManager;

/// Phase-completion thresholds (0-10 scale, matching `ReviewerVerdict::score`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSection {
    #[serde(default = "default_validation_threshold")]
    pub validation_threshold: f64,
    #[serde(default = "default_verification_threshold")]
    pub verification_threshold: f64,
    #[serde(default = "default_max_phase_retries")]
    pub max_phase_retries: u32,
}

fn default_validation_threshold() -> f64 {
    6.0
}
fn default_verification_threshold() -> f64 {
    7.0
}
fn default_max_phase_retries() -> u32 {
    3
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            validation_threshold: default_validation_threshold(),
            verification_threshold: default_verification_threshold(),
            max_phase_retries: default_max_phase_retries(),
        }
    }
}

/// Build-verification gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySection {
    #[serde(default = "default_coverage_threshold")]
    pub coverage_threshold: f64,
    #[serde(default)]
    pub coverage_blocking: bool,
    #[serde(default = "default_true")]
    pub build_required: bool,
    #[serde(default)]
    pub lint_required: bool,
}

fn default_coverage_threshold() -> f64 {
    70.0
}
fn default_true() -> bool {
    true
}

impl Default for QualitySection {
    fn default() -> Self {
        Self {
            coverage_threshold: default_coverage_threshold(),
            coverage_blocking: false,
            build_required: true,
            lint_required: false,
        }
    }
}

/// Security-scan gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_blocking_severities")]
    pub blocking_severities: Vec<String>,
}

fn default_blocking_severities() -> Vec<String> {
    vec!["critical".to_string(), "high".to_string()]
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            enabled: true,
            blocking_severities: default_blocking_severities(),
        }
    }
}

/// Which optional gates the build-verification node runs, plus which
/// phases require human approval before advancing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowFeaturesSection {
    #[serde(default = "default_true")]
    pub product_validation: bool,
    #[serde(default = "default_true")]
    pub environment_check: bool,
    #[serde(default = "default_true")]
    pub build_verification: bool,
    #[serde(default = "default_true")]
    pub coverage_check: bool,
    #[serde(default = "default_true")]
    pub security_scan: bool,
    #[serde(default)]
    pub approval_gates: bool,
    #[serde(default)]
    pub approval_phases: Vec<u8>,
}

impl Default for WorkflowFeaturesSection {
    fn default() -> Self {
        Self {
            product_validation: true,
            environment_check: true,
            build_verification: true,
            coverage_check: true,
            security_scan: true,
            approval_gates: false,
            approval_phases: Vec::new(),
        }
    }
}

/// One class of retry (agent calls vs. fixer-applied implementation
/// attempts), mapped onto `graph::RetryPolicy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryClassSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_interval_secs")]
    pub initial_interval_secs: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default)]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_interval_secs() -> u64 {
    2
}
fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetryClassSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_interval_secs: default_initial_interval_secs(),
            backoff_factor: default_backoff_factor(),
            jitter: false,
        }
    }
}

impl RetryClassSection {
    /// `jitter` isn't modeled by `RetryPolicy` (the engine's backoff is a
    /// deterministic doubling sequence); it's carried in config for a
    /// future scheduler that wants it, and ignored here.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_interval: std::time::Duration::from_secs(self.initial_interval_secs),
            backoff_factor: self.backoff_factor,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default)]
    pub agent: RetryClassSection,
    #[serde(default)]
    pub implementation: RetryClassSection,
    #[serde(default = "default_max_task_loop_iterations")]
    pub max_task_loop_iterations: u32,
}

fn default_max_task_loop_iterations() -> u32 {
    10
}

/// Dual-reviewer tuning, mapped onto `nodes::validation::DualReviewConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSection {
    #[serde(default = "default_reviewer_timeout_seconds")]
    pub reviewer_timeout_seconds: u64,
    #[serde(default = "default_true")]
    pub allow_single_agent_approval: bool,
    #[serde(default = "default_single_agent_score_penalty")]
    pub single_agent_score_penalty: f64,
    #[serde(default = "default_single_agent_minimum_score")]
    pub single_agent_minimum_score: f64,
    #[serde(default)]
    pub single_agent_preference: SingleAgentPreference,
    #[serde(default)]
    pub log_timeouts: bool,
}

fn default_reviewer_timeout_seconds() -> u64 {
    300
}
fn default_single_agent_score_penalty() -> f64 {
    1.0
}
fn default_single_agent_minimum_score() -> f64 {
    6.0
}

impl Default for SingleAgentPreference {
    fn default() -> Self {
        SingleAgentPreference::Any
    }
}

impl Default for ReviewSection {
    fn default() -> Self {
        Self {
            reviewer_timeout_seconds: default_reviewer_timeout_seconds(),
            allow_single_agent_approval: true,
            single_agent_score_penalty: default_single_agent_score_penalty(),
            single_agent_minimum_score: default_single_agent_minimum_score(),
            single_agent_preference: SingleAgentPreference::Any,
            log_timeouts: false,
        }
    }
}

impl ReviewSection {
    /// Builds a `DualReviewConfig` around this section's thresholds, using
    /// the reviewer binaries the caller already has configured elsewhere
    /// (project config, not this section — reviewer binaries are a project
    /// identity concern, not a review-policy one).
    pub fn to_dual_review_config(&self, reviewer_a_binary: &str, reviewer_b_binary: &str) -> DualReviewConfig {
        DualReviewConfig {
            reviewer_a_binary: reviewer_a_binary.to_string(),
            reviewer_b_binary: reviewer_b_binary.to_string(),
            per_reviewer_timeout: std::time::Duration::from_secs(self.reviewer_timeout_seconds),
            allow_single_agent_approval: self.allow_single_agent_approval,
            single_agent_score_penalty: self.single_agent_score_penalty,
            single_agent_minimum_score: self.single_agent_minimum_score,
            single_agent_preference: self.single_agent_preference,
        }
    }
}

/// Project-wide spend ceiling, mapped onto `orchestrator::budget::BudgetManager`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSection {
    #[serde(default = "default_max_budget")]
    pub max_budget: f64,
    #[serde(default = "default_budget_per_iteration")]
    pub budget_per_iteration: f64,
    #[serde(default = "default_hard_limit")]
    pub hard_limit: f64,
    #[serde(default = "default_fallback_ratio")]
    pub fallback_ratio: f64,
    #[serde(default)]
    pub fallback_model: Option<String>,
}

fn default_max_budget() -> f64 {
    50.0
}
fn default_budget_per_iteration() -> f64 {
    0.05
}
fn default_hard_limit() -> f64 {
    75.0
}
fn default_fallback_ratio() -> f64 {
    0.5
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            max_budget: default_max_budget(),
            budget_per_iteration: default_budget_per_iteration(),
            hard_limit: default_hard_limit(),
            fallback_ratio: default_fallback_ratio(),
            fallback_model: None,
        }
    }
}

impl BudgetSection {
    pub fn to_budget_manager(&self) -> BudgetManager {
        BudgetManager::new(self.max_budget, self.hard_limit, self.fallback_ratio)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// `tracing` setup, read by whoever installs the global subscriber at
/// process start (mirrors `ForgeToml`'s `[claude]`/`[defaults]` ambient
/// settings — this config doesn't construct the subscriber itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_log_directory")]
    pub directory: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_directory() -> String {
    ".workflow/logs".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            directory: default_log_directory(),
        }
    }
}

/// The complete `.workflow/config.toml` structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowToml {
    #[serde(default)]
    pub validation: ValidationSection,
    #[serde(default)]
    pub quality: QualitySection,
    #[serde(default)]
    pub security: SecuritySection,
    #[serde(default)]
    pub workflow: WorkflowFeaturesSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub review: ReviewSection,
    #[serde(default)]
    pub budget: BudgetSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl WorkflowToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse .workflow/config.toml")
    }

    /// Load from `<workflow_dir>/config.toml`, or built-in defaults if the
    /// file doesn't exist yet — a fresh project runs with sane behavior
    /// before a human ever writes the file.
    pub fn load_or_default(workflow_dir: &Path) -> Result<Self> {
        let config_path = workflow_dir.join("config.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize .workflow/config.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

/// Layered runtime configuration: file -> environment -> CLI, narrowest
/// scope wins, same rule `ForgeConfig` applies to `.forge/forge.toml`.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub project_dir: PathBuf,
    pub workflow_dir: PathBuf,
    pub toml: WorkflowToml,
    pub cli_max_budget: Option<f64>,
}

impl WorkflowConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let workflow_dir = project_dir.join(".workflow");
        let toml = WorkflowToml::load_or_default(&workflow_dir)?;
        Ok(Self {
            project_dir,
            workflow_dir,
            toml,
            cli_max_budget: None,
        })
    }

    pub fn with_cli_max_budget(mut self, max_budget: Option<f64>) -> Self {
        self.cli_max_budget = max_budget;
        self
    }

    /// Max project spend (CLI -> env `WORKFLOW_MAX_BUDGET` -> file ->
    /// built-in default), following the same override order
    /// `ForgeConfig::auto_approve_threshold` uses for its own CLI field.
    pub fn max_budget(&self) -> f64 {
        if let Some(cli) = self.cli_max_budget {
            return cli;
        }
        if let Ok(env_val) = std::env::var("WORKFLOW_MAX_BUDGET") {
            if let Ok(parsed) = env_val.parse() {
                return parsed;
            }
        }
        self.toml.budget.max_budget
    }

    /// Log level (env `RUST_LOG` -> file `logging.level` -> built-in
    /// default), matching `tracing_subscriber::EnvFilter`'s own precedence.
    pub fn log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.toml.logging.level.clone())
    }

    pub fn log_dir(&self) -> PathBuf {
        self.project_dir.join(&self.toml.logging.directory)
    }

    /// Builds the JSON fragment merged into the graph's initial state so
    /// every node that calls `state.get("config")`/`state.get("plan_review_config")`
    /// etc. sees these values without each node parsing TOML itself.
    pub fn to_initial_state(&self, project_name: &str, reviewer_a_binary: &str, reviewer_b_binary: &str) -> serde_json::Value {
        serde_json::json!({
            "config": {
                "project_dir": self.project_dir.to_string_lossy(),
                "project_name": project_name,
                "budget_limit": self.max_budget(),
                "budget_hard_limit": self.toml.budget.hard_limit,
                "budget_fallback_ratio": self.toml.budget.fallback_ratio,
                "estimated_iteration_cost": self.toml.budget.budget_per_iteration,
            },
            "plan_review_config": {
                "reviewer_a_binary": reviewer_a_binary,
                "reviewer_b_binary": reviewer_b_binary,
                "per_reviewer_timeout_secs": self.toml.review.reviewer_timeout_seconds,
                "allow_single_agent_approval": self.toml.review.allow_single_agent_approval,
                "single_agent_score_penalty": self.toml.review.single_agent_score_penalty,
                "single_agent_minimum_score": self.toml.review.single_agent_minimum_score,
                "max_attempts": self.toml.validation.max_phase_retries,
            },
            "validation": self.toml.validation,
            "quality": self.toml.quality,
            "security": self.toml.security,
            "workflow_features": self.toml.workflow,
            "retry": self.toml.retry,
            "logging": self.toml.logging,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_empty_config_into_documented_defaults() {
        let toml = WorkflowToml::parse("").unwrap();
        assert_eq!(toml.validation.validation_threshold, 6.0);
        assert_eq!(toml.validation.verification_threshold, 7.0);
        assert_eq!(toml.quality.coverage_threshold, 70.0);
        assert!(!toml.quality.coverage_blocking);
        assert!(toml.security.enabled);
        assert_eq!(toml.security.blocking_severities, vec!["critical", "high"]);
        assert_eq!(toml.budget.max_budget, 50.0);
        assert_eq!(toml.review.single_agent_minimum_score, 6.0);
    }

    #[test]
    fn parses_a_full_section_set() {
        let content = r#"
[validation]
validation_threshold = 5.0
verification_threshold = 8.0
max_phase_retries = 5

[quality]
coverage_threshold = 85.0
coverage_blocking = true

[security]
enabled = false

[workflow]
approval_gates = true
approval_phases = [2, 4]

[retry.agent]
max_attempts = 5

[budget]
max_budget = 100.0
fallback_model = "claude-haiku"

[logging]
level = "debug"
format = "json"
"#;
        let toml = WorkflowToml::parse(content).unwrap();
        assert_eq!(toml.validation.validation_threshold, 5.0);
        assert_eq!(toml.validation.max_phase_retries, 5);
        assert!(toml.quality.coverage_blocking);
        assert!(!toml.security.enabled);
        assert!(toml.workflow.approval_gates);
        assert_eq!(toml.workflow.approval_phases, vec![2, 4]);
        assert_eq!(toml.retry.agent.max_attempts, 5);
        assert_eq!(toml.budget.max_budget, 100.0);
        assert_eq!(toml.budget.fallback_model.as_deref(), Some("claude-haiku"));
        assert_eq!(toml.logging.level, "debug");
        assert_eq!(toml.logging.format, LogFormat::Json);
    }

    #[test]
    fn load_or_default_falls_back_when_the_file_is_missing() {
        let dir = tempdir().unwrap();
        let toml = WorkflowToml::load_or_default(&dir.path().join(".workflow")).unwrap();
        assert_eq!(toml.budget.max_budget, 50.0);
    }

    #[test]
    fn load_or_default_reads_a_present_file() {
        let dir = tempdir().unwrap();
        let workflow_dir = dir.path().join(".workflow");
        std::fs::create_dir_all(&workflow_dir).unwrap();
        std::fs::write(workflow_dir.join("config.toml"), "[budget]\nmax_budget = 12.0\n").unwrap();

        let toml = WorkflowToml::load_or_default(&workflow_dir).unwrap();
        assert_eq!(toml.budget.max_budget, 12.0);
    }

    #[test]
    fn cli_budget_override_wins_over_file_and_default() {
        let dir = tempdir().unwrap();
        let workflow_dir = dir.path().join(".workflow");
        std::fs::create_dir_all(&workflow_dir).unwrap();
        std::fs::write(workflow_dir.join("config.toml"), "[budget]\nmax_budget = 12.0\n").unwrap();

        let config = WorkflowConfig::new(dir.path().to_path_buf())
            .unwrap()
            .with_cli_max_budget(Some(99.0));
        assert_eq!(config.max_budget(), 99.0);
    }

    #[test]
    fn to_initial_state_carries_review_thresholds_into_plan_review_config() {
        let dir = tempdir().unwrap();
        let config = WorkflowConfig::new(dir.path().to_path_buf()).unwrap();
        let state = config.to_initial_state("demo", "cursor-agent", "gemini");
        assert_eq!(state["plan_review_config"]["reviewer_a_binary"], "cursor-agent");
        assert_eq!(state["config"]["budget_limit"], 50.0);
        assert_eq!(state["validation"]["validation_threshold"], 6.0);
    }

    #[test]
    fn retry_class_section_maps_onto_a_retry_policy() {
        let section = RetryClassSection {
            max_attempts: 4,
            initial_interval_secs: 3,
            backoff_factor: 1.5,
            jitter: true,
        };
        let policy = section.to_retry_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.initial_interval, std::time::Duration::from_secs(3));
        assert!((policy.backoff_factor - 1.5).abs() < f64::EPSILON);
    }
}
