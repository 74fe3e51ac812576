//! Typed error hierarchy for the Forge orchestrator.
//!
//! Top-level enums cover each subsystem:
//! - `OrchestratorError` — sequential and DAG runner failures
//! - `PhaseError` — per-phase execution failures
//! - `FactoryError` — factory API and pipeline failures
//! - `GraphError` — graph engine scheduling/checkpoint failures
//! - `LoopError` — iterative (fresh-context) loop failures
//! - `BudgetError` — budget manager ceiling violations
//! - `RepositoryError` — durable store failures

use thiserror::Error;

/// Errors raised by the graph engine while compiling or running a thread.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node '{0}' is not registered in this graph")]
    UnknownNode(String),

    #[error("recursion limit ({limit}) exceeded after node '{node}'")]
    RecursionLimitExceeded { limit: u32, node: String },

    #[error("node '{node}' exhausted its retry budget: {source}")]
    NodeRetriesExhausted {
        node: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("fan-in join '{node}' is missing results from predecessor(s): {missing:?}")]
    IncompleteFanIn { node: String, missing: Vec<String> },

    #[error("checkpoint conflict on thread '{thread_id}': expected previous id {expected}, found {actual}")]
    CheckpointConflict {
        thread_id: String,
        expected: String,
        actual: String,
    },

    #[error("resume() called on thread '{0}' with no pending interrupt")]
    NoPendingInterrupt(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Errors raised by the iterative (fresh-context) loop.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("task '{task_id}' exhausted {max_iterations} iterations without passing tests")]
    MaxIterationsReached { task_id: String, max_iterations: u32 },

    #[error("iteration {iteration} for task '{task_id}' timed out after {timeout_secs}s")]
    IterationTimeout {
        task_id: String,
        iteration: u32,
        timeout_secs: u64,
    },

    #[error("test command timed out after {timeout_secs}s on iteration {iteration}")]
    TestCommandTimeout { iteration: u32, timeout_secs: u64 },

    #[error("task '{task_id}' ran out of budget at iteration {iteration}")]
    BudgetExhausted { task_id: String, iteration: u32 },

    #[error("hook blocked iteration {iteration} for task '{task_id}': {reason}")]
    HookBlocked {
        task_id: String,
        iteration: u32,
        reason: String,
    },

    #[error("task '{task_id}' loop stopped early by stop_check hook at iteration {iteration}")]
    StoppedByHook { task_id: String, iteration: u32 },

    #[error(transparent)]
    Agent(#[from] OrchestratorError),
}

/// Errors raised enforcing cost ceilings.
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("task '{task_id}' would exceed the hard budget limit of {limit:.4}")]
    HardLimitReached { task_id: String, limit: f64 },

    #[error("no pricing entry for model '{0}'")]
    UnknownModel(String),
}

/// Errors raised by a `Repository` implementation.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("no active run for project '{0}'")]
    NoActiveRun(String),

    #[error("thread '{0}' has no checkpoints")]
    NoCheckpoints(String),

    #[error("task '{0}' not found")]
    TaskNotFound(String),

    #[error("I/O failure at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failure: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors from the orchestrator subsystem (sequential and DAG runners).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Failed to spawn Claude process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Failed to write prompt file at {path}: {source}")]
    PromptWriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write output file at {path}: {source}")]
    OutputWriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read spec file at {path}: {source}")]
    SpecReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Git tracker error: {0}")]
    GitTracker(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from a single phase execution.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("Budget exhausted after {iterations} iterations without promise tag")]
    BudgetExhausted { iterations: u32 },

    #[error("Claude exited with non-zero code {exit_code}")]
    ClaudeNonZeroExit { exit_code: i32 },

    #[error("Phase {phase} depends on unknown phase {dependency}")]
    UnknownDependency { phase: String, dependency: String },

    #[error("Iteration {iteration} failed: {message}")]
    IterationFailed { iteration: u32, message: String },

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

/// Errors from the factory API and pipeline subsystem.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("Project {id} not found")]
    ProjectNotFound { id: i64 },

    #[error("Issue {id} not found")]
    IssueNotFound { id: i64 },

    #[error("Pipeline run {id} not found")]
    RunNotFound { id: i64 },

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("GitHub API error: {0}")]
    GitHub(String),

    #[error("Invalid column '{column}': {message}")]
    InvalidColumn { column: String, message: String },

    #[error("Pipeline already running for issue {issue_id}")]
    PipelineAlreadyRunning { issue_id: i64 },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The taxonomy string used for error fingerprinting and aggregation (see `orchestrator::errors_aggregator`).
pub trait ErrorTaxonomy {
    fn error_type(&self) -> &'static str;
}

impl ErrorTaxonomy for PhaseError {
    fn error_type(&self) -> &'static str {
        match self {
            PhaseError::BudgetExhausted { .. } => "budget_exceeded_error",
            PhaseError::ClaudeNonZeroExit { .. } => "implementation_error",
            PhaseError::UnknownDependency { .. } => "planning_error",
            PhaseError::IterationFailed { .. } => "implementation_error",
            PhaseError::Orchestrator(_) => "implementation_error",
        }
    }
}

impl ErrorTaxonomy for LoopError {
    fn error_type(&self) -> &'static str {
        match self {
            LoopError::MaxIterationsReached { .. } => "task_failed",
            LoopError::IterationTimeout { .. } => "task_failed",
            LoopError::TestCommandTimeout { .. } => "verification_failed",
            LoopError::BudgetExhausted { .. } => "budget_limit_reached",
            LoopError::HookBlocked { .. } => "implementation_error",
            LoopError::StoppedByHook { .. } => "task_failed",
            LoopError::Agent(_) => "implementation_error",
        }
    }
}

impl ErrorTaxonomy for GraphError {
    fn error_type(&self) -> &'static str {
        match self {
            GraphError::UnknownNode(_) => "planning_error",
            GraphError::RecursionLimitExceeded { .. } => "autonomous_abort",
            GraphError::NodeRetriesExhausted { .. } => "implementation_error",
            GraphError::IncompleteFanIn { .. } => "validation_failed",
            GraphError::CheckpointConflict { .. } => "worktree_error",
            GraphError::NoPendingInterrupt(_) => "escalation_timeout",
            GraphError::Repository(_) => "missing_file",
        }
    }
}
