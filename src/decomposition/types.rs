//! Core types for the decomposition system.
//!
//! These types represent decomposed tasks and their execution state.

use serde::{Deserialize, Serialize};

/// Status of a decomposed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is waiting to be executed.
    #[default]
    Pending,
    /// Task is currently being executed.
    InProgress,
    /// Task completed successfully.
    Completed,
    /// Task failed.
    Failed,
    /// Task was skipped (dependency failed).
    Skipped,
}

impl TaskStatus {
    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Check if the task completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// A single decomposed task from phase decomposition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecompositionTask {
    /// Unique identifier for this task.
    pub id: String,
    /// Human-readable task name.
    pub name: String,
    /// Detailed description of what needs to be done.
    pub description: String,
    /// Files this task will likely modify. Kept for callers that don't
    /// distinguish create vs. modify; `files_to_create`/`files_to_modify`
    /// are the finer-grained pair new code should populate instead.
    #[serde(default)]
    pub files: Vec<String>,
    /// Files this task is expected to create from scratch.
    #[serde(default)]
    pub files_to_create: Vec<String>,
    /// Files this task is expected to modify in place.
    #[serde(default)]
    pub files_to_modify: Vec<String>,
    /// Task IDs this task depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Iteration budget for this task.
    pub budget: u32,
    /// Current status of the task.
    #[serde(default)]
    pub status: TaskStatus,
    /// Error message if task failed.
    #[serde(default)]
    pub error: Option<String>,
    /// Iterations used during execution.
    #[serde(default)]
    pub iterations_used: u32,
    /// Cumulative estimated cost spent on this task across every
    /// `implement_task`/`fix_bug` loop run, seeding the budget manager each
    /// node invocation reconstructs it in.
    #[serde(default)]
    pub budget_spent: f64,
    /// User-facing story this task fulfills, when the plan supplied one.
    #[serde(default)]
    pub user_story: Option<String>,
    /// Acceptance criteria the implementation must satisfy.
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Test files this task is expected to write or extend.
    #[serde(default)]
    pub test_files: Vec<String>,
    /// Subagent type to run this task under, when the plan names one.
    #[serde(default)]
    pub agent_type: Option<String>,
    /// Model override for this task, when the plan or budget router names one.
    #[serde(default)]
    pub model: Option<String>,
}

impl DecompositionTask {
    /// Create a new decomposition task.
    pub fn new(id: &str, name: &str, description: &str, budget: u32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            files: Vec::new(),
            files_to_create: Vec::new(),
            files_to_modify: Vec::new(),
            depends_on: Vec::new(),
            budget,
            status: TaskStatus::Pending,
            error: None,
            iterations_used: 0,
            budget_spent: 0.0,
            user_story: None,
            acceptance_criteria: Vec::new(),
            test_files: Vec::new(),
            agent_type: None,
            model: None,
        }
    }

    /// Add files that this task will modify.
    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    /// Record the create/modify split directly, keeping `files` as their union
    /// for callers that haven't migrated to the finer-grained fields.
    pub fn with_file_split(mut self, to_create: Vec<String>, to_modify: Vec<String>) -> Self {
        self.files = to_create.iter().chain(to_modify.iter()).cloned().collect();
        self.files_to_create = to_create;
        self.files_to_modify = to_modify;
        self
    }

    /// Add task dependencies.
    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Attach acceptance criteria and the test files expected to cover them.
    pub fn with_acceptance(mut self, criteria: Vec<String>, test_files: Vec<String>) -> Self {
        self.acceptance_criteria = criteria;
        self.test_files = test_files;
        self
    }

    /// Name the subagent type and model this task should run under.
    pub fn with_agent(mut self, agent_type: impl Into<String>, model: impl Into<String>) -> Self {
        self.agent_type = Some(agent_type.into());
        self.model = Some(model.into());
        self
    }

    /// Check if this task has dependencies.
    pub fn has_dependencies(&self) -> bool {
        !self.depends_on.is_empty()
    }

    /// Check if this task can run given completed task IDs.
    pub fn can_run(&self, completed: &[String]) -> bool {
        self.status == TaskStatus::Pending
            && self.depends_on.iter().all(|dep| completed.contains(dep))
    }

    /// Mark task as in progress.
    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
    }

    /// Mark task as completed.
    pub fn complete(&mut self, iterations: u32) {
        self.status = TaskStatus::Completed;
        self.iterations_used = iterations;
    }

    /// Mark task as failed.
    pub fn fail(&mut self, error: &str, iterations: u32) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.to_string());
        self.iterations_used = iterations;
    }

    /// Mark task as skipped.
    pub fn skip(&mut self) {
        self.status = TaskStatus::Skipped;
    }
}

/// Optional integration task that runs after all sub-tasks complete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntegrationTask {
    /// Task identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Description of integration work.
    pub description: String,
    /// Task IDs this depends on (usually all other tasks).
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Budget for integration work.
    pub budget: u32,
}

impl IntegrationTask {
    /// Create a new integration task.
    pub fn new(id: &str, name: &str, description: &str, budget: u32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            depends_on: Vec::new(),
            budget,
        }
    }

    /// Add dependencies (typically all other task IDs).
    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Convert to a DecompositionTask.
    pub fn to_task(&self) -> DecompositionTask {
        DecompositionTask {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            files: Vec::new(),
            files_to_create: Vec::new(),
            files_to_modify: Vec::new(),
            depends_on: self.depends_on.clone(),
            budget: self.budget,
            status: TaskStatus::Pending,
            error: None,
            iterations_used: 0,
            budget_spent: 0.0,
            user_story: None,
            acceptance_criteria: Vec::new(),
            test_files: Vec::new(),
            agent_type: None,
            model: None,
        }
    }
}

/// Result of decomposing a phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecompositionResult {
    /// The decomposed tasks.
    pub tasks: Vec<DecompositionTask>,
    /// Optional integration task.
    #[serde(default)]
    pub integration_task: Option<IntegrationTask>,
    /// Analysis/reasoning for the decomposition.
    #[serde(default)]
    pub analysis: Option<String>,
}

impl DecompositionResult {
    /// Create a new decomposition result.
    pub fn new(tasks: Vec<DecompositionTask>) -> Self {
        Self {
            tasks,
            integration_task: None,
            analysis: None,
        }
    }

    /// Add an integration task.
    pub fn with_integration(mut self, task: IntegrationTask) -> Self {
        self.integration_task = Some(task);
        self
    }

    /// Add analysis.
    pub fn with_analysis(mut self, analysis: &str) -> Self {
        self.analysis = Some(analysis.to_string());
        self
    }

    /// Get total task count including integration.
    pub fn task_count(&self) -> usize {
        self.tasks.len() + self.integration_task.as_ref().map_or(0, |_| 1)
    }

    /// Get total budget across all tasks.
    pub fn total_budget(&self) -> u32 {
        let task_budget: u32 = self.tasks.iter().map(|t| t.budget).sum();
        let integration_budget = self.integration_task.as_ref().map_or(0, |t| t.budget);
        task_budget + integration_budget
    }

    /// Get all tasks including integration task.
    pub fn all_tasks(&self) -> Vec<DecompositionTask> {
        let mut all = self.tasks.clone();
        if let Some(ref integration) = self.integration_task {
            all.push(integration.to_task());
        }
        all
    }

    /// Check if all tasks are complete.
    pub fn all_complete(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
            && self
                .integration_task
                .as_ref()
                .is_none_or(|_| self.tasks.iter().all(|t| t.status.is_success()))
    }

    /// Get completed task IDs.
    pub fn completed_task_ids(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|t| t.status.is_success())
            .map(|t| t.id.clone())
            .collect()
    }
}

/// Represents a phase that has been decomposed into sub-tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecomposedPhase {
    /// Original phase number.
    pub phase_number: String,
    /// Original phase name.
    pub phase_name: String,
    /// Original promise tag.
    pub promise: String,
    /// Original budget.
    pub original_budget: u32,
    /// Iterations used before decomposition.
    pub iterations_before_decomposition: u32,
    /// Reason for decomposition.
    pub decomposition_reason: String,
    /// The decomposition result.
    pub decomposition: DecompositionResult,
    /// Timestamp when decomposition occurred.
    pub decomposed_at: String,
}

impl DecomposedPhase {
    /// Create a new decomposed phase.
    pub fn new(
        phase_number: &str,
        phase_name: &str,
        promise: &str,
        original_budget: u32,
        iterations_used: u32,
        reason: &str,
        decomposition: DecompositionResult,
    ) -> Self {
        Self {
            phase_number: phase_number.to_string(),
            phase_name: phase_name.to_string(),
            promise: promise.to_string(),
            original_budget,
            iterations_before_decomposition: iterations_used,
            decomposition_reason: reason.to_string(),
            decomposition,
            decomposed_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Get remaining budget after decomposition overhead.
    pub fn remaining_budget(&self) -> u32 {
        self.original_budget
            .saturating_sub(self.iterations_before_decomposition)
    }

    /// Check if the decomposition fits within remaining budget.
    pub fn fits_budget(&self) -> bool {
        self.decomposition.total_budget() <= self.remaining_budget()
    }

    /// Get the budget overflow amount (0 if fits).
    pub fn budget_overflow(&self) -> u32 {
        let total = self.decomposition.total_budget();
        let remaining = self.remaining_budget();
        total.saturating_sub(remaining)
    }
}
