//! Swarm orchestration prompt templates.
//!
//! This module provides template functions for generating prompts sent to
//! Claude Code when invoking swarm capabilities. These prompts instruct the
//! swarm leader on how to coordinate parallel task execution.
//!
//! ## Prompt Types
//!
//! - **Orchestration prompt**: Main prompt for coordinating swarm execution
//! - **Task prompt**: Individual task assignment for workers
//! - **Review prompt**: Instructions for review specialists
//! - **Progress reporting**: Format for callback updates

use crate::swarm::context::{
    PhaseInfo, ReviewConfig, ReviewSpecialistConfig, SwarmContext, SwarmStrategy, SwarmTask,
};

/// Build the main orchestration prompt for swarm execution.
///
/// This prompt is sent to Claude Code to initiate swarm coordination.
/// It includes all context needed for the swarm leader to:
/// - Create a team
/// - Spawn worker agents
/// - Distribute tasks
/// - Monitor progress
/// - Run reviews
/// - Report completion
pub fn build_orchestration_prompt(context: &SwarmContext) -> String {
    let mut prompt = String::new();

    // Header
    prompt.push_str(&format!(
        "# Forge Swarm Orchestrator\n\n\
         You are coordinating a swarm for Forge phase {}: {}\n\n",
        context.phase.number, context.phase.name
    ));

    // Context section
    prompt.push_str("## Context\n\n");
    prompt.push_str(&format!(
        "- **Phase**: {} - {}\n",
        context.phase.number, context.phase.name
    ));
    prompt.push_str(&format!(
        "- **Promise**: `{}`\n",
        context.phase.promise
    ));
    prompt.push_str(&format!(
        "- **Budget**: {} iterations ({} remaining)\n",
        context.phase.budget,
        context.phase.remaining_budget()
    ));
    prompt.push_str(&format!(
        "- **Strategy**: {} - {}\n",
        strategy_name(context.strategy),
        context.strategy.description()
    ));
    prompt.push_str(&format!(
        "- **Working Directory**: {}\n",
        context.working_dir.display()
    ));
    prompt.push_str(&format!(
        "- **Callback URL**: {}\n",
        context.callback_url
    ));
    prompt.push('\n');

    // Additional context if provided
    if let Some(additional) = &context.additional_context {
        prompt.push_str("## Additional Instructions\n\n");
        prompt.push_str(additional);
        prompt.push_str("\n\n");
    }

    // Tasks section
    if context.has_predefined_tasks() {
        prompt.push_str("## Pre-defined Tasks\n\n");
        prompt.push_str("Execute the following tasks according to the strategy:\n\n");
        for task in &context.tasks {
            prompt.push_str(&format_task(task));
        }
        prompt.push('\n');
    } else {
        prompt.push_str("## Task Discovery\n\n");
        prompt.push_str(
            "No pre-defined tasks. Analyze the phase requirements and decompose into \
             appropriate sub-tasks before execution.\n\n",
        );
    }

    // Reviews section
    if let Some(reviews) = &context.reviews
        && reviews.has_specialists()
    {
        prompt.push_str("## Reviews\n\n");
        prompt.push_str(&format_review_config(reviews));
        prompt.push('\n');
    }

    // Responsibilities section
    prompt.push_str(&build_responsibilities_section(context));

    // Progress reporting section
    prompt.push_str(&build_progress_section(&context.callback_url));

    // Completion section
    prompt.push_str(&build_completion_section(&context.phase));

    prompt
}

/// Build the task assignment prompt for a worker agent.
///
/// This prompt is used when spawning a worker to execute a specific task.
pub fn build_task_prompt(task: &SwarmTask, phase: &PhaseInfo, callback_url: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "# Task: {}\n\n\
         You are executing task `{}` for Forge phase {} ({}).\n\n",
        task.name, task.id, phase.number, phase.name
    ));

    prompt.push_str("## Description\n\n");
    prompt.push_str(&task.description);
    prompt.push_str("\n\n");

    if !task.files.is_empty() {
        prompt.push_str("## Target Files\n\n");
        for file in &task.files {
            prompt.push_str(&format!("- `{}`\n", file));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "## Budget\n\n\
         You have {} iterations to complete this task.\n\n",
        task.budget
    ));

    prompt.push_str(&format!(
        "## Progress Reporting\n\n\
         Report progress to: `{}/progress`\n\n\
         ```bash\n\
         curl -X POST {}/progress -H 'Content-Type: application/json' \\\n\
           -d '{{\"task\": \"{}\", \"status\": \"in_progress\", \"percent\": 50}}'\n\
         ```\n\n",
        callback_url, callback_url, task.id
    ));

    prompt.push_str(&format!(
        "## Completion\n\n\
         When done, report completion:\n\n\
         ```bash\n\
         curl -X POST {}/complete -H 'Content-Type: application/json' \\\n\
           -d '{{\"task\": \"{}\", \"status\": \"success\", \"summary\": \"Brief description\"}}'\n\
         ```\n\n\
         Then output:\n\
         ```\n\
         <task_complete id=\"{}\">SUCCESS</task_complete>\n\
         ```\n",
        callback_url, task.id, task.id
    ));

    prompt
}

/// Build the review prompt for a review specialist.
///
/// This prompt instructs a review specialist on what to examine.
pub fn build_review_prompt(
    specialist: &ReviewSpecialistConfig,
    phase: &PhaseInfo,
    files_changed: &[String],
) -> String {
    let mut prompt = String::new();

    let specialist_name = specialist.specialist_type.display_name();
    prompt.push_str(&format!(
        "# {} Review\n\n\
         You are reviewing phase {} ({}) as the {}.\n\n",
        specialist_name, phase.number, phase.name, specialist_name
    ));

    if specialist.gate {
        prompt.push_str(
            "**This is a GATING review.** Phase cannot proceed until issues are resolved.\n\n",
        );
    } else {
        prompt.push_str("This is a non-gating review. Issues are advisory only.\n\n");
    }

    if !files_changed.is_empty() {
        prompt.push_str("## Files to Review\n\n");
        for file in files_changed {
            prompt.push_str(&format!("- `{}`\n", file));
        }
        prompt.push('\n');
    }

    if !specialist.focus_areas.is_empty() {
        prompt.push_str("## Focus Areas\n\n");
        for area in &specialist.focus_areas {
            prompt.push_str(&format!("- {}\n", area));
        }
        prompt.push('\n');
    }

    prompt.push_str(&build_review_output_format(specialist));

    prompt
}

/// Build the decomposition prompt for breaking down complex phases.
///
/// This prompt is sent when a phase needs to be split into sub-tasks.
pub fn build_decomposition_prompt(phase: &PhaseInfo, reason: &str) -> String {
    format!(
        "# Phase Decomposition Request\n\n\
         Phase {} ({}) requires decomposition.\n\n\
         ## Reason\n\n\
         {}\n\n\
         ## Instructions\n\n\
         Analyze the phase requirements and break it down into independent sub-tasks that can \
         be executed in parallel where possible.\n\n\
         For each sub-task, provide:\n\
         1. **ID**: Unique identifier (e.g., \"task-1\", \"oauth-google\")\n\
         2. **Name**: Brief descriptive name\n\
         3. **Description**: What needs to be done\n\
         4. **Files**: Files likely to be modified\n\
         5. **Dependencies**: Other task IDs this depends on\n\
         6. **Budget**: Suggested iteration budget\n\n\
         ## Output Format\n\n\
         ```xml\n\
         <decomposition>\n\
         {{\n\
           \"tasks\": [\n\
             {{\n\
               \"id\": \"task-1\",\n\
               \"name\": \"Task name\",\n\
               \"description\": \"What to do\",\n\
               \"files\": [\"src/file.rs\"],\n\
               \"depends_on\": [],\n\
               \"budget\": 5\n\
             }}\n\
           ],\n\
           \"integration_task\": {{\n\
             \"id\": \"integrate\",\n\
             \"name\": \"Integration\",\n\
             \"description\": \"Wire together sub-tasks\",\n\
             \"depends_on\": [\"task-1\"],\n\
             \"budget\": 3\n\
           }}\n\
         }}\n\
         </decomposition>\n\
         ```\n",
        phase.number, phase.name, reason
    )
}

/// Get a human-readable name for a strategy.
fn strategy_name(strategy: SwarmStrategy) -> &'static str {
    match strategy {
        SwarmStrategy::Parallel => "Parallel",
        SwarmStrategy::Sequential => "Sequential",
        SwarmStrategy::WavePipeline => "Wave Pipeline",
        SwarmStrategy::Adaptive => "Adaptive",
    }
}

/// Format a single task for display in the orchestration prompt.
fn format_task(task: &SwarmTask) -> String {
    let mut output = format!("### Task: {} (`{}`)\n\n", task.name, task.id);
    output.push_str(&format!("{}\n\n", task.description));
    output.push_str(&format!("- **Budget**: {} iterations\n", task.budget));

    if !task.files.is_empty() {
        output.push_str(&format!("- **Files**: {}\n", task.files.join(", ")));
    }

    if !task.depends_on.is_empty() {
        output.push_str(&format!("- **Depends on**: {}\n", task.depends_on.join(", ")));
    }

    output.push('\n');
    output
}

/// Format the review configuration for display.
fn format_review_config(config: &ReviewConfig) -> String {
    let mut output = String::new();

    if config.parallel {
        output.push_str("Reviews will run **in parallel** after task completion.\n\n");
    } else {
        output.push_str("Reviews will run **sequentially** after task completion.\n\n");
    }

    output.push_str("| Specialist | Gating | Focus Areas |\n");
    output.push_str("|------------|--------|-------------|\n");

    for specialist in &config.specialists {
        let name = specialist.specialist_type.display_name();
        let gate = if specialist.gate { "Yes" } else { "No" };
        let focus = if specialist.focus_areas.is_empty() {
            "Default".to_string()
        } else {
            specialist.focus_areas.join(", ")
        };
        output.push_str(&format!("| {} | {} | {} |\n", name, gate, focus));
    }

    output
}

/// Build the responsibilities section of the orchestration prompt.
fn build_responsibilities_section(context: &SwarmContext) -> String {
    let team_name = context.team_name();

    format!(
        "## Your Responsibilities\n\n\
         1. **Create team**: Use TeammateTool to create team `{}`\n\
         2. **Spawn workers**: Create worker agents for each task\n\
         3. **Coordinate**: Manage task dependencies and execution order\n\
         4. **Monitor**: Track progress via callbacks and agent outputs\n\
         5. **Review**: Run review specialists after task completion (if configured)\n\
         6. **Report**: Send progress updates to the callback server\n\
         7. **Complete**: Output completion signal when all tasks done\n\n",
        team_name
    )
}

/// Build the progress reporting section of the orchestration prompt.
fn build_progress_section(callback_url: &str) -> String {
    format!(
        "## Progress Reporting\n\n\
         Report progress to Forge via HTTP callbacks:\n\n\
         **Task Progress:**\n\
         ```bash\n\
         curl -X POST {}/progress -H 'Content-Type: application/json' \\\n\
           -d '{{\"task\": \"task-id\", \"status\": \"description\", \"percent\": 50}}'\n\
         ```\n\n\
         **Task Completion:**\n\
         ```bash\n\
         curl -X POST {}/complete -H 'Content-Type: application/json' \\\n\
           -d '{{\"task\": \"task-id\", \"status\": \"success\", \"summary\": \"...\", \"files_changed\": []}}'\n\
         ```\n\n\
         **Generic Events:**\n\
         ```bash\n\
         curl -X POST {}/event -H 'Content-Type: application/json' \\\n\
           -d '{{\"event_type\": \"custom\", \"payload\": {{}}}}'\n\
         ```\n\n",
        callback_url, callback_url, callback_url
    )
}

/// Build the completion section of the orchestration prompt.
fn build_completion_section(phase: &PhaseInfo) -> String {
    format!(
        "## Completion Signal\n\n\
         When all tasks are complete and reviews pass, output:\n\n\
         ```xml\n\
         <swarm_complete>\n\
         {{\n\
           \"success\": true,\n\
           \"phase\": \"{}\",\n\
           \"tasks_completed\": [\"task-1\", \"task-2\"],\n\
           \"reviews\": [\n\
             {{\"specialist\": \"security-sentinel\", \"verdict\": \"pass\"}}\n\
           ],\n\
           \"files_changed\": [\"src/file.rs\"]\n\
         }}\n\
         </swarm_complete>\n\
         ```\n\n\
         If the phase fails, output:\n\n\
         ```xml\n\
         <swarm_complete>\n\
         {{\n\
           \"success\": false,\n\
           \"phase\": \"{}\",\n\
           \"error\": \"Description of what went wrong\",\n\
           \"tasks_completed\": [\"task-1\"],\n\
           \"tasks_failed\": [\"task-2\"]\n\
         }}\n\
         </swarm_complete>\n\
         ```\n",
        phase.number, phase.number
    )
}

/// Build the review output format instructions.
fn build_review_output_format(specialist: &ReviewSpecialistConfig) -> String {
    let specialist_name = specialist.specialist_type.agent_name();

    format!(
        "## Output Format\n\n\
         Provide your review as JSON:\n\n\
         ```json\n\
         {{\n\
           \"reviewer\": \"{}\",\n\
           \"verdict\": \"pass|warn|fail\",\n\
           \"findings\": [\n\
             {{\n\
               \"severity\": \"info|warning|error\",\n\
               \"file\": \"src/file.rs\",\n\
               \"line\": 42,\n\
               \"issue\": \"Description of the issue\",\n\
               \"suggestion\": \"How to fix it\"\n\
             }}\n\
           ],\n\
           \"summary\": \"Brief summary of the review\"\n\
         }}\n\
         ```\n\n\
         **Verdict meanings:**\n\
         - `pass`: No issues or only informational notes\n\
         - `warn`: Non-blocking issues found\n\
         - `fail`: Critical issues that must be addressed{}\n",
        specialist_name,
        if specialist.gate {
            " (blocks phase completion)"
        } else {
            ""
        }
    )
}

/// Result of parsing a swarm completion signal.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct SwarmCompletionResult {
    /// Whether the swarm execution succeeded.
    pub success: bool,
    /// Phase number.
    pub phase: String,
    /// Tasks that completed successfully.
    #[serde(default)]
    pub tasks_completed: Vec<String>,
    /// Tasks that failed.
    #[serde(default)]
    pub tasks_failed: Vec<String>,
    /// Review results.
    #[serde(default)]
    pub reviews: Vec<ReviewResult>,
    /// Files changed during execution.
    #[serde(default)]
    pub files_changed: Vec<String>,
    /// Error message if failed.
    #[serde(default)]
    pub error: Option<String>,
}

/// Result from a review specialist.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ReviewResult {
    /// Specialist name.
    pub specialist: String,
    /// Review verdict.
    pub verdict: String,
}

/// Parse a swarm completion signal from output.
///
/// Looks for `<swarm_complete>...</swarm_complete>` tags and parses the JSON inside.
pub fn parse_swarm_completion(output: &str) -> Option<SwarmCompletionResult> {
    let start_tag = "<swarm_complete>";
    let end_tag = "</swarm_complete>";

    let start = output.find(start_tag)?;
    let end = output.find(end_tag)?;

    if start >= end {
        return None;
    }

    let json_start = start + start_tag.len();
    let json_content = output[json_start..end].trim();

    serde_json::from_str(json_content).ok()
}

/// Parse a task completion signal from output.
///
/// Looks for `<task_complete id="...">...</task_complete>` tags.
pub fn parse_task_completion(output: &str, task_id: &str) -> Option<String> {
    let pattern = format!("<task_complete id=\"{}\">", task_id);
    let end_tag = "</task_complete>";

    let start = output.find(&pattern)?;
    let content_start = start + pattern.len();
    let end = output[content_start..].find(end_tag)?;

    Some(output[content_start..content_start + end].trim().to_string())
}
