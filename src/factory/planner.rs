use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

/// Abstraction over the planning step for testability.
#[async_trait]
pub trait PlanProvider: Send + Sync {
    async fn plan(
        &self,
        issue_title: &str,
        issue_description: &str,
        issue_labels: &[String],
    ) -> Result<PlanResponse>;
}

/// Produced by the LLM planner; represents a decomposition of an issue into parallelizable tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResponse {
    /// Execution strategy (parallel, sequential, wave_pipeline, adaptive) — should match `ExecutionStrategy` enum values.
    pub strategy: String,
    /// Default isolation strategy — informational only; actual behavior driven by per-task `isolation` values.
    pub isolation: String,
    pub reasoning: String,
    pub tasks: Vec<PlanTask>,
    #[serde(default)]
    pub skip_visual_verification: bool,
}

/// A single task in the plan, assigned to one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTask {
    pub name: String,
    /// Agent role (coder, tester, reviewer) — should match `AgentRole` enum values.
    pub role: String,
    /// 0-indexed execution group; tasks in the same wave run in parallel.
    #[serde(default)]
    pub wave: i32,
    pub description: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default = "default_isolation")]
    pub isolation: String,
    /// 0-based indices into the parent `PlanResponse`'s `tasks` array; referenced tasks must be in earlier waves.
    #[serde(default)]
    pub depends_on: Vec<i32>,
}

fn default_isolation() -> String {
    "shared".to_string()
}

/// Extract the first balanced JSON object from text, handling nested braces and strings correctly.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0;
    let mut in_string = false;
    let mut escape = false;
    for (i, ch) in text[start..].char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }
    None
}

impl PlanResponse {
    pub fn parse(json: &str) -> Result<Self> {
        // Try direct parse first
        let plan = if let Ok(plan) = serde_json::from_str::<PlanResponse>(json) {
            plan
        } else {
            // Strip markdown code blocks
            let cleaned = json.replace("```json", "").replace("```", "");
            if let Ok(plan) = serde_json::from_str::<PlanResponse>(cleaned.trim()) {
                plan
            } else {
                // Extract first balanced JSON object
                let extracted = extract_json_object(&cleaned)
                    .unwrap_or(cleaned.trim());
                serde_json::from_str(extracted)
                    .context("Failed to parse planner response as JSON")?
            }
        };
        plan.validate().context("Planner produced an invalid plan")?;
        Ok(plan)
    }

    /// Validate that the plan's fields contain valid enum values and dependency indices.
    pub fn validate(&self) -> Result<()> {
        use super::models::{ExecutionStrategy, AgentRole, IsolationStrategy};

        self.strategy.parse::<ExecutionStrategy>()
            .map_err(|_| anyhow::anyhow!("Invalid strategy '{}' from planner", self.strategy))?;

        self.isolation.parse::<IsolationStrategy>()
            .map_err(|_| anyhow::anyhow!("Invalid isolation '{}' from planner", self.isolation))?;

        for (i, task) in self.tasks.iter().enumerate() {
            task.role.parse::<AgentRole>()
                .map_err(|_| anyhow::anyhow!("Invalid role '{}' for task {} ('{}')", task.role, i, task.name))?;

            task.isolation.parse::<IsolationStrategy>()
                .map_err(|_| anyhow::anyhow!("Invalid isolation '{}' for task {} ('{}')", task.isolation, i, task.name))?;

            for &dep_idx in &task.depends_on {
                if dep_idx < 0 || dep_idx as usize >= self.tasks.len() {
                    anyhow::bail!("Task {} ('{}') has out-of-bounds depends_on index {}", i, task.name, dep_idx);
                }
                if let Some(dep_task) = self.tasks.get(dep_idx as usize)
                    && dep_task.wave >= task.wave
                {
                    anyhow::bail!(
                        "Task {} ('{}', wave {}) depends on task {} ('{}', wave {}) which is not in an earlier wave",
                        i, task.name, task.wave, dep_idx, dep_task.name, dep_task.wave
                    );
                }
            }
        }

        Ok(())
    }

    pub fn fallback(title: &str, description: &str) -> Self {
        PlanResponse {
            strategy: "sequential".to_string(),
            isolation: "shared".to_string(),
            reasoning: "Fallback: running as single sequential task".to_string(),
            tasks: vec![PlanTask {
                name: title.to_string(),
                role: "coder".to_string(),
                wave: 0,
                description: format!(
                    "Implement the following:\n\nTitle: {}\n\n{}",
                    title, description
                ),
                files: vec![],
                isolation: "shared".to_string(),
                depends_on: vec![],
            }],
            skip_visual_verification: false,
        }
    }

    pub fn max_wave(&self) -> i32 {
        self.tasks.iter().map(|t| t.wave).max().unwrap_or(0)
    }

    pub fn tasks_in_wave(&self, wave: i32) -> Vec<&PlanTask> {
        self.tasks.iter().filter(|t| t.wave == wave).collect()
    }
}

// NOTE: The top-level `isolation` field is stored in agent_teams.isolation but is informational only.
// Actual isolation behavior is driven by per-task `isolation` values.
const PLANNER_SYSTEM_PROMPT: &str = r#"You are a software engineering planner. Analyze the given issue and produce a JSON task decomposition.

You MUST respond with valid JSON only (no markdown, no explanation) matching this schema:
{
  "strategy": "parallel" | "sequential" | "wave_pipeline" | "adaptive",
  "isolation": "worktree" | "hybrid" | "shared",
  "reasoning": "Brief explanation of your decomposition",
  "tasks": [
    {
      "name": "Short task name",
      "role": "coder" | "tester" | "reviewer",
      "wave": 0,
      "description": "Detailed task prompt for the agent",
      "files": ["files/this/task/touches.rs"],
      "isolation": "worktree" | "shared",
      "depends_on": []
    }
  ],
  "skip_visual_verification": false
}

Rules:
- Tasks in the same wave run in parallel. Higher waves wait for lower waves.
- Use "worktree" isolation when tasks touch different files and can run in parallel.
- Use "shared" when tasks must see each other's changes (e.g., integration tests after code changes).
- Set skip_visual_verification to true for pure backend/library changes with no UI impact.
- For simple issues, return a single task — don't over-decompose.
- depends_on uses 0-based indices into the tasks array.
- DO NOT include verification tasks — those are added automatically.
"#;

pub struct Planner {
    project_path: String,
}

impl Planner {
    pub fn new(project_path: &str) -> Self {
        Self {
            project_path: project_path.to_string(),
        }
    }

    /// Decompose an issue into a task plan by calling the Claude CLI.
    ///
    /// Returns errors on CLI or parse failures -- the caller is responsible
    /// for deciding whether to fall back to a single-task plan.
    pub async fn create_plan(
        &self,
        issue_title: &str,
        issue_description: &str,
        issue_labels: &[String],
    ) -> Result<PlanResponse> {
        let repo_context = self.gather_repo_context().await?;
        let prompt = self.build_prompt(issue_title, issue_description, issue_labels, &repo_context);

        let response = self.call_claude(&prompt).await
            .context("Claude CLI call failed during planning")?;
        PlanResponse::parse(&response)
            .context("Failed to parse planner response")
    }

    fn build_prompt(
        &self,
        title: &str,
        description: &str,
        labels: &[String],
        repo_context: &str,
    ) -> String {
        format!(
            "Analyze this issue and create a task decomposition plan.\n\n\
             ## Issue\n\
             **Title:** {}\n\
             **Description:** {}\n\
             **Labels:** {}\n\n\
             ## Repository Context\n\
             {}\n\n\
             Respond with JSON only.",
            title,
            description,
            labels.join(", "),
            repo_context,
        )
    }

    async fn gather_repo_context(&self) -> Result<String> {
        let tree_output = Command::new("find")
            .args([
                &self.project_path,
                "-maxdepth",
                "2",
                "-type",
                "f",
                "-not",
                "-path",
                "*/.git/*",
                "-not",
                "-path",
                "*/node_modules/*",
                "-not",
                "-path",
                "*/target/*",
            ])
            .output()
            .await
            .context("Failed to list project files")?;
        if !tree_output.status.success() {
            eprintln!(
                "[planner] File tree command failed ({}): {}. Planner will have reduced repo context.",
                tree_output.status,
                String::from_utf8_lossy(&tree_output.stderr).trim()
            );
        }
        let tree = String::from_utf8_lossy(&tree_output.stdout);

        let log_output = Command::new("git")
            .args(["log", "--oneline", "-10"])
            .current_dir(&self.project_path)
            .output()
            .await
            .context("Failed to get git log")?;
        if !log_output.status.success() {
            eprintln!(
                "[planner] git log failed: {}",
                String::from_utf8_lossy(&log_output.stderr)
            );
        }
        let log = String::from_utf8_lossy(&log_output.stdout);

        Ok(format!(
            "### File Tree (top 2 levels)\n```\n{}\n```\n\n### Recent Commits\n```\n{}\n```",
            tree.chars().take(3000).collect::<String>(),
            log
        ))
    }

    async fn call_claude(&self, prompt: &str) -> Result<String> {
        let claude_cmd = std::env::var("CLAUDE_CMD").unwrap_or_else(|_| "claude".to_string());

        let full_prompt = format!("{}\n\n{}", PLANNER_SYSTEM_PROMPT, prompt);

        let output = Command::new(&claude_cmd)
            .args([
                "--print",
                "--output-format",
                "text",
                "-p",
                &full_prompt,
            ])
            .current_dir(&self.project_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to run claude CLI for planning")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Claude planner failed: {}", stderr);
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl PlanProvider for Planner {
    async fn plan(
        &self,
        issue_title: &str,
        issue_description: &str,
        issue_labels: &[String],
    ) -> Result<PlanResponse> {
        self.create_plan(issue_title, issue_description, issue_labels).await
    }
}
