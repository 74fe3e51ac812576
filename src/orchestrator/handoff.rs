//! Handoff brief generation.
//!
//! When a run stops — whether cleanly at phase 5 or halted on an
//! unresolved escalation — this module renders a summary a human (or the
//! next invocation of this engine) can pick up from: what phase things are
//! in, what's unresolved, and a recommended next action. The brief is
//! regenerated, not appended, on every terminal transition so it always
//! reflects current state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors_aggregator::{AggregatedError, ErrorSeverity};
use crate::decomposition::types::{DecompositionTask, TaskStatus};

const MAX_LIST_ITEMS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffBrief {
    pub project_name: String,
    pub generated_at: DateTime<Utc>,
    pub current_phase: u8,
    pub phase_name: String,
    pub completed_tasks: usize,
    pub total_tasks: usize,
    pub next_action: String,
    pub unresolved_by_severity: Vec<(ErrorSeverity, Vec<String>)>,
    pub blockers: Vec<String>,
    pub pending_work: Vec<String>,
    pub files_in_progress: Vec<String>,
    pub open_questions: Vec<String>,
}

impl HandoffBrief {
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Handoff Brief — {}\n\n", self.project_name));
        out.push_str(&format!(
            "Generated: {}\n\n",
            self.generated_at.to_rfc3339()
        ));
        out.push_str(&format!(
            "**Phase:** {} ({})\n",
            self.current_phase, self.phase_name
        ));
        out.push_str(&format!(
            "**Tasks:** {}/{} completed\n\n",
            self.completed_tasks, self.total_tasks
        ));

        out.push_str("## Recommended next action\n\n");
        out.push_str(&self.next_action);
        out.push_str("\n\n");

        if !self.unresolved_by_severity.is_empty() {
            out.push_str("## Unresolved errors\n\n");
            for (severity, messages) in &self.unresolved_by_severity {
                out.push_str(&format!("### {severity:?}\n"));
                for m in messages {
                    out.push_str(&format!("- {m}\n"));
                }
            }
            out.push('\n');
        }

        if !self.blockers.is_empty() {
            out.push_str("## Blockers\n\n");
            for b in &self.blockers {
                out.push_str(&format!("- {b}\n"));
            }
            out.push('\n');
        }

        if !self.pending_work.is_empty() {
            out.push_str("## Pending work\n\n");
            for p in &self.pending_work {
                out.push_str(&format!("- {p}\n"));
            }
            out.push('\n');
        }

        if !self.files_in_progress.is_empty() {
            out.push_str("## Files in progress\n\n");
            for f in &self.files_in_progress {
                out.push_str(&format!("- `{f}`\n"));
            }
            out.push('\n');
        }

        if !self.open_questions.is_empty() {
            out.push_str("## Open questions\n\n");
            for q in &self.open_questions {
                out.push_str(&format!("- {q}\n"));
            }
            out.push('\n');
        }

        out
    }
}

const PHASE_NAMES: [&str; 6] = [
    "prerequisites",
    "planning",
    "validation",
    "implementation",
    "verification",
    "completion",
];

/// Builds a `HandoffBrief` from the pieces of workflow state that matter to
/// a resuming operator: phase progress, task list, and the error aggregator.
pub struct HandoffGenerator<'a> {
    project_name: &'a str,
    current_phase: u8,
    tasks: &'a [DecompositionTask],
    errors: Vec<&'a AggregatedError>,
    review_skipped: bool,
}

impl<'a> HandoffGenerator<'a> {
    pub fn new(project_name: &'a str, current_phase: u8, tasks: &'a [DecompositionTask]) -> Self {
        Self {
            project_name,
            current_phase,
            tasks,
            errors: Vec::new(),
            review_skipped: false,
        }
    }

    pub fn with_errors(mut self, errors: Vec<&'a AggregatedError>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_review_skipped(mut self, skipped: bool) -> Self {
        self.review_skipped = skipped;
        self
    }

    pub fn generate(&self) -> HandoffBrief {
        let completed = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();

        let mut by_severity: Vec<(ErrorSeverity, Vec<String>)> = Vec::new();
        for severity in [
            ErrorSeverity::Critical,
            ErrorSeverity::Error,
            ErrorSeverity::Warning,
        ] {
            let messages: Vec<String> = self
                .errors
                .iter()
                .filter(|e| e.severity == severity)
                .take(MAX_LIST_ITEMS)
                .map(|e| e.message.clone())
                .collect();
            if !messages.is_empty() {
                by_severity.push((severity, messages));
            }
        }

        HandoffBrief {
            project_name: self.project_name.to_string(),
            generated_at: Utc::now(),
            current_phase: self.current_phase,
            phase_name: PHASE_NAMES
                .get(self.current_phase as usize)
                .copied()
                .unwrap_or("unknown")
                .to_string(),
            completed_tasks: completed,
            total_tasks: self.tasks.len(),
            next_action: self.determine_next_action(),
            unresolved_by_severity: by_severity,
            blockers: self.get_blockers(),
            pending_work: self.get_pending_work(),
            files_in_progress: self.get_files_in_progress(),
            open_questions: Vec::new(),
        }
    }

    /// Priority ladder: critical unresolved errors first, then phase-specific
    /// guidance, falling back to a generic "continue" message.
    fn determine_next_action(&self) -> String {
        if let Some(critical) = self
            .errors
            .iter()
            .find(|e| e.severity == ErrorSeverity::Critical)
        {
            return format!(
                "Resolve the critical error before resuming: {}",
                critical.message
            );
        }

        match self.current_phase {
            0 => "Run prerequisite checks, then proceed to planning.".to_string(),
            1 => "Planning has not produced an approved plan yet; retry or inspect the planner's output.".to_string(),
            2 => {
                if self.review_skipped {
                    "Validation was skipped after exhausting autonomous retries; review the plan manually before implementation continues.".to_string()
                } else {
                    "Waiting on reviewer feedback for the plan; retry validation.".to_string()
                }
            }
            3 => {
                let remaining = self.tasks.iter().filter(|t| !t.status.is_terminal()).count();
                if remaining > 0 {
                    format!("{remaining} task(s) remain; resume implementation with `select_task`.")
                } else {
                    "All tasks reached a terminal state; proceed to verification.".to_string()
                }
            }
            4 => {
                if self.review_skipped {
                    "Verification was skipped after exhausting autonomous retries; inspect the build before calling this complete.".to_string()
                } else {
                    "Waiting on reviewer feedback for verification; retry.".to_string()
                }
            }
            5 => "Workflow complete.".to_string(),
            _ => "Inspect workflow state; phase number is out of range.".to_string(),
        }
    }

    fn get_blockers(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .take(MAX_LIST_ITEMS)
            .map(|t| format!("{}: {}", t.id, t.error.as_deref().unwrap_or("failed")))
            .collect()
    }

    fn get_pending_work(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .take(MAX_LIST_ITEMS)
            .map(|t| format!("{}: {}", t.id, t.name))
            .collect()
    }

    fn get_files_in_progress(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .flat_map(|t| t.files.clone())
            .take(MAX_LIST_ITEMS)
            .collect()
    }
}
