//! Decomposition trigger detection.
//!
//! This module detects when a phase should be decomposed based on:
//! - Budget usage vs. progress ratio
//! - Complexity signals in blocker messages
//! - Explicit decomposition requests from Claude

use crate::decomposition::config::DecompositionConfig;
use crate::phase::Phase;
use crate::signals::IterationSignals;
use serde::{Deserialize, Serialize};

/// Accumulated execution signals across multiple iterations.
///
/// This provides a simplified interface for checking decomposition triggers.
#[derive(Debug, Clone, Default)]
pub struct ExecutionSignals {
    /// Blocker descriptions accumulated from iterations.
    blockers: Vec<String>,
    /// Whether an explicit decomposition request was detected.
    decomposition_requested: bool,
    /// Latest progress percentage.
    latest_progress: Option<u8>,
}

impl ExecutionSignals {
    /// Create a new empty signals accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add signals from an iteration.
    pub fn add_iteration(&mut self, signals: &IterationSignals) {
        // Collect blocker descriptions
        for blocker in &signals.blockers {
            self.blockers.push(blocker.description.clone());
        }

        // Update latest progress
        if let Some(pct) = signals.latest_progress() {
            self.latest_progress = Some(pct);
        }
    }

    /// Add a blocker description directly.
    pub fn add_blocker(&mut self, description: &str) {
        self.blockers.push(description.to_string());
    }

    /// Mark that a decomposition request was detected.
    pub fn add_decomposition_request(&mut self) {
        self.decomposition_requested = true;
    }

    /// Check if a decomposition request was made.
    pub fn has_decomposition_request(&self) -> bool {
        self.decomposition_requested
    }

    /// Get all blocker descriptions.
    pub fn blockers(&self) -> &[String] {
        &self.blockers
    }

    /// Get the latest progress percentage.
    pub fn latest_progress(&self) -> Option<u8> {
        self.latest_progress
    }

    /// Set the latest progress percentage.
    pub fn set_progress(&mut self, percent: u8) {
        self.latest_progress = Some(percent);
    }

    /// Check if there are any blockers.
    pub fn has_blockers(&self) -> bool {
        !self.blockers.is_empty()
    }

    /// Clear all signals.
    pub fn clear(&mut self) {
        self.blockers.clear();
        self.decomposition_requested = false;
        self.latest_progress = None;
    }
}

/// Reason for triggering decomposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerReason {
    /// Budget threshold exceeded with insufficient progress.
    BudgetProgressMismatch {
        iterations_used: u32,
        budget: u32,
        progress_percent: u32,
    },
    /// Complexity detected in blocker message.
    ComplexitySignal { message: String },
    /// Explicit decomposition request from Claude.
    ExplicitRequest,
    /// Multiple blockers indicate need for decomposition.
    MultipleBlockers { count: usize },
    /// No trigger condition met.
    None,
}

impl TriggerReason {
    /// Get a human-readable description of the trigger.
    pub fn description(&self) -> String {
        match self {
            Self::BudgetProgressMismatch {
                iterations_used,
                budget,
                progress_percent,
            } => format!(
                "Budget progress mismatch: {}% budget used ({}/{}) with only {}% progress",
                (iterations_used * 100) / budget,
                iterations_used,
                budget,
                progress_percent
            ),
            Self::ComplexitySignal { message } => format!("Complexity signal detected: {}", message),
            Self::ExplicitRequest => "Explicit decomposition request from Claude".to_string(),
            Self::MultipleBlockers { count } => {
                format!("Multiple blockers ({}) indicate need for decomposition", count)
            }
            Self::None => "No decomposition trigger".to_string(),
        }
    }
}

/// Result of checking for decomposition triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionTrigger {
    /// Whether decomposition should be triggered.
    should_decompose: bool,
    /// The reason for the trigger (or None if not triggered).
    reason: TriggerReason,
    /// Current iteration count.
    iterations_used: u32,
    /// Total budget.
    budget: u32,
    /// Last reported progress (0-100).
    progress_percent: u32,
}

impl DecompositionTrigger {
    /// Create a trigger indicating decomposition is needed.
    pub fn triggered(
        reason: TriggerReason,
        iterations_used: u32,
        budget: u32,
        progress_percent: u32,
    ) -> Self {
        Self {
            should_decompose: true,
            reason,
            iterations_used,
            budget,
            progress_percent,
        }
    }

    /// Create a trigger indicating decomposition is not needed.
    pub fn not_triggered(iterations_used: u32, budget: u32, progress_percent: u32) -> Self {
        Self {
            should_decompose: false,
            reason: TriggerReason::None,
            iterations_used,
            budget,
            progress_percent,
        }
    }

    /// Check if decomposition should occur.
    pub fn should_decompose(&self) -> bool {
        self.should_decompose
    }

    /// Get the trigger reason.
    pub fn reason(&self) -> &TriggerReason {
        &self.reason
    }

    /// Get a description of the trigger.
    pub fn description(&self) -> String {
        self.reason.description()
    }

    /// Get the iterations used.
    pub fn iterations_used(&self) -> u32 {
        self.iterations_used
    }

    /// Get the budget.
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Get the progress percentage.
    pub fn progress_percent(&self) -> u32 {
        self.progress_percent
    }
}

/// Detector for decomposition triggers.
#[derive(Debug, Clone)]
pub struct DecompositionDetector {
    config: DecompositionConfig,
}

impl DecompositionDetector {
    /// Create a new detector with the given configuration.
    pub fn new(config: DecompositionConfig) -> Self {
        Self { config }
    }

    /// Create a detector with default configuration.
    pub fn default_config() -> Self {
        Self::new(DecompositionConfig::default())
    }

    /// Check if decomposition should be triggered based on budget and progress.
    ///
    /// Triggers if:
    /// - iterations_used > (budget * threshold_percent / 100) AND
    /// - progress < progress_threshold_percent
    pub fn check_budget_trigger(
        &self,
        phase: &Phase,
        iterations_used: u32,
        progress_percent: u32,
    ) -> DecompositionTrigger {
        if !self.config.enabled {
            return DecompositionTrigger::not_triggered(iterations_used, phase.budget, progress_percent);
        }

        let budget_threshold = (phase.budget * self.config.budget_threshold_percent) / 100;

        if iterations_used > budget_threshold && progress_percent < self.config.progress_threshold_percent
        {
            DecompositionTrigger::triggered(
                TriggerReason::BudgetProgressMismatch {
                    iterations_used,
                    budget: phase.budget,
                    progress_percent,
                },
                iterations_used,
                phase.budget,
                progress_percent,
            )
        } else {
            DecompositionTrigger::not_triggered(iterations_used, phase.budget, progress_percent)
        }
    }

    /// Check if decomposition should be triggered based on execution signals.
    ///
    /// Looks for:
    /// - Explicit `<request-decomposition/>` signals
    /// - Complexity keywords in blocker messages
    /// - Multiple blockers
    pub fn check_signals_trigger(
        &self,
        phase: &Phase,
        signals: &ExecutionSignals,
        iterations_used: u32,
        progress_percent: u32,
    ) -> DecompositionTrigger {
        if !self.config.enabled {
            return DecompositionTrigger::not_triggered(iterations_used, phase.budget, progress_percent);
        }

        // Check for explicit decomposition request
        if self.config.allow_explicit_request && signals.has_decomposition_request() {
            return DecompositionTrigger::triggered(
                TriggerReason::ExplicitRequest,
                iterations_used,
                phase.budget,
                progress_percent,
            );
        }

        // Check for complexity signals in blockers
        if self.config.detect_complexity_signals {
            for blocker in signals.blockers() {
                if self.config.is_complexity_keyword(blocker) {
                    return DecompositionTrigger::triggered(
                        TriggerReason::ComplexitySignal {
                            message: blocker.clone(),
                        },
                        iterations_used,
                        phase.budget,
                        progress_percent,
                    );
                }
            }

            // Multiple blockers might indicate the phase is too complex
            let blocker_count = signals.blockers().len();
            if blocker_count >= 3 {
                return DecompositionTrigger::triggered(
                    TriggerReason::MultipleBlockers {
                        count: blocker_count,
                    },
                    iterations_used,
                    phase.budget,
                    progress_percent,
                );
            }
        }

        DecompositionTrigger::not_triggered(iterations_used, phase.budget, progress_percent)
    }

    /// Check all trigger conditions.
    ///
    /// Returns the first trigger that fires, or no trigger if none apply.
    pub fn check_trigger(
        &self,
        phase: &Phase,
        iterations_used: u32,
        progress_percent: u32,
    ) -> DecompositionTrigger {
        // Budget trigger takes precedence as it's more objective
        let budget_trigger = self.check_budget_trigger(phase, iterations_used, progress_percent);
        if budget_trigger.should_decompose() {
            return budget_trigger;
        }

        DecompositionTrigger::not_triggered(iterations_used, phase.budget, progress_percent)
    }

    /// Check all trigger conditions including signals.
    pub fn check_trigger_with_signals(
        &self,
        phase: &Phase,
        signals: &ExecutionSignals,
        iterations_used: u32,
        progress_percent: u32,
    ) -> DecompositionTrigger {
        // Signal triggers take precedence (explicit requests, complexity signals)
        let signal_trigger =
            self.check_signals_trigger(phase, signals, iterations_used, progress_percent);
        if signal_trigger.should_decompose() {
            return signal_trigger;
        }

        // Then check budget trigger
        self.check_trigger(phase, iterations_used, progress_percent)
    }

    /// Check if a text output contains a decomposition request.
    pub fn has_decomposition_request(&self, output: &str) -> bool {
        if !self.config.allow_explicit_request {
            return false;
        }
        output.contains("<request-decomposition")
            || output.contains("<request_decomposition")
            || output.contains("<decomposition-request")
    }

    /// Get the configuration.
    pub fn config(&self) -> &DecompositionConfig {
        &self.config
    }
}
