//! Hook manager for coordinating hook execution.
//!
//! The `HookManager` is the main entry point for the hook system.
//! It loads hook configurations, matches hooks to events/phases,
//! and orchestrates their execution.

use super::config::{HookDefinition, HooksConfig};
use super::executor::HookExecutor;
use super::types::{HookContext, HookEvent, HookResult};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Manages hook loading, matching, and execution.
///
/// The HookManager is responsible for:
/// - Loading hooks from configuration files
/// - Matching hooks to events and phases
/// - Executing hooks and aggregating results
/// - Providing a clean API for the orchestrator
pub struct HookManager {
    /// Loaded hook configuration
    config: HooksConfig,
    /// Hook executor
    executor: HookExecutor,
    /// Path to the forge directory
    forge_dir: PathBuf,
}

impl HookManager {
    /// Create a new HookManager from project directory.
    ///
    /// This loads hooks from `.forge/hooks.toml` if it exists.
    pub fn new(project_dir: impl AsRef<Path>, verbose: bool) -> Result<Self> {
        let project_dir = project_dir.as_ref();
        let forge_dir = project_dir.join(".forge");

        // Load hooks configuration
        let config = HooksConfig::load_or_default(&forge_dir)?;

        let executor = HookExecutor::new(project_dir, verbose);

        Ok(Self {
            config,
            executor,
            forge_dir,
        })
    }

    /// Create a HookManager with explicit config.
    pub fn with_config(project_dir: impl AsRef<Path>, config: HooksConfig, verbose: bool) -> Self {
        let project_dir = project_dir.as_ref();
        let forge_dir = project_dir.join(".forge");
        let executor = HookExecutor::new(project_dir, verbose);

        Self {
            config,
            executor,
            forge_dir,
        }
    }

    /// Reload hooks from configuration file.
    pub fn reload(&mut self) -> Result<()> {
        self.config = HooksConfig::load_or_default(&self.forge_dir)?;
        Ok(())
    }

    /// Merge additional hooks into the configuration.
    ///
    /// This is useful for adding hooks from forge.toml's [hooks] section.
    pub fn merge_config(&mut self, additional: HooksConfig) {
        self.config.merge(additional);
    }

    /// Check if any hooks are registered for an event.
    pub fn has_hooks_for(&self, event: HookEvent) -> bool {
        self.config.has_hooks_for(event)
    }

    /// Get count of enabled hooks.
    pub fn hook_count(&self) -> usize {
        self.config.enabled_hook_count()
    }

    /// Run all hooks for a given event with context.
    ///
    /// Hooks are executed in order. Execution stops on the first
    /// non-continue result (Block, Skip, Reject).
    ///
    /// Returns the aggregate result from all hooks.
    pub async fn run_hooks(&self, context: &HookContext) -> Result<HookResult> {
        let phase_name = context
            .phase
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or("");

        let hooks: Vec<&HookDefinition> = self
            .config
            .hooks_for_event_and_phase(context.event, phase_name);

        if hooks.is_empty() {
            return Ok(HookResult::continue_execution());
        }

        self.executor.execute_all(&hooks, context).await
    }

    /// Convenience method: run PrePhase hooks.
    pub async fn run_pre_phase(
        &self,
        phase: &crate::phase::Phase,
        previous_changes: Option<&crate::audit::FileChangeSummary>,
    ) -> Result<HookResult> {
        let context = HookContext::pre_phase(phase, previous_changes);
        self.run_hooks(&context).await
    }

    /// Convenience method: run PostPhase hooks.
    pub async fn run_post_phase(
        &self,
        phase: &crate::phase::Phase,
        iteration: u32,
        file_changes: &crate::audit::FileChangeSummary,
        promise_found: bool,
    ) -> Result<HookResult> {
        let context = HookContext::post_phase(phase, iteration, file_changes, promise_found);
        self.run_hooks(&context).await
    }

    /// Convenience method: run PreIteration hooks.
    pub async fn run_pre_iteration(
        &self,
        phase: &crate::phase::Phase,
        iteration: u32,
    ) -> Result<HookResult> {
        let context = HookContext::pre_iteration(phase, iteration);
        self.run_hooks(&context).await
    }

    /// Convenience method: run PostIteration hooks.
    pub async fn run_post_iteration(
        &self,
        phase: &crate::phase::Phase,
        iteration: u32,
        file_changes: &crate::audit::FileChangeSummary,
        promise_found: bool,
        output: Option<&str>,
    ) -> Result<HookResult> {
        let context =
            HookContext::post_iteration(phase, iteration, file_changes, promise_found, output);
        self.run_hooks(&context).await
    }

    /// Convenience method: run PostIteration hooks with signals.
    pub async fn run_post_iteration_with_signals(
        &self,
        phase: &crate::phase::Phase,
        iteration: u32,
        file_changes: &crate::audit::FileChangeSummary,
        promise_found: bool,
        output: Option<&str>,
        signals: &crate::signals::IterationSignals,
    ) -> Result<HookResult> {
        let context = HookContext::post_iteration_with_signals(
            phase,
            iteration,
            file_changes,
            promise_found,
            output,
            signals,
        );
        self.run_hooks(&context).await
    }

    /// Convenience method: run PreIteration hooks for the task-centric loop.
    pub async fn run_pre_iteration_task(
        &self,
        task_id: impl Into<String>,
        iteration: u32,
    ) -> Result<HookResult> {
        let context = HookContext::pre_iteration_task(task_id, iteration);
        self.run_hooks(&context).await
    }

    /// Convenience method: run PostIteration hooks for the task-centric loop.
    pub async fn run_post_iteration_task(
        &self,
        task_id: impl Into<String>,
        iteration: u32,
        promise_found: bool,
        output: Option<&str>,
    ) -> Result<HookResult> {
        let context = HookContext::post_iteration_task(task_id, iteration, promise_found, output);
        self.run_hooks(&context).await
    }

    /// Convenience method: poll the StopCheck hook. A hook whose command
    /// exits 0 resolves to `HookAction::Continue`, which here means "stop
    /// the loop early" per the StopCheck contract — inverted from every
    /// other event, where Continue means proceed.
    pub async fn run_stop_check(&self, task_id: impl Into<String>, iteration: u32) -> Result<HookResult> {
        let context = HookContext::stop_check(task_id, iteration);
        self.run_hooks(&context).await
    }

    /// Convenience method: run OnFailure hooks.
    pub async fn run_on_failure(
        &self,
        phase: &crate::phase::Phase,
        iteration: u32,
        file_changes: &crate::audit::FileChangeSummary,
    ) -> Result<HookResult> {
        let context = HookContext::on_failure(phase, iteration, file_changes);
        self.run_hooks(&context).await
    }

    /// Convenience method: run OnApproval hooks.
    pub async fn run_on_approval(
        &self,
        phase: &crate::phase::Phase,
        previous_changes: Option<&crate::audit::FileChangeSummary>,
    ) -> Result<HookResult> {
        let context = HookContext::on_approval(phase, previous_changes);
        self.run_hooks(&context).await
    }

    /// Validate all hooks and return warnings.
    pub fn validate(&self) -> Vec<String> {
        self.config.validate()
    }

    /// Get the hooks configuration (for inspection/debugging).
    pub fn config(&self) -> &HooksConfig {
        &self.config
    }
}
