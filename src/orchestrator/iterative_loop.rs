//! The fresh-context per-task loop.
//!
//! Unlike the sequential phase runner (`orchestrator/runner.rs`), which
//! reuses accumulated context across a phase's iterations, this loop spawns
//! a brand-new Claude process per iteration: each call sees only the task
//! description, the repository as it stands, and a short carried-forward
//! summary of what the previous iteration tried and why it didn't pass. A
//! completion tag from the model is treated as a hint worth checking, never
//! as proof — the loop only stops on a passing test run or exhausted
//! iterations/budget.
//!
//! One iteration:
//! 1. check the task's budget; exhausted stops the loop with `budget_exhausted`
//! 2. build the prompt (task + carried-forward context)
//! 3. run the `pre_iteration` hook; a blocking result stops the loop
//! 4. spawn Claude, stream its output, enforce the iteration timeout
//! 5. run the `post_iteration` hook
//! 6. run the resolved test plan, enforcing the test timeout
//! 7. parse failing test names out of the test command's output
//! 8. update `PreviousIterationContext` for the next pass
//! 9. poll `stop_check`; exit code 0 stops the loop early
//!
//! Hooks are loaded the same way the sequential runner loads them —
//! `HookManager::new` reading `<project_dir>/.forge/hooks.toml` — so a
//! project that defines no hooks pays only the cost of a missing-file
//! check per iteration.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::errors::LoopError;
use crate::hooks::manager::HookManager;
use crate::orchestrator::budget::BudgetManager;
use crate::orchestrator::events::{Event, EventEmitter, EventPriority};

const GRACEFUL_KILL_WAIT: Duration = Duration::from_secs(5);
const MAX_CARRIED_FILES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestFramework {
    Cargo,
    Npm,
    Unknown,
}

/// Looks for `Cargo.toml` first since this engine's own project is Rust-native;
/// falls back to `package.json` for tasks operating on a JS/TS subtree.
pub fn detect_test_framework(project_dir: &Path) -> TestFramework {
    if project_dir.join("Cargo.toml").exists() {
        TestFramework::Cargo
    } else if project_dir.join("package.json").exists() {
        TestFramework::Npm
    } else {
        TestFramework::Unknown
    }
}

pub fn test_command(framework: TestFramework) -> Option<(&'static str, &'static [&'static str])> {
    match framework {
        TestFramework::Cargo => Some(("cargo", &["test"])),
        TestFramework::Npm => Some(("npm", &["test"])),
        TestFramework::Unknown => None,
    }
}

/// How a task's tests get run, decided once per loop rather than re-derived
/// every iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestPlan {
    /// The task declared no `test_files`; nothing to run regardless of what
    /// manifests happen to sit in the project directory.
    NotRequired,
    /// A project-level `test_command` was configured; run it verbatim.
    Configured(String),
    /// Fall back to sniffing the project directory for a manifest.
    Detected(TestFramework),
}

/// Decide how to run a task's tests. An empty `test_files` list means the
/// task itself declared no tests to guard it, which takes priority over
/// whatever manifest happens to exist in the project directory. Absent
/// that, an explicitly configured command wins over framework detection.
pub fn resolve_test_plan(
    project_dir: &Path,
    test_files: &[String],
    test_command: Option<&str>,
) -> TestPlan {
    if test_files.is_empty() {
        return TestPlan::NotRequired;
    }
    if let Some(cmd) = test_command {
        return TestPlan::Configured(cmd.to_string());
    }
    TestPlan::Detected(detect_test_framework(project_dir))
}

/// What the previous iteration left behind for this one to read.
#[derive(Debug, Clone, Default)]
pub struct PreviousIterationContext {
    pub iteration: u32,
    pub failed_tests: Vec<String>,
    pub changed_files: Vec<String>,
    pub test_output_tail: Option<String>,
}

impl PreviousIterationContext {
    pub fn to_prompt_section(&self) -> String {
        if self.iteration == 0 {
            return String::new();
        }
        let mut section = format!(
            "## PREVIOUS ITERATION ({})\n\n",
            self.iteration
        );
        if !self.failed_tests.is_empty() {
            section.push_str("Failing tests:\n");
            for t in &self.failed_tests {
                section.push_str(&format!("- {t}\n"));
            }
        } else {
            section.push_str("No tests were reported as failing.\n");
        }
        if !self.changed_files.is_empty() {
            section.push_str("\nFiles changed so far (most recent, capped):\n");
            for f in self.changed_files.iter().take(MAX_CARRIED_FILES) {
                section.push_str(&format!("- `{f}`\n"));
            }
        }
        if let Some(tail) = &self.test_output_tail {
            section.push_str(&format!("\nLast test output tail:\n```\n{tail}\n```\n"));
        }
        section
    }
}

/// Parse `FAILED <name>`-style lines out of test runner output. Cargo's own
/// default harness prints `test foo::bar ... FAILED`; this also matches
/// `FAILED foo::bar` in case a custom harness reorders the tokens.
pub fn parse_failed_tests(output: &str) -> Vec<String> {
    let trailing = Regex::new(r"^test\s+(\S+)\s+\.\.\.\s+FAILED\s*$").unwrap();
    let leading = Regex::new(r"^FAILED\s+(\S+)\s*$").unwrap();
    let mut names = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if let Some(caps) = trailing.captures(line) {
            names.push(caps[1].to_string());
        } else if let Some(caps) = leading.captures(line) {
            names.push(caps[1].to_string());
        }
    }
    names
}

#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub output: String,
    pub completion_claimed: bool,
    pub tests_passed: bool,
    pub context: PreviousIterationContext,
}

/// Budget ladder applied once per iteration. `initial_spend` seeds the
/// manager with whatever this task already spent in an earlier loop run
/// (e.g. a prior `fix_bug` pass), since a fresh `BudgetManager` is
/// reconstructed per `run_task_loop` call rather than kept alive across them.
#[derive(Debug, Clone)]
pub struct BudgetPolicy {
    pub limit: f64,
    pub hard_limit: f64,
    pub fallback_ratio: f64,
    pub estimated_iteration_cost: f64,
    pub initial_spend: f64,
}

/// Configuration for one task's iterative loop run.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub task_id: String,
    pub project_dir: PathBuf,
    pub claude_cmd: String,
    pub claude_flags: Vec<String>,
    pub max_iterations: u32,
    pub iteration_timeout: Duration,
    pub test_timeout: Duration,
    /// Tests the task declared it needs — an empty list means none required,
    /// regardless of what manifest the project directory happens to hold.
    pub test_files: Vec<String>,
    /// Operator-configured test command, used verbatim when no framework
    /// should be auto-detected.
    pub test_command: Option<String>,
    /// `None` disables budget enforcement entirely (the pre-existing,
    /// unconstrained behavior).
    pub budget: Option<BudgetPolicy>,
    /// `None` disables event emission entirely — a caller with no repository
    /// wired up (most unit tests) just doesn't get `ralph_iteration`/
    /// `task_complete` events.
    pub event_emitter: Option<Arc<EventEmitter>>,
    pub project_name: String,
}

/// Runs one iteration: spawn Claude with the given prompt, stream its
/// stdout, and enforce `timeout`. On timeout the child is asked to
/// terminate, given `GRACEFUL_KILL_WAIT` to exit, then killed outright.
pub async fn run_iteration_process(
    cmd_name: &str,
    flags: &[String],
    cwd: &Path,
    prompt: &str,
    iteration_timeout: Duration,
) -> Result<String, LoopError> {
    let mut command = Command::new(cmd_name);
    for flag in flags {
        command.arg(flag);
    }
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .current_dir(cwd);

    let mut child = command.spawn().map_err(|e| {
        LoopError::Agent(crate::errors::OrchestratorError::SpawnFailed(e))
    })?;

    if let Some(mut stdin) = child.stdin.take() {
        use tokio::io::AsyncWriteExt;
        let _ = stdin.write_all(prompt.as_bytes()).await;
        let _ = stdin.shutdown().await;
    }

    let stdout = child.stdout.take();
    let read_output = async move {
        let mut text = String::new();
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                text.push_str(&line);
                text.push('\n');
            }
        }
        text
    };

    match timeout(iteration_timeout, read_output).await {
        Ok(text) => {
            let _ = child.wait().await;
            Ok(text)
        }
        Err(_) => {
            kill_gracefully(&mut child).await;
            Err(LoopError::IterationTimeout {
                task_id: String::new(),
                iteration: 0,
                timeout_secs: iteration_timeout.as_secs(),
            })
        }
    }
}

/// Tokio's `Child` has no portable "ask nicely" primitive short of a raw
/// signal, so this gives the process `GRACEFUL_KILL_WAIT` to have already
/// wound down on its own (it was already racing the timeout that got us
/// here) before escalating to a hard kill.
async fn kill_gracefully(child: &mut Child) {
    if timeout(GRACEFUL_KILL_WAIT, child.wait()).await.is_err() {
        warn!("child did not exit within grace period, killing it directly");
        let _ = child.kill().await;
    }
}

/// Run the task's detected test command, enforcing `test_timeout`, and
/// return its combined stdout+stderr along with whether it exited zero.
pub async fn run_test_command(
    project_dir: &Path,
    framework: TestFramework,
    test_timeout: Duration,
    iteration: u32,
) -> Result<(bool, String), LoopError> {
    let Some((program, args)) = test_command(framework) else {
        return Ok((true, String::new()));
    };

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(project_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = command
        .spawn()
        .map_err(|e| LoopError::Agent(crate::errors::OrchestratorError::SpawnFailed(e)))?;

    match timeout(test_timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let combined = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            Ok((output.status.success(), combined))
        }
        Ok(Err(e)) => Err(LoopError::Agent(crate::errors::OrchestratorError::SpawnFailed(e))),
        Err(_) => Err(LoopError::TestCommandTimeout {
            iteration,
            timeout_secs: test_timeout.as_secs(),
        }),
    }
}

/// Run an operator-configured test command verbatim through a shell, the
/// same `sh -c` spawn `HookExecutor` uses for command hooks — a configured
/// command is as free-form as a hook script and gets the same treatment.
pub async fn run_shell_test_command(
    project_dir: &Path,
    command: &str,
    test_timeout: Duration,
    iteration: u32,
) -> Result<(bool, String), LoopError> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(project_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = cmd
        .spawn()
        .map_err(|e| LoopError::Agent(crate::errors::OrchestratorError::SpawnFailed(e)))?;

    match timeout(test_timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let combined = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            Ok((output.status.success(), combined))
        }
        Ok(Err(e)) => Err(LoopError::Agent(crate::errors::OrchestratorError::SpawnFailed(e))),
        Err(_) => Err(LoopError::TestCommandTimeout {
            iteration,
            timeout_secs: test_timeout.as_secs(),
        }),
    }
}

/// Run whichever test plan `resolve_test_plan` decided on.
pub async fn run_planned_test_command(
    plan: &TestPlan,
    project_dir: &Path,
    test_timeout: Duration,
    iteration: u32,
) -> Result<(bool, String), LoopError> {
    match plan {
        TestPlan::NotRequired => Ok((true, String::new())),
        TestPlan::Configured(command) => {
            run_shell_test_command(project_dir, command, test_timeout, iteration).await
        }
        TestPlan::Detected(framework) => {
            run_test_command(project_dir, *framework, test_timeout, iteration).await
        }
    }
}

/// The literal tag a model emits to claim a task is done. Treated as a hint
/// worth recording, never as proof — only a passing test run stops the loop.
pub const COMPLETION_TOKEN: &str = "<promise>DONE</promise>";

/// Drive one task through its iterations: build a fresh prompt from the
/// carried-forward context, run the agent, run the tests, and stop on the
/// first passing run or `max_iterations` exhaustion.
pub async fn run_task_loop(
    config: &LoopConfig,
    mut build_prompt: impl FnMut(&PreviousIterationContext) -> String,
) -> Result<IterationOutcome, LoopError> {
    let plan = resolve_test_plan(&config.project_dir, &config.test_files, config.test_command.as_deref());
    let mut context = PreviousIterationContext::default();

    let hooks = match HookManager::new(&config.project_dir, false) {
        Ok(manager) => Some(manager),
        Err(err) => {
            warn!(task_id = %config.task_id, %err, "failed to load hooks, continuing without them");
            None
        }
    };

    let mut budget = config.budget.as_ref().map(|policy| {
        let mut mgr = BudgetManager::new(policy.limit, policy.hard_limit, policy.fallback_ratio);
        if policy.initial_spend > 0.0 {
            mgr.record_spend(&config.task_id, policy.initial_spend);
        }
        mgr
    });

    for iteration in 1..=config.max_iterations {
        context.iteration = iteration;

        if let (Some(mgr), Some(policy)) = (&budget, &config.budget) {
            let result = mgr.enforce(&config.task_id, policy.estimated_iteration_cost);
            if !result.allowed {
                warn!(task_id = %config.task_id, iteration, %result.message, "budget exhausted");
                return Err(LoopError::BudgetExhausted {
                    task_id: config.task_id.clone(),
                    iteration,
                });
            }
        }

        if let Some(manager) = &hooks {
            let result = manager
                .run_pre_iteration_task(config.task_id.clone(), iteration)
                .await
                .map_err(|e| LoopError::HookBlocked {
                    task_id: config.task_id.clone(),
                    iteration,
                    reason: e.to_string(),
                })?;
            if !result.should_continue() {
                return Err(LoopError::HookBlocked {
                    task_id: config.task_id.clone(),
                    iteration,
                    reason: result.message.unwrap_or_else(|| "pre_iteration hook blocked".to_string()),
                });
            }
        }

        let prompt = build_prompt(&context);

        let output = run_iteration_process(
            &config.claude_cmd,
            &config.claude_flags,
            &config.project_dir,
            &prompt,
            config.iteration_timeout,
        )
        .await
        .map_err(|err| match err {
            LoopError::IterationTimeout { timeout_secs, .. } => LoopError::IterationTimeout {
                task_id: config.task_id.clone(),
                iteration,
                timeout_secs,
            },
            other => other,
        })?;

        let completion_claimed = output.contains(COMPLETION_TOKEN);

        if let Some(manager) = &hooks {
            let result = manager
                .run_post_iteration_task(config.task_id.clone(), iteration, completion_claimed, Some(&output))
                .await
                .map_err(|e| LoopError::HookBlocked {
                    task_id: config.task_id.clone(),
                    iteration,
                    reason: e.to_string(),
                })?;
            if !result.should_continue() {
                return Err(LoopError::HookBlocked {
                    task_id: config.task_id.clone(),
                    iteration,
                    reason: result.message.unwrap_or_else(|| "post_iteration hook blocked".to_string()),
                });
            }
        }

        let (tests_passed, test_output) =
            run_planned_test_command(&plan, &config.project_dir, config.test_timeout, iteration).await?;

        if let Some(mgr) = budget.as_mut() {
            mgr.record_spend(&config.task_id, config.budget.as_ref().unwrap().estimated_iteration_cost);
        }

        context.failed_tests = parse_failed_tests(&test_output);
        context.test_output_tail = Some(tail_chars(&test_output, 2000));

        if let Some(emitter) = &config.event_emitter {
            let event = Event::new("ralph_iteration", config.project_name.clone(), EventPriority::Medium)
                .with_task(config.task_id.clone())
                .with_data("iteration", json!(iteration))
                .with_data("tests_passed", json!(tests_passed))
                .with_data("completion_claimed", json!(completion_claimed));
            emitter.emit(event).await;
        }

        if tests_passed {
            if let Some(emitter) = &config.event_emitter {
                let event = Event::new("task_complete", config.project_name.clone(), EventPriority::High)
                    .with_task(config.task_id.clone())
                    .with_data("iterations", json!(iteration));
                emitter.emit_now(event).await;
            }
            return Ok(IterationOutcome {
                output,
                completion_claimed,
                tests_passed: true,
                context,
            });
        }

        if let Some(manager) = &hooks {
            let result = manager
                .run_stop_check(config.task_id.clone(), iteration)
                .await
                .map_err(|e| LoopError::HookBlocked {
                    task_id: config.task_id.clone(),
                    iteration,
                    reason: e.to_string(),
                })?;
            if result.action == crate::hooks::types::HookAction::Continue {
                return Err(LoopError::StoppedByHook {
                    task_id: config.task_id.clone(),
                    iteration,
                });
            }
        }
    }

    Err(LoopError::MaxIterationsReached {
        task_id: config.task_id.clone(),
        max_iterations: config.max_iterations,
    })
}

fn tail_chars(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s.to_string();
    }
    s.chars().skip(char_count - max_chars).collect()
}

/// Compute the retention cutoff for pruning per-task iteration logs, using a
/// real `now - days` timestamp rather than deferring the subtraction.
pub fn log_retention_cutoff(days: i64) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::Duration::try_days(days).map(|d| chrono::Utc::now() - d)
}

/// Remove iteration log files under `log_dir` for `task_id` whose modified
/// time is older than `cutoff`.
pub fn prune_iteration_logs(log_dir: &Path, task_id: &str, cutoff: chrono::DateTime<chrono::Utc>) -> usize {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return 0;
    };
    let prefix = format!("task-{task_id}-iter-");
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(&prefix) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let modified: chrono::DateTime<chrono::Utc> = modified.into();
        if modified < cutoff && std::fs::remove_file(&path).is_ok() {
            removed += 1;
            info!(task_id, file = %path.display(), "pruned stale iteration log");
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cargo_style_failed_lines() {
        let output = "running 3 tests\ntest foo::bar ... FAILED\ntest foo::baz ... ok\n";
        let failed = parse_failed_tests(output);
        assert_eq!(failed, vec!["foo::bar".to_string()]);
    }

    #[test]
    fn parses_leading_failed_style_lines() {
        let output = "FAILED foo::bar\nsome other line\n";
        let failed = parse_failed_tests(output);
        assert_eq!(failed, vec!["foo::bar".to_string()]);
    }

    #[test]
    fn no_failures_returns_empty_vec() {
        let output = "running 2 tests\ntest a ... ok\ntest b ... ok\n";
        assert!(parse_failed_tests(output).is_empty());
    }

    #[test]
    fn previous_context_empty_at_iteration_zero() {
        let ctx = PreviousIterationContext::default();
        assert_eq!(ctx.to_prompt_section(), "");
    }

    #[test]
    fn previous_context_caps_changed_files_list() {
        let ctx = PreviousIterationContext {
            iteration: 2,
            failed_tests: vec![],
            changed_files: (0..10).map(|i| format!("file{i}.rs")).collect(),
            test_output_tail: None,
        };
        let section = ctx.to_prompt_section();
        assert_eq!(section.matches("file").count(), MAX_CARRIED_FILES);
    }

    #[test]
    fn detect_test_framework_prefers_cargo_over_npm() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        assert_eq!(detect_test_framework(dir.path()), TestFramework::Cargo);
    }

    #[test]
    fn detect_test_framework_falls_back_to_npm() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        assert_eq!(detect_test_framework(dir.path()), TestFramework::Npm);
    }

    #[test]
    fn detect_test_framework_unknown_with_neither_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_test_framework(dir.path()), TestFramework::Unknown);
    }

    #[test]
    fn retention_cutoff_is_strictly_in_the_past() {
        let cutoff = log_retention_cutoff(7).unwrap();
        assert!(cutoff < chrono::Utc::now());
    }

    #[test]
    fn prune_only_touches_files_matching_the_task_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let t1_log = dir.path().join("task-t1-iter-1-output.log");
        let t2_log = dir.path().join("task-t2-iter-1-output.log");
        std::fs::write(&t1_log, "old").unwrap();
        std::fs::write(&t2_log, "other").unwrap();

        // A cutoff far in the future treats every existing file as stale,
        // which is enough to exercise the prefix filter without needing to
        // fabricate file mtimes.
        let cutoff = chrono::Utc::now() + chrono::Duration::days(3650);
        let removed = prune_iteration_logs(dir.path(), "t1", cutoff);

        assert_eq!(removed, 1);
        assert!(!t1_log.exists());
        assert!(t2_log.exists());
    }

    #[tokio::test]
    async fn run_task_loop_stops_on_first_passing_run_with_no_test_framework() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoopConfig {
            task_id: "t1".to_string(),
            project_dir: dir.path().to_path_buf(),
            claude_cmd: "cat".to_string(),
            claude_flags: vec![],
            max_iterations: 3,
            iteration_timeout: Duration::from_secs(5),
            test_timeout: Duration::from_secs(5),
            test_files: vec![],
            test_command: None,
            budget: None,
            event_emitter: None,
            project_name: "demo".to_string(),
        };

        let outcome = run_task_loop(&config, |_ctx| format!("do the thing\n{COMPLETION_TOKEN}\n"))
            .await
            .unwrap();

        assert!(outcome.tests_passed);
        assert!(outcome.completion_claimed);
        assert!(outcome.output.contains(COMPLETION_TOKEN));
    }

    #[test]
    fn resolve_test_plan_requires_nothing_with_empty_test_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();
        assert_eq!(resolve_test_plan(dir.path(), &[], None), TestPlan::NotRequired);
    }

    #[test]
    fn resolve_test_plan_prefers_configured_command_over_detection() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec!["tests/a_test.rs".to_string()];
        let plan = resolve_test_plan(dir.path(), &files, Some("make test"));
        assert_eq!(plan, TestPlan::Configured("make test".to_string()));
    }

    #[test]
    fn resolve_test_plan_falls_back_to_framework_detection() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();
        let files = vec!["tests/a_test.rs".to_string()];
        let plan = resolve_test_plan(dir.path(), &files, None);
        assert_eq!(plan, TestPlan::Detected(TestFramework::Cargo));
    }

    #[tokio::test]
    async fn run_task_loop_stops_with_budget_exhausted_when_the_ladder_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoopConfig {
            task_id: "t1".to_string(),
            project_dir: dir.path().to_path_buf(),
            claude_cmd: "cat".to_string(),
            claude_flags: vec![],
            max_iterations: 3,
            iteration_timeout: Duration::from_secs(5),
            test_timeout: Duration::from_secs(5),
            test_files: vec![],
            test_command: None,
            budget: Some(BudgetPolicy {
                limit: 0.0,
                hard_limit: 0.0,
                fallback_ratio: 1.0,
                estimated_iteration_cost: 1.0,
                initial_spend: 0.0,
            }),
            event_emitter: None,
            project_name: "demo".to_string(),
        };

        let result = run_task_loop(&config, |_ctx| "do the thing".to_string()).await;
        assert!(matches!(result, Err(LoopError::BudgetExhausted { .. })));
    }

    #[test]
    fn prune_keeps_files_newer_than_the_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("task-t1-iter-1-output.log");
        std::fs::write(&log, "fresh").unwrap();

        let cutoff = chrono::Utc::now() - chrono::Duration::days(3650);
        let removed = prune_iteration_logs(dir.path(), "t1", cutoff);

        assert_eq!(removed, 0);
        assert!(log.exists());
    }
}
