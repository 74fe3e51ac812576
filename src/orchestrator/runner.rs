use crate::audit::ClaudeSession;
use crate::config::Config;
use crate::phase::Phase;
use crate::skills::SkillsLoader;
use crate::stream::{ContentBlock, StreamEvent, describe_tool_use, tool_emoji, truncate_thinking};
use crate::ui::OrchestratorUI;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

pub struct ClaudeRunner {
    config: Config,
}

pub struct IterationResult {
    pub session: ClaudeSession,
    pub promise_found: bool,
    pub output: String,
}

impl ClaudeRunner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run_iteration(
        &self,
        phase: &Phase,
        iteration: u32,
        ui: Option<Arc<OrchestratorUI>>,
    ) -> Result<IterationResult> {
        let prompt = self.generate_prompt(phase);

        // Write prompt to file
        let prompt_file = self.config.log_dir.join(format!(
            "phase-{}-iter-{}-prompt.md",
            phase.number, iteration
        ));

        if let Some(ref ui) = ui {
            ui.log_step("Writing prompt file...");
        }

        std::fs::write(&prompt_file, &prompt).context("Failed to write prompt file")?;

        let output_file = self.config.log_dir.join(format!(
            "phase-{}-iter-{}-output.log",
            phase.number, iteration
        ));

        let start = Instant::now();

        // Build command
        let mut cmd = Command::new(&self.config.claude_cmd);
        let flags = self.config.claude_flags();
        for flag in &flags {
            cmd.arg(flag);
        }

        // Log the command being executed
        let cmd_display = format!("{} {}", self.config.claude_cmd, flags.join(" "));
        if let Some(ref ui) = ui {
            ui.log_step(&format!("Spawning: {}", cmd_display));
        }

        // Run Claude with prompt via stdin
        let mut child = cmd
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .current_dir(&self.config.project_dir)
            .spawn()
            .context("Failed to spawn Claude process")?;

        let child_pid = child.id().unwrap_or(0);
        if let Some(ref ui) = ui {
            ui.log_step(&format!("Process spawned (PID: {})", child_pid));
        }

        // Write prompt to stdin and close it
        if let Some(mut stdin) = child.stdin.take() {
            use tokio::io::AsyncWriteExt;
            if let Some(ref ui) = ui {
                ui.log_step(&format!("Writing {} chars to stdin...", prompt.len()));
            }
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await.context("Failed to close stdin")?;
        }

        // Take stdout for streaming
        let stdout = child.stdout.take().context("Failed to get stdout")?;
        let mut reader = BufReader::new(stdout).lines();

        // Accumulate output and final result
        let mut accumulated_text = String::new();
        let mut final_result: Option<String> = None;
        let mut is_error = false;

        // Spawn elapsed time updater
        let ui_clone = ui.clone();
        let start_clone = start;
        let elapsed_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            interval.tick().await;
            loop {
                interval.tick().await;
                let elapsed = start_clone.elapsed();
                if let Some(ref ui) = ui_clone {
                    ui.update_elapsed(elapsed);
                }
            }
        });

        // Process streaming JSON events
        while let Some(line) = reader.next_line().await? {
            if line.is_empty() {
                continue;
            }

            // Try to parse as JSON
            match serde_json::from_str::<StreamEvent>(&line) {
                Ok(event) => {
                    match event {
                        StreamEvent::Assistant { message, .. } => {
                            for content in message.content {
                                match content {
                                    ContentBlock::ToolUse { name, input, .. } => {
                                        let desc = describe_tool_use(&name, &input);
                                        let emoji = tool_emoji(&name);
                                        if let Some(ref ui) = ui {
                                            ui.show_tool_use(emoji, &desc);
                                        }
                                    }
                                    ContentBlock::Text { text } => {
                                        accumulated_text.push_str(&text);
                                        accumulated_text.push('\n');
                                        // Show brief thinking snippet
                                        let snippet = truncate_thinking(&text, 60);
                                        if !snippet.is_empty() {
                                            if let Some(ref ui) = ui {
                                                ui.show_thinking(&snippet);
                                            }
                                        }
                                    }
                                }
                            }
                        }
                        StreamEvent::Result {
                            result,
                            is_error: err,
                            ..
                        } => {
                            final_result = result;
                            is_error = err;
                        }
                        StreamEvent::User { .. } | StreamEvent::System { .. } => {
                            // Ignore these events
                        }
                    }
                }
                Err(_) => {
                    // Not valid JSON, might be stderr or other output
                    accumulated_text.push_str(&line);
                    accumulated_text.push('\n');
                }
            }
        }

        // Wait for process to finish
        let status = child.wait().await?;
        elapsed_task.abort();

        let duration = start.elapsed();
        let exit_code = status.code().unwrap_or(-1);

        if let Some(ref ui) = ui {
            ui.log_step(&format!(
                "Completed in {:.1}s (exit: {})",
                duration.as_secs_f64(),
                exit_code
            ));
        }

        // Use final_result if available, otherwise accumulated text
        let combined_output = final_result.unwrap_or(accumulated_text);

        if is_error {
            if let Some(ref ui) = ui {
                ui.log_step("Claude reported an error");
            }
        }

        // Write output to file
        std::fs::write(&output_file, &combined_output).context("Failed to write output file")?;

        // Check for promise in output
        let promise_tag = format!("<promise>{}</promise>", phase.promise);
        let promise_found = combined_output.contains(&promise_tag);

        if let Some(ref ui) = ui {
            if promise_found {
                ui.log_step(&format!("Promise tag found: {}", promise_tag));
            } else {
                ui.log_step(&format!(
                    "Promise tag NOT found (looking for: {})",
                    promise_tag
                ));
            }
        }

        let session = ClaudeSession {
            prompt_file: prompt_file.clone(),
            prompt_chars: prompt.len(),
            output_file: output_file.clone(),
            output_chars: combined_output.len(),
            exit_code,
            token_usage: None, // TODO: Extract from output if available
        };

        Ok(IterationResult {
            session,
            promise_found,
            output: combined_output,
        })
    }

    fn generate_prompt(&self, phase: &Phase) -> String {
        // Read spec file contents
        let spec_content = std::fs::read_to_string(&self.config.spec_file)
            .unwrap_or_else(|e| format!("[ERROR: Could not read spec file: {}]", e));

        // Load skills for this phase
        let skills_section = self.load_skills_for_phase(phase);

        let base_context = format!(
            r#"You are implementing a project per the following spec.

## SPECIFICATION
{}
{}"#,
            spec_content, skills_section
        );

        let critical_rules = format!(
            r#"## CRITICAL RULES
1. Follow the spec requirements exactly
2. Check existing code before making changes
3. Run tests/checks to verify your work
4. Only output <promise>{}</promise> when the task is FULLY complete and verified
5. If tests fail, fix them before claiming completion

"#,
            phase.promise
        );

        format!(
            "{}{}## TASK
Implement phase {} - {}

When complete, output:
<promise>{}</promise>",
            base_context, critical_rules, phase.number, phase.name, phase.promise
        )
    }

    /// Load skills for a phase, combining phase-defined skills with global skills from config.
    fn load_skills_for_phase(&self, phase: &Phase) -> String {
        let forge_dir = self.config.project_dir.join(".forge");
        let mut loader = SkillsLoader::new(&forge_dir, self.config.verbose);

        // Collect all skill names: phase skills + global skills from config
        let mut all_skills = phase.skills.clone();

        // Add global skills from forge.toml if available
        if let Some(fc) = self.config.forge_config() {
            let phase_settings = fc.toml.phase_settings(&phase.name);
            for skill in phase_settings.skills {
                if !all_skills.contains(&skill) {
                    all_skills.push(skill);
                }
            }
        }

        if all_skills.is_empty() {
            return String::new();
        }

        match loader.generate_skills_section(&all_skills) {
            Ok(section) => section,
            Err(e) => {
                if self.config.verbose {
                    eprintln!("Warning: Failed to load skills: {}", e);
                }
                String::new()
            }
        }
    }

    pub fn get_prompt_file(&self, phase: &str, iteration: u32) -> PathBuf {
        self.config
            .log_dir
            .join(format!("phase-{}-iter-{}-prompt.md", phase, iteration))
    }

    pub fn get_output_file(&self, phase: &str, iteration: u32) -> PathBuf {
        self.config
            .log_dir
            .join(format!("phase-{}-iter-{}-output.log", phase, iteration))
    }

    /// Generate prompt (public for testing)
    #[cfg(test)]
    pub fn generate_prompt_for_test(&self, phase: &Phase) -> String {
        self.generate_prompt(phase)
    }
}
