//! The agent runner: spawns an opaque agent binary as a subprocess with a
//! prompt, captures its output, and enforces a per-call timeout with
//! graceful-then-forceful termination.
//!
//! `ClaudeRunner` (`orchestrator::runner`) drives the sequential phase path
//! with its own prompt-generation and streaming concerns; this module is
//! the lower-level, library-wide primitive any graph node can call when it
//! just needs "run this agent, get one result back." It commits to a
//! single `AgentResult` shape for both the in-process return value and
//! whatever gets persisted through `Repository::save_log` — no second ad
//! hoc struct for the logged form.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::warn;

const GRACEFUL_KILL_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

impl AgentResult {
    fn failed(duration_seconds: f64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            duration_seconds,
            error: Some(error.into()),
        }
    }
}

/// The arguments to one agent call. Borrowed rather than owned since every
/// field is only needed for the duration of `invoke`.
pub struct AgentInvocation<'a> {
    pub agent_kind: &'a str,
    pub prompt: &'a str,
    pub allowed_tools: &'a [String],
    pub max_turns: Option<u32>,
    pub timeout: Duration,
    pub env_overrides: &'a HashMap<String, String>,
    pub cwd: &'a Path,
}

pub async fn invoke(invocation: AgentInvocation<'_>) -> AgentResult {
    let start = Instant::now();

    let mut cmd = Command::new(invocation.agent_kind);
    cmd.current_dir(invocation.cwd)
        .env("TERM", "dumb")
        .envs(invocation.env_overrides)
        .arg(invocation.prompt);
    if !invocation.allowed_tools.is_empty() {
        cmd.arg("--allowed-tools").arg(invocation.allowed_tools.join(","));
    }
    if let Some(turns) = invocation.max_turns {
        cmd.arg("--max-turns").arg(turns.to_string());
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            return AgentResult::failed(
                start.elapsed().as_secs_f64(),
                format!("failed to spawn '{}': {err}", invocation.agent_kind),
            );
        }
    };

    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(async move { read_all(stdout_pipe).await });
    let stderr_task = tokio::spawn(async move { read_all(stderr_pipe).await });

    match timeout(invocation.timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            AgentResult {
                success: status.success(),
                error: if status.success() {
                    None
                } else {
                    Some(format!("exit code {:?}", status.code()))
                },
                stdout,
                stderr,
                exit_code: status.code(),
                duration_seconds: start.elapsed().as_secs_f64(),
            }
        }
        Ok(Err(err)) => AgentResult::failed(start.elapsed().as_secs_f64(), err.to_string()),
        Err(_elapsed) => {
            kill_gracefully(&mut child).await;
            stdout_task.abort();
            stderr_task.abort();
            AgentResult::failed(start.elapsed().as_secs_f64(), "timeout")
        }
    }
}

async fn read_all(pipe: Option<impl tokio::io::AsyncRead + Unpin>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        if let Err(err) = pipe.read_to_string(&mut buf).await {
            warn!(error = %err, "failed reading agent output stream");
        }
    }
    buf
}

/// Same simplification as the iterative loop's subprocess teardown: give
/// the process `GRACEFUL_KILL_WAIT` to exit on its own, then hard-kill it.
async fn kill_gracefully(child: &mut Child) {
    if timeout(GRACEFUL_KILL_WAIT, child.wait()).await.is_err() {
        let _ = child.kill().await;
    }
}

/// Extract a JSON value from agent stdout: try the whole string first, then
/// fall back to the outermost `{...}` block, since agents sometimes wrap
/// their JSON in prose or log lines.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_json_parses_a_bare_object() {
        let parsed = extract_json(r#"{"success": true}"#).unwrap();
        assert_eq!(parsed, json!({"success": true}));
    }

    #[test]
    fn extract_json_finds_the_outermost_braces_in_prose() {
        let text = "Here is the result:\n{\"score\": 7}\nThanks!";
        let parsed = extract_json(text).unwrap();
        assert_eq!(parsed, json!({"score": 7}));
    }

    #[test]
    fn extract_json_returns_none_without_any_braces() {
        assert!(extract_json("no json here").is_none());
    }

    #[test]
    fn extract_json_returns_none_for_malformed_braces() {
        assert!(extract_json("{ this is not json }").is_none());
    }

    #[tokio::test]
    async fn invoke_reports_failure_when_the_binary_does_not_exist() {
        let env = HashMap::new();
        let cwd = std::env::temp_dir();
        let result = invoke(AgentInvocation {
            agent_kind: "definitely-not-a-real-agent-binary",
            prompt: "hello",
            allowed_tools: &[],
            max_turns: None,
            timeout: Duration::from_secs(5),
            env_overrides: &env,
            cwd: &cwd,
        })
        .await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn invoke_captures_stdout_and_exit_status_from_a_real_process() {
        let env = HashMap::new();
        let cwd = std::env::temp_dir();
        let result = invoke(AgentInvocation {
            agent_kind: "echo",
            prompt: "hello-from-agent",
            allowed_tools: &[],
            max_turns: None,
            timeout: Duration::from_secs(5),
            env_overrides: &env,
            cwd: &cwd,
        })
        .await;
        assert!(result.success);
        assert!(result.stdout.contains("hello-from-agent"));
    }

    #[tokio::test]
    async fn invoke_times_out_and_kills_a_long_running_process() {
        let env = HashMap::new();
        let cwd = std::env::temp_dir();
        let result = invoke(AgentInvocation {
            agent_kind: "sleep",
            prompt: "5",
            allowed_tools: &[],
            max_turns: None,
            timeout: Duration::from_millis(100),
            env_overrides: &env,
            cwd: &cwd,
        })
        .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("timeout"));
    }
}
