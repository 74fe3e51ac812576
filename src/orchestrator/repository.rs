//! Durable store contract and a file-backed reference implementation.
//!
//! The graph engine depends only on this trait; it has no opinion on SQL
//! vs. graph-native vs. flat files. The reference implementation here
//! writes newline-delimited JSON logs plus one checkpoint-per-file under
//! `<project>/.workflow/`, following the atomic current-file pattern
//! `AuditLogger` already uses for run state: one "current" pointer file
//! plus an append-only history.
//!
//! Every log write funnels through `save_log`, resolving the single
//! naming inconsistency between `repo.save` and `repo.save_log` noted in
//! `SPEC_FULL.md` §10.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RepositoryError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub previous_id: Option<String>,
    pub checkpoint_id: String,
    pub state_snapshot: Value,
    pub pending_next_nodes: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub interrupted: bool,
    pub interrupt_payload: Option<Value>,
    /// Set only on the checkpoint written when a caller-requested pause
    /// takes effect, distinguishing it from an ordinary node-boundary
    /// checkpoint — `resume` treats both the same way, but a reader of the
    /// checkpoint history (or a human deciding whether to resume) needs to
    /// tell a deliberate pause apart from the graph simply being mid-run.
    #[serde(default)]
    pub paused: bool,
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), RepositoryError>;
    async fn latest_checkpoint(&self, thread_id: &str) -> Result<Checkpoint, RepositoryError>;
    async fn checkpoint_history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, RepositoryError>;

    /// Append a structured log record. The single write path for research
    /// logs, action-log entries, and anything else the engine persists as
    /// an append-only record outside the checkpoint stream.
    async fn save_log(&self, project_name: &str, log_type: &str, record: Value)
    -> Result<(), RepositoryError>;

    async fn query_logs(&self, project_name: &str, log_type: &str) -> Result<Vec<Value>, RepositoryError>;
}

/// File-backed reference implementation rooted at `<project>/.workflow/`.
///
/// `checkpoints/<thread_id>.ndjson` holds the full checkpoint history in
/// append order (last line = latest); `logs/<log_type>.ndjson` holds
/// arbitrary structured records for that log type.
pub struct FileRepository {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn checkpoints_dir(&self) -> PathBuf {
        self.root.join("checkpoints")
    }

    fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    fn checkpoint_file(&self, thread_id: &str) -> PathBuf {
        self.checkpoints_dir().join(format!("{thread_id}.ndjson"))
    }

    fn log_file(&self, log_type: &str) -> PathBuf {
        self.logs_dir().join(format!("{log_type}.ndjson"))
    }

    fn append_line(path: &Path, line: &str) -> Result<(), RepositoryError> {
        use std::fs::OpenOptions;
        use std::io::Write;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| RepositoryError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| RepositoryError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        writeln!(file, "{line}").map_err(|source| RepositoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    fn read_lines(path: &Path) -> Result<Vec<String>, RepositoryError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path).map_err(|source| RepositoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(content.lines().map(|l| l.to_string()).collect())
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock().unwrap();
        let path = self.checkpoint_file(&checkpoint.thread_id);
        let line = serde_json::to_string(&checkpoint)?;
        Self::append_line(&path, &line)
    }

    async fn latest_checkpoint(&self, thread_id: &str) -> Result<Checkpoint, RepositoryError> {
        let path = self.checkpoint_file(thread_id);
        let lines = Self::read_lines(&path)?;
        let last = lines
            .last()
            .ok_or_else(|| RepositoryError::NoCheckpoints(thread_id.to_string()))?;
        Ok(serde_json::from_str(last)?)
    }

    async fn checkpoint_history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, RepositoryError> {
        let path = self.checkpoint_file(thread_id);
        let lines = Self::read_lines(&path)?;
        lines
            .iter()
            .map(|l| serde_json::from_str(l).map_err(RepositoryError::from))
            .collect()
    }

    async fn save_log(
        &self,
        project_name: &str,
        log_type: &str,
        record: Value,
    ) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut envelope = HashMap::new();
        envelope.insert("project_name".to_string(), Value::String(project_name.to_string()));
        envelope.insert("recorded_at".to_string(), Value::String(Utc::now().to_rfc3339()));
        envelope.insert("record".to_string(), record);
        let line = serde_json::to_string(&envelope)?;
        Self::append_line(&self.log_file(log_type), &line)
    }

    async fn query_logs(&self, project_name: &str, log_type: &str) -> Result<Vec<Value>, RepositoryError> {
        let lines = Self::read_lines(&self.log_file(log_type))?;
        let mut out = Vec::new();
        for line in lines {
            let value: Value = serde_json::from_str(&line)?;
            if value.get("project_name").and_then(|v| v.as_str()) == Some(project_name) {
                out.push(value);
            }
        }
        Ok(out)
    }
}
