//! Filesystem isolation for parallel task execution.
//!
//! A `git worktree` per task gives each parallel `implement_task` run an
//! independent working copy of the project without the cost of a full
//! clone. Grounded on `factory::agent_executor`'s existing
//! `setup_worktree`/`cleanup_worktree`, stripped of that module's SQLite
//! bookkeeping since the graph engine tracks task state in its own state
//! object instead.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::errors::OrchestratorError;

pub struct Worktree {
    pub path: PathBuf,
    pub branch_name: String,
}

/// Create a worktree for `task_id`, branched from `base_branch`, under
/// `<project_dir>/.worktrees/task-<task_id>`.
pub async fn create(project_dir: &Path, task_id: &str, base_branch: &str) -> Result<Worktree, OrchestratorError> {
    let branch_name = format!("workflow/task-{task_id}");
    let path = project_dir.join(".worktrees").join(format!("task-{task_id}"));

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(OrchestratorError::SpawnFailed)?;
    }

    let output = Command::new("git")
        .args(["worktree", "add", "-b", &branch_name])
        .arg(&path)
        .arg(base_branch)
        .current_dir(project_dir)
        .output()
        .await
        .map_err(OrchestratorError::SpawnFailed)?;

    if !output.status.success() {
        return Err(OrchestratorError::GitTracker(format!(
            "git worktree add failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(Worktree { path, branch_name })
}

/// Remove a worktree. Failing to clean up doesn't fail the task it was
/// created for — it's logged and left for a later sweep.
pub async fn remove(project_dir: &Path, worktree_path: &Path) -> Result<(), OrchestratorError> {
    let output = Command::new("git")
        .args(["worktree", "remove", "--force"])
        .arg(worktree_path)
        .current_dir(project_dir)
        .output()
        .await
        .map_err(OrchestratorError::SpawnFailed)?;

    if !output.status.success() {
        return Err(OrchestratorError::GitTracker(format!(
            "git worktree remove failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

/// Merge a completed task's branch back into `base_branch` in the main
/// worktree, sequentially and in task-id order, so two tasks that touch
/// the same file produce a deterministic conflict rather than a race.
pub async fn merge_into(project_dir: &Path, branch_name: &str, base_branch: &str) -> Result<(), OrchestratorError> {
    let checkout = Command::new("git")
        .args(["checkout", base_branch])
        .current_dir(project_dir)
        .output()
        .await
        .map_err(OrchestratorError::SpawnFailed)?;
    if !checkout.status.success() {
        return Err(OrchestratorError::GitTracker(format!(
            "git checkout {base_branch} failed: {}",
            String::from_utf8_lossy(&checkout.stderr)
        )));
    }

    let merge = Command::new("git")
        .args(["merge", "--no-ff", branch_name])
        .current_dir(project_dir)
        .output()
        .await
        .map_err(OrchestratorError::SpawnFailed)?;
    if !merge.status.success() {
        return Err(OrchestratorError::GitTracker(format!(
            "git merge {branch_name} failed: {}",
            String::from_utf8_lossy(&merge.stderr)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn init_repo(dir: &Path) {
        Command::new("git").arg("init").arg("-q").current_dir(dir).output().await.unwrap();
        Command::new("git")
            .args(["config", "user.email", "test@test.com"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
        Command::new("git")
            .args(["config", "user.name", "test"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
        tokio::fs::write(dir.join("README.md"), "hello").await.unwrap();
        Command::new("git").args(["add", "."]).current_dir(dir).output().await.unwrap();
        Command::new("git")
            .args(["commit", "-q", "-m", "initial"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
        Command::new("git")
            .args(["branch", "-M", "main"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_and_remove_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;

        let worktree = create(dir.path(), "t1", "main").await.unwrap();
        assert!(worktree.path.exists());
        assert_eq!(worktree.branch_name, "workflow/task-t1");

        remove(dir.path(), &worktree.path).await.unwrap();
        assert!(!worktree.path.exists());
    }
}
