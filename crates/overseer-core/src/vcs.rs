//! Clean/dirty queries against the version control system that owns a target.

use crate::config::VcsConfig;
use crate::error::{OverseerError, Result};
use crate::target::MutationTarget;
use std::process::Command;
use std::sync::Arc;

/// Reports whether a target has uncommitted changes.
pub trait CleanState: Send + Sync {
    fn is_clean(&self, target: &MutationTarget) -> Result<bool>;
}

pub fn from_config(cfg: &VcsConfig) -> Arc<dyn CleanState> {
    match cfg {
        VcsConfig::Git { include_untracked } => Arc::new(GitCleanState {
            include_untracked: *include_untracked,
        }),
        VcsConfig::None => Arc::new(AssumeClean),
    }
}

// ---------------------------------------------------------------------------
// GitCleanState
// ---------------------------------------------------------------------------

/// `git status --porcelain` in the target root; empty output means clean.
#[derive(Debug, Clone, Copy)]
pub struct GitCleanState {
    pub include_untracked: bool,
}

impl CleanState for GitCleanState {
    fn is_clean(&self, target: &MutationTarget) -> Result<bool> {
        let git = which::which("git")
            .map_err(|_| OverseerError::Vcs("git not found on PATH".to_string()))?;

        let mut cmd = Command::new(git);
        cmd.arg("status").arg("--porcelain");
        if !self.include_untracked {
            cmd.arg("--untracked-files=no");
        }
        let output = cmd
            .current_dir(target.root())
            .output()
            .map_err(|e| OverseerError::Vcs(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(OverseerError::Vcs(format!("git status failed: {stderr}")));
        }
        Ok(output.stdout.iter().all(|b| b.is_ascii_whitespace()))
    }
}

// ---------------------------------------------------------------------------
// AssumeClean
// ---------------------------------------------------------------------------

/// For targets that are not under version control.
#[derive(Debug, Clone, Copy)]
pub struct AssumeClean;

impl CleanState for AssumeClean {
    fn is_clean(&self, _target: &MutationTarget) -> Result<bool> {
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "test")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "test")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    fn committed_repo() -> Option<(TempDir, MutationTarget)> {
        which::which("git").ok()?;
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "-q"]);
        std::fs::write(dir.path().join("a.txt"), "v1").unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-q", "-m", "init"]);
        let target = MutationTarget::open(dir.path()).unwrap();
        Some((dir, target))
    }

    #[test]
    fn committed_repo_is_clean() {
        let Some((_dir, target)) = committed_repo() else {
            return;
        };
        let vcs = GitCleanState {
            include_untracked: true,
        };
        assert!(vcs.is_clean(&target).unwrap());
    }

    #[test]
    fn modified_file_is_dirty() {
        let Some((dir, target)) = committed_repo() else {
            return;
        };
        std::fs::write(dir.path().join("a.txt"), "v2").unwrap();
        let vcs = GitCleanState {
            include_untracked: false,
        };
        assert!(!vcs.is_clean(&target).unwrap());
    }

    #[test]
    fn untracked_file_respects_setting() {
        let Some((dir, target)) = committed_repo() else {
            return;
        };
        std::fs::write(dir.path().join("new_file.txt"), "new content").unwrap();
        let strict = GitCleanState {
            include_untracked: true,
        };
        let lenient = GitCleanState {
            include_untracked: false,
        };
        assert!(!strict.is_clean(&target).unwrap());
        assert!(lenient.is_clean(&target).unwrap());
    }

    #[test]
    fn non_repository_is_an_error() {
        if which::which("git").is_err() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("plain");
        std::fs::create_dir(&repo).unwrap();
        let target = MutationTarget::open(&repo).unwrap();
        // Guard against the temp dir itself sitting inside a work tree.
        let inside_work_tree = Command::new("git")
            .args(["rev-parse", "--is-inside-work-tree"])
            .current_dir(&repo)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if inside_work_tree {
            return;
        }
        let vcs = GitCleanState {
            include_untracked: true,
        };
        assert!(matches!(vcs.is_clean(&target), Err(OverseerError::Vcs(_))));
    }

    #[test]
    fn assume_clean_is_always_clean() {
        let dir = TempDir::new().unwrap();
        let target = MutationTarget::open(dir.path()).unwrap();
        assert!(AssumeClean.is_clean(&target).unwrap());
    }
}
