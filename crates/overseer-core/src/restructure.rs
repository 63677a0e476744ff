//! Declarative repository reorganisation.
//!
//! A plan is a YAML document:
//!
//! ```yaml
//! create:
//!   - docs/guides
//! moves:
//!   - from: GUIDE.md
//!     to: docs/guides/GUIDE.md
//! ```
//!
//! Paths are relative to the target root. Directories are created first,
//! then moves run in order. `apply` is not transactional on its own; run it
//! under [`crate::guard::GuardedExecutor`] so a failed move rolls back.

use crate::error::{OverseerError, Result};
use crate::target::MutationTarget;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestructurePlan {
    #[serde(default)]
    pub create: Vec<PathBuf>,
    #[serde(default)]
    pub moves: Vec<Move>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub created: usize,
    pub moved: usize,
}

impl RestructurePlan {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let plan: Self = serde_yaml::from_str(&data)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Every path must stay inside the target root.
    pub fn validate(&self) -> Result<()> {
        if self.create.is_empty() && self.moves.is_empty() {
            return Err(OverseerError::InvalidPlan("plan has nothing to do".to_string()));
        }
        for dir in &self.create {
            check_relative(dir)?;
        }
        for mv in &self.moves {
            check_relative(&mv.from)?;
            check_relative(&mv.to)?;
            if mv.from == mv.to {
                return Err(OverseerError::InvalidPlan(format!(
                    "move of '{}' onto itself",
                    mv.from.display()
                )));
            }
        }
        Ok(())
    }

    /// Default approval step text for this plan.
    pub fn describe(&self) -> String {
        format!(
            "Refine repository structure: create {} director{}, perform {} move{}",
            self.create.len(),
            if self.create.len() == 1 { "y" } else { "ies" },
            self.moves.len(),
            if self.moves.len() == 1 { "" } else { "s" },
        )
    }

    /// Paths are resolved through any symlinks already in the tree; one that
    /// would land outside `root` fails the plan before anything is touched
    /// at that path.
    pub fn apply(&self, root: &Path) -> Result<ApplySummary> {
        self.validate()?;
        let target = MutationTarget::open(root)?;
        let mut summary = ApplySummary::default();

        for dir in &self.create {
            let path = root.join(dir);
            ensure_inside(&target, &path, dir)?;
            if !path.is_dir() {
                std::fs::create_dir_all(&path)?;
                summary.created += 1;
            }
        }

        for mv in &self.moves {
            let from = root.join(&mv.from);
            let to = root.join(&mv.to);
            // A symlink may itself be moved, so only its parent must resolve inside.
            ensure_inside(&target, from.parent().unwrap_or(root), &mv.from)?;
            ensure_inside(&target, &to, &mv.to)?;
            if std::fs::symlink_metadata(&from).is_err() {
                return Err(OverseerError::InvalidPlan(format!(
                    "move source '{}' does not exist",
                    mv.from.display()
                )));
            }
            if std::fs::symlink_metadata(&to).is_ok() {
                return Err(OverseerError::InvalidPlan(format!(
                    "move destination '{}' already exists",
                    mv.to.display()
                )));
            }
            if let Some(parent) = to.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::rename(&from, &to)?;
            tracing::debug!(from = %mv.from.display(), to = %mv.to.display(), "moved");
            summary.moved += 1;
        }
        Ok(summary)
    }
}

fn ensure_inside(target: &MutationTarget, resolved: &Path, planned: &Path) -> Result<()> {
    if target.contains(resolved) {
        return Ok(());
    }
    Err(OverseerError::InvalidPlan(format!(
        "'{}' resolves outside the target through a symlink",
        planned.display()
    )))
}

fn check_relative(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(OverseerError::InvalidPlan("empty path".to_string()));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(OverseerError::InvalidPlan(format!(
                    "'{}' escapes the target with '..'",
                    path.display()
                )))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(OverseerError::InvalidPlan(format!(
                    "'{}' must be relative to the target root",
                    path.display()
                )))
            }
        }
    }
    if !path.components().any(|c| matches!(c, Component::Normal(_))) {
        return Err(OverseerError::InvalidPlan(format!(
            "'{}' names the target root itself",
            path.display()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
