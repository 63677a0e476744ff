//! Feedback queue: issues and notes collected about a target.
//!
//! Layout:
//!   <state dir>/feedback.yaml   : list of feedback entries
//!
//! IDs are sequential: F1, F2, F3, …

use crate::error::{OverseerError, Result};
use crate::{io, paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            other => Err(format!("unknown severity '{other}' (expected info, warning or error)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: String,
    /// Free-form category, e.g. `note`, `content_issues`.
    pub kind: String,
    pub message: String,
    pub severity: Severity,
    /// Path or other locator the entry refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the caller; id and timestamp are assigned on add.
#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub kind: String,
    pub message: String,
    pub severity: Severity,
    pub location: Option<String>,
}

// ---------------------------------------------------------------------------
// Internal file I/O
// ---------------------------------------------------------------------------

fn load_all(state_dir: &Path) -> Result<Vec<FeedbackEntry>> {
    let path = paths::feedback_path(state_dir);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_yaml::from_str(&content)?)
}

fn save_all(state_dir: &Path, entries: &[FeedbackEntry]) -> Result<()> {
    let path = paths::feedback_path(state_dir);
    let content = serde_yaml::to_string(entries)?;
    io::atomic_write(&path, content.as_bytes())
}

fn next_id(entries: &[FeedbackEntry]) -> String {
    // Highest numeric suffix + 1, so deleting the last entry frees its id
    // but deleting an earlier one does not.
    let max = entries
        .iter()
        .filter_map(|n| n.id.strip_prefix('F')?.parse::<usize>().ok())
        .max()
        .unwrap_or(0);
    format!("F{}", max + 1)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn add(state_dir: &Path, new: NewFeedback) -> Result<FeedbackEntry> {
    add_many(state_dir, vec![new]).map(|mut added| added.remove(0))
}

/// Add several entries with a single write. Returns them in input order.
pub fn add_many(state_dir: &Path, batch: Vec<NewFeedback>) -> Result<Vec<FeedbackEntry>> {
    let mut entries = load_all(state_dir)?;
    let mut added = Vec::with_capacity(batch.len());
    for new in batch {
        let entry = FeedbackEntry {
            id: next_id(&entries),
            kind: new.kind,
            message: new.message,
            severity: new.severity,
            location: new.location,
            created_at: Utc::now(),
        };
        entries.push(entry.clone());
        added.push(entry);
    }
    if !added.is_empty() {
        save_all(state_dir, &entries)?;
    }
    Ok(added)
}

/// All entries, oldest first.
pub fn list(state_dir: &Path) -> Result<Vec<FeedbackEntry>> {
    load_all(state_dir)
}

pub fn delete(state_dir: &Path, id: &str) -> Result<()> {
    let mut entries = load_all(state_dir)?;
    let before = entries.len();
    entries.retain(|n| n.id != id);
    if entries.len() == before {
        return Err(OverseerError::FeedbackNotFound(id.to_string()));
    }
    save_all(state_dir, &entries)
}

/// Remove every entry. Returns how many were removed.
pub fn clear(state_dir: &Path) -> Result<usize> {
    let count = load_all(state_dir)?.len();
    save_all(state_dir, &[])?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn note(message: &str) -> NewFeedback {
        NewFeedback {
            kind: "note".to_string(),
            message: message.to_string(),
            severity: Severity::Info,
            location: None,
        }
    }

    #[test]
    fn add_and_list() {
        let dir = tempfile::TempDir::new().unwrap();
        let entry = add(dir.path(), note("Docs index is stale")).unwrap();
        assert_eq!(entry.id, "F1");
        assert_eq!(entry.message, "Docs index is stale");

        let entries = list(dir.path()).unwrap();
        assert_eq!(entries, vec![entry]);
    }

    #[test]
    fn sequential_ids() {
        let dir = tempfile::TempDir::new().unwrap();
        let added = add_many(dir.path(), vec![note("First"), note("Second")]).unwrap();
        assert_eq!(added[0].id, "F1");
        assert_eq!(added[1].id, "F2");
        assert_eq!(add(dir.path(), note("Third")).unwrap().id, "F3");
    }

    #[test]
    fn delete_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        add(dir.path(), note("Keep")).unwrap();
        add(dir.path(), note("Remove")).unwrap();

        delete(dir.path(), "F2").unwrap();

        let entries = list(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "F1");
    }

    #[test]
    fn delete_missing_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            delete(dir.path(), "F99"),
            Err(OverseerError::FeedbackNotFound(_))
        ));
    }

    #[test]
    fn id_continues_from_highest() {
        let dir = tempfile::TempDir::new().unwrap();
        add_many(dir.path(), vec![note("A"), note("B"), note("C")]).unwrap();
        delete(dir.path(), "F1").unwrap();
        assert_eq!(add(dir.path(), note("D")).unwrap().id, "F4");
    }

    #[test]
    fn clear_removes_all() {
        let dir = tempfile::TempDir::new().unwrap();
        add_many(dir.path(), vec![note("A"), note("B")]).unwrap();
        assert_eq!(clear(dir.path()).unwrap(), 2);
        assert!(list(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("WARNING".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!("warn".parse::<Severity>().unwrap(), Severity::Warning);
        assert!("critical".parse::<Severity>().is_err());
    }
}
