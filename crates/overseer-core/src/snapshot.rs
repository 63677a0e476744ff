//! Point-in-time copies of a mutation target.
//!
//! # Layout
//!
//! ```text
//! <backup_dir>/
//!   backup_20261016_142530_000/
//!     snapshot.yaml      SnapshotMeta
//!     tree/              exact copy of the target root
//!   .partial-XXXXXX/     staging area, never listed
//! ```
//!
//! A snapshot is copied into a `.partial-*` staging directory and renamed
//! into place only once both the tree and its metadata are written, so a
//! listed snapshot is always complete. Published snapshots are never
//! modified; they are only read by restore or removed by an explicit prune.

use crate::config::RetentionPolicy;
use crate::error::{OverseerError, Result};
use crate::io;
use crate::paths;
use crate::target::MutationTarget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Upper bound on same-second snapshots before creation gives up.
const MAX_PER_SECOND: u32 = 10_000;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub id: String,
    /// Canonical root of the target this snapshot was taken from.
    pub target: PathBuf,
    pub created_at: DateTime<Utc>,
    pub files: u64,
    pub bytes: u64,
}

/// A published, complete snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotHandle {
    pub meta: SnapshotMeta,
    /// `<backup_dir>/<id>`
    pub location: PathBuf,
}

impl SnapshotHandle {
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn tree(&self) -> PathBuf {
        self.location.join(paths::SNAPSHOT_TREE)
    }
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

pub struct SnapshotStore {
    backup_dir: PathBuf,
    copy_timeout: Option<Duration>,
}

impl SnapshotStore {
    /// `backup_dir` is created on first use.
    pub fn new(backup_dir: impl Into<PathBuf>, copy_timeout: Option<Duration>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            copy_timeout,
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Copy the whole target tree into a new snapshot.
    ///
    /// Every failure, including an expired copy deadline, is reported as
    /// `SnapshotIo` and leaves nothing behind in the backup directory.
    pub fn create(&self, target: &MutationTarget) -> Result<SnapshotHandle> {
        self.create_at(target, Utc::now()).map_err(into_snapshot_io)
    }

    fn create_at(&self, target: &MutationTarget, created_at: DateTime<Utc>) -> Result<SnapshotHandle> {
        target.ensure_outside(&self.backup_dir, "backup directory")?;
        io::ensure_dir(&self.backup_dir)?;

        // Removed on drop unless renamed into place first.
        let staging = tempfile::Builder::new()
            .prefix(paths::PARTIAL_PREFIX)
            .tempdir_in(&self.backup_dir)?;
        let tree = staging.path().join(paths::SNAPSHOT_TREE);
        std::fs::create_dir(&tree)?;

        let deadline = self.copy_timeout.map(|t| Instant::now() + t);
        let stats = io::copy_tree(target.root(), &tree, deadline)?;

        let mut meta = SnapshotMeta {
            id: String::new(),
            target: target.root().to_path_buf(),
            created_at,
            files: stats.files,
            bytes: stats.bytes,
        };
        let location = self.publish(staging.path(), &mut meta)?;

        tracing::info!(
            snapshot = %meta.id,
            files = meta.files,
            bytes = meta.bytes,
            "snapshot created"
        );
        Ok(SnapshotHandle { meta, location })
    }

    /// Claim the first free `<stamp>_NNN` id by renaming the staging dir.
    ///
    /// A rename onto an existing, non-empty snapshot dir fails, so two
    /// writers racing for the same id cannot both win.
    fn publish(&self, staging: &Path, meta: &mut SnapshotMeta) -> Result<PathBuf> {
        let stamp = meta.created_at.format("%Y%m%d_%H%M%S").to_string();
        for counter in 0..MAX_PER_SECOND {
            let id = format!("{}_{stamp}_{counter:03}", paths::SNAPSHOT_PREFIX);
            let dest = paths::snapshot_dir(&self.backup_dir, &id);
            if dest.exists() {
                continue;
            }
            meta.id = id;
            io::atomic_write(
                &staging.join(paths::SNAPSHOT_META),
                serde_yaml::to_string(&*meta)?.as_bytes(),
            )?;
            match std::fs::rename(staging, &dest) {
                Ok(()) => return Ok(dest),
                Err(_) if dest.exists() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(OverseerError::SnapshotIo(format!(
            "more than {MAX_PER_SECOND} snapshots in one second"
        )))
    }

    /// Replace the target's contents with the snapshot tree.
    ///
    /// Total: anything in the target that is not in the snapshot is
    /// removed. Running it again with the same handle yields the same
    /// state. No deadline applies; an interrupted restore is worse than a
    /// slow one.
    pub fn restore(&self, handle: &SnapshotHandle) -> Result<()> {
        let tree = handle.tree();
        if !tree.is_dir() {
            return Err(OverseerError::SnapshotIo(format!(
                "snapshot {} has no tree at {}",
                handle.id(),
                tree.display()
            )));
        }
        let root = &handle.meta.target;
        let restore = || -> Result<()> {
            io::ensure_dir(root)?;
            io::clear_dir(root)?;
            io::copy_tree(&tree, root, None)?;
            Ok(())
        };
        restore().map_err(into_snapshot_io)?;
        tracing::info!(snapshot = handle.id(), target = %root.display(), "snapshot restored");
        Ok(())
    }

    /// Look up a published snapshot by id.
    pub fn get(&self, id: &str) -> Result<SnapshotHandle> {
        paths::validate_snapshot_id(id)?;
        let location = paths::snapshot_dir(&self.backup_dir, id);
        let meta_path = paths::snapshot_meta(&self.backup_dir, id);
        if !meta_path.is_file() {
            return Err(OverseerError::SnapshotNotFound(id.to_string()));
        }
        let meta: SnapshotMeta = serde_yaml::from_str(&std::fs::read_to_string(&meta_path)?)?;
        Ok(SnapshotHandle { meta, location })
    }

    /// Snapshots owned by `target`, oldest first.
    pub fn list(&self, target: &MutationTarget) -> Result<Vec<SnapshotHandle>> {
        let mut handles = Vec::new();
        if !self.backup_dir.is_dir() {
            return Ok(handles);
        }
        for entry in std::fs::read_dir(&self.backup_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if paths::validate_snapshot_id(&name).is_err() {
                continue;
            }
            match self.get(&name) {
                Ok(handle) if handle.meta.target.as_path() == target.root() => handles.push(handle),
                Ok(_) => {}
                Err(e) => tracing::warn!(snapshot = %name, error = %e, "skipping unreadable snapshot"),
            }
        }
        handles.sort_by(|a, b| order_key(a.id()).cmp(&order_key(b.id())));
        Ok(handles)
    }

    /// Delete the oldest snapshots of `target` beyond `policy.keep_last`.
    /// Returns what was removed. A policy without a limit removes nothing.
    ///
    /// `keep_last: 0` is refused: the newest snapshot may be the rollback
    /// point of a run in progress. Callers outside a guarded context should
    /// go through [`crate::guard::GuardedExecutor::prune`], which holds the
    /// target lock.
    pub fn prune(&self, target: &MutationTarget, policy: &RetentionPolicy) -> Result<Vec<SnapshotHandle>> {
        let keep = match policy.keep_last {
            None => return Ok(Vec::new()),
            Some(0) => {
                return Err(OverseerError::InvalidConfig(
                    "snapshot.retention.keep_last must be at least 1".to_string(),
                ))
            }
            Some(n) => n,
        };
        let mut handles = self.list(target)?;
        let excess = handles.len().saturating_sub(keep);
        let removed: Vec<SnapshotHandle> = handles.drain(..excess).collect();
        for handle in &removed {
            io::remove_tree(&handle.location)?;
            tracing::info!(snapshot = handle.id(), "snapshot pruned");
        }
        Ok(removed)
    }
}

/// Sort by timestamp, then numerically by counter, so `_1000` follows `_999`.
fn order_key(id: &str) -> (&str, u64) {
    match id.rsplit_once('_') {
        Some((stamp, counter)) => (stamp, counter.parse().unwrap_or(0)),
        None => (id, 0),
    }
}

fn into_snapshot_io(e: OverseerError) -> OverseerError {
    match e {
        OverseerError::SnapshotIo(_) => e,
        other => OverseerError::SnapshotIo(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
