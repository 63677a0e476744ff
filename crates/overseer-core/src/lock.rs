//! Cross-process exclusive lock per mutation target.
//!
//! Path: `<target parent>/.overseer/.locks/<encoded target path>.lock`
//!
//! The location is a function of the target alone. State dirs and backup
//! dirs are configurable per invocation and must not split the lock.
//!
//! The lock file is left on disk after release; only the advisory OS lock
//! carries meaning, so a crashed holder never leaves a stale lock behind.
//! The file body records who holds it, for error messages.

use crate::error::{OverseerError, Result};
use crate::paths;
use crate::target::MutationTarget;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub target: PathBuf,
    pub acquired_at: DateTime<Utc>,
}

/// Held for the whole guarded run. Released on drop.
#[derive(Debug)]
pub struct TargetLock {
    file: File,
    path: PathBuf,
}

impl TargetLock {
    /// Try to take the lock without waiting.
    ///
    /// Fails with [`OverseerError::TargetLocked`] if another guarded
    /// operation (in any process) holds it.
    pub fn acquire(target: &MutationTarget) -> Result<Self> {
        let dir = paths::locks_dir(target);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.lock", encode_target(target.root())));

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == fs2::lock_contended_error().kind() {
                return Err(OverseerError::TargetLocked(target.root().to_path_buf()));
            }
            return Err(e.into());
        }

        let holder = LockHolder {
            pid: std::process::id(),
            target: target.root().to_path_buf(),
            acquired_at: Utc::now(),
        };
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serde_json::to_string(&holder)?.as_bytes())?;
        file.flush()?;

        tracing::debug!(lock = %path.display(), "target lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Flatten an absolute path into a single file name.
fn encode_target(root: &Path) -> String {
    let raw = root.to_string_lossy();
    let encoded: String = raw
        .trim_start_matches(['/', '\\'])
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    if encoded.is_empty() {
        "root".to_string()
    } else {
        encoded
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
