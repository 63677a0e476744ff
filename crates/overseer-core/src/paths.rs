use crate::error::{OverseerError, Result};
use crate::target::MutationTarget;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Layout constants
// ---------------------------------------------------------------------------

pub const STATE_DIR: &str = ".overseer";
pub const CONFIG_FILE: &str = "config.yaml";
pub const APPROVALS_DB: &str = "approvals.redb";
pub const FEEDBACK_FILE: &str = "feedback.yaml";
pub const BACKUPS_DIR: &str = "backups";
pub const LOCKS_DIR: &str = ".locks";

pub const SNAPSHOT_PREFIX: &str = "backup";
pub const SNAPSHOT_TREE: &str = "tree";
pub const SNAPSHOT_META: &str = "snapshot.yaml";
pub const PARTIAL_PREFIX: &str = ".partial-";

// ---------------------------------------------------------------------------
// State home
// ---------------------------------------------------------------------------

/// Default state home for a target: `<parent>/.overseer/<target name>`.
///
/// Lives next to the target so that nothing the tool writes ever lands in
/// the tree it protects.
pub fn default_state_dir(target: &MutationTarget) -> PathBuf {
    target.parent().join(STATE_DIR).join(target.name())
}

pub fn config_path(state_dir: &Path) -> PathBuf {
    state_dir.join(CONFIG_FILE)
}

pub fn approvals_db_path(state_dir: &Path) -> PathBuf {
    state_dir.join(APPROVALS_DB)
}

pub fn feedback_path(state_dir: &Path) -> PathBuf {
    state_dir.join(FEEDBACK_FILE)
}

pub fn default_backup_dir(state_dir: &Path) -> PathBuf {
    state_dir.join(BACKUPS_DIR)
}

pub fn snapshot_dir(backup_dir: &Path, id: &str) -> PathBuf {
    backup_dir.join(id)
}

pub fn snapshot_meta(backup_dir: &Path, id: &str) -> PathBuf {
    snapshot_dir(backup_dir, id).join(SNAPSHOT_META)
}

/// Lock directory shared by every state home of the target's parent:
/// `<parent>/.overseer/.locks`. Depends only on the target, so two runs with
/// different state dirs or backup dirs still contend for the same lock.
pub fn locks_dir(target: &MutationTarget) -> PathBuf {
    target.parent().join(STATE_DIR).join(LOCKS_DIR)
}

// ---------------------------------------------------------------------------
// Snapshot id validation
// ---------------------------------------------------------------------------

static SNAPSHOT_ID_RE: OnceLock<Regex> = OnceLock::new();

fn snapshot_id_re() -> &'static Regex {
    SNAPSHOT_ID_RE.get_or_init(|| {
        Regex::new(r"^backup_[0-9]{8}_[0-9]{6}_[0-9]{3,}$").expect("static regex")
    })
}

/// Ids come from the command line and are joined onto the backup dir, so
/// anything that is not exactly the generated shape is refused.
pub fn validate_snapshot_id(id: &str) -> Result<()> {
    if !snapshot_id_re().is_match(id) {
        return Err(OverseerError::InvalidSnapshotId(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_snapshot_ids() {
        for id in ["backup_20261016_142530_000", "backup_20261016_142530_1234"] {
            validate_snapshot_id(id).unwrap_or_else(|_| panic!("expected valid: {id}"));
        }
    }

    #[test]
    fn invalid_snapshot_ids() {
        for id in [
            "",
            "backup_20261016_142530",
            "../backup_20261016_142530_000",
            "backup_20261016_142530_000/..",
            ".partial-abc",
            "snapshot_20261016_142530_000",
        ] {
            assert!(validate_snapshot_id(id).is_err(), "expected invalid: {id}");
        }
    }

    #[test]
    fn path_helpers() {
        let backups = Path::new("/tmp/.overseer/repo/backups");
        assert_eq!(
            snapshot_meta(backups, "backup_20261016_142530_000"),
            PathBuf::from("/tmp/.overseer/repo/backups/backup_20261016_142530_000/snapshot.yaml")
        );
        assert_eq!(
            config_path(Path::new("/tmp/.overseer/repo")),
            PathBuf::from("/tmp/.overseer/repo/config.yaml")
        );
    }
}
