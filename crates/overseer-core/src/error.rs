use std::path::PathBuf;
use thiserror::Error;

/// Error type carried by a failed guarded operation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum OverseerError {
    #[error("not initialized: run 'overseer init'")]
    NotInitialized,

    #[error("invalid target '{path}': {reason}")]
    InvalidTarget { path: PathBuf, reason: String },

    #[error("target is locked by another guarded operation: {0}")]
    TargetLocked(PathBuf),

    // -- Guarded execution taxonomy -----------------------------------------
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("snapshot I/O error: {0}")]
    SnapshotIo(String),

    #[error("operation failed and the target was restored from snapshot {snapshot}: {source}")]
    OperationFailed {
        snapshot: String,
        #[source]
        source: BoxError,
    },

    #[error(
        "rollback from snapshot {snapshot} failed: {restore} (operation error: {operation}); \
         target {} is in an undefined state, manual intervention required",
        target.display()
    )]
    RollbackFailed {
        snapshot: String,
        target: PathBuf,
        operation: String,
        restore: String,
    },

    // -- Snapshots -----------------------------------------------------------
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("invalid snapshot id '{0}'")]
    InvalidSnapshotId(String),

    // -- Approval ------------------------------------------------------------
    #[error(
        "step rejected by approval gate: {step}{}",
        note.as_deref().map(|n| format!(" ({n})")).unwrap_or_default()
    )]
    Rejected { step: String, note: Option<String> },

    #[error("invalid step description: {0}")]
    InvalidStep(String),

    #[error("decider error: {0}")]
    Decider(String),

    #[error("approval log error: {0}")]
    ApprovalLog(String),

    // -- Collaborators -------------------------------------------------------
    #[error("version control error: {0}")]
    Vcs(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid restructure plan: {0}")]
    InvalidPlan(String),

    #[error("feedback entry not found: {0}")]
    FeedbackNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl OverseerError {
    /// True only when the target may be left inconsistent with both its
    /// pre- and post-operation state.
    pub fn requires_manual_intervention(&self) -> bool {
        matches!(self, OverseerError::RollbackFailed { .. })
    }

    /// The approval gate said no; nothing was snapshotted or changed.
    pub fn is_rejection(&self) -> bool {
        matches!(self, OverseerError::Rejected { .. })
    }
}

pub type Result<T> = std::result::Result<T, OverseerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rollback_failure_requires_intervention() {
        let rollback = OverseerError::RollbackFailed {
            snapshot: "backup_20260101_000000_000".to_string(),
            target: PathBuf::from("/tmp/repo"),
            operation: "boom".to_string(),
            restore: "disk full".to_string(),
        };
        assert!(rollback.requires_manual_intervention());
        assert!(rollback.to_string().contains("manual intervention required"));

        let op = OverseerError::OperationFailed {
            snapshot: "backup_20260101_000000_000".to_string(),
            source: "boom".into(),
        };
        assert!(!op.requires_manual_intervention());
        assert!(!OverseerError::Precondition("dirty".into()).requires_manual_intervention());
        assert!(!OverseerError::Precondition("dirty".into()).is_rejection());
    }

    #[test]
    fn rejection_message_includes_note() {
        let err = OverseerError::Rejected {
            step: "Integrate CMS".to_string(),
            note: Some("decider timed out after 60s".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "step rejected by approval gate: Integrate CMS (decider timed out after 60s)"
        );
        let bare = OverseerError::Rejected {
            step: "Integrate CMS".to_string(),
            note: None,
        };
        assert_eq!(bare.to_string(), "step rejected by approval gate: Integrate CMS");
        assert!(bare.is_rejection());
    }

    #[test]
    fn operation_failed_keeps_source() {
        use std::error::Error as _;
        let err = OverseerError::OperationFailed {
            snapshot: "s".to_string(),
            source: "inner failure".into(),
        };
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("inner failure"));
    }
}
