//! Guarded execution: validate, snapshot, run, and roll back on failure.
//!
//! ```text
//! Idle -> Validating -> Snapshotting -> Executing -> Committed
//!             |              |              |
//!             v              v              v
//!         Rejected        Aborted      RollingBack -> RolledBack
//!                                           |
//!                                           v
//!                                     RollbackFailed
//! ```
//!
//! The operation is never invoked unless the target was clean and a
//! snapshot was published immediately before. The per-target lock is held
//! from `Validating` until a terminal phase is reached. With
//! [`GuardedExecutor::run_approved`] the approval gate is consulted inside
//! `Validating`, so the decider runs while the target is already locked.

use crate::approval_log::ApprovalRecord;
use crate::config::RetentionPolicy;
use crate::error::{BoxError, OverseerError, Result};
use crate::gate::ApprovalGate;
use crate::lock::TargetLock;
use crate::snapshot::{SnapshotHandle, SnapshotStore};
use crate::target::MutationTarget;
use crate::vcs::CleanState;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// GuardPhase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardPhase {
    Idle,
    Validating,
    Rejected,
    Snapshotting,
    Aborted,
    Executing,
    Committed,
    RollingBack,
    RolledBack,
    RollbackFailed,
}

impl GuardPhase {
    pub fn can_advance_to(self, next: GuardPhase) -> bool {
        use GuardPhase::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Snapshotting)
                | (Validating, Rejected)
                | (Snapshotting, Executing)
                | (Snapshotting, Aborted)
                | (Executing, Committed)
                | (Executing, RollingBack)
                | (RollingBack, RolledBack)
                | (RollingBack, RollbackFailed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GuardPhase::Rejected
                | GuardPhase::Aborted
                | GuardPhase::Committed
                | GuardPhase::RolledBack
                | GuardPhase::RollbackFailed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GuardPhase::Idle => "idle",
            GuardPhase::Validating => "validating",
            GuardPhase::Rejected => "rejected",
            GuardPhase::Snapshotting => "snapshotting",
            GuardPhase::Aborted => "aborted",
            GuardPhase::Executing => "executing",
            GuardPhase::Committed => "committed",
            GuardPhase::RollingBack => "rolling_back",
            GuardPhase::RolledBack => "rolled_back",
            GuardPhase::RollbackFailed => "rollback_failed",
        }
    }
}

impl std::fmt::Display for GuardPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase history of one run.
struct Phases(Vec<GuardPhase>);

impl Phases {
    fn new() -> Self {
        Self(vec![GuardPhase::Idle])
    }

    fn current(&self) -> GuardPhase {
        self.0.last().copied().unwrap_or(GuardPhase::Idle)
    }

    fn advance(&mut self, next: GuardPhase) {
        let from = self.current();
        debug_assert!(from.can_advance_to(next), "illegal transition {from} -> {next}");
        tracing::info!(%from, to = %next, "guard phase");
        self.0.push(next);
    }
}

// ---------------------------------------------------------------------------
// GuardedExecutor
// ---------------------------------------------------------------------------

/// Result of a successful guarded run.
#[derive(Debug)]
pub struct Committed<T> {
    /// Whatever the operation returned, unchanged.
    pub output: T,
    /// The pre-operation snapshot, kept for manual recovery.
    pub snapshot: SnapshotHandle,
    /// Present when the run went through [`GuardedExecutor::run_approved`].
    pub approval: Option<ApprovalRecord>,
    pub phases: Vec<GuardPhase>,
}

/// Gate and step description for an approved run.
type Approval<'a> = Option<(&'a ApprovalGate, &'a str)>;

pub struct GuardedExecutor {
    store: SnapshotStore,
    clean_state: Arc<dyn CleanState>,
}

impl GuardedExecutor {
    pub fn new(store: SnapshotStore, clean_state: Arc<dyn CleanState>) -> Self {
        Self { store, clean_state }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Run `op` against the target root under the full guard protocol.
    ///
    /// # Errors
    /// - `TargetLocked` if another guarded run holds the target.
    /// - `Precondition` if the target is dirty or its state is unknown.
    ///   Nothing was snapshotted and `op` was not called.
    /// - `SnapshotIo` if the snapshot could not be created; `op` was not called.
    /// - `OperationFailed` if `op` returned an error or panicked; the target
    ///   has been restored.
    /// - `RollbackFailed` if restoring also failed. The target is in an
    ///   undefined state.
    pub fn run_guarded<T, E, F>(&self, target: &MutationTarget, op: F) -> Result<Committed<T>>
    where
        F: FnOnce(&Path) -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        self.execute(target, None, op)
    }

    /// Like [`run_guarded`](Self::run_guarded), but `step` must first pass
    /// `gate`. The gate is consulted after the target lock is taken, so no
    /// other guarded run can touch the target while the decider deliberates.
    ///
    /// # Errors
    /// - `Rejected` if the gate did not approve; nothing was snapshotted and
    ///   `op` was not called. The decision is in the approval log.
    /// - `InvalidStep` / `ApprovalLog` from the gate, with the same guarantee.
    /// - Everything [`run_guarded`](Self::run_guarded) can return.
    pub fn run_approved<T, E, F>(
        &self,
        gate: &ApprovalGate,
        step: &str,
        target: &MutationTarget,
        op: F,
    ) -> Result<Committed<T>>
    where
        F: FnOnce(&Path) -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        self.execute(target, Some((gate, step)), op)
    }

    fn execute<T, E, F>(
        &self,
        target: &MutationTarget,
        approval: Approval<'_>,
        op: F,
    ) -> Result<Committed<T>>
    where
        F: FnOnce(&Path) -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        let mut phases = Phases::new();
        let result = self.drive(target, approval, op, &mut phases);
        result.map(|(output, snapshot, approval)| Committed {
            output,
            snapshot,
            approval,
            phases: phases.0,
        })
    }

    fn drive<T, E, F>(
        &self,
        target: &MutationTarget,
        approval: Approval<'_>,
        op: F,
        phases: &mut Phases,
    ) -> Result<(T, SnapshotHandle, Option<ApprovalRecord>)>
    where
        F: FnOnce(&Path) -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        let _lock = TargetLock::acquire(target)?;

        phases.advance(GuardPhase::Validating);
        let record = match approve(approval).and_then(|record| {
            self.validate(target)?;
            Ok(record)
        }) {
            Ok(record) => record,
            Err(e) => {
                phases.advance(GuardPhase::Rejected);
                return Err(e);
            }
        };

        phases.advance(GuardPhase::Snapshotting);
        let snapshot = match self.store.create(target) {
            Ok(handle) => handle,
            Err(e) => {
                phases.advance(GuardPhase::Aborted);
                return Err(e);
            }
        };

        phases.advance(GuardPhase::Executing);
        let root = target.root();
        let failure: BoxError = match panic::catch_unwind(AssertUnwindSafe(|| op(root))) {
            Ok(Ok(output)) => {
                phases.advance(GuardPhase::Committed);
                return Ok((output, snapshot, record));
            }
            Ok(Err(e)) => e.into(),
            Err(payload) => panic_message(payload.as_ref()).into(),
        };

        phases.advance(GuardPhase::RollingBack);
        tracing::warn!(snapshot = snapshot.id(), error = %failure, "operation failed, rolling back");
        match self.store.restore(&snapshot) {
            Ok(()) => {
                phases.advance(GuardPhase::RolledBack);
                Err(OverseerError::OperationFailed {
                    snapshot: snapshot.id().to_string(),
                    source: failure,
                })
            }
            Err(restore) => {
                phases.advance(GuardPhase::RollbackFailed);
                tracing::error!(
                    snapshot = snapshot.id(),
                    target = %root.display(),
                    operation = %failure,
                    restore = %restore,
                    "ROLLBACK FAILED: target is in an undefined state"
                );
                Err(OverseerError::RollbackFailed {
                    snapshot: snapshot.id().to_string(),
                    target: root.to_path_buf(),
                    operation: failure.to_string(),
                    restore: restore.to_string(),
                })
            }
        }
    }

    /// Clean means clean; anything else, including "could not tell", rejects.
    fn validate(&self, target: &MutationTarget) -> Result<()> {
        match self.clean_state.is_clean(target) {
            Ok(true) => Ok(()),
            Ok(false) => Err(OverseerError::Precondition("uncommitted changes".to_string())),
            Err(e) => Err(OverseerError::Precondition(format!(
                "could not determine clean state: {e}"
            ))),
        }
    }

    /// Take a snapshot outside of any operation, under the same lock and
    /// clean-state check as a guarded run.
    pub fn checkpoint(&self, target: &MutationTarget) -> Result<SnapshotHandle> {
        let _lock = TargetLock::acquire(target)?;
        self.validate(target)?;
        self.store.create(target)
    }

    /// Restore the target from snapshot `id` while holding the target lock.
    ///
    /// Refuses snapshots that were taken from a different target.
    pub fn restore(&self, target: &MutationTarget, id: &str) -> Result<SnapshotHandle> {
        let _lock = TargetLock::acquire(target)?;
        let handle = self.store.get(id)?;
        if handle.meta.target.as_path() != target.root() {
            return Err(OverseerError::SnapshotNotFound(format!(
                "{id} (taken from {})",
                handle.meta.target.display()
            )));
        }
        self.store.restore(&handle)?;
        Ok(handle)
    }

    /// Apply `policy` to the target's snapshots while holding the target
    /// lock, so a run in progress never loses its rollback point.
    pub fn prune(
        &self,
        target: &MutationTarget,
        policy: &RetentionPolicy,
    ) -> Result<Vec<SnapshotHandle>> {
        let _lock = TargetLock::acquire(target)?;
        self.store.prune(target, policy)
    }
}

/// Consult the gate, if any. A rejection is an error carrying the note the
/// gate recorded.
fn approve(approval: Approval<'_>) -> Result<Option<ApprovalRecord>> {
    let Some((gate, step)) = approval else {
        return Ok(None);
    };
    let record = gate.review(step)?;
    if !record.approved {
        return Err(OverseerError::Rejected {
            step: record.step,
            note: record.note,
        });
    }
    Ok(Some(record))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("operation panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("operation panicked: {s}")
    } else {
        "operation panicked".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
