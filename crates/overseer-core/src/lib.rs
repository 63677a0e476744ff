pub mod approval_log;
pub mod config;
pub mod decider;
pub mod error;
pub mod feedback;
pub mod gate;
pub mod guard;
pub mod io;
pub mod lock;
pub mod paths;
pub mod restructure;
pub mod scan;
pub mod snapshot;
pub mod target;
pub mod vcs;

pub use error::{BoxError, OverseerError, Result};
pub use gate::ApprovalGate;
pub use guard::{Committed, GuardPhase, GuardedExecutor};
pub use snapshot::{SnapshotHandle, SnapshotStore};
pub use target::MutationTarget;
