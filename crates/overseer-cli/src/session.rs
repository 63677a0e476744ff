use anyhow::Context;
use overseer_core::approval_log::RedbApprovalLog;
use overseer_core::config::{Config, WarnLevel};
use overseer_core::{decider, paths, vcs};
use overseer_core::{ApprovalGate, GuardedExecutor, MutationTarget, SnapshotStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An initialized target together with its state home and config.
pub struct Session {
    pub target: MutationTarget,
    pub state_dir: PathBuf,
    pub config: Config,
}

impl Session {
    pub fn open(target_root: &Path, state_dir: Option<&Path>) -> anyhow::Result<Self> {
        let target = MutationTarget::open(target_root)?;
        let state_dir = state_dir_for(&target, state_dir);
        let config = Config::load(&state_dir).context("failed to load config")?;
        Ok(Self {
            target,
            state_dir,
            config,
        })
    }

    /// Refuse to mutate anything while the config has errors.
    pub fn require_valid_config(&self) -> anyhow::Result<()> {
        let errors: Vec<String> = self
            .config
            .validate(&self.target, &self.state_dir)
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if !errors.is_empty() {
            anyhow::bail!("invalid config: {}", errors.join("; "));
        }
        Ok(())
    }

    pub fn approval_log(&self) -> anyhow::Result<RedbApprovalLog> {
        let path = paths::approvals_db_path(&self.state_dir);
        RedbApprovalLog::open(&path)
            .with_context(|| format!("failed to open approval log {}", path.display()))
    }

    pub fn gate(&self) -> anyhow::Result<ApprovalGate> {
        let decider = decider::from_config(&self.config.decider)?;
        let log = Arc::new(self.approval_log()?);
        Ok(ApprovalGate::new(decider, log).with_timeout(self.config.gate.timeout()))
    }

    pub fn store(&self) -> SnapshotStore {
        SnapshotStore::new(
            self.config.snapshot.backup_dir(&self.state_dir),
            self.config.snapshot.copy_timeout(),
        )
    }

    pub fn executor(&self) -> GuardedExecutor {
        GuardedExecutor::new(self.store(), vcs::from_config(&self.config.vcs))
    }
}

pub fn state_dir_for(target: &MutationTarget, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(dir) => dir.to_path_buf(),
        None => paths::default_state_dir(target),
    }
}
