use crate::output::print_json;
use crate::session::state_dir_for;
use anyhow::Context;
use clap::ValueEnum;
use overseer_core::approval_log::RedbApprovalLog;
use overseer_core::config::{Config, DeciderConfig, VcsConfig, WarnLevel};
use overseer_core::{io, paths, MutationTarget};
use std::path::Path;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DeciderArg {
    /// Ask a language model over the Messages API
    Llm,
    /// Ask the operator on the terminal
    Human,
    /// Fixed answer, see --approve
    Static,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum VcsArg {
    Git,
    None,
}

pub fn run(
    target_root: &Path,
    state_dir: Option<&Path>,
    decider: DeciderArg,
    approve: bool,
    vcs: VcsArg,
    json: bool,
) -> anyhow::Result<()> {
    let target = MutationTarget::open(target_root)?;
    let state_dir = state_dir_for(&target, state_dir);
    target.ensure_outside(&state_dir, "state directory")?;

    if !json {
        println!("Initializing overseer for: {}", target.root().display());
    }
    io::ensure_dir(&state_dir)
        .with_context(|| format!("failed to create {}", state_dir.display()))?;

    let config_path = paths::config_path(&state_dir);
    let created = !config_path.exists();
    let config = if created {
        let mut cfg = Config::default();
        cfg.decider = match decider {
            DeciderArg::Llm => DeciderConfig::default(),
            DeciderArg::Human => DeciderConfig::Human,
            DeciderArg::Static => DeciderConfig::Static { approve },
        };
        cfg.vcs = match vcs {
            VcsArg::Git => VcsConfig::default(),
            VcsArg::None => VcsConfig::None,
        };
        cfg.save(&state_dir).context("failed to write config.yaml")?;
        cfg
    } else {
        Config::load(&state_dir).context("failed to load existing config.yaml")?
    };

    let db_path = paths::approvals_db_path(&state_dir);
    RedbApprovalLog::open(&db_path)
        .with_context(|| format!("failed to create {}", db_path.display()))?;

    let backup_dir = config.snapshot.backup_dir(&state_dir);
    io::ensure_dir(&backup_dir)
        .with_context(|| format!("failed to create {}", backup_dir.display()))?;

    let warnings = config.validate(&target, &state_dir);

    if json {
        print_json(&serde_json::json!({
            "target": target.root(),
            "state_dir": state_dir,
            "config_created": created,
            "warnings": warnings,
        }))?;
    } else {
        let verb = if created { "created:" } else { "exists: " };
        println!("  {verb} {}", config_path.display());
        println!("  ready:   {}", db_path.display());
        println!("  ready:   {}", backup_dir.display());
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }
    Ok(())
}
