use crate::output::{print_json, print_table};
use crate::session::Session;
use clap::Subcommand;
use overseer_core::config::RetentionPolicy;
use overseer_core::SnapshotHandle;

#[derive(Subcommand)]
pub enum SnapshotSubcommand {
    /// Snapshot the target now (requires a clean target)
    Create,
    /// List snapshots of the target, oldest first
    List,
    /// Show one snapshot's metadata
    Show { id: String },
    /// Replace the target's contents with a snapshot
    Restore { id: String },
    /// Delete old snapshots, keeping the newest N
    Prune {
        /// Overrides snapshot.retention.keep_last from the config
        #[arg(long)]
        keep: Option<usize>,
    },
}

pub fn run(session: &Session, subcmd: SnapshotSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        SnapshotSubcommand::Create => create(session, json),
        SnapshotSubcommand::List => list(session, json),
        SnapshotSubcommand::Show { id } => show(session, &id, json),
        SnapshotSubcommand::Restore { id } => restore(session, &id, json),
        SnapshotSubcommand::Prune { keep } => prune(session, keep, json),
    }
}

fn create(session: &Session, json: bool) -> anyhow::Result<()> {
    session.require_valid_config()?;
    let handle = session.executor().checkpoint(&session.target)?;
    if json {
        print_json(&handle.meta)?;
    } else {
        println!("created: {}", handle.id());
        println!("  {} files, {} bytes", handle.meta.files, handle.meta.bytes);
    }
    Ok(())
}

fn list(session: &Session, json: bool) -> anyhow::Result<()> {
    let handles = session.store().list(&session.target)?;
    if json {
        let metas: Vec<_> = handles.iter().map(|h| &h.meta).collect();
        return print_json(&metas);
    }
    if handles.is_empty() {
        println!("No snapshots.");
        return Ok(());
    }
    let rows = handles
        .iter()
        .map(|h| {
            vec![
                h.id().to_string(),
                h.meta.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                h.meta.files.to_string(),
                h.meta.bytes.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "CREATED", "FILES", "BYTES"], rows);
    Ok(())
}

fn show(session: &Session, id: &str, json: bool) -> anyhow::Result<()> {
    let handle = session.store().get(id)?;
    if json {
        return print_json(&handle.meta);
    }
    print_handle(&handle);
    Ok(())
}

fn restore(session: &Session, id: &str, json: bool) -> anyhow::Result<()> {
    session.require_valid_config()?;
    let handle = session.executor().restore(&session.target, id)?;
    if json {
        print_json(&serde_json::json!({
            "restored": handle.id(),
            "target": session.target.root(),
        }))?;
    } else {
        println!("restored: {} -> {}", handle.id(), session.target.root().display());
    }
    Ok(())
}

fn prune(session: &Session, keep: Option<usize>, json: bool) -> anyhow::Result<()> {
    let policy = match keep {
        Some(0) => anyhow::bail!("--keep must be at least 1"),
        Some(n) => RetentionPolicy { keep_last: Some(n) },
        None => session.config.snapshot.retention.clone(),
    };
    session.require_valid_config()?;
    if policy.keep_last.is_none() && !json {
        println!("No retention limit configured; nothing pruned.");
        return Ok(());
    }
    let removed = session.executor().prune(&session.target, &policy)?;
    if json {
        let ids: Vec<&str> = removed.iter().map(|h| h.id()).collect();
        print_json(&serde_json::json!({ "removed": ids }))?;
    } else if removed.is_empty() {
        println!("Nothing to prune.");
    } else {
        for handle in &removed {
            println!("removed: {}", handle.id());
        }
    }
    Ok(())
}

fn print_handle(handle: &SnapshotHandle) {
    println!("id:       {}", handle.id());
    println!("target:   {}", handle.meta.target.display());
    println!("created:  {}", handle.meta.created_at.to_rfc3339());
    println!("files:    {}", handle.meta.files);
    println!("bytes:    {}", handle.meta.bytes);
    println!("location: {}", handle.location.display());
}
