use crate::output::print_json;
use crate::session::Session;
use overseer_core::BoxError;
use std::path::Path;
use std::process::Command;

/// Gate `step`, then run `command` in the target root under the guard.
///
/// A non-zero exit status counts as an operation failure and triggers
/// rollback.
pub fn run(session: &Session, step: &str, command: &[String], json: bool) -> anyhow::Result<()> {
    let Some((program, args)) = command.split_first() else {
        anyhow::bail!("no command given after --");
    };
    session.require_valid_config()?;

    let gate = session.gate()?;
    let committed = session.executor().run_approved(&gate, step, &session.target, |root| {
        run_command(root, program, args)
    })?;

    if json {
        print_json(&serde_json::json!({
            "step": step,
            "snapshot": committed.snapshot.id(),
            "exit_code": committed.output,
            "phases": committed.phases,
        }))?;
    } else {
        println!("committed: {step}");
        println!("  snapshot: {}", committed.snapshot.id());
    }
    Ok(())
}

fn run_command(root: &Path, program: &str, args: &[String]) -> Result<i32, BoxError> {
    tracing::info!(program, ?args, "running guarded command");
    let status = Command::new(program)
        .args(args)
        .current_dir(root)
        .status()
        .map_err(|e| format!("failed to start '{program}': {e}"))?;
    if !status.success() {
        return Err(format!("'{program}' exited with {status}").into());
    }
    Ok(status.code().unwrap_or(0))
}
