use crate::output::print_json;
use crate::session::Session;
use anyhow::Context;
use overseer_core::restructure::RestructurePlan;
use std::path::Path;

pub fn run(session: &Session, plan_path: &Path, step: Option<&str>, json: bool) -> anyhow::Result<()> {
    let plan = RestructurePlan::load(plan_path)
        .with_context(|| format!("failed to load plan {}", plan_path.display()))?;
    session.require_valid_config()?;

    let step = step.map(str::to_string).unwrap_or_else(|| plan.describe());
    let gate = session.gate()?;
    let committed = session
        .executor()
        .run_approved(&gate, &step, &session.target, |root| plan.apply(root))?;

    if json {
        print_json(&serde_json::json!({
            "step": step,
            "snapshot": committed.snapshot.id(),
            "created": committed.output.created,
            "moved": committed.output.moved,
        }))?;
    } else {
        println!("committed: {step}");
        println!(
            "  created {} director{}, moved {} path{}",
            committed.output.created,
            if committed.output.created == 1 { "y" } else { "ies" },
            committed.output.moved,
            if committed.output.moved == 1 { "" } else { "s" },
        );
        println!("  snapshot: {}", committed.snapshot.id());
    }
    Ok(())
}
