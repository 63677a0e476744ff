use crate::output::print_json;
use crate::session::Session;
use overseer_core::OverseerError;

/// Consult the gate for `step` without running anything.
pub fn run(session: &Session, step: &str, json: bool) -> anyhow::Result<()> {
    let gate = session.gate()?;
    let record = gate.review(step)?;

    if json {
        print_json(&record)?;
    } else {
        let verdict = if record.approved { "approved" } else { "rejected" };
        println!("{verdict}: {} (decider: {})", record.step, record.decider);
        if let Some(note) = &record.note {
            println!("  note: {note}");
        }
    }
    if !record.approved {
        return Err(OverseerError::Rejected {
            step: record.step,
            note: record.note,
        }
        .into());
    }
    Ok(())
}
