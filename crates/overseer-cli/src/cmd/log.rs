use crate::output::{print_json, print_table};
use crate::session::Session;

/// Approval audit view, newest first.
pub fn run(session: &Session, limit: usize, json: bool) -> anyhow::Result<()> {
    let records = session.approval_log()?.list(limit)?;
    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No approvals recorded.");
        return Ok(());
    }
    let rows = records
        .iter()
        .map(|r| {
            vec![
                r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                if r.approved { "approved" } else { "rejected" }.to_string(),
                r.decider.clone(),
                r.step.clone(),
                r.note.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["TIME (UTC)", "VERDICT", "DECIDER", "STEP", "NOTE"], rows);
    Ok(())
}
