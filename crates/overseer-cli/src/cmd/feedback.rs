use crate::output::{print_json, print_table};
use crate::session::Session;
use clap::Subcommand;
use overseer_core::feedback::{self, NewFeedback, Severity};

#[derive(Subcommand)]
pub enum FeedbackSubcommand {
    /// Record a feedback entry
    Add {
        message: String,
        /// Category label
        #[arg(long, default_value = "note")]
        kind: String,
        /// info, warning, or error
        #[arg(long, default_value = "info")]
        severity: Severity,
        /// File or other locator the entry refers to
        #[arg(long)]
        location: Option<String>,
    },
    /// List feedback entries, oldest first
    List,
    /// Delete one entry by id (e.g. F3)
    Delete { id: String },
    /// Delete every entry
    Clear,
}

pub fn run(session: &Session, subcmd: FeedbackSubcommand, json: bool) -> anyhow::Result<()> {
    let state_dir = &session.state_dir;
    match subcmd {
        FeedbackSubcommand::Add {
            message,
            kind,
            severity,
            location,
        } => {
            let entry = feedback::add(
                state_dir,
                NewFeedback {
                    kind,
                    message,
                    severity,
                    location,
                },
            )?;
            if json {
                print_json(&entry)?;
            } else {
                println!("Added feedback [{}]", entry.id);
            }
        }
        FeedbackSubcommand::List => {
            let entries = feedback::list(state_dir)?;
            if json {
                return print_json(&entries);
            }
            if entries.is_empty() {
                println!("No feedback.");
                return Ok(());
            }
            let rows = entries
                .iter()
                .map(|e| {
                    vec![
                        e.id.clone(),
                        e.severity.to_string(),
                        e.kind.clone(),
                        e.location.clone().unwrap_or_default(),
                        e.message.clone(),
                    ]
                })
                .collect();
            print_table(&["ID", "SEVERITY", "KIND", "LOCATION", "MESSAGE"], rows);
        }
        FeedbackSubcommand::Delete { id } => {
            feedback::delete(state_dir, &id)?;
            if json {
                print_json(&serde_json::json!({ "deleted": id }))?;
            } else {
                println!("Deleted feedback [{id}]");
            }
        }
        FeedbackSubcommand::Clear => {
            let count = feedback::clear(state_dir)?;
            if json {
                print_json(&serde_json::json!({ "cleared": count }))?;
            } else {
                println!("Cleared {count} feedback entr{}", if count == 1 { "y" } else { "ies" });
            }
        }
    }
    Ok(())
}
