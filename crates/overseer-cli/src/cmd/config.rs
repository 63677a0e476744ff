use crate::output::print_json;
use crate::session::Session;
use clap::Subcommand;
use overseer_core::config::WarnLevel;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective config
    Show,
    /// Validate the config for common mistakes
    Validate,
}

pub fn run(session: &Session, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(session, json),
        ConfigSubcommand::Validate => validate(session, json),
    }
}

fn show(session: &Session, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&session.config);
    }
    println!("# {}", session.state_dir.display());
    print!("{}", serde_yaml::to_string(&session.config)?);
    Ok(())
}

fn validate(session: &Session, json: bool) -> anyhow::Result<()> {
    let warnings = session.config.validate(&session.target, &session.state_dir);

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);
    if has_errors {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}
