mod cmd;
mod output;
mod root;
mod session;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand,
    feedback::FeedbackSubcommand,
    init::{DeciderArg, VcsArg},
    snapshot::SnapshotSubcommand,
};
use overseer_core::OverseerError;
use session::Session;
use std::path::PathBuf;

const EXIT_FAILURE: i32 = 1;
const EXIT_REJECTED: i32 = 2;
const EXIT_MANUAL_INTERVENTION: i32 = 3;

#[derive(Parser)]
#[command(
    name = "overseer",
    about = "Approval-gated, snapshot-protected changes to a repository",
    version,
    propagate_version = true
)]
struct Cli {
    /// Target directory (default: enclosing git repository, else cwd)
    #[arg(long, global = true, env = "OVERSEER_TARGET")]
    target: Option<PathBuf>,

    /// State directory (default: <target parent>/.overseer/<target name>)
    #[arg(long, global = true, env = "OVERSEER_HOME")]
    state_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the state directory, config, and approval log for a target
    Init {
        /// Who approves steps
        #[arg(long, value_enum, default_value = "llm")]
        decider: DeciderArg,
        /// With --decider static: approve every step instead of rejecting
        #[arg(long)]
        approve: bool,
        /// How to tell whether the target has uncommitted changes
        #[arg(long, value_enum, default_value = "git")]
        vcs: VcsArg,
    },

    /// Ask the approval gate about a step without running anything
    Approve {
        /// Description of the step
        step: String,
    },

    /// Run a command against the target under approval and rollback
    Run {
        /// Description of the step, shown to the decider
        #[arg(long)]
        step: String,
        /// Command and arguments, after --
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Apply a YAML restructure plan under approval and rollback
    Restructure {
        plan: PathBuf,
        /// Description for the decider (default: summary of the plan)
        #[arg(long)]
        step: Option<String>,
    },

    /// Create, inspect, restore, and prune snapshots
    Snapshot {
        #[command(subcommand)]
        subcommand: SnapshotSubcommand,
    },

    /// Show recorded approval decisions, newest first
    Log {
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Scan documents for broken links, markers, and empty sections
    Scan {
        /// File one feedback entry per file with issues
        #[arg(long)]
        record: bool,
    },

    /// Manage collected feedback
    Feedback {
        #[command(subcommand)]
        subcommand: FeedbackSubcommand,
    },

    /// Show or validate the config
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::Restructure { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let target = root::resolve_target(cli.target.as_deref());
    let state_dir = cli.state_dir.as_deref();
    let json = cli.json;

    let session = || Session::open(&target, state_dir);

    let result = match cli.command {
        Commands::Init {
            decider,
            approve,
            vcs,
        } => cmd::init::run(&target, state_dir, decider, approve, vcs, json),
        Commands::Approve { step } => session().and_then(|s| cmd::approve::run(&s, &step, json)),
        Commands::Run { step, command } => {
            session().and_then(|s| cmd::run::run(&s, &step, &command, json))
        }
        Commands::Restructure { plan, step } => {
            session().and_then(|s| cmd::restructure::run(&s, &plan, step.as_deref(), json))
        }
        Commands::Snapshot { subcommand } => {
            session().and_then(|s| cmd::snapshot::run(&s, subcommand, json))
        }
        Commands::Log { limit } => session().and_then(|s| cmd::log::run(&s, limit, json)),
        Commands::Scan { record } => session().and_then(|s| cmd::scan::run(&s, record, json)),
        Commands::Feedback { subcommand } => {
            session().and_then(|s| cmd::feedback::run(&s, subcommand, json))
        }
        Commands::Config { subcommand } => {
            session().and_then(|s| cmd::config::run(&s, subcommand, json))
        }
    };

    if let Err(e) = result {
        std::process::exit(report(&e));
    }
}

/// Print the error and pick the exit code.
fn report(e: &anyhow::Error) -> i32 {
    let causes = || {
        e.chain()
            .filter_map(|cause| cause.downcast_ref::<OverseerError>())
    };
    if causes().any(OverseerError::is_rejection) {
        eprintln!("error: {e:#}");
        return EXIT_REJECTED;
    }

    let manual = causes().any(OverseerError::requires_manual_intervention);
    if manual {
        tracing::error!("{e:#}");
        eprintln!();
        eprintln!("!!! MANUAL INTERVENTION REQUIRED !!!");
        eprintln!("Rollback failed. The target may match neither its state before nor after");
        eprintln!("the operation. Inspect it and restore by hand with `overseer snapshot restore`.");
        eprintln!();
        eprintln!("error: {e:#}");
        return EXIT_MANUAL_INTERVENTION;
    }

    // Print the full error chain (anyhow's alternate Display)
    eprintln!("error: {e:#}");
    EXIT_FAILURE
}
