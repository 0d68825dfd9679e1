mod commands;
mod config;
mod render;

use clap::{Parser, Subcommand};
use tracing::info;

use config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "kairos")]
#[command(about = "Local-first project planner and session recommender")]
struct Cli {
    /// Store path override (falls back to KAIROS_DB, then the data dir).
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// What should I do now, given this many minutes?
    Recommend {
        #[arg(long)]
        minutes: i64,
        /// balanced (default) or critical
        #[arg(long)]
        mode: Option<String>,
        /// Project id or short id to scope to
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        max_slices: Option<i64>,
        /// Allow several slices from one project in the first pass
        #[arg(long, default_value_t = false)]
        no_variation: bool,
    },
    /// Per-project risk and progress
    Status {
        #[arg(long)]
        project: Option<String>,
    },
    /// Re-estimate plans from observed pace, then refresh risk
    Replan {
        #[arg(long)]
        project: Option<String>,
    },
    /// Log a work session
    Log {
        #[arg(long)]
        item: String,
        #[arg(long)]
        minutes: i64,
        #[arg(long)]
        units: Option<i64>,
        #[arg(long)]
        note: Option<String>,
        /// Session date (YYYY-MM-DD), today when omitted
        #[arg(long)]
        date: Option<String>,
    },
    /// Project management
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Free-text command; writes always ask for confirmation
    Ask { text: String },
    /// Interactive loop
    Shell,
}

#[derive(Subcommand, Debug)]
enum ProjectCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        short_id: Option<String>,
        /// Start date (YYYY-MM-DD), today when omitted
        #[arg(long)]
        start: Option<String>,
        /// Target date (YYYY-MM-DD)
        #[arg(long)]
        target: Option<String>,
    },
    List {
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    Archive { project: String },
    Remove { project: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = AppConfig::from_env().with_db_override(cli.db.clone());

    let logs_dir = config
        .db_path
        .parent()
        .map(kairos_observability::default_logs_dir)
        .unwrap_or_else(|| std::path::PathBuf::from(".kairos/logs"));
    let _guard = match kairos_observability::init_process_logging(
        kairos_observability::ProcessKind::Engine,
        &logs_dir,
        14,
    ) {
        Ok((guard, init)) => {
            info!(logs_dir = %init.logs_dir, "logging initialised");
            Some(guard)
        }
        Err(err) => {
            eprintln!("warning: file logging unavailable: {err}");
            None
        }
    };

    // Fatal store/config failures exit nonzero; per-command errors
    // inside the shell loop are caught there and reported instead.
    match commands::run(cli.command, config).await {
        Ok(()) => {}
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}
