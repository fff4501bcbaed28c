//! matrixmigrate - Mattermost to Matrix migration tool
//!
//! Each step is run as its own invocation; the state file carries progress
//! between them.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use migrator::features::migration::StateStore;
use migrator::{Config, Orchestrator};
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

const DEFAULT_LOG_FILTER: &str = "matrixmigrate=info,migrator=info";

#[derive(Parser, Debug)]
#[command(name = "matrixmigrate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the state of every step
    Status,

    #[command(flatten)]
    Run(RunCommand),
}

/// Commands that take the state lock
#[derive(Subcommand, Debug)]
enum RunCommand {
    /// Read records from Mattermost into a local artifact
    #[command(subcommand)]
    Export(Target),

    /// Create exported records on the Matrix homeserver
    #[command(subcommand)]
    Import(Target),

    /// Check connectivity to Mattermost and Matrix
    Test {
        #[arg(value_enum, default_value = "all")]
        target: commands::test::TestTarget,
    },

    /// Mark a step as handled without running it
    Skip {
        /// Step key, e.g. `export_messages`
        step: String,

        #[arg(long, default_value = "skipped by operator")]
        reason: String,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Target {
    /// Users, teams and channels
    Assets,
    /// Team and channel memberships
    Memberships,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config
        .ensure_data_dirs()
        .context("Failed to create data directories")?;

    let command = match cli.command {
        // Read-only: works while another run holds the lock, or after one crashed
        Commands::Status => {
            let store = StateStore::new(&config.data.state_file);
            let state = store
                .load()
                .await
                .context("Failed to read migration state")?;
            commands::status::print_status(&state, store.path());
            return Ok(());
        }
        Commands::Run(command) => command,
    };

    let mut orchestrator = Orchestrator::open(config)
        .await
        .context("Failed to open migration state")?;
    debug!("[CLI] Using state file {}", orchestrator.state_file().display());

    let result = run(&mut orchestrator, command).await;
    orchestrator.close().await;
    result
}

async fn run(orchestrator: &mut Orchestrator, command: RunCommand) -> Result<()> {
    match command {
        RunCommand::Export(Target::Assets) => commands::steps::export_assets(orchestrator).await,
        RunCommand::Export(Target::Memberships) => {
            commands::steps::export_memberships(orchestrator).await
        }
        RunCommand::Import(Target::Assets) => commands::steps::import_assets(orchestrator).await,
        RunCommand::Import(Target::Memberships) => {
            commands::steps::import_memberships(orchestrator).await
        }
        RunCommand::Test { target } => commands::test::run(orchestrator, target).await,
        RunCommand::Skip { step, reason } => {
            commands::steps::skip(orchestrator, &step, &reason).await
        }
    }
}
