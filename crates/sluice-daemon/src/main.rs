//! Sluice scheduler daemon.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "sluiced")]
#[command(about = "Sluice pipeline scheduler", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler service
    Run {
        /// Path to the system configuration file
        #[arg(long, env = "SLUICE_CONFIG")]
        config: Option<PathBuf>,
        /// PostgreSQL connection string; overrides the configuration file
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
        /// Resolve nothing, only keep the loops running
        #[arg(long)]
        noop: bool,
    },
    /// Validate a pipeline definition
    Validate {
        /// Path to the pipeline file
        #[arg(default_value = "pipeline.kdl")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Commands::Run {
            config,
            database_url,
            noop,
        } => {
            commands::run(config.as_deref(), database_url, noop).await?;
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
    }

    Ok(())
}
