//! Prowtrace CLI entrypoint.

use clap::Parser;
use prowtrace_trace::{LogFormat, init_logging};
use std::path::PathBuf;

mod commands;
mod config;
mod handlers;


use commands::Commands;
use config::CliConfig;

#[derive(Parser)]
#[command(name = "prowtrace")]
#[command(author, version, about = "Rebuild OpenTelemetry traces for finished Prow jobs", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format: text or json
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;
    init_logging(cli.log_format.unwrap_or(config.log_format), "info");

    match cli.command {
        Commands::Reconstruct(args) => {
            handlers::reconstruct(&config, args).await?;
        }
        Commands::Selftest {
            job_id,
            endpoint,
            dry_run,
        } => handlers::selftest(&config, &job_id, endpoint, dry_run)?,
        Commands::Id { id } => handlers::show_id(&id)?,
    }

    Ok(())
}
