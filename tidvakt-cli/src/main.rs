//! ## tidvakt-cli
//! **Operational front end for the ingestion core**
//!
//! - `simulate`: runs the full pipeline against the in-process simulated
//!   kernel and prints a delivery report
//! - `config`: prints the effective configuration

use clap::Parser;
use tidvakt_telemetry::EventLogger;

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;
    EventLogger::init(&config.telemetry.log_level, config.telemetry.json_logs);

    match cli.command {
        Commands::Simulate(args) => commands::simulate(config, args).await,
        Commands::Config => commands::print_config(&config),
    }
}
