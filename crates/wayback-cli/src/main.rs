//! wayback CLI - capture pages and search the Wayback Machine index
//!
//! Main entry point for the `wayback` command-line interface. Command
//! implementations live in [`commands`].

use anyhow::{Context, Result};
use clap::Parser;
use wayback_core::Config;

mod cli;
mod commands;
mod logging;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::initialize_logging(&cli)?;

    let config = load_config(&cli)?;
    execute_command(cli.command, &config).await
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };

    if let Some(agent) = &cli.user_agent {
        config.client.user_agent.clone_from(agent);
    }
    Ok(config)
}

async fn execute_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Save(args) => commands::save::execute(&args, config).await,
        Commands::Cdx(args) => commands::cdx::execute(&args, config).await,
        Commands::Near(args) => commands::near::execute(&args, config).await,
    }
}
