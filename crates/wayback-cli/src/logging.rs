//! Logging initialization.
//!
//! Sets up the tracing subscriber from the global CLI flags. Logs always go to
//! stderr so stdout stays clean for results.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::cli::Cli;

/// Initialize the logging subsystem based on CLI flags.
///
/// Machine-readable output (JSON/JSONL) drops the level to errors unless
/// `--verbose` was given explicitly.
///
/// # Errors
///
/// Returns an error if the global tracing subscriber cannot be set.
pub fn initialize_logging(cli: &Cli) -> Result<()> {
    let level = level_for(cli);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn level_for(cli: &Cli) -> Level {
    if cli.verbose {
        Level::DEBUG
    } else if cli.quiet || cli.command.format().is_machine() {
        Level::ERROR
    } else {
        Level::WARN
    }
}
