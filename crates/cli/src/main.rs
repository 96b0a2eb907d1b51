use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::Parser;
use claimdesk_cli::Cli;
use claimdesk_core::config::{AppConfig, LogFormat};
use tracing::Level;

/// Logs go to stderr so stdout stays a single JSON payload. Config errors are reported by
/// the command itself; logging then falls back to `warn`.
fn init_logging(cli: &Cli) -> Result<()> {
    let (level, format) = match AppConfig::load(cli.load_options()) {
        Ok(config) => (config.logging.level, config.logging.format),
        Err(_) => ("warn".to_string(), LogFormat::Compact),
    };
    let level = level.parse::<Level>().unwrap_or(Level::INFO);

    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|error| anyhow!(error).context("failed to install the log subscriber"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(error) = init_logging(&cli) {
        eprintln!("{error:#}");
    }
    claimdesk_cli::execute(cli)
}
