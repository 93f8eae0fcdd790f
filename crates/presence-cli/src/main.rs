//! Presence CLI entry point

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use presence_cli::{Cli, CliAppConfig, CommandDispatcher, ConfigOverrides};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = CliAppConfig::load(&ConfigOverrides::from_cli(&cli))
        .context("failed to load configuration")?;

    CommandDispatcher::execute(cli.command, &config)
        .await
        .context("command failed")?;
    Ok(())
}

/// Setup logging based on verbosity level; `RUST_LOG` wins when set
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
