//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the persisted display name
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Advertise a display name and list nearby peers
    Run {
        /// Display name to advertise (defaults to the stored name)
        #[arg(short, long)]
        name: Option<String>,

        /// Scan only; do not advertise
        #[arg(long)]
        no_advertise: bool,

        /// Advertise only; do not scan
        #[arg(long)]
        no_scan: bool,

        /// Start in background mode (continuous scanning)
        #[arg(long)]
        background: bool,

        /// Print sightings as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Show or change the persisted display name
    Name {
        #[command(subcommand)]
        action: NameAction,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Subcommand, Debug)]
pub enum NameAction {
    /// Print the stored display name
    Show,
    /// Store a new display name
    Set {
        /// The new display name
        name: String,
    },
}
