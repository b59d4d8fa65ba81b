//! Command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};

/// Murmur - distributed, Redis-protocol-compatible in-memory key/value
/// store.
#[derive(Parser, Debug)]
#[command(name = "murmur", version, about)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server.
    Start(commands::start::StartArgs),

    /// Configuration utilities.
    Config(commands::config::ConfigArgs),
}
