//! Murmur - unified CLI entrypoint.
//!
//! Usage:
//!   murmur start [--config config/murmur.toml] [--join-addr HOST:PORT]
//!   murmur config validate --config config/murmur.toml

use anyhow::Result;
use clap::Parser;
use murmur::cli::commands::{run_config, run_start};
use murmur::cli::{Cli, Commands};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/murmur.toml"));

    match cli.command {
        Commands::Start(args) => run_start(&config_path, args).await,
        Commands::Config(args) => run_config(&config_path, args),
    }
}
