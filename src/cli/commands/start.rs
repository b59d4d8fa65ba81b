//! Start command implementation.

use crate::core::config::{Config, ConfigOverrides};
use crate::core::runtime::Runtime;
use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

/// Start the Murmur server.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Override the server identity.
    #[arg(long)]
    pub server_id: Option<String>,

    /// Override the address of an existing member to join through.
    #[arg(long)]
    pub join_addr: Option<String>,

    /// Override the client port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Override the log level.
    #[arg(long)]
    pub log_level: Option<String>,
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Run the start command with the given config path.
pub async fn run_start(config_path: &Path, args: StartArgs) -> Result<()> {
    let mut config = if config_path.exists() {
        Config::from_file(config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        Config::default()
    };

    config.apply_overrides(&ConfigOverrides {
        server_id: args.server_id,
        join_addr: args.join_addr,
        port: args.port,
        log_level: args.log_level,
    });
    config.validate()?;

    init_tracing(&config.telemetry.log_level);

    let mut runtime = Runtime::new(config)?;
    runtime.run().await
}
