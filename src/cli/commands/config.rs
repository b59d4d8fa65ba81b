//! Config command implementation.

use crate::core::config::Config;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::Path;

/// Configuration utilities.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Parse and validate the configuration file.
    Validate,
}

/// Run the config command with the given config path.
pub fn run_config(config_path: &Path, args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Validate => {
            let config = Config::from_file(config_path)
                .with_context(|| format!("failed to load config from {}", config_path.display()))?;
            println!(
                "configuration valid: server_id={} client={} gossip={}:{} raft={}",
                config.node.server_id,
                config.client_addr(),
                config.node.bind_addr,
                config.gossip.memberlist_bind_port,
                config.raft_addr(),
            );
            Ok(())
        }
    }
}
