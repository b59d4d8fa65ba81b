//! Configuration parsing and validation.
//!
//! Murmur configuration is loaded from TOML files with CLI overrides.

use crate::cluster::GossipSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level Murmur configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Node identity and bind host.
    #[serde(default)]
    pub node: NodeConfig,

    /// Client listener configuration.
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Gossip membership configuration.
    #[serde(default)]
    pub gossip: GossipConfig,

    /// Replication configuration.
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Node identity and bind host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's server identity; must be unique in the cluster.
    #[serde(default = "default_server_id")]
    pub server_id: String,

    /// Host all sockets bind on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            server_id: default_server_id(),
            bind_addr: default_bind_addr(),
        }
    }
}

/// Client listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Client port.
    #[serde(default = "default_client_port")]
    pub port: u16,

    /// Maximum concurrent client connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Disable Nagle's algorithm on accepted sockets.
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: default_client_port(),
            max_connections: default_max_connections(),
            nodelay: default_nodelay(),
        }
    }
}

/// Gossip membership configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipConfig {
    /// Gossip bind port.
    #[serde(default = "default_memberlist_bind_port")]
    pub memberlist_bind_port: u16,

    /// Address of an existing member to join through (host:port). Absent on
    /// a solo start.
    #[serde(default)]
    pub join_addr: Option<String>,

    /// Probe cadence in milliseconds.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Replication-endpoint advertisement cadence in milliseconds.
    #[serde(default = "default_broadcast_interval_ms")]
    pub broadcast_interval_ms: u64,

    /// Peer silence threshold in milliseconds.
    #[serde(default = "default_suspicion_timeout_ms")]
    pub suspicion_timeout_ms: u64,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            memberlist_bind_port: default_memberlist_bind_port(),
            join_addr: None,
            probe_interval_ms: default_probe_interval_ms(),
            broadcast_interval_ms: default_broadcast_interval_ms(),
            suspicion_timeout_ms: default_suspicion_timeout_ms(),
        }
    }
}

/// Replication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Replication bind port, advertised to peers via gossip.
    #[serde(default = "default_raft_bind_port")]
    pub raft_bind_port: u16,

    /// Consensus submission timeout in milliseconds.
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            raft_bind_port: default_raft_bind_port(),
            submit_timeout_ms: default_submit_timeout_ms(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// CLI overrides applied on top of the file configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override the server identity.
    pub server_id: Option<String>,

    /// Override the join address.
    pub join_addr: Option<String>,

    /// Override the client port.
    pub port: Option<u16>,

    /// Override the log level.
    pub log_level: Option<String>,
}

// Default value functions

fn default_server_id() -> String {
    "local".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_client_port() -> u16 {
    7480
}

fn default_max_connections() -> usize {
    10_000
}

fn default_nodelay() -> bool {
    true
}

fn default_memberlist_bind_port() -> u16 {
    7946
}

fn default_probe_interval_ms() -> u64 {
    1_000
}

fn default_broadcast_interval_ms() -> u64 {
    5_000
}

fn default_suspicion_timeout_ms() -> u64 {
    5_000
}

fn default_raft_bind_port() -> u16 {
    7481
}

fn default_submit_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref server_id) = overrides.server_id {
            self.node.server_id = server_id.clone();
        }
        if let Some(ref join_addr) = overrides.join_addr {
            self.gossip.join_addr = Some(join_addr.clone());
        }
        if let Some(port) = overrides.port {
            self.listener.port = port;
        }
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.node.server_id.is_empty() {
            anyhow::bail!("node.server_id must not be empty");
        }
        if self.node.bind_addr.is_empty() {
            anyhow::bail!("node.bind_addr must not be empty");
        }

        let ports = [
            ("listener.port", self.listener.port),
            (
                "gossip.memberlist_bind_port",
                self.gossip.memberlist_bind_port,
            ),
            ("replication.raft_bind_port", self.replication.raft_bind_port),
        ];
        for (i, (name_a, port_a)) in ports.iter().enumerate() {
            for (name_b, port_b) in ports.iter().skip(i + 1) {
                if port_a == port_b && *port_a != 0 {
                    anyhow::bail!("{} and {} must differ (both are {})", name_a, name_b, port_a);
                }
            }
        }

        if let Some(ref join_addr) = self.gossip.join_addr {
            if !join_addr.contains(':') {
                anyhow::bail!("gossip.join_addr must be host:port, got '{}'", join_addr);
            }
        }

        match self.telemetry.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("telemetry.log_level '{}' is not a valid level", other),
        }

        Ok(())
    }

    /// Client listener address.
    pub fn client_addr(&self) -> String {
        format!("{}:{}", self.node.bind_addr, self.listener.port)
    }

    /// Advertised replication endpoint.
    pub fn raft_addr(&self) -> String {
        format!("{}:{}", self.node.bind_addr, self.replication.raft_bind_port)
    }

    /// Consensus submission timeout.
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.replication.submit_timeout_ms)
    }

    /// Gossip settings derived from this configuration.
    pub fn gossip_settings(&self) -> GossipSettings {
        GossipSettings {
            bind_addr: self.node.bind_addr.clone(),
            bind_port: self.gossip.memberlist_bind_port,
            server_id: self.node.server_id.clone(),
            raft_addr: self.raft_addr(),
            join_addr: self.gossip.join_addr.clone(),
            probe_interval: Duration::from_millis(self.gossip.probe_interval_ms),
            broadcast_interval: Duration::from_millis(self.gossip.broadcast_interval_ms),
            suspicion_timeout: Duration::from_millis(self.gossip.suspicion_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.node.server_id, "local");
        assert_eq!(config.listener.port, 7480);
        assert_eq!(config.gossip.memberlist_bind_port, 7946);
        assert_eq!(config.replication.raft_bind_port, 7481);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = Config::from_toml(
            r#"
[node]
server_id = "n1"
bind_addr = "0.0.0.0"

[gossip]
join_addr = "10.0.0.1:7946"
"#,
        )
        .unwrap();
        assert_eq!(config.node.server_id, "n1");
        assert_eq!(config.gossip.join_addr.as_deref(), Some("10.0.0.1:7946"));
        assert_eq!(config.listener.port, 7480);
    }

    #[test]
    fn test_rejects_empty_server_id() {
        let result = Config::from_toml(
            r#"
[node]
server_id = ""
"#,
        );
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("server_id"));
    }

    #[test]
    fn test_rejects_colliding_ports() {
        let result = Config::from_toml(
            r#"
[listener]
port = 7946
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_bad_join_addr() {
        let result = Config::from_toml(
            r#"
[gossip]
join_addr = "not-an-address"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(&ConfigOverrides {
            server_id: Some("n9".to_string()),
            join_addr: Some("10.0.0.2:7946".to_string()),
            port: Some(9000),
            log_level: Some("debug".to_string()),
        });
        assert_eq!(config.node.server_id, "n9");
        assert_eq!(config.gossip.join_addr.as_deref(), Some("10.0.0.2:7946"));
        assert_eq!(config.listener.port, 9000);
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn test_derived_addresses() {
        let config = Config::default();
        assert_eq!(config.client_addr(), "127.0.0.1:7480");
        assert_eq!(config.raft_addr(), "127.0.0.1:7481");
    }
}
