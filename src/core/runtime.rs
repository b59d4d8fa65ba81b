//! Main runtime orchestration.
//!
//! The runtime coordinates component lifecycle:
//! - Start order: replication → dispatcher → gossip membership → listener
//! - Shutdown order: listener → gossip membership → replication
//!
//! The runtime owns both the gossip and replication subsystems and wires
//! them together: the replication bridge is handed to membership as its
//! voter-management capability.

use crate::cluster::{Membership, VoterControl};
use crate::command::{CommandTable, Dispatcher};
use crate::core::config::Config;
use crate::net::{ListenerSettings, TcpServer};
use crate::replication::{CommandApplier, LocalConsensus, ReplicationBridge};
use crate::store::Keyspace;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Component health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Component is starting.
    Starting,
    /// Component is healthy and operational.
    Healthy,
    /// Component has failed.
    Failed,
    /// Component is stopping.
    Stopping,
    /// Component has stopped.
    Stopped,
}

/// Health status aggregated from all components.
#[derive(Debug, Clone)]
pub struct RuntimeHealth {
    /// Replication bridge and consensus health.
    pub replication: ComponentHealth,
    /// Gossip membership health.
    pub membership: ComponentHealth,
    /// Client listener health.
    pub listener: ComponentHealth,
}

impl Default for RuntimeHealth {
    fn default() -> Self {
        Self {
            replication: ComponentHealth::Starting,
            membership: ComponentHealth::Starting,
            listener: ComponentHealth::Starting,
        }
    }
}

impl RuntimeHealth {
    /// Whether the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        matches!(
            (self.replication, self.membership, self.listener),
            (
                ComponentHealth::Healthy,
                ComponentHealth::Healthy,
                ComponentHealth::Healthy
            )
        )
    }
}

/// Murmur runtime holding all component handles.
pub struct Runtime {
    config: Arc<Config>,
    keyspace: Arc<Keyspace>,
    table: Arc<CommandTable>,
    bridge: Option<Arc<ReplicationBridge>>,
    dispatcher: Option<Arc<Dispatcher>>,
    membership: Option<Membership>,
    health: RuntimeHealth,
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    listener_handle: Option<JoinHandle<Result<()>>>,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            keyspace: Arc::new(Keyspace::new()),
            table: Arc::new(CommandTable::new()),
            bridge: None,
            dispatcher: None,
            membership: None,
            health: RuntimeHealth::default(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
            listener_handle: None,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the keyspace.
    pub fn keyspace(&self) -> &Arc<Keyspace> {
        &self.keyspace
    }

    /// Get the dispatcher, if started.
    pub fn dispatcher(&self) -> Option<&Arc<Dispatcher>> {
        self.dispatcher.as_ref()
    }

    /// Get the replication bridge, if started.
    pub fn bridge(&self) -> Option<&Arc<ReplicationBridge>> {
        self.bridge.as_ref()
    }

    /// Get the gossip membership, if started.
    pub fn membership(&self) -> Option<&Membership> {
        self.membership.as_ref()
    }

    /// Get the current health status.
    pub fn health(&self) -> &RuntimeHealth {
        &self.health
    }

    /// Whether the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Initialize and start all runtime components.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(
            server_id = %self.config.node.server_id,
            "starting Murmur runtime"
        );

        self.init_replication()?;
        self.init_dispatcher();
        self.start_membership().await?;
        self.start_listener()?;

        self.running.store(true, Ordering::Release);
        tracing::info!("Murmur runtime started");
        Ok(())
    }

    fn init_replication(&mut self) -> Result<()> {
        tracing::debug!("initializing replication");

        let applier = Arc::new(CommandApplier::new(
            self.table.clone(),
            self.keyspace.clone(),
        ));
        let consensus = LocalConsensus::spawn(applier);
        let bridge = Arc::new(ReplicationBridge::new(
            consensus,
            self.config.submit_timeout(),
        ));

        // This node votes for itself from the start.
        bridge
            .add_voter(&self.config.node.server_id, &self.config.raft_addr())
            .map_err(|e| anyhow::anyhow!("self voter admission failed: {}", e))?;

        self.bridge = Some(bridge);
        self.health.replication = ComponentHealth::Healthy;
        tracing::info!("replication initialized");
        Ok(())
    }

    fn init_dispatcher(&mut self) {
        let bridge = self
            .bridge
            .clone()
            .expect("replication initialized before dispatcher");
        self.dispatcher = Some(Arc::new(Dispatcher::new(
            self.table.clone(),
            self.keyspace.clone(),
            bridge,
        )));
    }

    async fn start_membership(&mut self) -> Result<()> {
        tracing::debug!("starting gossip membership");

        let voters: Arc<dyn VoterControl> = self
            .bridge
            .clone()
            .expect("replication initialized before membership");
        let membership = Membership::start(self.config.gossip_settings(), voters)
            .await
            .context("gossip membership failed to start")?;

        self.membership = Some(membership);
        self.health.membership = ComponentHealth::Healthy;
        Ok(())
    }

    fn start_listener(&mut self) -> Result<()> {
        tracing::debug!("starting client listener");

        let bind_addr = self
            .config
            .client_addr()
            .parse()
            .with_context(|| format!("invalid client address {}", self.config.client_addr()))?;
        let settings = ListenerSettings {
            bind_addr,
            max_connections: self.config.listener.max_connections,
            nodelay: self.config.listener.nodelay,
        };
        let server = TcpServer::new(settings, self.shutdown_rx.clone());
        let dispatcher = self
            .dispatcher
            .clone()
            .expect("dispatcher initialized before listener");

        self.listener_handle = Some(tokio::spawn(async move { server.run(dispatcher).await }));
        self.health.listener = ComponentHealth::Healthy;
        Ok(())
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Run the runtime until a shutdown signal arrives.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received (SIGINT)");
            }
            _ = async {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            } => {
                tracing::info!("shutdown requested by component");
            }
        }

        self.stop().await
    }

    /// Stop all runtime components in reverse start order.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping Murmur runtime");
        self.running.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send(true);

        // 1. Stop the listener.
        self.health.listener = ComponentHealth::Stopping;
        if let Some(handle) = self.listener_handle.take() {
            match tokio::time::timeout(std::time::Duration::from_secs(5), handle).await {
                Ok(Ok(Ok(()))) => tracing::info!("client listener stopped"),
                Ok(Ok(Err(error))) => {
                    tracing::warn!(%error, "client listener stopped with error");
                }
                Ok(Err(error)) => tracing::warn!(%error, "client listener task panicked"),
                Err(_) => tracing::warn!("client listener stop timed out"),
            }
        }
        self.health.listener = ComponentHealth::Stopped;

        // 2. Leave the gossip cluster; a failed leave is fatal.
        self.health.membership = ComponentHealth::Stopping;
        if let Some(membership) = self.membership.take() {
            membership
                .shutdown()
                .await
                .context("gossip shutdown failed")?;
        }
        self.health.membership = ComponentHealth::Stopped;

        // 3. Drop the replication handles; the apply task exits with them.
        self.health.replication = ComponentHealth::Stopping;
        self.dispatcher = None;
        self.bridge = None;
        self.health.replication = ComponentHealth::Stopped;

        tracing::info!("Murmur runtime stopped");
        Ok(())
    }

    /// Start only the replication and dispatch components, for tests that
    /// drive the dispatcher without sockets.
    pub async fn start_for_tests(&mut self) -> Result<()> {
        self.init_replication()?;
        self.init_dispatcher();
        self.running.store(true, Ordering::Release);
        Ok(())
    }
}
