//! TCP listener for client connections.
//!
//! Accepts connections until the shutdown signal fires and spawns one task
//! per connection. Each in-flight command runs under that connection's
//! cancellation context.

use crate::command::Dispatcher;
use crate::net::connection::serve_connection;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ListenerSettings {
    /// Bind address.
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Disable Nagle's algorithm on accepted sockets.
    pub nodelay: bool,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7480".parse().expect("static address"),
            max_connections: 10_000,
            nodelay: true,
        }
    }
}

/// Connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Listener metrics.
#[derive(Debug, Default)]
pub struct ListenerMetrics {
    /// Total connections accepted.
    pub connections_total: AtomicU64,

    /// Currently active connections.
    pub connections_active: AtomicU64,

    /// Connections rejected at capacity.
    pub connections_rejected: AtomicU64,
}

impl ListenerMetrics {
    /// Record an accepted connection.
    pub fn connection_accepted(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a closed connection.
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a rejected connection.
    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Active connection count.
    pub fn active_connections(&self) -> u64 {
        self.connections_active.load(Ordering::Relaxed)
    }
}

/// The client TCP server.
pub struct TcpServer {
    settings: ListenerSettings,
    metrics: Arc<ListenerMetrics>,
    next_conn_id: AtomicU64,
    shutdown_rx: watch::Receiver<bool>,
}

impl TcpServer {
    /// Create a server with the given settings and shutdown receiver.
    pub fn new(settings: ListenerSettings, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            settings,
            metrics: Arc::new(ListenerMetrics::default()),
            next_conn_id: AtomicU64::new(1),
            shutdown_rx,
        }
    }

    /// Listener metrics.
    pub fn metrics(&self) -> &Arc<ListenerMetrics> {
        &self.metrics
    }

    /// Bind and serve until the shutdown signal fires.
    pub async fn run(self, dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.settings.bind_addr)
            .await
            .with_context(|| format!("failed to bind listener on {}", self.settings.bind_addr))?;
        let local_addr = listener.local_addr().context("listener has no address")?;
        tracing::info!(addr = %local_addr, "client listener started");

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            let (stream, remote_addr) = tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("client listener stopping");
                        return Ok(());
                    }
                    continue;
                }
                result = listener.accept() => match result {
                    Ok(pair) => pair,
                    Err(error) => {
                        tracing::warn!(%error, "accept failed");
                        continue;
                    }
                }
            };

            if self.metrics.active_connections() >= self.settings.max_connections as u64 {
                self.metrics.connection_rejected();
                tracing::warn!(%remote_addr, "connection rejected at capacity");
                continue;
            }

            if self.settings.nodelay {
                let _ = stream.set_nodelay(true);
            }

            let id = ConnectionId(self.next_conn_id.fetch_add(1, Ordering::Relaxed));
            self.metrics.connection_accepted();
            let metrics = self.metrics.clone();
            let dispatcher = dispatcher.clone();

            tokio::spawn(async move {
                if let Err(error) = serve_connection(stream, dispatcher, id).await {
                    tracing::debug!(%id, %error, "connection closed with error");
                }
                metrics.connection_closed();
            });
        }
    }
}
