//! Gossip membership runtime.
//!
//! Each node binds a UDP socket, probes a random peer every interval, and
//! piggybacks queued broadcasts on probe traffic. Joining retries with
//! fibonacci backoff; after startup the node advertises its replication
//! endpoint every broadcast interval until it has been admitted to the
//! cluster. Peers that stay silent past the suspicion timeout are treated as
//! departed.

use crate::cluster::broadcast::TransmitQueue;
use crate::cluster::delegate::{EventDelegate, VoterControl};
use crate::cluster::message::{
    decode_packet, encode_packet, BroadcastAction, BroadcastMessage, GossipMessage, NodeMeta,
};
use anyhow::Context;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Maximum join attempts before startup fails.
const JOIN_ATTEMPTS: u32 = 5;

/// Jitter floor added to every join backoff delay.
const JOIN_JITTER_FLOOR: Duration = Duration::from_millis(200);

/// Graceful-leave bound at shutdown.
const LEAVE_TIMEOUT: Duration = Duration::from_millis(500);

/// Broadcasts piggybacked per outgoing packet.
const MAX_PIGGYBACK: usize = 4;

/// Gossip configuration, derived from the node config.
#[derive(Debug, Clone)]
pub struct GossipSettings {
    /// Host to bind the gossip socket on.
    pub bind_addr: String,

    /// Gossip port; 0 binds an ephemeral port.
    pub bind_port: u16,

    /// This node's server identity.
    pub server_id: String,

    /// Advertised replication endpoint.
    pub raft_addr: String,

    /// Optional address of an existing member to join through.
    pub join_addr: Option<String>,

    /// Probe cadence.
    pub probe_interval: Duration,

    /// Replication-endpoint advertisement cadence.
    pub broadcast_interval: Duration,

    /// Silence threshold after which a peer is treated as departed.
    pub suspicion_timeout: Duration,
}

struct Peer {
    meta: NodeMeta,
    meta_raw: Bytes,
    addr: SocketAddr,
    last_seen: Instant,
}

struct Shared {
    settings: GossipSettings,
    socket: UdpSocket,
    local_addr: SocketAddr,
    local_meta: NodeMeta,
    peers: Mutex<HashMap<String, Peer>>,
    delegate: EventDelegate,
    voters: Arc<dyn VoterControl>,
    queue: TransmitQueue,
    joined: Notify,
}

/// Running gossip membership.
pub struct Membership {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Membership {
    /// Bind the gossip socket, start the maintenance tasks, and join the
    /// cluster if a join address is configured. A failed join is fatal.
    pub async fn start(
        settings: GossipSettings,
        voters: Arc<dyn VoterControl>,
    ) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind((settings.bind_addr.as_str(), settings.bind_port))
            .await
            .with_context(|| {
                format!(
                    "failed to bind gossip socket on {}:{}",
                    settings.bind_addr, settings.bind_port
                )
            })?;
        let local_addr = socket.local_addr().context("gossip socket has no address")?;

        let local_meta = NodeMeta {
            server_id: settings.server_id.clone(),
            memberlist_addr: local_addr.to_string(),
            raft_addr: settings.raft_addr.clone(),
        };

        let num_nodes = Arc::new(AtomicUsize::new(0));
        let counter = num_nodes.clone();
        let queue = TransmitQueue::new(1, move || counter.load(Ordering::Acquire));
        let delegate = EventDelegate::new(num_nodes, voters.clone());

        let shared = Arc::new(Shared {
            settings: settings.clone(),
            socket,
            local_addr,
            local_meta,
            peers: Mutex::new(HashMap::new()),
            delegate,
            voters,
            queue,
            joined: Notify::new(),
        });

        // The local node is the first member of its own view.
        shared.delegate.notify_join(&settings.server_id);

        let shutdown = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(recv_loop(shared.clone(), shutdown.clone())),
            tokio::spawn(probe_loop(shared.clone(), shutdown.clone())),
            tokio::spawn(advertise_loop(shared.clone(), shutdown.clone())),
        ];

        let membership = Self {
            shared,
            shutdown,
            tasks,
        };

        if let Some(join_addr) = settings.join_addr.clone() {
            membership.join_cluster(&join_addr).await?;
        }

        tracing::info!(
            server_id = %settings.server_id,
            gossip_addr = %local_addr,
            "gossip membership started"
        );
        Ok(membership)
    }

    /// Current node count, the local node included.
    pub fn num_nodes(&self) -> usize {
        self.shared.delegate.num_nodes()
    }

    /// Identities of the known remote peers.
    pub fn peer_ids(&self) -> Vec<String> {
        self.shared.peers.lock().keys().cloned().collect()
    }

    /// Bound gossip address.
    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    /// The broadcast queue riding on this membership's probe traffic.
    pub fn queue(&self) -> &TransmitQueue {
        &self.shared.queue
    }

    async fn join_cluster(&self, join_addr: &str) -> anyhow::Result<()> {
        let target = tokio::net::lookup_host(join_addr)
            .await
            .with_context(|| format!("could not resolve join address {}", join_addr))?
            .next()
            .with_context(|| format!("join address {} resolved to nothing", join_addr))?;

        for attempt in 0..JOIN_ATTEMPTS {
            let notified = self.shared.joined.notified();
            send_packet(
                &self.shared,
                target,
                &[GossipMessage::Join(self.shared.local_meta.clone())],
            )
            .await;

            let backoff = fibonacci_backoff(attempt);
            tokio::select! {
                _ = notified => {
                    tracing::info!(%join_addr, "joined gossip cluster");
                    return Ok(());
                }
                _ = tokio::time::sleep(backoff) => {
                    tracing::warn!(%join_addr, attempt = attempt + 1, "join attempt timed out");
                }
            }
        }

        anyhow::bail!("could not join gossip cluster via {}", join_addr)
    }

    /// Gracefully leave (bounded) and stop the maintenance tasks. Both
    /// failures are fatal to the node.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        let shared = self.shared.clone();
        let leave = async move {
            let server_id = shared.local_meta.server_id.clone();
            let targets: Vec<SocketAddr> = shared.peers.lock().values().map(|p| p.addr).collect();
            for addr in targets {
                send_packet(
                    &shared,
                    addr,
                    &[GossipMessage::Leave {
                        server_id: server_id.clone(),
                    }],
                )
                .await;
            }
        };

        tokio::time::timeout(LEAVE_TIMEOUT, leave)
            .await
            .map_err(|_| anyhow::anyhow!("could not gracefully leave gossip cluster"))?;

        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            if tokio::time::timeout(Duration::from_secs(1), task)
                .await
                .is_err()
            {
                anyhow::bail!("could not stop gossip maintenance");
            }
        }

        tracing::info!("gossip membership stopped");
        Ok(())
    }
}

/// Fibonacci backoff with the configured jitter floor.
fn fibonacci_backoff(attempt: u32) -> Duration {
    let mut previous = 1u64;
    let mut current = 1u64;
    for _ in 0..attempt {
        let next = previous + current;
        previous = current;
        current = next;
    }
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..200));
    Duration::from_secs(previous) + JOIN_JITTER_FLOOR + jitter
}

async fn recv_loop(shared: Arc<Shared>, shutdown: CancellationToken) {
    let mut buf = vec![0u8; 65_536];
    loop {
        let (len, src) = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = shared.socket.recv_from(&mut buf) => match result {
                Ok(pair) => pair,
                Err(error) => {
                    tracing::warn!(%error, "gossip recv failed");
                    continue;
                }
            }
        };

        let messages = match decode_packet(&buf[..len]) {
            Ok(messages) => messages,
            Err(error) => {
                tracing::warn!(%src, %error, "dropping malformed gossip packet");
                continue;
            }
        };

        for message in messages {
            handle_message(&shared, message, src).await;
        }
    }
}

async fn handle_message(shared: &Arc<Shared>, message: GossipMessage, src: SocketAddr) {
    match message {
        GossipMessage::Join(meta) => {
            if meta.server_id == shared.local_meta.server_id {
                return;
            }
            upsert_peer(shared, meta, src);

            let mut known = vec![shared.local_meta.clone()];
            known.extend(shared.peers.lock().values().map(|p| p.meta.clone()));
            send_with_broadcasts(shared, src, GossipMessage::JoinAck(known)).await;
        }
        GossipMessage::JoinAck(metas) => {
            for meta in metas {
                if meta.server_id == shared.local_meta.server_id {
                    continue;
                }
                let addr = meta.memberlist_addr.parse().unwrap_or(src);
                upsert_peer(shared, meta, addr);
            }
            shared.joined.notify_one();
        }
        GossipMessage::Ping { from } => {
            touch_peer(shared, &from, src);
            let ack = GossipMessage::Ack {
                from: shared.local_meta.server_id.clone(),
            };
            send_with_broadcasts(shared, src, ack).await;
        }
        GossipMessage::Ack { from } => {
            touch_peer(shared, &from, src);
        }
        GossipMessage::Leave { server_id } => {
            let removed = shared.peers.lock().remove(&server_id);
            if let Some(peer) = removed {
                shared.delegate.notify_leave(&server_id, &peer.meta_raw);
            }
        }
        GossipMessage::Broadcast(broadcast) => match broadcast.action {
            BroadcastAction::RaftJoin => {
                let meta = broadcast.node_meta;
                if let Err(error) = shared.voters.add_voter(&meta.server_id, &meta.raft_addr) {
                    tracing::warn!(
                        server_id = %meta.server_id,
                        %error,
                        "voter admission failed"
                    );
                }
            }
        },
    }
}

fn upsert_peer(shared: &Arc<Shared>, meta: NodeMeta, addr: SocketAddr) {
    let raw = match serde_json::to_vec(&meta) {
        Ok(raw) => Bytes::from(raw),
        Err(error) => {
            tracing::warn!(server_id = %meta.server_id, %error, "could not encode peer metadata");
            return;
        }
    };

    let server_id = meta.server_id.clone();
    let is_new = {
        let mut peers = shared.peers.lock();
        if let Some(peer) = peers.get_mut(&server_id) {
            peer.meta = meta;
            peer.meta_raw = raw;
            peer.addr = addr;
            peer.last_seen = Instant::now();
            false
        } else {
            peers.insert(
                server_id.clone(),
                Peer {
                    meta,
                    meta_raw: raw,
                    addr,
                    last_seen: Instant::now(),
                },
            );
            true
        }
    };

    if is_new {
        shared.delegate.notify_join(&server_id);
    }
}

fn touch_peer(shared: &Arc<Shared>, server_id: &str, addr: SocketAddr) {
    let mut peers = shared.peers.lock();
    if let Some(peer) = peers.get_mut(server_id) {
        peer.addr = addr;
        peer.last_seen = Instant::now();
    }
}

async fn probe_loop(shared: Arc<Shared>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(shared.settings.probe_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        // Expire peers that have stayed silent past the suspicion timeout.
        let now = Instant::now();
        let expired: Vec<(String, Bytes)> = {
            let mut peers = shared.peers.lock();
            let gone: Vec<String> = peers
                .iter()
                .filter(|(_, p)| now.duration_since(p.last_seen) > shared.settings.suspicion_timeout)
                .map(|(id, _)| id.clone())
                .collect();
            gone.into_iter()
                .filter_map(|id| peers.remove(&id).map(|p| (id, p.meta_raw)))
                .collect()
        };
        for (server_id, raw) in expired {
            tracing::warn!(%server_id, "peer suspected down");
            shared.delegate.notify_leave(&server_id, &raw);
        }

        // Probe one random peer, piggybacking queued broadcasts.
        let target = {
            let peers = shared.peers.lock();
            if peers.is_empty() {
                None
            } else {
                let index = rand::thread_rng().gen_range(0..peers.len());
                peers.values().nth(index).map(|p| p.addr)
            }
        };
        if let Some(addr) = target {
            let ping = GossipMessage::Ping {
                from: shared.local_meta.server_id.clone(),
            };
            send_with_broadcasts(&shared, addr, ping).await;
        }
    }
}

async fn advertise_loop(shared: Arc<Shared>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(shared.settings.broadcast_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if shared.voters.has_joined_cluster() {
            tracing::debug!("cluster joined; stopping replication endpoint advertisement");
            return;
        }

        shared.queue.queue_broadcast(BroadcastMessage {
            action: BroadcastAction::RaftJoin,
            node_meta: shared.local_meta.clone(),
        });
    }
}

async fn send_with_broadcasts(shared: &Arc<Shared>, addr: SocketAddr, message: GossipMessage) {
    let mut messages = vec![message];
    for broadcast in shared.queue.get_broadcasts(MAX_PIGGYBACK) {
        messages.push(GossipMessage::Broadcast(broadcast));
    }
    send_packet(shared, addr, &messages).await;
}

async fn send_packet(shared: &Arc<Shared>, addr: SocketAddr, messages: &[GossipMessage]) {
    let packet = match encode_packet(messages) {
        Ok(packet) => packet,
        Err(error) => {
            tracing::warn!(%error, "gossip encode failed");
            return;
        }
    };
    if let Err(error) = shared.socket.send_to(&packet, addr).await {
        tracing::warn!(%addr, %error, "gossip send failed");
    }
}
