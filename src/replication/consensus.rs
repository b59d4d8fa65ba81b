//! Opaque consensus interface and the in-process single-voter log.
//!
//! The store interacts with consensus only through [`Consensus`]: submit an
//! entry, receive the applied result, and manage the voter set. Entries
//! commit in a total order; the apply callback is invoked once per entry in
//! commit order and is never cancelled mid-apply.

use crate::core::error::{StoreError, StoreResult};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Deterministic application of a committed entry to the local state
/// machine. The returned bytes are the entry's commit result.
pub trait Applier: Send + Sync {
    /// Apply one committed entry.
    fn apply(&self, entry: Bytes) -> Pin<Box<dyn Future<Output = Bytes> + Send + '_>>;
}

/// The consensus layer, seen as an opaque ordered-log service.
pub trait Consensus: Send + Sync {
    /// Submit an entry for replication; resolves with the apply result once
    /// the entry commits, or an error if the submission fails.
    fn submit(
        &self,
        entry: Bytes,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = StoreResult<Bytes>> + Send + '_>>;

    /// Admit a voter. Idempotent.
    fn add_voter(&self, id: &str, addr: SocketAddr) -> StoreResult<()>;

    /// Remove a voter. Idempotent.
    fn remove_voter(&self, id: &str) -> StoreResult<()>;

    /// Whether this node currently leads the cluster.
    fn is_leader(&self) -> bool;

    /// Whether this node has been admitted to a cluster.
    fn has_joined_cluster(&self) -> bool;

    /// Client-facing address of the current leader, for command forwarding.
    /// `None` when unknown or when this node is the leader.
    fn leader_addr(&self) -> Option<SocketAddr>;

    /// Current voter set, by server identity.
    fn voters(&self) -> Vec<String>;
}

/// In-process single-voter consensus log.
///
/// Entries are committed in submission order by a dedicated apply task, which
/// gives every submitter the same total order a multi-node log would. The
/// node is always the leader of its own log.
pub struct LocalConsensus {
    submit_tx: mpsc::Sender<(Bytes, oneshot::Sender<Bytes>)>,
    voters: RwLock<HashMap<String, SocketAddr>>,
    log: Mutex<Vec<Bytes>>,
    joined: AtomicBool,
}

impl LocalConsensus {
    /// Start the apply task and return the consensus handle.
    pub fn spawn(applier: Arc<dyn Applier>) -> Arc<Self> {
        let (submit_tx, mut submit_rx) = mpsc::channel::<(Bytes, oneshot::Sender<Bytes>)>(256);

        let node = Arc::new(Self {
            submit_tx,
            voters: RwLock::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            joined: AtomicBool::new(false),
        });

        let worker = node.clone();
        tokio::spawn(async move {
            while let Some((entry, reply)) = submit_rx.recv().await {
                worker.log.lock().push(entry.clone());
                // Applies run to completion; a submitter timing out does not
                // interrupt the state transition.
                let result = applier.apply(entry).await;
                let _ = reply.send(result);
            }
            tracing::debug!("consensus apply task stopped");
        });

        node.joined.store(true, Ordering::Release);
        node
    }

    /// The committed log, in commit order.
    pub fn log(&self) -> Vec<Bytes> {
        self.log.lock().clone()
    }
}

impl Consensus for LocalConsensus {
    fn submit(
        &self,
        entry: Bytes,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = StoreResult<Bytes>> + Send + '_>> {
        Box::pin(async move {
            let (reply_tx, reply_rx) = oneshot::channel();
            self.submit_tx
                .send((entry, reply_tx))
                .await
                .map_err(|_| StoreError::internal("consensus apply task is not running"))?;

            match tokio::time::timeout(timeout, reply_rx).await {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(_)) => Err(StoreError::internal("consensus apply task dropped entry")),
                Err(_) => Err(StoreError::Cancelled),
            }
        })
    }

    fn add_voter(&self, id: &str, addr: SocketAddr) -> StoreResult<()> {
        let mut voters = self.voters.write();
        if voters.insert(id.to_string(), addr).is_none() {
            tracing::info!(server_id = %id, %addr, "voter admitted");
        }
        Ok(())
    }

    fn remove_voter(&self, id: &str) -> StoreResult<()> {
        if self.voters.write().remove(id).is_some() {
            tracing::info!(server_id = %id, "voter removed");
        }
        Ok(())
    }

    fn is_leader(&self) -> bool {
        true
    }

    fn has_joined_cluster(&self) -> bool {
        self.joined.load(Ordering::Acquire)
    }

    fn leader_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn voters(&self) -> Vec<String> {
        self.voters.read().keys().cloned().collect()
    }
}
