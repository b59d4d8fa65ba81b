//! Membership event delegate.
//!
//! Join and leave events are translated into node-count updates and voter
//! removal on the consensus layer. Voter management is a capability object
//! provided by the orchestrator that owns both the gossip and replication
//! subsystems.

use crate::cluster::message::NodeMeta;
use crate::core::error::StoreResult;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Voter management exposed to the gossip layer by the replication bridge.
pub trait VoterControl: Send + Sync {
    /// Admit a voter at the given replication endpoint. Idempotent.
    fn add_voter(&self, id: &str, raft_addr: &str) -> StoreResult<()>;

    /// Remove a departed voter. Idempotent.
    fn remove_voter(&self, id: &str) -> StoreResult<()>;

    /// Whether this node has been admitted to the cluster.
    fn has_joined_cluster(&self) -> bool;
}

/// Translates membership events into counter updates and voter removal.
pub struct EventDelegate {
    num_nodes: Arc<AtomicUsize>,
    voters: Arc<dyn VoterControl>,
}

impl EventDelegate {
    /// Create a delegate over the shared node counter and voter capability.
    pub fn new(num_nodes: Arc<AtomicUsize>, voters: Arc<dyn VoterControl>) -> Self {
        Self { num_nodes, voters }
    }

    /// A node joined the cluster.
    pub fn notify_join(&self, server_id: &str) {
        let count = self.num_nodes.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::info!(%server_id, num_nodes = count, "node joined");
    }

    /// A node left the cluster. The departing node's raw metadata is decoded
    /// to remove its vote; a decode failure is logged, never fatal.
    pub fn notify_leave(&self, server_id: &str, raw_meta: &[u8]) {
        let count = self.num_nodes.fetch_sub(1, Ordering::AcqRel) - 1;
        tracing::info!(%server_id, num_nodes = count, "node left");

        let meta: NodeMeta = match serde_json::from_slice(raw_meta) {
            Ok(meta) => meta,
            Err(error) => {
                tracing::warn!(%server_id, %error, "could not decode leaving node's metadata");
                return;
            }
        };

        if let Err(error) = self.voters.remove_voter(&meta.server_id) {
            tracing::warn!(server_id = %meta.server_id, %error, "voter removal failed");
        }
    }

    /// Current node count.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes.load(Ordering::Acquire)
    }
}
