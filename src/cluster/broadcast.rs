//! Transmit-limited broadcast queue.
//!
//! Outgoing broadcasts piggyback on gossip probe traffic. Each queued record
//! is retransmitted until it has been sent `retransmit_mult *
//! ceil(log10(num_nodes + 1))` times, then dropped. The node-count resolver
//! is a closure over the live membership counter so the limit scales with
//! the cluster.

use crate::cluster::message::BroadcastMessage;
use parking_lot::Mutex;
use std::collections::VecDeque;

struct QueuedBroadcast {
    message: BroadcastMessage,
    transmits: usize,
}

/// Piggyback queue with a retransmit multiplier.
pub struct TransmitQueue {
    retransmit_mult: usize,
    num_nodes: Box<dyn Fn() -> usize + Send + Sync>,
    queue: Mutex<VecDeque<QueuedBroadcast>>,
}

impl TransmitQueue {
    /// Create a queue with the given multiplier and node-count resolver.
    pub fn new(
        retransmit_mult: usize,
        num_nodes: impl Fn() -> usize + Send + Sync + 'static,
    ) -> Self {
        Self {
            retransmit_mult,
            num_nodes: Box::new(num_nodes),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Current retransmit limit for one broadcast.
    pub fn retransmit_limit(&self) -> usize {
        let n = (self.num_nodes)();
        self.retransmit_mult * (((n + 1) as f64).log10().ceil() as usize)
    }

    /// Enqueue a broadcast for piggybacked transmission.
    pub fn queue_broadcast(&self, message: BroadcastMessage) {
        self.queue.lock().push_back(QueuedBroadcast {
            message,
            transmits: 0,
        });
    }

    /// Take up to `max` broadcasts for one outgoing packet. Records whose
    /// transmit count reaches the limit are dropped from the queue.
    pub fn get_broadcasts(&self, max: usize) -> Vec<BroadcastMessage> {
        let limit = self.retransmit_limit();
        let mut queue = self.queue.lock();
        let mut out = Vec::new();

        let mut index = 0;
        while index < queue.len() && out.len() < max {
            let entry = &mut queue[index];
            out.push(entry.message.clone());
            entry.transmits += 1;
            if entry.transmits >= limit {
                let _ = queue.remove(index);
            } else {
                index += 1;
            }
        }

        out
    }

    /// Number of queued broadcasts.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::message::{BroadcastAction, NodeMeta};

    fn broadcast(id: &str) -> BroadcastMessage {
        BroadcastMessage {
            action: BroadcastAction::RaftJoin,
            node_meta: NodeMeta {
                server_id: id.to_string(),
                memberlist_addr: "127.0.0.1:7946".to_string(),
                raft_addr: "127.0.0.1:7481".to_string(),
            },
        }
    }

    #[test]
    fn test_retransmit_limit_scales_with_nodes() {
        let queue = TransmitQueue::new(1, || 1);
        assert_eq!(queue.retransmit_limit(), 1);

        let queue = TransmitQueue::new(1, || 9);
        assert_eq!(queue.retransmit_limit(), 1);

        let queue = TransmitQueue::new(1, || 10);
        assert_eq!(queue.retransmit_limit(), 2);

        let queue = TransmitQueue::new(2, || 10);
        assert_eq!(queue.retransmit_limit(), 4);
    }

    #[test]
    fn test_broadcast_dropped_after_limit() {
        let queue = TransmitQueue::new(1, || 1);
        queue.queue_broadcast(broadcast("n1"));

        let taken = queue.get_broadcasts(8);
        assert_eq!(taken.len(), 1);
        // Limit is 1 at a single node, so the record is gone.
        assert!(queue.is_empty());
        assert!(queue.get_broadcasts(8).is_empty());
    }

    #[test]
    fn test_broadcast_retransmits_until_limit() {
        let queue = TransmitQueue::new(2, || 1);
        queue.queue_broadcast(broadcast("n1"));

        assert_eq!(queue.get_broadcasts(8).len(), 1);
        assert_eq!(queue.get_broadcasts(8).len(), 1);
        assert!(queue.get_broadcasts(8).is_empty());
    }

    #[test]
    fn test_max_bounds_one_packet() {
        let queue = TransmitQueue::new(2, || 1);
        for i in 0..5 {
            queue.queue_broadcast(broadcast(&format!("n{}", i)));
        }

        assert_eq!(queue.get_broadcasts(3).len(), 3);
        assert_eq!(queue.len(), 5);
    }
}
