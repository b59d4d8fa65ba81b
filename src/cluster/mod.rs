//! Cluster membership.
//!
//! A lightweight UDP gossip layer maintains the live peer set, counts nodes,
//! and piggybacks broadcast records on probe traffic. Join and leave events
//! flow through an event delegate that keeps the node counter current and
//! feeds voter add/remove into the replication bridge.

pub mod broadcast;
pub mod delegate;
pub mod membership;
pub mod message;

pub use broadcast::TransmitQueue;
pub use delegate::{EventDelegate, VoterControl};
pub use membership::{GossipSettings, Membership};
pub use message::{BroadcastAction, BroadcastMessage, GossipMessage, NodeMeta};
