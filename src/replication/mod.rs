//! Write replication: the consensus interface and the bridge that routes
//! sync commands through it.

pub mod bridge;
pub mod consensus;

pub use bridge::{CommandApplier, ReplicationBridge};
pub use consensus::{Applier, Consensus, LocalConsensus};
