//! Murmur - distributed, Redis-protocol-compatible in-memory key/value store.
//!
//! Clients speak a line-oriented bulk-string wire protocol over TCP. The
//! server executes commands against a typed keyspace guarded by per-key
//! reader/writer locks, and replicates writes through a consensus layer.
//! Gossip membership maintains the live peer set and feeds voter add/remove
//! into consensus.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Front-End                           │
//! │        frame codec │ per-connection cancellation            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Command Dispatcher                      │
//! │   name lookup │ key extraction │ read/write classification  │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                            │
//!         (read commands)              (sync commands)
//!                 │                            │
//! ┌───────────────────────────┐  ┌─────────────────────────────┐
//! │         Keyspace          │  │     Replication Bridge      │
//! │  typed values │ per-key   │◄─┤  submit → commit → apply    │
//! │  reader/writer locks      │  │  voter add/remove           │
//! └───────────────────────────┘  └─────────────────────────────┘
//!                                              ▲
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Gossip Membership                        │
//! │   peer set │ node counter │ piggybacked broadcast queue     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error taxonomy and wire mapping
//! - [`core::runtime`] - Runtime orchestration
//! - [`store`] - Typed values and the per-key lock registry
//! - [`protocol`] - Frame codec and response encoding
//! - [`command`] - Command table, handlers, and dispatcher
//! - [`replication`] - Consensus interface and replication bridge
//! - [`cluster`] - Gossip membership, broadcasts, and the event delegate
//! - [`net`] - TCP listener and per-connection loop
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod cluster;
pub mod command;
pub mod core;
pub mod net;
pub mod protocol;
pub mod replication;
pub mod store;

pub use self::core::{config, error, runtime};
pub use cluster::{Membership, NodeMeta, TransmitQueue};
pub use command::{CommandTable, Dispatcher};
pub use replication::{LocalConsensus, ReplicationBridge};
pub use store::{Keyspace, Value};
