//! Shared helpers for integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use murmur::command::{CommandTable, Dispatcher};
use murmur::replication::{CommandApplier, LocalConsensus, ReplicationBridge};
use murmur::store::Keyspace;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One in-process node: keyspace, command table, local consensus, bridge,
/// and dispatcher.
pub struct TestNode {
    pub keyspace: Arc<Keyspace>,
    pub table: Arc<CommandTable>,
    pub consensus: Arc<LocalConsensus>,
    pub bridge: Arc<ReplicationBridge>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Build a node with replication wired through an in-process consensus log.
pub fn start_node() -> TestNode {
    let keyspace = Arc::new(Keyspace::new());
    let table = Arc::new(CommandTable::new());
    let applier = Arc::new(CommandApplier::new(table.clone(), keyspace.clone()));
    let consensus = LocalConsensus::spawn(applier);
    let bridge = Arc::new(ReplicationBridge::new(
        consensus.clone(),
        Duration::from_secs(1),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        table.clone(),
        keyspace.clone(),
        bridge.clone(),
    ));

    TestNode {
        keyspace,
        table,
        consensus,
        bridge,
        dispatcher,
    }
}

/// Build a command frame from string parts.
pub fn args(parts: &[&str]) -> Vec<Bytes> {
    parts
        .iter()
        .map(|p| Bytes::copy_from_slice(p.as_bytes()))
        .collect()
}

/// Dispatch a command and return the encoded response frame.
pub async fn send(node: &TestNode, parts: &[&str]) -> Bytes {
    node.dispatcher
        .dispatch(args(parts), CancellationToken::new())
        .await
}

/// Dispatch a command under an already-cancelled context.
pub async fn send_cancelled(node: &TestNode, parts: &[&str]) -> Bytes {
    let cancel = CancellationToken::new();
    cancel.cancel();
    node.dispatcher.dispatch(args(parts), cancel).await
}
