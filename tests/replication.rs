//! Replication integration tests.
//!
//! Writes must replicate leader-submits / apply-on-commit: the dispatcher
//! never mutates the keyspace inline for a sync command, and replaying the
//! same ordered log on an empty node reproduces the keyspace exactly.

mod common;

use common::{args, send, start_node};
use murmur::command::CommandTable;
use murmur::replication::{Applier, CommandApplier};
use murmur::store::Keyspace;
use std::sync::Arc;

#[tokio::test]
async fn sync_commands_are_committed_to_the_log() {
    let node = start_node();

    send(&node, &["rpush", "k", "a"]).await;
    send(&node, &["llen", "k"]).await;
    send(&node, &["lset", "k", "0", "b"]).await;

    // Only the two writes reach the log; reads never do.
    let log = node.consensus.log();
    assert_eq!(log.len(), 2);
}

#[tokio::test]
async fn replaying_the_log_reproduces_the_keyspace() {
    let node = start_node();

    send(&node, &["rpush", "list", "1", "2", "3"]).await;
    send(&node, &["lpush", "list", "0"]).await;
    send(&node, &["set", "scalar", "42"]).await;
    send(&node, &["lmove", "list", "list", "left", "right"]).await;
    send(&node, &["lrem", "list", "1", "2"]).await;

    let log = node.consensus.log();

    // Apply the same ordered entries to a fresh, empty node.
    let keyspace = Arc::new(Keyspace::new());
    let table = Arc::new(CommandTable::new());
    let applier = CommandApplier::new(table, keyspace.clone());
    for entry in log {
        applier.apply(entry).await;
    }

    assert_eq!(keyspace.snapshot(), node.keyspace.snapshot());
}

#[tokio::test]
async fn two_replicas_of_the_same_log_agree() {
    let node = start_node();

    for i in 0..20 {
        send(&node, &["rpush", "k", &i.to_string()]).await;
    }
    send(&node, &["ltrim", "k", "5", "15"]).await;

    let log = node.consensus.log();

    let mut snapshots = Vec::new();
    for _ in 0..2 {
        let keyspace = Arc::new(Keyspace::new());
        let table = Arc::new(CommandTable::new());
        let applier = CommandApplier::new(table, keyspace.clone());
        for entry in log.clone() {
            applier.apply(entry).await;
        }
        snapshots.push(keyspace.snapshot());
    }

    assert_eq!(snapshots[0], snapshots[1]);
    assert!(!snapshots[0].is_empty());
}

#[tokio::test]
async fn failed_apply_is_recorded_without_state_change() {
    let node = start_node();

    // The precondition fails at apply time; the error comes back through
    // the commit result and the keyspace is untouched.
    let resp = send(&node, &["lpushx", "missing", "v"]).await;
    assert!(resp.starts_with(b"-NOTFOUND"));
    assert!(!node.keyspace.key_exists(b"missing"));

    // The entry still committed, and replaying it reproduces the same
    // error deterministically.
    let log = node.consensus.log();
    assert_eq!(log.len(), 1);

    let keyspace = Arc::new(Keyspace::new());
    let table = Arc::new(CommandTable::new());
    let applier = CommandApplier::new(table, keyspace.clone());
    let result = applier.apply(log[0].clone()).await;
    assert!(result.starts_with(b"-NOTFOUND"));
    assert!(keyspace.is_empty());
}

#[tokio::test]
async fn read_commands_bypass_replication() {
    let node = start_node();
    send(&node, &["rpush", "k", "a"]).await;

    let before = node.consensus.log().len();
    send(&node, &["llen", "k"]).await;
    send(&node, &["lrange", "k", "0", "-1"]).await;
    send(&node, &["lindex", "k", "0"]).await;
    send(&node, &["exists", "k"]).await;
    assert_eq!(node.consensus.log().len(), before);
}

#[tokio::test]
async fn replicated_entry_is_the_raw_framed_command() {
    let node = start_node();
    send(&node, &["rpush", "k", "a"]).await;

    let log = node.consensus.log();
    assert_eq!(
        log[0],
        murmur::protocol::encode_request(&args(&["rpush", "k", "a"]))
    );
}
