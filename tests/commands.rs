//! Command dispatch integration tests.
//!
//! Every command here flows through the full dispatch path: name lookup,
//! key extraction, and — for write commands — submission through the
//! replication bridge with apply on commit.

mod common;

use common::{send, send_cancelled, start_node};

#[tokio::test]
async fn llen_on_missing_key_returns_zero() {
    let node = start_node();
    let resp = send(&node, &["llen", "missing"]).await;
    assert_eq!(&resp[..], b":0\r\n\r\n");
}

#[tokio::test]
async fn lrange_to_tail() {
    let node = start_node();
    send(&node, &["rpush", "k", "1", "2", "3"]).await;

    let resp = send(&node, &["lrange", "k", "0", "-1"]).await;
    assert_eq!(&resp[..], b"*3\r\n$1\r\n1\r\n$1\r\n2\r\n$1\r\n3\r\n\r\n");
}

#[tokio::test]
async fn lrange_descending() {
    let node = start_node();
    send(&node, &["rpush", "k", "a", "b", "c", "d"]).await;

    let resp = send(&node, &["lrange", "k", "2", "0"]).await;
    assert_eq!(&resp[..], b"*3\r\n$1\r\nc\r\n$1\r\nb\r\n$1\r\na\r\n\r\n");
}

#[tokio::test]
async fn lrange_equal_indices_is_an_error() {
    let node = start_node();
    send(&node, &["rpush", "k", "a", "b"]).await;

    let resp = send(&node, &["lrange", "k", "1", "1"]).await;
    assert!(resp.starts_with(b"-EMPTYRANGE"));
}

#[tokio::test]
async fn ltrim_to_tail() {
    let node = start_node();
    send(&node, &["rpush", "k", "a", "b", "c"]).await;

    let resp = send(&node, &["ltrim", "k", "1", "-1"]).await;
    assert_eq!(&resp[..], b"+OK\r\n\r\n");

    let resp = send(&node, &["lrange", "k", "0", "-1"]).await;
    assert_eq!(&resp[..], b"*2\r\n$1\r\nb\r\n$1\r\nc\r\n\r\n");
}

#[tokio::test]
async fn lrem_scans_from_tail_on_negative_count() {
    let node = start_node();
    send(&node, &["rpush", "k", "x", "y", "x", "z", "x"]).await;

    send(&node, &["lrem", "k", "-2", "x"]).await;

    let resp = send(&node, &["lrange", "k", "0", "-1"]).await;
    assert_eq!(&resp[..], b"*3\r\n$1\r\nx\r\n$1\r\ny\r\n$1\r\nz\r\n\r\n");
}

#[tokio::test]
async fn lmove_right_left() {
    let node = start_node();
    send(&node, &["rpush", "A", "1", "2", "3"]).await;
    send(&node, &["rpush", "B", "9"]).await;

    let resp = send(&node, &["lmove", "A", "B", "right", "left"]).await;
    assert_eq!(&resp[..], b"+OK\r\n\r\n");

    let a = send(&node, &["lrange", "A", "0", "-1"]).await;
    assert_eq!(&a[..], b"*2\r\n$1\r\n1\r\n$1\r\n2\r\n\r\n");
    let b = send(&node, &["lrange", "B", "0", "-1"]).await;
    assert_eq!(&b[..], b"*2\r\n$1\r\n3\r\n$1\r\n9\r\n\r\n");
}

#[tokio::test]
async fn lmove_moves_old_head_to_new_tail() {
    let node = start_node();
    send(&node, &["rpush", "src", "h", "m", "t"]).await;
    send(&node, &["rpush", "dst", "d"]).await;

    send(&node, &["lmove", "src", "dst", "left", "right"]).await;

    let src = send(&node, &["llen", "src"]).await;
    assert_eq!(&src[..], b":2\r\n\r\n");
    let dst = send(&node, &["lrange", "dst", "0", "-1"]).await;
    assert_eq!(&dst[..], b"*2\r\n$1\r\nd\r\n$1\r\nh\r\n\r\n");
}

#[tokio::test]
async fn lpushx_on_missing_key_fails_and_creates_nothing() {
    let node = start_node();
    let resp = send(&node, &["lpushx", "k", "v"]).await;
    assert!(resp.starts_with(b"-NOTFOUND"));
    assert!(!node.keyspace.key_exists(b"k"));
}

#[tokio::test]
async fn write_under_cancelled_context_changes_nothing() {
    let node = start_node();
    let resp = send_cancelled(&node, &["rpush", "k", "v"]).await;
    assert!(resp.starts_with(b"-CANCELLED"));
    assert!(!node.keyspace.key_exists(b"k"));
}

#[tokio::test]
async fn lpush_then_lrange_reverses_argument_order() {
    let node = start_node();
    send(&node, &["lpush", "k", "a", "b", "c"]).await;

    let resp = send(&node, &["lrange", "k", "0", "-1"]).await;
    assert_eq!(&resp[..], b"*3\r\n$1\r\nc\r\n$1\r\nb\r\n$1\r\na\r\n\r\n");
}

#[tokio::test]
async fn rpush_then_rpop_round_trips_tail() {
    let node = start_node();
    send(&node, &["rpush", "k", "a", "b"]).await;
    send(&node, &["rpush", "k", "x"]).await;

    let popped = send(&node, &["rpop", "k"]).await;
    assert_eq!(&popped[..], b"+x\r\n\r\n");

    let len = send(&node, &["llen", "k"]).await;
    assert_eq!(&len[..], b":2\r\n\r\n");
}

#[tokio::test]
async fn lindex_returns_simple_string() {
    let node = start_node();
    send(&node, &["rpush", "k", "a", "42"]).await;

    let resp = send(&node, &["lindex", "k", "1"]).await;
    assert_eq!(&resp[..], b"+42\r\n\r\n");

    let resp = send(&node, &["lindex", "k", "9"]).await;
    assert!(resp.starts_with(b"-INDEXRANGE"));
}

#[tokio::test]
async fn lset_adapts_value_type() {
    let node = start_node();
    send(&node, &["rpush", "k", "a"]).await;
    send(&node, &["lset", "k", "0", "3.5"]).await;

    let resp = send(&node, &["lindex", "k", "0"]).await;
    assert_eq!(&resp[..], b"+3.5\r\n\r\n");
}

#[tokio::test]
async fn unknown_command_is_reported() {
    let node = start_node();
    let resp = send(&node, &["frobnicate", "k"]).await;
    assert!(resp.starts_with(b"-ERR unknown command 'frobnicate'"));
}

#[tokio::test]
async fn arity_errors_surface_before_execution() {
    let node = start_node();
    let resp = send(&node, &["llen"]).await;
    assert!(resp.starts_with(b"-ERR wrong number of arguments"));

    let resp = send(&node, &["lmove", "a", "b", "left"]).await;
    assert!(resp.starts_with(b"-ERR wrong number of arguments"));
}

#[tokio::test]
async fn wrong_type_against_scalar_key() {
    let node = start_node();
    send(&node, &["set", "k", "v"]).await;

    let resp = send(&node, &["llen", "k"]).await;
    assert!(resp.starts_with(b"-WRONGTYPE"));

    let resp = send(&node, &["rpush", "k", "x"]).await;
    assert!(resp.starts_with(b"-WRONGTYPE"));
}

#[tokio::test]
async fn ping_and_string_commands() {
    let node = start_node();

    let resp = send(&node, &["ping"]).await;
    assert_eq!(&resp[..], b"+PONG\r\n\r\n");

    let resp = send(&node, &["set", "greeting", "hello"]).await;
    assert_eq!(&resp[..], b"+OK\r\n\r\n");

    let resp = send(&node, &["get", "greeting"]).await;
    assert_eq!(&resp[..], b"$5\r\nhello\r\n\r\n");

    let resp = send(&node, &["exists", "greeting"]).await;
    assert_eq!(&resp[..], b":1\r\n\r\n");

    let resp = send(&node, &["del", "greeting"]).await;
    assert_eq!(&resp[..], b":1\r\n\r\n");

    let resp = send(&node, &["get", "greeting"]).await;
    assert!(resp.starts_with(b"-NOTFOUND"));
}

#[tokio::test]
async fn command_names_are_case_insensitive() {
    let node = start_node();
    send(&node, &["RPUSH", "k", "a"]).await;
    let resp = send(&node, &["LLEN", "k"]).await;
    assert_eq!(&resp[..], b":1\r\n\r\n");
}
