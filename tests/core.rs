//! Core infrastructure tests.

use murmur::core::config::{Config, ConfigOverrides};
use murmur::core::error::StoreError;
use std::io::Write;
use tempfile::NamedTempFile;

// ============================================================================
// Config tests
// ============================================================================

#[test]
fn parse_minimal_config_file() {
    let config_content = r#"
[node]
server_id = "n1"

[gossip]
join_addr = "10.0.0.7:7946"
"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(config_content.as_bytes()).unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.node.server_id, "n1");
    assert_eq!(config.gossip.join_addr.as_deref(), Some("10.0.0.7:7946"));
    assert_eq!(config.client_addr(), "127.0.0.1:7480");
}

#[test]
fn reject_config_with_port_collision() {
    let config_content = r#"
[replication]
raft_bind_port = 7946
"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(config_content.as_bytes()).unwrap();

    let result = Config::from_file(file.path());
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("must differ"));
}

#[test]
fn reject_config_with_bad_log_level() {
    let config_content = r#"
[telemetry]
log_level = "loud"
"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(config_content.as_bytes()).unwrap();

    let result = Config::from_file(file.path());
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("log_level"));
}

#[test]
fn missing_config_file_is_an_error() {
    let result = Config::from_file(std::path::Path::new("/nonexistent/murmur.toml"));
    assert!(result.is_err());
}

#[test]
fn overrides_apply_on_top_of_file() {
    let config_content = r#"
[node]
server_id = "n1"
"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(config_content.as_bytes()).unwrap();

    let mut config = Config::from_file(file.path()).unwrap();
    config.apply_overrides(&ConfigOverrides {
        server_id: Some("n2".to_string()),
        join_addr: None,
        port: Some(9480),
        log_level: None,
    });

    assert_eq!(config.node.server_id, "n2");
    assert_eq!(config.listener.port, 9480);
    assert!(config.validate().is_ok());
}

// ============================================================================
// Error taxonomy tests
// ============================================================================

#[test]
fn error_kinds_render_deterministically() {
    let cases = [
        (StoreError::NotFound, "NOTFOUND"),
        (StoreError::WrongType, "WRONGTYPE"),
        (StoreError::IndexOutOfRange, "INDEXRANGE"),
        (StoreError::EmptyRange, "EMPTYRANGE"),
        (StoreError::NotLeader, "NOTLEADER"),
        (StoreError::Cancelled, "CANCELLED"),
    ];

    for (error, kind) in cases {
        assert_eq!(error.kind(), kind);
        let encoded = murmur::protocol::encode_error(&error);
        assert!(encoded.starts_with(format!("-{} ", kind).as_bytes()));
        assert!(encoded.ends_with(b"\r\n\r\n"));
    }
}
