//! Gossip wire records.
//!
//! Records are self-describing JSON, carried on the wire as length-prefixed
//! segments so several can ride in one datagram. All nodes must agree on the
//! encoding; the field names below are the cluster wire contract.

use crate::core::error::{StoreError, StoreResult};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Upper bound for a single gossip record.
pub const MAX_RECORD_SIZE: usize = 64 * 1024;

/// Node metadata attached to every gossip member and carried in broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMeta {
    /// Server identity (opaque string).
    #[serde(rename = "ServerID")]
    pub server_id: String,

    /// Gossip endpoint (host:port).
    #[serde(rename = "MemberlistAddr")]
    pub memberlist_addr: String,

    /// Replication endpoint (host:port).
    #[serde(rename = "RaftAddr")]
    pub raft_addr: String,
}

/// Action carried by a broadcast record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastAction {
    /// A node advertises its replication endpoint for voter admission.
    RaftJoin,
}

/// User broadcast riding on gossip probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    #[serde(rename = "Action")]
    pub action: BroadcastAction,

    #[serde(rename = "NodeMeta")]
    pub node_meta: NodeMeta,
}

/// Envelope for every gossip datagram record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GossipMessage {
    /// Join request carrying the joiner's metadata.
    Join(NodeMeta),

    /// Join reply listing the known members (including the responder).
    JoinAck(Vec<NodeMeta>),

    /// Liveness probe.
    Ping { from: String },

    /// Probe acknowledgement.
    Ack { from: String },

    /// Graceful departure.
    Leave { server_id: String },

    /// Piggybacked user broadcast.
    Broadcast(BroadcastMessage),
}

/// Encode records into one datagram payload.
pub fn encode_packet(messages: &[GossipMessage]) -> StoreResult<Bytes> {
    let mut buf = BytesMut::new();
    for message in messages {
        let record = serde_json::to_vec(message)
            .map_err(|e| StoreError::internal(format!("gossip encode failed: {}", e)))?;
        if record.len() > MAX_RECORD_SIZE {
            return Err(StoreError::internal("gossip record too large"));
        }
        buf.put_u32(record.len() as u32);
        buf.extend_from_slice(&record);
    }
    Ok(buf.freeze())
}

/// Decode all records from a datagram payload.
pub fn decode_packet(data: &[u8]) -> StoreResult<Vec<GossipMessage>> {
    let mut messages = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        if data.len() - pos < 4 {
            return Err(StoreError::internal("truncated gossip record header"));
        }
        let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
            as usize;
        pos += 4;
        if len > MAX_RECORD_SIZE || data.len() - pos < len {
            return Err(StoreError::internal("truncated gossip record"));
        }
        let message: GossipMessage = serde_json::from_slice(&data[pos..pos + len])
            .map_err(|e| StoreError::internal(format!("gossip decode failed: {}", e)))?;
        messages.push(message);
        pos += len;
    }

    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str) -> NodeMeta {
        NodeMeta {
            server_id: id.to_string(),
            memberlist_addr: "127.0.0.1:7946".to_string(),
            raft_addr: "127.0.0.1:7481".to_string(),
        }
    }

    #[test]
    fn test_packet_round_trip() {
        let messages = vec![
            GossipMessage::Ping {
                from: "n1".to_string(),
            },
            GossipMessage::Broadcast(BroadcastMessage {
                action: BroadcastAction::RaftJoin,
                node_meta: meta("n2"),
            }),
        ];

        let packet = encode_packet(&messages).unwrap();
        let decoded = decode_packet(&packet).unwrap();
        assert_eq!(decoded, messages);
    }

    #[test]
    fn test_node_meta_field_names_are_wire_contract() {
        let json = serde_json::to_string(&meta("n1")).unwrap();
        assert!(json.contains("\"ServerID\""));
        assert!(json.contains("\"MemberlistAddr\""));
        assert!(json.contains("\"RaftAddr\""));
    }

    #[test]
    fn test_broadcast_action_encoding() {
        let msg = BroadcastMessage {
            action: BroadcastAction::RaftJoin,
            node_meta: meta("n1"),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"Action\":\"RaftJoin\""));
    }

    #[test]
    fn test_decode_rejects_truncated_packet() {
        let packet = encode_packet(&[GossipMessage::Ping {
            from: "n1".to_string(),
        }])
        .unwrap();
        assert!(decode_packet(&packet[..packet.len() - 1]).is_err());
        assert!(decode_packet(&[0, 0]).is_err());
    }

    #[test]
    fn test_empty_packet_decodes_empty() {
        assert!(decode_packet(&[]).unwrap().is_empty());
    }
}
