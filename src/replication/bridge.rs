//! Replication bridge: routes sync commands into consensus and applies
//! committed entries against the local keyspace.

use crate::cluster::VoterControl;
use crate::command::{execute_local, CommandTable};
use crate::core::error::{StoreError, StoreResult};
use crate::protocol::{
    decode_request, decode_response, encode_error, encode_request, encode_response, DecodeResult,
};
use crate::replication::consensus::{Applier, Consensus};
use crate::store::Keyspace;
use bytes::{Bytes, BytesMut};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Applies committed entries by re-executing them as commands against the
/// local keyspace, bypassing the dispatcher's replication decision.
pub struct CommandApplier {
    table: Arc<CommandTable>,
    keyspace: Arc<Keyspace>,
}

impl CommandApplier {
    /// Create an applier over the given table and keyspace.
    pub fn new(table: Arc<CommandTable>, keyspace: Arc<Keyspace>) -> Self {
        Self { table, keyspace }
    }
}

impl Applier for CommandApplier {
    fn apply(&self, entry: Bytes) -> Pin<Box<dyn Future<Output = Bytes> + Send + '_>> {
        Box::pin(async move {
            let frame = match decode_request(&entry) {
                DecodeResult::Frame { frame, .. } => frame,
                DecodeResult::Incomplete | DecodeResult::Corrupt(_) => {
                    tracing::error!("corrupt replication entry");
                    return encode_error(&StoreError::internal("corrupt replication entry"));
                }
            };

            // Applies are never cancelled mid-apply; a handler error is
            // recorded in the commit result with no rollback (handlers
            // check preconditions before mutating).
            let cancel = CancellationToken::new();
            match execute_local(&self.table, &self.keyspace, frame, cancel).await {
                Ok(response) => encode_response(&response),
                Err(err) => encode_error(&err),
            }
        })
    }
}

/// The replication bridge owns the consensus handle.
pub struct ReplicationBridge {
    consensus: Arc<dyn Consensus>,
    submit_timeout: Duration,
}

impl ReplicationBridge {
    /// Create a bridge over the given consensus handle.
    pub fn new(consensus: Arc<dyn Consensus>, submit_timeout: Duration) -> Self {
        Self {
            consensus,
            submit_timeout,
        }
    }

    /// Whether this node currently leads the cluster.
    pub fn is_leader(&self) -> bool {
        self.consensus.is_leader()
    }

    /// Whether this node has been admitted to a cluster.
    pub fn joined_cluster(&self) -> bool {
        self.consensus.has_joined_cluster()
    }

    /// Current voter set, by server identity.
    pub fn voters(&self) -> Vec<String> {
        self.consensus.voters()
    }

    /// Submit a raw command for replication. Resolves with the encoded
    /// response produced by the commit-time apply.
    pub async fn replicate(
        &self,
        args: &[Bytes],
        cancel: &CancellationToken,
    ) -> StoreResult<Bytes> {
        // An already-cancelled request never reaches the log.
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let entry = encode_request(args);
        tokio::select! {
            result = self.consensus.submit(entry, self.submit_timeout) => result,
            _ = cancel.cancelled() => Err(StoreError::Cancelled),
        }
    }

    /// Forward a raw command to the current leader and proxy its response
    /// back verbatim.
    pub async fn forward_to_leader(
        &self,
        args: &[Bytes],
        cancel: &CancellationToken,
    ) -> StoreResult<Bytes> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let addr = self.consensus.leader_addr().ok_or(StoreError::NotLeader)?;
        let result = tokio::select! {
            result = forward(addr, args) => result,
            _ = cancel.cancelled() => return Err(StoreError::Cancelled),
        };

        result.map_err(|error| {
            tracing::warn!(leader = %addr, %error, "leader forwarding failed");
            StoreError::NotLeader
        })
    }
}

impl VoterControl for ReplicationBridge {
    fn add_voter(&self, id: &str, raft_addr: &str) -> StoreResult<()> {
        let addr: SocketAddr = raft_addr.parse().map_err(|_| {
            StoreError::internal(format!("invalid replication address '{}'", raft_addr))
        })?;
        self.consensus.add_voter(id, addr)
    }

    fn remove_voter(&self, id: &str) -> StoreResult<()> {
        self.consensus.remove_voter(id)
    }

    fn has_joined_cluster(&self) -> bool {
        self.consensus.has_joined_cluster()
    }
}

async fn forward(addr: SocketAddr, args: &[Bytes]) -> StoreResult<Bytes> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| StoreError::internal(format!("leader connect failed: {}", e)))?;
    stream
        .write_all(&encode_request(args))
        .await
        .map_err(|e| StoreError::internal(format!("leader write failed: {}", e)))?;

    let mut buf = BytesMut::with_capacity(4096);
    loop {
        match decode_response(&buf) {
            DecodeResult::Frame { frame, .. } => return Ok(frame),
            DecodeResult::Incomplete => {}
            DecodeResult::Corrupt(message) => {
                return Err(StoreError::internal(format!(
                    "corrupt leader response: {}",
                    message
                )))
            }
        }

        let n = stream
            .read_buf(&mut buf)
            .await
            .map_err(|e| StoreError::internal(format!("leader read failed: {}", e)))?;
        if n == 0 {
            return Err(StoreError::internal("leader closed connection"));
        }
    }
}
