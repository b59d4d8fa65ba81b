//! Command table and dispatcher.
//!
//! Every command is described by a [`CommandHandler`]: its lowercase name,
//! category set, sync flag, key-extraction function, and execution body.
//! The dispatcher looks commands up by name, validates their key shape, and
//! routes them: reads execute directly against the local keyspace, while
//! sync (write) commands are submitted through the replication bridge on the
//! leader or forwarded to the leader from followers. Committed entries are
//! re-executed locally by the apply path using the same handlers.
//!
//! Lock acquisition is the handler's responsibility so each handler can
//! decide shared vs. exclusive; the dispatcher guarantees no handler runs
//! unless key extraction succeeded.

pub mod connection;
pub mod list;
pub mod string;

use crate::core::error::{StoreError, StoreResult};
use crate::protocol::{encode_error, encode_response, Response};
use crate::replication::ReplicationBridge;
use crate::store::Keyspace;
use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

bitflags::bitflags! {
    /// Command category set: access mode, cost class, and type tag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Categories: u16 {
        const READ       = 0b0000_0001;
        const WRITE      = 0b0000_0010;
        const FAST       = 0b0000_0100;
        const SLOW       = 0b0000_1000;
        const LIST       = 0b0001_0000;
        const STRING     = 0b0010_0000;
        const GENERIC    = 0b0100_0000;
        const CONNECTION = 0b1000_0000;
    }
}

/// Execution context handed to command handlers.
///
/// Handlers receive the keyspace and the request's cancellation context
/// explicitly; there is no process-wide server state.
#[derive(Clone)]
pub struct ExecContext {
    /// The node-local keyspace.
    pub keyspace: Arc<Keyspace>,

    /// Cancellation context for the in-flight request.
    pub cancel: CancellationToken,
}

/// Future type returned by command execution.
pub type HandlerFuture = Pin<Box<dyn Future<Output = StoreResult<Response>> + Send>>;

/// A command descriptor and its execution body.
pub trait CommandHandler: Send + Sync {
    /// Lowercase command name.
    fn name(&self) -> &'static str;

    /// Category set for this command.
    fn categories(&self) -> Categories;

    /// Whether this command mutates state and must go through replication.
    fn sync(&self) -> bool {
        false
    }

    /// Validate argument shape and return the ordered list of keys the
    /// handler will touch. `args[0]` is the command name.
    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>>;

    /// Execute the command. Takes owned arguments to avoid lifetime issues
    /// with async execution.
    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture;
}

/// Registry mapping lowercase command names to handlers.
pub struct CommandTable {
    handlers: HashMap<&'static str, Arc<dyn CommandHandler>>,
}

impl CommandTable {
    /// Create a table with every built-in command registered.
    pub fn new() -> Self {
        let mut table = Self {
            handlers: HashMap::new(),
        };

        for handler in list::handlers() {
            table.register(handler);
        }
        for handler in string::handlers() {
            table.register(handler);
        }
        for handler in connection::handlers() {
            table.register(handler);
        }

        table
    }

    fn register(&mut self, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    /// Look up a handler by case-insensitive name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn CommandHandler>> {
        self.handlers.get(name.to_ascii_lowercase().as_str())
    }

    /// All registered command names.
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute a command against the local keyspace, bypassing the replication
/// decision. Used for direct reads and by the consensus apply path.
pub async fn execute_local(
    table: &CommandTable,
    keyspace: &Arc<Keyspace>,
    args: Vec<Bytes>,
    cancel: CancellationToken,
) -> StoreResult<Response> {
    let name = command_name(&args)?;
    let handler = table
        .get(&name)
        .ok_or_else(|| StoreError::unknown_command(&name))?;
    handler.extract_keys(&args)?;
    handler
        .execute(
            ExecContext {
                keyspace: keyspace.clone(),
                cancel,
            },
            args,
        )
        .await
}

/// The command dispatcher: name lookup, key extraction, replication routing,
/// and wire encoding.
pub struct Dispatcher {
    table: Arc<CommandTable>,
    keyspace: Arc<Keyspace>,
    bridge: Arc<ReplicationBridge>,
}

impl Dispatcher {
    /// Create a dispatcher over the given table, keyspace, and bridge.
    pub fn new(
        table: Arc<CommandTable>,
        keyspace: Arc<Keyspace>,
        bridge: Arc<ReplicationBridge>,
    ) -> Self {
        Self {
            table,
            keyspace,
            bridge,
        }
    }

    /// The command table backing this dispatcher.
    pub fn table(&self) -> &Arc<CommandTable> {
        &self.table
    }

    /// Dispatch one framed command and return the encoded response frame.
    pub async fn dispatch(&self, args: Vec<Bytes>, cancel: CancellationToken) -> Bytes {
        match self.dispatch_inner(args, cancel).await {
            Ok(bytes) => bytes,
            Err(err) => {
                if matches!(err, StoreError::Internal { .. }) {
                    tracing::error!(error = %err, "command failed");
                }
                encode_error(&err)
            }
        }
    }

    async fn dispatch_inner(
        &self,
        args: Vec<Bytes>,
        cancel: CancellationToken,
    ) -> StoreResult<Bytes> {
        let name = command_name(&args)?;
        let handler = self
            .table
            .get(&name)
            .ok_or_else(|| StoreError::unknown_command(&name))?;

        handler.extract_keys(&args)?;

        if handler.sync() {
            if self.bridge.is_leader() {
                // Leader submits; the commit callback applies the command
                // locally. No inline apply on the write path.
                return self.bridge.replicate(&args, &cancel).await;
            }
            return self.bridge.forward_to_leader(&args, &cancel).await;
        }

        let response = handler
            .execute(
                ExecContext {
                    keyspace: self.keyspace.clone(),
                    cancel,
                },
                args,
            )
            .await?;
        Ok(encode_response(&response))
    }
}

/// Extract the lowercase command name from a frame.
pub fn command_name(args: &[Bytes]) -> StoreResult<String> {
    let first = args
        .first()
        .ok_or_else(|| StoreError::argument("empty command frame"))?;
    std::str::from_utf8(first)
        .map(|s| s.to_ascii_lowercase())
        .map_err(|_| StoreError::argument("command name is not valid utf-8"))
}

/// Validate exact argument count (including the command name).
pub(crate) fn require_args(name: &str, args: &[Bytes], count: usize) -> StoreResult<()> {
    if args.len() != count {
        return Err(StoreError::argument(format!(
            "wrong number of arguments for '{}'",
            name
        )));
    }
    Ok(())
}

/// Validate a minimum argument count (including the command name).
pub(crate) fn require_min_args(name: &str, args: &[Bytes], count: usize) -> StoreResult<()> {
    if args.len() < count {
        return Err(StoreError::argument(format!(
            "wrong number of arguments for '{}'",
            name
        )));
    }
    Ok(())
}

/// Parse an argument as a signed integer.
pub(crate) fn arg_int(args: &[Bytes], index: usize, what: &str) -> StoreResult<i64> {
    let raw = args
        .get(index)
        .ok_or_else(|| StoreError::argument(format!("{} is required", what)))?;
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| StoreError::argument(format!("{} must be an integer", what)))
}

/// Borrow an argument as a utf-8 string.
pub(crate) fn arg_str<'a>(args: &'a [Bytes], index: usize, what: &str) -> StoreResult<&'a str> {
    let raw = args
        .get(index)
        .ok_or_else(|| StoreError::argument(format!("{} is required", what)))?;
    std::str::from_utf8(raw).map_err(|_| StoreError::argument(format!("{} must be utf-8", what)))
}
