//! Connection command handlers.

use super::{require_args, Categories, CommandHandler, ExecContext, HandlerFuture};
use crate::core::error::StoreResult;
use crate::protocol::Response;
use bytes::Bytes;
use std::sync::Arc;

/// All connection command handlers.
pub fn handlers() -> Vec<Arc<dyn CommandHandler>> {
    vec![Arc::new(PingHandler)]
}

/// PING — liveness check, never replicated.
pub struct PingHandler;

impl CommandHandler for PingHandler {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn categories(&self) -> Categories {
        Categories::CONNECTION | Categories::FAST
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        require_args(self.name(), args, 1)?;
        Ok(Vec::new())
    }

    fn execute(&self, _ctx: ExecContext, _args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(async move { Ok(Response::pong()) })
    }
}
