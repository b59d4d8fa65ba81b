//! String and generic key command handlers.

use super::{require_args, Categories, CommandHandler, ExecContext, HandlerFuture};
use crate::core::error::{StoreError, StoreResult};
use crate::protocol::Response;
use crate::store::Value;
use bytes::Bytes;
use std::sync::Arc;

/// All string and generic command handlers.
pub fn handlers() -> Vec<Arc<dyn CommandHandler>> {
    vec![
        Arc::new(SetHandler),
        Arc::new(GetHandler),
        Arc::new(DelHandler),
        Arc::new(ExistsHandler),
    ]
}

/// SET key value — create or overwrite a scalar value.
pub struct SetHandler;

impl CommandHandler for SetHandler {
    fn name(&self) -> &'static str {
        "set"
    }

    fn categories(&self) -> Categories {
        Categories::STRING | Categories::WRITE | Categories::FAST
    }

    fn sync(&self) -> bool {
        true
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        require_args(self.name(), args, 3)?;
        Ok(vec![args[1].clone()])
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(async move {
            let value = Value::adapt(&args[2]);
            let mut guard = ctx
                .keyspace
                .create_and_write(&ctx.cancel, &args[1], value.clone())
                .await?;
            if ctx.cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            *guard = value;
            Ok(Response::ok())
        })
    }
}

/// GET key — return a scalar value as a bulk string.
pub struct GetHandler;

impl CommandHandler for GetHandler {
    fn name(&self) -> &'static str {
        "get"
    }

    fn categories(&self) -> Categories {
        Categories::STRING | Categories::READ | Categories::FAST
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        require_args(self.name(), args, 2)?;
        Ok(vec![args[1].clone()])
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(async move {
            let key = &args[1];
            if !ctx.keyspace.key_exists(key) {
                return Err(StoreError::NotFound);
            }
            let guard = ctx.keyspace.read(&ctx.cancel, key).await?;
            if !guard.is_scalar() {
                return Err(StoreError::WrongType);
            }
            Ok(Response::bulk(guard.render()))
        })
    }
}

/// DEL key — remove a key and its lock; integer count response.
pub struct DelHandler;

impl CommandHandler for DelHandler {
    fn name(&self) -> &'static str {
        "del"
    }

    fn categories(&self) -> Categories {
        Categories::GENERIC | Categories::WRITE | Categories::FAST
    }

    fn sync(&self) -> bool {
        true
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        require_args(self.name(), args, 2)?;
        Ok(vec![args[1].clone()])
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(async move {
            let removed = ctx.keyspace.remove(&ctx.cancel, &args[1]).await?;
            Ok(Response::Integer(if removed { 1 } else { 0 }))
        })
    }
}

/// EXISTS key — lock-free existence check.
pub struct ExistsHandler;

impl CommandHandler for ExistsHandler {
    fn name(&self) -> &'static str {
        "exists"
    }

    fn categories(&self) -> Categories {
        Categories::GENERIC | Categories::READ | Categories::FAST
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        require_args(self.name(), args, 2)?;
        Ok(vec![args[1].clone()])
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(async move {
            let exists = ctx.keyspace.key_exists(&args[1]);
            Ok(Response::Integer(if exists { 1 } else { 0 }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Keyspace;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ExecContext {
        ExecContext {
            keyspace: Arc::new(Keyspace::new()),
            cancel: CancellationToken::new(),
        }
    }

    fn args(parts: &[&str]) -> Vec<Bytes> {
        parts
            .iter()
            .map(|p| Bytes::copy_from_slice(p.as_bytes()))
            .collect()
    }

    async fn run(
        ctx: &ExecContext,
        handler: &dyn CommandHandler,
        parts: &[&str],
    ) -> StoreResult<Response> {
        let frame = args(parts);
        handler.extract_keys(&frame)?;
        handler.execute(ctx.clone(), frame).await
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let ctx = ctx();
        run(&ctx, &SetHandler, &["set", "k", "hello"]).await.unwrap();
        let resp = run(&ctx, &GetHandler, &["get", "k"]).await.unwrap();
        assert_eq!(resp, Response::bulk("hello"));
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let ctx = ctx();
        run(&ctx, &SetHandler, &["set", "k", "1"]).await.unwrap();
        run(&ctx, &SetHandler, &["set", "k", "2"]).await.unwrap();
        let resp = run(&ctx, &GetHandler, &["get", "k"]).await.unwrap();
        assert_eq!(resp, Response::bulk("2"));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let ctx = ctx();
        assert_eq!(
            run(&ctx, &GetHandler, &["get", "missing"]).await.unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn test_get_list_is_wrong_type() {
        let ctx = ctx();
        drop(
            ctx.keyspace
                .create_and_write(&ctx.cancel, b"k", Value::List(Vec::new()))
                .await
                .unwrap(),
        );
        assert_eq!(
            run(&ctx, &GetHandler, &["get", "k"]).await.unwrap_err(),
            StoreError::WrongType
        );
    }

    #[tokio::test]
    async fn test_del_and_exists() {
        let ctx = ctx();
        run(&ctx, &SetHandler, &["set", "k", "v"]).await.unwrap();

        let resp = run(&ctx, &ExistsHandler, &["exists", "k"]).await.unwrap();
        assert_eq!(resp, Response::Integer(1));

        let resp = run(&ctx, &DelHandler, &["del", "k"]).await.unwrap();
        assert_eq!(resp, Response::Integer(1));

        let resp = run(&ctx, &ExistsHandler, &["exists", "k"]).await.unwrap();
        assert_eq!(resp, Response::Integer(0));

        let resp = run(&ctx, &DelHandler, &["del", "k"]).await.unwrap();
        assert_eq!(resp, Response::Integer(0));
    }
}
