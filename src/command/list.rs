//! List command handlers.
//!
//! All handlers assume the value under the acquired lock is a list and fail
//! with `WrongType` otherwise. Read commands take a shared lock, write
//! commands an exclusive lock; `lmove` acquires its two keys in ascending
//! lexicographic order to prevent deadlock.

use super::{
    arg_int, arg_str, require_args, require_min_args, Categories, CommandHandler, ExecContext,
    HandlerFuture,
};
use crate::core::error::{StoreError, StoreResult};
use crate::protocol::Response;
use crate::store::Value;
use bytes::Bytes;
use std::sync::Arc;

/// All list command handlers.
pub fn handlers() -> Vec<Arc<dyn CommandHandler>> {
    vec![
        Arc::new(LPushHandler),
        Arc::new(LPushXHandler),
        Arc::new(RPushHandler),
        Arc::new(RPushXHandler),
        Arc::new(LPopHandler),
        Arc::new(RPopHandler),
        Arc::new(LLenHandler),
        Arc::new(LRangeHandler),
        Arc::new(LIndexHandler),
        Arc::new(LSetHandler),
        Arc::new(LTrimHandler),
        Arc::new(LRemHandler),
        Arc::new(LMoveHandler),
    ]
}

fn single_key(name: &'static str, args: &[Bytes], arity: usize) -> StoreResult<Vec<Bytes>> {
    require_args(name, args, arity)?;
    Ok(vec![args[1].clone()])
}

fn list_of(value: &Value) -> StoreResult<&Vec<Value>> {
    value.as_list().ok_or(StoreError::WrongType)
}

fn list_of_mut(value: &mut Value) -> StoreResult<&mut Vec<Value>> {
    value.as_list_mut().ok_or(StoreError::WrongType)
}

/// One end of a list for `lmove` directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Left,
    Right,
}

fn parse_end(args: &[Bytes], index: usize, what: &str) -> StoreResult<End> {
    match arg_str(args, index, what)?.to_ascii_lowercase().as_str() {
        "left" => Ok(End::Left),
        "right" => Ok(End::Right),
        _ => Err(StoreError::argument(format!(
            "{} must be either LEFT or RIGHT",
            what
        ))),
    }
}

async fn push(
    ctx: ExecContext,
    args: Vec<Bytes>,
    at_head: bool,
    require_existing: bool,
) -> StoreResult<Response> {
    let key = &args[1];
    let elements: Vec<Value> = args[2..].iter().map(|raw| Value::adapt(raw)).collect();

    let mut guard = if ctx.keyspace.key_exists(key) {
        ctx.keyspace.write(&ctx.cancel, key).await?
    } else if require_existing {
        return Err(StoreError::NotFound);
    } else {
        ctx.keyspace
            .create_and_write(&ctx.cancel, key, Value::List(Vec::new()))
            .await?
    };

    if ctx.cancel.is_cancelled() {
        return Err(StoreError::Cancelled);
    }

    let list = list_of_mut(&mut guard)?;
    if at_head {
        for element in elements {
            list.insert(0, element);
        }
    } else {
        list.extend(elements);
    }

    Ok(Response::ok())
}

async fn pop(ctx: ExecContext, args: Vec<Bytes>, at_head: bool) -> StoreResult<Response> {
    let key = &args[1];
    if !ctx.keyspace.key_exists(key) {
        return Err(StoreError::NotFound);
    }

    let mut guard = ctx.keyspace.write(&ctx.cancel, key).await?;
    if ctx.cancel.is_cancelled() {
        return Err(StoreError::Cancelled);
    }

    let list = list_of_mut(&mut guard)?;
    if list.is_empty() {
        return Err(StoreError::IndexOutOfRange);
    }

    let element = if at_head {
        list.remove(0)
    } else {
        list.pop().ok_or(StoreError::IndexOutOfRange)?
    };

    Ok(Response::simple(element.render()))
}

/// LPUSH key value [value ...]
pub struct LPushHandler;

impl CommandHandler for LPushHandler {
    fn name(&self) -> &'static str {
        "lpush"
    }

    fn categories(&self) -> Categories {
        Categories::LIST | Categories::WRITE | Categories::FAST
    }

    fn sync(&self) -> bool {
        true
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        require_min_args(self.name(), args, 3)?;
        Ok(vec![args[1].clone()])
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(push(ctx, args, true, false))
    }
}

/// LPUSHX key value [value ...] — only if the list exists.
pub struct LPushXHandler;

impl CommandHandler for LPushXHandler {
    fn name(&self) -> &'static str {
        "lpushx"
    }

    fn categories(&self) -> Categories {
        Categories::LIST | Categories::WRITE | Categories::FAST
    }

    fn sync(&self) -> bool {
        true
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        require_min_args(self.name(), args, 3)?;
        Ok(vec![args[1].clone()])
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(push(ctx, args, true, true))
    }
}

/// RPUSH key value [value ...]
pub struct RPushHandler;

impl CommandHandler for RPushHandler {
    fn name(&self) -> &'static str {
        "rpush"
    }

    fn categories(&self) -> Categories {
        Categories::LIST | Categories::WRITE | Categories::FAST
    }

    fn sync(&self) -> bool {
        true
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        require_min_args(self.name(), args, 3)?;
        Ok(vec![args[1].clone()])
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(push(ctx, args, false, false))
    }
}

/// RPUSHX key value [value ...] — only if the list exists.
pub struct RPushXHandler;

impl CommandHandler for RPushXHandler {
    fn name(&self) -> &'static str {
        "rpushx"
    }

    fn categories(&self) -> Categories {
        Categories::LIST | Categories::WRITE | Categories::FAST
    }

    fn sync(&self) -> bool {
        true
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        require_min_args(self.name(), args, 3)?;
        Ok(vec![args[1].clone()])
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(push(ctx, args, false, true))
    }
}

/// LPOP key — remove and return the head.
pub struct LPopHandler;

impl CommandHandler for LPopHandler {
    fn name(&self) -> &'static str {
        "lpop"
    }

    fn categories(&self) -> Categories {
        Categories::LIST | Categories::WRITE | Categories::FAST
    }

    fn sync(&self) -> bool {
        true
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        single_key(self.name(), args, 2)
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(pop(ctx, args, true))
    }
}

/// RPOP key — remove and return the tail.
pub struct RPopHandler;

impl CommandHandler for RPopHandler {
    fn name(&self) -> &'static str {
        "rpop"
    }

    fn categories(&self) -> Categories {
        Categories::LIST | Categories::WRITE | Categories::FAST
    }

    fn sync(&self) -> bool {
        true
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        single_key(self.name(), args, 2)
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(pop(ctx, args, false))
    }
}

/// LLEN key — list length; 0 for a missing key.
pub struct LLenHandler;

impl CommandHandler for LLenHandler {
    fn name(&self) -> &'static str {
        "llen"
    }

    fn categories(&self) -> Categories {
        Categories::LIST | Categories::READ | Categories::FAST
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        single_key(self.name(), args, 2)
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(async move {
            let key = &args[1];
            if !ctx.keyspace.key_exists(key) {
                return Ok(Response::Integer(0));
            }
            let guard = ctx.keyspace.read(&ctx.cancel, key).await?;
            let list = list_of(&guard)?;
            Ok(Response::Integer(list.len() as i64))
        })
    }
}

/// LINDEX key index — element at index, as a simple string.
pub struct LIndexHandler;

impl CommandHandler for LIndexHandler {
    fn name(&self) -> &'static str {
        "lindex"
    }

    fn categories(&self) -> Categories {
        Categories::LIST | Categories::READ | Categories::SLOW
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        single_key(self.name(), args, 3)
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(async move {
            let index = arg_int(&args, 2, "index")?;
            let key = &args[1];
            if !ctx.keyspace.key_exists(key) {
                return Err(StoreError::NotFound);
            }

            let guard = ctx.keyspace.read(&ctx.cancel, key).await?;
            let list = list_of(&guard)?;
            if index < 0 || index >= list.len() as i64 {
                return Err(StoreError::IndexOutOfRange);
            }
            Ok(Response::simple(list[index as usize].render()))
        })
    }
}

/// LRANGE key start end.
///
/// `end == -1` reads to the tail; `start > end` yields a descending range;
/// `start == end` is an error.
pub struct LRangeHandler;

impl CommandHandler for LRangeHandler {
    fn name(&self) -> &'static str {
        "lrange"
    }

    fn categories(&self) -> Categories {
        Categories::LIST | Categories::READ | Categories::SLOW
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        single_key(self.name(), args, 4)
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(async move {
            let start = arg_int(&args, 2, "start")?;
            let end = arg_int(&args, 3, "end")?;
            let key = &args[1];
            if !ctx.keyspace.key_exists(key) {
                return Err(StoreError::NotFound);
            }

            let guard = ctx.keyspace.read(&ctx.cancel, key).await?;
            let list = list_of(&guard)?;
            let len = list.len() as i64;

            if start < 0 || start >= len {
                return Err(StoreError::IndexOutOfRange);
            }
            if end != -1 && (end < 0 || end >= len) {
                return Err(StoreError::IndexOutOfRange);
            }

            let elements: Vec<Response> = if end == -1 {
                list[start as usize..]
                    .iter()
                    .map(|e| Response::bulk(e.render()))
                    .collect()
            } else if start == end {
                return Err(StoreError::EmptyRange);
            } else if start < end {
                list[start as usize..=end as usize]
                    .iter()
                    .map(|e| Response::bulk(e.render()))
                    .collect()
            } else {
                (end..=start)
                    .rev()
                    .map(|i| Response::bulk(list[i as usize].render()))
                    .collect()
            };

            Ok(Response::array(elements))
        })
    }
}

/// LSET key index value — replace the element at index.
pub struct LSetHandler;

impl CommandHandler for LSetHandler {
    fn name(&self) -> &'static str {
        "lset"
    }

    fn categories(&self) -> Categories {
        Categories::LIST | Categories::WRITE | Categories::SLOW
    }

    fn sync(&self) -> bool {
        true
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        single_key(self.name(), args, 4)
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(async move {
            let index = arg_int(&args, 2, "index")?;
            let key = &args[1];
            if !ctx.keyspace.key_exists(key) {
                return Err(StoreError::NotFound);
            }

            let mut guard = ctx.keyspace.write(&ctx.cancel, key).await?;
            if ctx.cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }

            let list = list_of_mut(&mut guard)?;
            if index < 0 || index >= list.len() as i64 {
                return Err(StoreError::IndexOutOfRange);
            }
            list[index as usize] = Value::adapt(&args[3]);
            Ok(Response::ok())
        })
    }
}

/// LTRIM key start end — trim to `[start, end)`, or to the tail when
/// `end == -1` or `end > len`.
pub struct LTrimHandler;

impl CommandHandler for LTrimHandler {
    fn name(&self) -> &'static str {
        "ltrim"
    }

    fn categories(&self) -> Categories {
        Categories::LIST | Categories::WRITE | Categories::SLOW
    }

    fn sync(&self) -> bool {
        true
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        single_key(self.name(), args, 4)
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(async move {
            let start = arg_int(&args, 2, "start")?;
            let end = arg_int(&args, 3, "end")?;

            if end < start && end != -1 {
                return Err(StoreError::IndexOutOfRange);
            }

            let key = &args[1];
            if !ctx.keyspace.key_exists(key) {
                return Err(StoreError::NotFound);
            }

            let mut guard = ctx.keyspace.write(&ctx.cancel, key).await?;
            if ctx.cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }

            let list = list_of_mut(&mut guard)?;
            let len = list.len() as i64;
            if start < 0 || start >= len {
                return Err(StoreError::IndexOutOfRange);
            }

            if end == -1 || end > len {
                list.drain(..start as usize);
            } else {
                list.truncate(end as usize);
                list.drain(..start as usize);
            }
            Ok(Response::ok())
        })
    }
}

/// LREM key count value — remove up to `|count|` matching elements, from the
/// head when `count > 0`, from the tail when `count < 0`.
pub struct LRemHandler;

impl CommandHandler for LRemHandler {
    fn name(&self) -> &'static str {
        "lrem"
    }

    fn categories(&self) -> Categories {
        Categories::LIST | Categories::WRITE | Categories::SLOW
    }

    fn sync(&self) -> bool {
        true
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        single_key(self.name(), args, 4)
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(async move {
            let count = arg_int(&args, 2, "count")?;
            let target = String::from_utf8_lossy(&args[3]).into_owned();

            let key = &args[1];
            if !ctx.keyspace.key_exists(key) {
                return Err(StoreError::NotFound);
            }

            let mut guard = ctx.keyspace.write(&ctx.cancel, key).await?;
            if ctx.cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }

            let list = list_of_mut(&mut guard)?;
            let mut remaining = count.unsigned_abs() as usize;
            let mut keep = vec![true; list.len()];

            if count > 0 {
                for (i, element) in list.iter().enumerate() {
                    if remaining == 0 {
                        break;
                    }
                    if element.render() == target {
                        keep[i] = false;
                        remaining -= 1;
                    }
                }
            } else if count < 0 {
                for (i, element) in list.iter().enumerate().rev() {
                    if remaining == 0 {
                        break;
                    }
                    if element.render() == target {
                        keep[i] = false;
                        remaining -= 1;
                    }
                }
            }

            if count != 0 {
                let mut index = 0;
                list.retain(|_| {
                    let kept = keep[index];
                    index += 1;
                    kept
                });
            }

            Ok(Response::ok())
        })
    }
}

/// LMOVE source destination LEFT|RIGHT LEFT|RIGHT — atomically move one
/// element between two lists.
pub struct LMoveHandler;

impl CommandHandler for LMoveHandler {
    fn name(&self) -> &'static str {
        "lmove"
    }

    fn categories(&self) -> Categories {
        Categories::LIST | Categories::WRITE | Categories::SLOW
    }

    fn sync(&self) -> bool {
        true
    }

    fn extract_keys(&self, args: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        require_args(self.name(), args, 5)?;
        Ok(vec![args[1].clone(), args[2].clone()])
    }

    fn execute(&self, ctx: ExecContext, args: Vec<Bytes>) -> HandlerFuture {
        Box::pin(async move {
            let wherefrom = parse_end(&args, 3, "wherefrom")?;
            let whereto = parse_end(&args, 4, "whereto")?;
            let source = args[1].clone();
            let destination = args[2].clone();

            if !ctx.keyspace.key_exists(&source) || !ctx.keyspace.key_exists(&destination) {
                return Err(StoreError::NotFound);
            }

            if source == destination {
                let mut guard = ctx.keyspace.write(&ctx.cancel, &source).await?;
                if ctx.cancel.is_cancelled() {
                    return Err(StoreError::Cancelled);
                }
                let list = list_of_mut(&mut guard)?;
                if list.is_empty() {
                    return Err(StoreError::IndexOutOfRange);
                }
                let element = match wherefrom {
                    End::Left => list.remove(0),
                    End::Right => list.pop().ok_or(StoreError::IndexOutOfRange)?,
                };
                match whereto {
                    End::Left => list.insert(0, element),
                    End::Right => list.push(element),
                }
                return Ok(Response::ok());
            }

            // Locks are acquired in ascending key order to prevent deadlock
            // under concurrent opposing moves.
            let (mut src_guard, mut dst_guard) = if source < destination {
                let src = ctx.keyspace.write(&ctx.cancel, &source).await?;
                let dst = ctx.keyspace.write(&ctx.cancel, &destination).await?;
                (src, dst)
            } else {
                let dst = ctx.keyspace.write(&ctx.cancel, &destination).await?;
                let src = ctx.keyspace.write(&ctx.cancel, &source).await?;
                (src, dst)
            };
            if ctx.cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }

            let src_list = list_of_mut(&mut src_guard)?;
            let dst_list = list_of_mut(&mut dst_guard)?;
            if src_list.is_empty() {
                return Err(StoreError::IndexOutOfRange);
            }

            let element = match wherefrom {
                End::Left => src_list.remove(0),
                End::Right => src_list.pop().ok_or(StoreError::IndexOutOfRange)?,
            };
            match whereto {
                End::Left => dst_list.insert(0, element),
                End::Right => dst_list.push(element),
            }

            Ok(Response::ok())
        })
    }
}
