//! Keyspace and per-key lock table.
//!
//! The keyspace owns the key → value map and one reader/writer lock per key.
//! Handlers acquire locks through this registry only, one key per call, and
//! receive RAII guards so every exit path (errors and panics included)
//! releases the lock.
//!
//! The map itself is guarded by a separate short-lived lock that is never
//! held across a per-key lock acquisition or any await point. Creation
//! publishes a key only with its value already written and its exclusive
//! lock held, so a reader can never observe a half-initialized entry through
//! the lock. Lock-free existence checks may or may not observe a
//! concurrently-created key.

use crate::core::error::{StoreError, StoreResult};
use crate::store::value::Value;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock as AsyncRwLock};
use tokio_util::sync::CancellationToken;

type KeyLock = Arc<AsyncRwLock<Value>>;

/// Shared (read) guard over a key's value.
#[derive(Debug)]
pub struct ReadGuard {
    guard: OwnedRwLockReadGuard<Value>,
}

impl Deref for ReadGuard {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.guard
    }
}

/// Exclusive (write) guard over a key's value.
#[derive(Debug)]
pub struct WriteGuard {
    guard: OwnedRwLockWriteGuard<Value>,
}

impl Deref for WriteGuard {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.guard
    }
}

impl DerefMut for WriteGuard {
    fn deref_mut(&mut self) -> &mut Value {
        &mut self.guard
    }
}

/// The keyspace: key → (value, lock) registry.
#[derive(Default)]
pub struct Keyspace {
    entries: RwLock<HashMap<Bytes, KeyLock>>,
}

impl Keyspace {
    /// Create an empty keyspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock-free existence check.
    pub fn key_exists(&self, key: &[u8]) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of keys currently published.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the keyspace is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Acquire a shared lock on an existing key.
    ///
    /// Fails with `NotFound` if the key does not exist, `Cancelled` if the
    /// context fires before the lock is granted.
    pub async fn read(&self, cancel: &CancellationToken, key: &[u8]) -> StoreResult<ReadGuard> {
        loop {
            let lock = self
                .entries
                .read()
                .get(key)
                .cloned()
                .ok_or(StoreError::NotFound)?;

            let guard = tokio::select! {
                guard = lock.clone().read_owned() => guard,
                _ = cancel.cancelled() => return Err(StoreError::Cancelled),
            };

            // The key may have been deleted while we waited on the lock.
            if self.is_current(key, &lock) {
                return Ok(ReadGuard { guard });
            }
        }
    }

    /// Acquire an exclusive lock on an existing key.
    pub async fn write(&self, cancel: &CancellationToken, key: &[u8]) -> StoreResult<WriteGuard> {
        loop {
            let lock = self
                .entries
                .read()
                .get(key)
                .cloned()
                .ok_or(StoreError::NotFound)?;

            let guard = tokio::select! {
                guard = lock.clone().write_owned() => guard,
                _ = cancel.cancelled() => return Err(StoreError::Cancelled),
            };

            if self.is_current(key, &lock) {
                return Ok(WriteGuard { guard });
            }
        }
    }

    /// Create the key if absent and return it exclusively locked.
    ///
    /// If the key already exists, `initial` is discarded and the existing
    /// value is locked instead. The create/lock race is retried until this
    /// task holds the lock of the current entry.
    pub async fn create_and_write(
        &self,
        cancel: &CancellationToken,
        key: &[u8],
        initial: Value,
    ) -> StoreResult<WriteGuard> {
        loop {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }

            let existing = self.entries.read().get(key).cloned();
            match existing {
                Some(lock) => {
                    let guard = tokio::select! {
                        guard = lock.clone().write_owned() => guard,
                        _ = cancel.cancelled() => return Err(StoreError::Cancelled),
                    };
                    if self.is_current(key, &lock) {
                        return Ok(WriteGuard { guard });
                    }
                }
                None => {
                    let lock: KeyLock = Arc::new(AsyncRwLock::new(initial.clone()));
                    let Ok(guard) = lock.clone().try_write_owned() else {
                        // Unreachable on a freshly created lock; retry.
                        continue;
                    };

                    let mut map = self.entries.write();
                    if map.contains_key(key) {
                        // Lost the creation race; lock the winner's entry.
                        continue;
                    }
                    map.insert(Bytes::copy_from_slice(key), lock);
                    drop(map);

                    return Ok(WriteGuard { guard });
                }
            }
        }
    }

    /// Delete a key and its lock.
    ///
    /// Returns `false` if the key does not exist. The entry is unpublished
    /// while its exclusive lock is held, so concurrent acquirers observe the
    /// deletion and report `NotFound`.
    pub async fn remove(&self, cancel: &CancellationToken, key: &[u8]) -> StoreResult<bool> {
        loop {
            let Some(lock) = self.entries.read().get(key).cloned() else {
                return Ok(false);
            };

            let guard = tokio::select! {
                guard = lock.clone().write_owned() => guard,
                _ = cancel.cancelled() => return Err(StoreError::Cancelled),
            };

            let mut map = self.entries.write();
            match map.get(key) {
                Some(current) if Arc::ptr_eq(current, &lock) => {
                    map.remove(key);
                    drop(map);
                    drop(guard);
                    return Ok(true);
                }
                Some(_) => continue,
                None => return Ok(false),
            }
        }
    }

    /// Snapshot of all key/value pairs, sorted by key.
    ///
    /// Best-effort: keys whose lock is held exclusively at snapshot time are
    /// skipped. Intended for diagnostics and tests, not the command path.
    pub fn snapshot(&self) -> Vec<(Bytes, Value)> {
        let map = self.entries.read();
        let mut out: Vec<(Bytes, Value)> = map
            .iter()
            .filter_map(|(key, lock)| {
                lock.try_read().ok().map(|guard| (key.clone(), guard.clone()))
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    fn is_current(&self, key: &[u8], lock: &KeyLock) -> bool {
        self.entries
            .read()
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, lock))
    }
}
