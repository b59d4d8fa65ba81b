//! In-memory keyspace: typed values and the per-key lock registry.

pub mod keyspace;
pub mod value;

pub use keyspace::{Keyspace, ReadGuard, WriteGuard};
pub use value::Value;
