//! Core infrastructure: configuration, errors, and runtime orchestration.

pub mod config;
pub mod error;
pub mod runtime;

pub use config::{Config, ConfigOverrides};
pub use error::{StoreError, StoreResult};
pub use runtime::Runtime;
