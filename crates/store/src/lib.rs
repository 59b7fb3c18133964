//! Persisted key-value blob storage.
//!
//! The bridge only needs `get` and `set` on opaque byte values. There are no
//! transactions: callers that need check-then-write semantics provide their
//! own locking.

pub mod error;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

pub use {
    error::{Error, Result},
    memory::MemoryKvStore,
    sqlite::SqliteKvStore,
};

/// Persistent key-value storage for bridge state.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
}
