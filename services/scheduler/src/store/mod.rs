//! Cluster KV store interface.
//!
//! The KV store is the single source of truth for applications and
//! containers. Every scheduler operation re-reads what it needs; nothing read
//! through this interface is cached across calls.

pub mod keys;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;

/// KV store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Where a read is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadScope {
    /// This node's replica only.
    Local,

    /// The controlling leader's view.
    #[default]
    Cluster,
}

/// Replicated key/value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a key with an explicit scope.
    async fn get_scoped(&self, key: &str, scope: ReadScope) -> Result<String, StoreError>;

    /// Read a key cluster-wide.
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        self.get_scoped(key, ReadScope::Cluster).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// List keys matching a pattern; `*` matches within one segment.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}
