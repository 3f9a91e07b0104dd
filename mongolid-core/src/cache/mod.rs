//! Document cache.
//!
//! The cache is advisory. A missing entry means "ask storage", never "does
//! not exist", and read errors are treated as misses by every caller in the
//! engine.

mod key;
mod memory;

use std::time::Duration;

use async_trait::async_trait;
use bson::Document;

use crate::error::OdmResult;

pub use key::{CacheKey, query_hash};
pub use memory::{MemoryCache, MemoryCacheBuilder, MemoryCacheConfig};

/// A key-value store for documents.
///
/// Implementations provide their own thread safety.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Value stored under a key, if present and not expired.
    async fn get(&self, key: &CacheKey) -> OdmResult<Option<Document>>;

    /// Store a value, expiring after `ttl` when given.
    async fn put(&self, key: &CacheKey, value: &Document, ttl: Option<Duration>) -> OdmResult<()>;

    /// Whether a live value is stored under a key.
    async fn has(&self, key: &CacheKey) -> OdmResult<bool>;

    /// Remove a value, returning whether one was stored.
    async fn forget(&self, key: &CacheKey) -> OdmResult<bool>;
}
