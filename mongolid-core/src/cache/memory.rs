//! In-process cache store.
//!
//! Entries are kept as encoded BSON so a cached document can never alias a
//! model's attributes. Capacity is bounded; when full, expired entries are
//! dropped first and then the least recently used tenth.
//!
//! ```rust
//! use mongolid_core::cache::MemoryCache;
//! use std::time::Duration;
//!
//! let cache = MemoryCache::builder()
//!     .max_capacity(10_000)
//!     .time_to_live(Duration::from_secs(300))
//!     .build();
//! assert_eq!(cache.config().max_capacity, 10_000);
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bson::Document;
use parking_lot::RwLock;

use super::{CacheKey, CacheStore};
use crate::error::{OdmError, OdmResult};

/// Configuration for the in-memory cache.
#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    /// Maximum number of entries.
    pub max_capacity: usize,
    /// Time-to-live applied when a put carries none.
    pub time_to_live: Option<Duration>,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            time_to_live: None,
        }
    }
}

impl MemoryCacheConfig {
    /// Create a new config with the given capacity.
    pub fn new(max_capacity: usize) -> Self {
        Self {
            max_capacity,
            ..Default::default()
        }
    }

    /// Set the default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }
}

/// Builder for MemoryCache.
#[derive(Default)]
pub struct MemoryCacheBuilder {
    config: MemoryCacheConfig,
}

impl MemoryCacheBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max capacity.
    pub fn max_capacity(mut self, capacity: usize) -> Self {
        self.config.max_capacity = capacity;
        self
    }

    /// Set TTL.
    pub fn time_to_live(mut self, ttl: Duration) -> Self {
        self.config.time_to_live = Some(ttl);
        self
    }

    /// Build the cache.
    pub fn build(self) -> MemoryCache {
        MemoryCache::new(self.config)
    }
}

#[derive(Clone)]
struct CacheEntry {
    /// Encoded document.
    data: Vec<u8>,
    expires_at: Option<Instant>,
    last_accessed: Instant,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            data,
            expires_at: ttl.map(|d| now + d),
            last_accessed: now,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }
}

/// In-memory cache with TTL and LRU eviction.
#[derive(Default)]
pub struct MemoryCache {
    config: MemoryCacheConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    /// Create a new memory cache with the given config.
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Create a builder.
    pub fn builder() -> MemoryCacheBuilder {
        MemoryCacheBuilder::new()
    }

    /// Get the config.
    pub fn config(&self) -> &MemoryCacheConfig {
        &self.config
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Evict expired entries.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    fn evict_lru(&self, count: usize) {
        let mut entries = self.entries.write();

        let mut by_access: Vec<_> = entries
            .iter()
            .map(|(k, e)| (k.clone(), e.last_accessed))
            .collect();
        by_access.sort_by_key(|(_, t)| *t);

        for (key, _) in by_access.into_iter().take(count) {
            entries.remove(&key);
        }
    }

    fn make_room(&self) {
        if self.len() < self.config.max_capacity {
            return;
        }
        self.evict_expired();
        if self.len() >= self.config.max_capacity {
            self.evict_lru((self.config.max_capacity / 10).max(1));
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &CacheKey) -> OdmResult<Option<Document>> {
        let key_str = key.as_str();
        let mut entries = self.entries.write();

        let Some(entry) = entries.get_mut(&key_str) else {
            return Ok(None);
        };
        if entry.is_expired() {
            entries.remove(&key_str);
            return Ok(None);
        }

        entry.touch();
        Document::from_reader(&mut entry.data.as_slice())
            .map(Some)
            .map_err(|e| OdmError::cache(e.to_string()))
    }

    async fn put(&self, key: &CacheKey, value: &Document, ttl: Option<Duration>) -> OdmResult<()> {
        let mut data = Vec::new();
        value
            .to_writer(&mut data)
            .map_err(|e| OdmError::cache(e.to_string()))?;

        self.make_room();

        let entry = CacheEntry::new(data, ttl.or(self.config.time_to_live));
        self.entries.write().insert(key.as_str(), entry);
        Ok(())
    }

    async fn has(&self, key: &CacheKey) -> OdmResult<bool> {
        let entries = self.entries.read();
        Ok(entries.get(&key.as_str()).is_some_and(|entry| !entry.is_expired()))
    }

    async fn forget(&self, key: &CacheKey) -> OdmResult<bool> {
        Ok(self.entries.write().remove(&key.as_str()).is_some())
    }
}
