//! Engine configuration.

use std::time::Duration;

use crate::error::{OdmError, OdmResult};

/// Default number of source documents inspected by the eager-load cache.
pub const DEFAULT_EAGER_LOAD_LIMIT: usize = 100;

/// Default time-to-live of eager-loaded cache entries.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(36);

/// Default collection holding auto-increment counters.
pub const DEFAULT_SEQUENCE_COLLECTION: &str = "mongolid_sequences";

/// Default field marking a soft-deleted document.
pub const DEFAULT_SOFT_DELETE_FIELD: &str = "deleted_at";

/// Configuration shared by every builder created from a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OdmConfig {
    /// Maximum number of source documents scanned when prefetching relations.
    pub eager_load_limit: usize,
    /// Time-to-live for prefetched relation entries and cached query results.
    pub cache_ttl: Duration,
    /// Collection storing `{_id: name, seq: n}` counters.
    pub sequence_collection: String,
    /// Deleted-at field used by soft-delete models that do not name their own.
    pub soft_delete_field: String,
}

impl Default for OdmConfig {
    fn default() -> Self {
        Self {
            eager_load_limit: DEFAULT_EAGER_LOAD_LIMIT,
            cache_ttl: DEFAULT_CACHE_TTL,
            sequence_collection: DEFAULT_SEQUENCE_COLLECTION.to_string(),
            soft_delete_field: DEFAULT_SOFT_DELETE_FIELD.to_string(),
        }
    }
}

impl OdmConfig {
    /// Create a builder for configuration.
    pub fn builder() -> OdmConfigBuilder {
        OdmConfigBuilder::new()
    }

    /// Load configuration from the process environment.
    ///
    /// Reads `MONGOLID_EAGER_LOAD_LIMIT`, `MONGOLID_CACHE_TTL_SECS`,
    /// `MONGOLID_SEQUENCE_COLLECTION` and `MONGOLID_SOFT_DELETE_FIELD`.
    pub fn from_env() -> OdmResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through a variable lookup function.
    pub fn from_lookup<F>(lookup: F) -> OdmResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(limit) = lookup("MONGOLID_EAGER_LOAD_LIMIT") {
            let limit = limit.trim().parse::<usize>().map_err(|_| {
                OdmError::config(format!("MONGOLID_EAGER_LOAD_LIMIT is not a number: {limit}"))
            })?;
            builder = builder.eager_load_limit(limit);
        }

        if let Some(ttl) = lookup("MONGOLID_CACHE_TTL_SECS") {
            let secs = ttl.trim().parse::<u64>().map_err(|_| {
                OdmError::config(format!("MONGOLID_CACHE_TTL_SECS is not a number: {ttl}"))
            })?;
            builder = builder.cache_ttl(Duration::from_secs(secs));
        }

        if let Some(collection) = lookup("MONGOLID_SEQUENCE_COLLECTION") {
            builder = builder.sequence_collection(collection);
        }

        if let Some(field) = lookup("MONGOLID_SOFT_DELETE_FIELD") {
            builder = builder.soft_delete_field(field);
        }

        builder.build()
    }
}

/// Builder for [`OdmConfig`].
#[derive(Debug, Default)]
pub struct OdmConfigBuilder {
    eager_load_limit: Option<usize>,
    cache_ttl: Option<Duration>,
    sequence_collection: Option<String>,
    soft_delete_field: Option<String>,
}

impl OdmConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the eager-load document limit.
    pub fn eager_load_limit(mut self, limit: usize) -> Self {
        self.eager_load_limit = Some(limit);
        self
    }

    /// Set the cache time-to-live.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Set the sequence collection name.
    pub fn sequence_collection(mut self, name: impl Into<String>) -> Self {
        self.sequence_collection = Some(name.into());
        self
    }

    /// Set the default soft-delete field.
    pub fn soft_delete_field(mut self, field: impl Into<String>) -> Self {
        self.soft_delete_field = Some(field.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> OdmResult<OdmConfig> {
        let eager_load_limit = self.eager_load_limit.unwrap_or(DEFAULT_EAGER_LOAD_LIMIT);
        if eager_load_limit == 0 {
            return Err(OdmError::config("eager load limit must be greater than zero"));
        }

        let sequence_collection = self
            .sequence_collection
            .unwrap_or_else(|| DEFAULT_SEQUENCE_COLLECTION.to_string());
        if sequence_collection.is_empty() {
            return Err(OdmError::config("sequence collection name is required"));
        }

        let soft_delete_field = self
            .soft_delete_field
            .unwrap_or_else(|| DEFAULT_SOFT_DELETE_FIELD.to_string());
        if soft_delete_field.is_empty() {
            return Err(OdmError::config("soft delete field name is required"));
        }

        Ok(OdmConfig {
            eager_load_limit,
            cache_ttl: self.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL),
            sequence_collection,
            soft_delete_field,
        })
    }
}
