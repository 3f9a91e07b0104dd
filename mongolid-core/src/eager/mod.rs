//! Relation prefetching.
//!
//! When a model type declares eager loads, every query for it collects the
//! referenced ids from (at most `eager_load_limit` of) the returned documents
//! and fetches the related documents with one `$in` query per relation. The
//! results land in the cache under `"{related collection}:{id}"`, where
//! reference relations look first.

mod extractor;
mod loader;

use smol_str::SmolStr;

use crate::schema::ID_FIELD;

pub use extractor::{ExtractedIds, RelationExtractor};
pub use loader::EagerLoadCache;

/// A relation to prefetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EagerLoad {
    key: String,
    model: SmolStr,
}

impl EagerLoad {
    /// Prefetch models of a type, referenced by `_id` unless [`key`](Self::key)
    /// says otherwise.
    pub fn new(model: impl Into<SmolStr>) -> Self {
        Self {
            key: ID_FIELD.to_string(),
            model: model.into(),
        }
    }

    /// Field of the source document holding the referenced id(s). A dotted
    /// key (`"skus.shop_id"`) reads the child key from each embedded document.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Source field holding the referenced ids.
    pub fn key_path(&self) -> &str {
        &self.key
    }

    /// Related model type tag.
    pub fn model(&self) -> &str {
        &self.model
    }
}
