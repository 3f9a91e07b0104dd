//! Storage seams.
//!
//! The engine talks to storage exclusively through [`Connection`] and
//! [`Collection`]. `mongolid-mongodb` implements them over the official
//! driver; [`memory`](crate::memory) implements them in-process.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::error::OdmResult;

/// Write acknowledgment level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteConcern {
    /// Acknowledge writes from the specified number of nodes. `W(0)` is
    /// fire-and-forget.
    W(u32),
    /// Acknowledge writes from majority of nodes.
    Majority,
    /// Custom write concern tag.
    Custom(String),
}

impl WriteConcern {
    /// Whether writes under this concern report an acknowledgment.
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self, Self::W(0))
    }
}

/// Options shared by every write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Overrides the collection's write concern.
    pub write_concern: Option<WriteConcern>,
}

impl WriteOptions {
    /// Options with a write concern.
    pub fn with_write_concern(write_concern: WriteConcern) -> Self {
        Self {
            write_concern: Some(write_concern),
        }
    }

    /// Whether a write with these options is acknowledged, given the
    /// collection default.
    pub fn is_acknowledged(&self, default: Option<&WriteConcern>) -> bool {
        self.write_concern
            .as_ref()
            .or(default)
            .is_none_or(WriteConcern::is_acknowledged)
    }
}

/// Options for finds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Fields to return.
    pub projection: Option<Document>,
    /// Sort specification.
    pub sort: Option<Document>,
    /// Documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents.
    pub limit: Option<i64>,
}

impl FindOptions {
    /// Options carrying only a projection.
    pub fn projection(projection: Document) -> Self {
        Self {
            projection: Some(projection).filter(|p| !p.is_empty()),
            ..Self::default()
        }
    }

    /// Whether nothing is set.
    pub fn is_empty(&self) -> bool {
        self.projection.is_none() && self.sort.is_none() && self.skip.is_none() && self.limit.is_none()
    }
}

/// Result of `insert_one`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    /// Whether the server acknowledged the write.
    pub acknowledged: bool,
    /// Documents inserted.
    pub inserted_count: u64,
    /// Id of the inserted document.
    pub inserted_id: Option<Bson>,
}

/// Result of `update_one` and `replace_one`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResult {
    /// Whether the server acknowledged the write.
    pub acknowledged: bool,
    /// Documents matched by the filter.
    pub matched_count: u64,
    /// Documents modified.
    pub modified_count: u64,
    /// Documents upserted.
    pub upserted_count: u64,
    /// Id of the upserted document.
    pub upserted_id: Option<Bson>,
}

impl UpdateResult {
    /// Result reported for an unacknowledged write.
    pub fn unacknowledged() -> Self {
        Self {
            acknowledged: false,
            matched_count: 0,
            modified_count: 0,
            upserted_count: 0,
            upserted_id: None,
        }
    }
}

/// Result of `delete_one`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResult {
    /// Whether the server acknowledged the write.
    pub acknowledged: bool,
    /// Documents deleted.
    pub deleted_count: u64,
}

/// A named collection of documents.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Insert one document.
    async fn insert_one(&self, document: Document, options: &WriteOptions) -> OdmResult<InsertOneResult>;

    /// Apply an update document to the first match.
    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: &WriteOptions,
    ) -> OdmResult<UpdateResult>;

    /// Replace the first match, inserting when `upsert` is set and nothing matches.
    async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        upsert: bool,
        options: &WriteOptions,
    ) -> OdmResult<UpdateResult>;

    /// Delete the first match.
    async fn delete_one(&self, filter: Document, options: &WriteOptions) -> OdmResult<DeleteResult>;

    /// First document matching the filter.
    async fn find_one(&self, filter: Document, options: &FindOptions) -> OdmResult<Option<Document>>;

    /// Every document matching the filter.
    async fn find(&self, filter: Document, options: &FindOptions) -> OdmResult<Vec<Document>>;

    /// Atomically update the first match and return it after the update.
    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> OdmResult<Option<Document>>;

    /// Number of documents matching the filter.
    async fn count(&self, filter: Document) -> OdmResult<u64> {
        Ok(self.find(filter, &FindOptions::default()).await?.len() as u64)
    }
}

/// Source of collections.
pub trait Connection: Send + Sync {
    /// Handle to a named collection.
    fn collection(&self, name: &str) -> Arc<dyn Collection>;
}
