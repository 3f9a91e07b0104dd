//! In-process storage backend.
//!
//! [`MemoryConnection`] keeps every collection in memory and evaluates
//! filters and update operators the way the document store does for the
//! subset the engine emits: equality (with array containment and dotted
//! paths), `$in`, `$nin`, `$ne`, `$exists`, comparisons, `$and`/`$or`, and
//! the `$set`, `$unset`, `$pull` and `$inc` update operators.
//!
//! Each collection counts the operations issued against it, so tests can
//! assert how many round-trips a code path takes.
//!
//! ```rust,ignore
//! use mongolid_core::memory::MemoryConnection;
//!
//! let connection = MemoryConnection::new();
//! let users = connection.memory_collection("users");
//! assert_eq!(users.stats().finds(), 0);
//! ```

mod filter;
mod update;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use parking_lot::RwLock;
use tracing::trace;

use crate::backend::{
    Collection, Connection, DeleteResult, FindOptions, InsertOneResult, UpdateResult, WriteConcern,
    WriteOptions,
};
use crate::error::{OdmError, OdmResult};
use crate::value::id_string;

/// Operation counters for one collection.
#[derive(Debug, Default)]
pub struct OperationStats {
    finds: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

impl OperationStats {
    /// `find` and `find_one` calls.
    pub fn finds(&self) -> u64 {
        self.finds.load(AtomicOrdering::Relaxed)
    }

    /// `insert_one` calls.
    pub fn inserts(&self) -> u64 {
        self.inserts.load(AtomicOrdering::Relaxed)
    }

    /// `update_one`, `replace_one` and `find_one_and_update` calls.
    pub fn updates(&self) -> u64 {
        self.updates.load(AtomicOrdering::Relaxed)
    }

    /// `delete_one` calls.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(AtomicOrdering::Relaxed)
    }

    /// Reset every counter.
    pub fn reset(&self) {
        for counter in [&self.finds, &self.inserts, &self.updates, &self.deletes] {
            counter.store(0, AtomicOrdering::Relaxed);
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, AtomicOrdering::Relaxed);
    }
}

/// An in-memory collection.
pub struct MemoryCollection {
    name: String,
    documents: RwLock<Vec<Document>>,
    write_concern: RwLock<Option<WriteConcern>>,
    stats: OperationStats,
}

impl MemoryCollection {
    /// Create an empty collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(Vec::new()),
            write_concern: RwLock::new(None),
            stats: OperationStats::default(),
        }
    }

    /// Default write concern for writes that do not set one.
    pub fn set_write_concern(&self, write_concern: Option<WriteConcern>) {
        *self.write_concern.write() = write_concern;
    }

    /// Operation counters.
    pub fn stats(&self) -> &OperationStats {
        &self.stats
    }

    /// Copy of every stored document, in insertion order.
    pub fn documents(&self) -> Vec<Document> {
        self.documents.read().clone()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    fn acknowledged(&self, options: &WriteOptions) -> bool {
        options.is_acknowledged(self.write_concern.read().as_ref())
    }

    fn has_id(documents: &[Document], id: &Bson) -> bool {
        let key = id_string(id);
        documents
            .iter()
            .any(|doc| doc.get("_id").is_some_and(|existing| id_string(existing) == key))
    }

    fn duplicate(&self, id: &Bson) -> OdmError {
        OdmError::duplicate_key(format!(
            "E11000 duplicate key error collection: {} index: _id_ dup key: {{ _id: {id} }}",
            self.name
        ))
    }

    /// Apply an update to the first match, upserting when asked. Returns the
    /// resulting document and the counts.
    fn write_update(
        &self,
        filter: &Document,
        update: &Document,
        upsert: bool,
    ) -> OdmResult<(Option<Document>, UpdateResult)> {
        let replacing = !update::is_operator_document(update);
        let mut documents = self.documents.write();

        if let Some(position) = documents.iter().position(|doc| filter::matches(doc, filter)) {
            let current = &documents[position];
            let mut next = if replacing {
                let mut replacement = update.clone();
                if let Some(id) = current.get("_id") {
                    if replacement.get("_id").is_some_and(|new_id| new_id != id) {
                        return Err(OdmError::storage("the (immutable) field '_id' was found to have been altered"));
                    }
                    replacement.insert("_id", id.clone());
                }
                replacement
            } else {
                current.clone()
            };
            if !replacing {
                update::apply(&mut next, update)?;
            }

            let modified = u64::from(&next != current || !same_order(&next, current));
            documents[position] = next.clone();
            return Ok((
                Some(next),
                UpdateResult {
                    acknowledged: true,
                    matched_count: 1,
                    modified_count: modified,
                    upserted_count: 0,
                    upserted_id: None,
                },
            ));
        }

        if !upsert {
            return Ok((
                None,
                UpdateResult {
                    acknowledged: true,
                    matched_count: 0,
                    modified_count: 0,
                    upserted_count: 0,
                    upserted_id: None,
                },
            ));
        }

        let mut inserted = update::seed_from_filter(filter);
        if replacing {
            for (key, value) in update {
                inserted.insert(key.clone(), value.clone());
            }
        } else {
            update::apply(&mut inserted, update)?;
        }
        let id = match inserted.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                inserted.insert("_id", id.clone());
                id
            }
        };
        if Self::has_id(&documents, &id) {
            return Err(self.duplicate(&id));
        }
        documents.push(inserted.clone());

        Ok((
            Some(inserted),
            UpdateResult {
                acknowledged: true,
                matched_count: 0,
                modified_count: 0,
                upserted_count: 1,
                upserted_id: Some(id),
            },
        ))
    }
}

impl std::fmt::Debug for MemoryCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCollection")
            .field("name", &self.name)
            .field("documents", &self.len())
            .finish()
    }
}

fn same_order(a: &Document, b: &Document) -> bool {
    a.keys().eq(b.keys())
}

fn project(document: Document, projection: &Document) -> Document {
    let includes = |value: &Bson| !matches!(value, Bson::Int32(0) | Bson::Int64(0) | Bson::Boolean(false));
    let inclusive = projection
        .iter()
        .filter(|(key, _)| key.as_str() != "_id")
        .any(|(_, value)| includes(value));
    let keep_id = projection.get("_id").is_none_or(includes);

    document
        .into_iter()
        .filter(|(key, _)| {
            if key == "_id" {
                return keep_id;
            }
            match projection.get(key) {
                Some(value) => includes(value),
                None => !inclusive,
            }
        })
        .collect()
}

fn sort(documents: &mut [Document], spec: &Document) {
    documents.sort_by(|a, b| {
        for (key, direction) in spec {
            let descending = matches!(direction, Bson::Int32(d) if *d < 0) || matches!(direction, Bson::Int64(d) if *d < 0);
            let left = filter::lookup(a, key).first().copied().cloned().unwrap_or(Bson::Null);
            let right = filter::lookup(b, key).first().copied().cloned().unwrap_or(Bson::Null);
            let ordering = match (&left, &right) {
                (Bson::Null, Bson::Null) => Ordering::Equal,
                (Bson::Null, _) => Ordering::Less,
                (_, Bson::Null) => Ordering::Greater,
                _ => filter::compare(&left, &right).unwrap_or(Ordering::Equal),
            };
            let ordering = if descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, mut document: Document, options: &WriteOptions) -> OdmResult<InsertOneResult> {
        OperationStats::bump(&self.stats.inserts);
        let id = match document.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                document.insert("_id", id.clone());
                id
            }
        };

        {
            let mut documents = self.documents.write();
            if Self::has_id(&documents, &id) {
                return Err(self.duplicate(&id));
            }
            documents.push(document);
        }
        trace!(collection = %self.name, id = %id, "Inserted document");

        if !self.acknowledged(options) {
            return Ok(InsertOneResult {
                acknowledged: false,
                inserted_count: 0,
                inserted_id: None,
            });
        }
        Ok(InsertOneResult {
            acknowledged: true,
            inserted_count: 1,
            inserted_id: Some(id),
        })
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: &WriteOptions,
    ) -> OdmResult<UpdateResult> {
        OperationStats::bump(&self.stats.updates);
        if !update::is_operator_document(&update) {
            return Err(OdmError::storage("update document requires atomic operators"));
        }
        let (_, result) = self.write_update(&filter, &update, false)?;
        trace!(collection = %self.name, modified = result.modified_count, "Updated document");

        if !self.acknowledged(options) {
            return Ok(UpdateResult::unacknowledged());
        }
        Ok(result)
    }

    async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        upsert: bool,
        options: &WriteOptions,
    ) -> OdmResult<UpdateResult> {
        OperationStats::bump(&self.stats.updates);
        if update::is_operator_document(&replacement) {
            return Err(OdmError::storage("replacement document must not contain atomic operators"));
        }
        let (_, result) = self.write_update(&filter, &replacement, upsert)?;
        trace!(
            collection = %self.name,
            modified = result.modified_count,
            upserted = result.upserted_count,
            "Replaced document"
        );

        if !self.acknowledged(options) {
            return Ok(UpdateResult::unacknowledged());
        }
        Ok(result)
    }

    async fn delete_one(&self, filter: Document, options: &WriteOptions) -> OdmResult<DeleteResult> {
        OperationStats::bump(&self.stats.deletes);
        let deleted = {
            let mut documents = self.documents.write();
            match documents.iter().position(|doc| filter::matches(doc, &filter)) {
                Some(position) => {
                    documents.remove(position);
                    1
                }
                None => 0,
            }
        };
        trace!(collection = %self.name, deleted, "Deleted document");

        if !self.acknowledged(options) {
            return Ok(DeleteResult {
                acknowledged: false,
                deleted_count: 0,
            });
        }
        Ok(DeleteResult {
            acknowledged: true,
            deleted_count: deleted,
        })
    }

    async fn find_one(&self, filter: Document, options: &FindOptions) -> OdmResult<Option<Document>> {
        let options = FindOptions {
            limit: Some(1),
            ..options.clone()
        };
        Ok(self.find(filter, &options).await?.into_iter().next())
    }

    async fn find(&self, filter: Document, options: &FindOptions) -> OdmResult<Vec<Document>> {
        OperationStats::bump(&self.stats.finds);
        let mut found: Vec<Document> = self
            .documents
            .read()
            .iter()
            .filter(|doc| filter::matches(doc, &filter))
            .cloned()
            .collect();

        if let Some(spec) = &options.sort {
            sort(&mut found, spec);
        }
        let skip = options.skip.unwrap_or(0) as usize;
        let limit = match options.limit {
            Some(limit) if limit != 0 => limit.unsigned_abs() as usize,
            _ => usize::MAX,
        };
        let found = found.into_iter().skip(skip).take(limit);

        Ok(match &options.projection {
            Some(projection) => found.map(|doc| project(doc, projection)).collect(),
            None => found.collect(),
        })
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> OdmResult<Option<Document>> {
        OperationStats::bump(&self.stats.updates);
        let (document, _) = self.write_update(&filter, &update, upsert)?;
        Ok(document)
    }

    async fn count(&self, filter: Document) -> OdmResult<u64> {
        Ok(self
            .documents
            .read()
            .iter()
            .filter(|doc| filter::matches(doc, &filter))
            .count() as u64)
    }
}

/// In-memory connection. Collections are created on first use and live as
/// long as the connection or any handle to them.
#[derive(Debug, Default, Clone)]
pub struct MemoryConnection {
    collections: Arc<RwLock<HashMap<String, Arc<MemoryCollection>>>>,
}

impl MemoryConnection {
    /// Create an empty connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete handle to a collection, for inspection.
    pub fn memory_collection(&self, name: &str) -> Arc<MemoryCollection> {
        if let Some(collection) = self.collections.read().get(name) {
            return Arc::clone(collection);
        }
        let mut collections = self.collections.write();
        Arc::clone(
            collections
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryCollection::new(name))),
        )
    }

    /// Names of the collections created so far.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Connection for MemoryConnection {
    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        self.memory_collection(name)
    }
}
