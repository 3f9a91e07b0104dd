//! Persistence orchestration.
//!
//! A [`Builder`] runs every operation for one model type. Writes go through
//! the same sequence:
//!
//! 1. fire the "before" event; a listener returning `false` aborts the write
//! 2. map the attributes through the schema
//! 3. issue the write
//! 4. on an acknowledged write that changed data, snapshot the attributes
//!    and fire the "after" event
//!
//! Writes report `Ok(false)` when nothing observably happened, including
//! unacknowledged writes, and `Err` only for real failures.
//!
//! Reads resolve the query, fetch, prefetch declared eager loads and hand
//! back a [`Cursor`] assembling models on demand.

use std::sync::Arc;

use bson::{Bson, Document, doc};
use tracing::{debug, warn};

use crate::backend::{Collection, FindOptions, WriteConcern, WriteOptions};
use crate::cache::CacheKey;
use crate::changes::calculate_changes;
use crate::context::Context;
use crate::cursor::Cursor;
use crate::eager::EagerLoadCache;
use crate::error::{OdmError, OdmResult};
use crate::events::ModelEvent;
use crate::model::{Model, ModelType};
use crate::query::{self, Query};
use crate::schema::ID_FIELD;

/// Field holding cached query results.
const CACHED_DOCUMENTS_FIELD: &str = "documents";

/// Runs queries and writes for one model type.
#[derive(Clone)]
pub struct Builder<'a> {
    context: &'a Context,
    model_type: Arc<ModelType>,
    options: WriteOptions,
    with_trashed: bool,
}

impl<'a> Builder<'a> {
    /// Create a builder.
    pub fn new(context: &'a Context, model_type: Arc<ModelType>) -> Self {
        Self {
            context,
            model_type,
            options: WriteOptions::default(),
            with_trashed: false,
        }
    }

    /// Write concern for every write issued through this builder.
    pub fn write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.options.write_concern = Some(write_concern);
        self
    }

    /// Include soft-deleted documents in reads.
    pub fn with_trashed(mut self) -> Self {
        self.with_trashed = true;
        self
    }

    /// Model type this builder queries.
    pub fn model_type(&self) -> &Arc<ModelType> {
        &self.model_type
    }

    // ==================== Writes ====================

    /// Upsert the model by id, replacing the stored document.
    pub async fn save(&self, model: &mut Model) -> OdmResult<bool> {
        if !self.fire_before(ModelEvent::Saving, model) {
            return Ok(false);
        }

        let document = self.map(model).await?;
        let filter = id_filter(&document);
        let collection = self.collection_of(model)?;
        debug!(collection = %collection.name(), "Saving model");

        let result = collection
            .replace_one(filter, document.clone(), true, &self.options)
            .await?;
        model.replace_attributes(document);

        let saved = result.acknowledged && result.modified_count + result.upserted_count > 0;
        if saved {
            self.after_success(ModelEvent::Saved, model);
        }
        Ok(saved)
    }

    /// Insert the model. An existing id surfaces as a duplicate key error.
    pub async fn insert(&self, model: &mut Model) -> OdmResult<bool> {
        self.insert_model(model, true).await
    }

    /// Persist the attributes changed since the model was loaded or last
    /// written.
    ///
    /// A model without an id has never been persisted and is inserted
    /// instead, firing only the update events. An empty change set succeeds
    /// without a write.
    pub async fn update(&self, model: &mut Model) -> OdmResult<bool> {
        if !self.fire_before(ModelEvent::Updating, model) {
            return Ok(false);
        }

        if model.id().is_none() {
            let inserted = self.insert_model(model, false).await?;
            if inserted {
                self.context.events().fire(ModelEvent::Updated, model, false);
            }
            return Ok(inserted);
        }

        let document = self.map(model).await?;
        let changes = calculate_changes(&document, model.original_attributes());
        if changes.is_empty() {
            debug!(model = %model.model_type().name(), "No changes to update");
            return Ok(true);
        }

        let filter = id_filter(&document);
        let collection = self.collection_of(model)?;
        debug!(
            collection = %collection.name(),
            set = changes.set().len(),
            unset = changes.unset().len(),
            "Updating model"
        );

        let result = collection
            .update_one(filter.clone(), changes.to_update_document(), &self.options)
            .await?;
        model.replace_attributes(document);

        if !(result.acknowledged && result.modified_count > 0) {
            return Ok(false);
        }
        if let Some(pull) = changes.pull_document() {
            collection.update_one(filter, pull, &self.options).await?;
        }

        self.after_success(ModelEvent::Updated, model);
        Ok(true)
    }

    /// Delete the model. Soft-delete types stamp the deleted-at field
    /// instead of removing the document.
    pub async fn delete(&self, model: &mut Model) -> OdmResult<bool> {
        self.delete_model(model, false).await
    }

    /// Remove the document, even for soft-delete types.
    pub async fn force_delete(&self, model: &mut Model) -> OdmResult<bool> {
        self.delete_model(model, true).await
    }

    /// Clear the deleted-at field of a soft-deleted model.
    pub async fn restore(&self, model: &mut Model) -> OdmResult<bool> {
        let Some(field) = model.model_type().soft_delete_field().map(str::to_string) else {
            return Err(OdmError::config(format!(
                "model '{}' does not soft delete",
                model.model_type().name()
            )));
        };
        let Some(id) = model.id().cloned() else {
            return Ok(false);
        };

        let filter = query::resolve(id, model.model_type(), true);
        let collection = self.collection_of(model)?;
        let result = collection
            .update_one(filter, operator("$unset", &field, ""), &self.options)
            .await?;

        let restored = result.acknowledged && result.modified_count > 0;
        if restored {
            model.unset(&field);
            model.sync_original();
        }
        Ok(restored)
    }

    async fn insert_model(&self, model: &mut Model, fire_events: bool) -> OdmResult<bool> {
        if fire_events && !self.fire_before(ModelEvent::Inserting, model) {
            return Ok(false);
        }

        let document = self.map(model).await?;
        let collection = self.collection_of(model)?;
        debug!(collection = %collection.name(), "Inserting model");

        let result = collection.insert_one(document.clone(), &self.options).await?;
        model.replace_attributes(document);

        let inserted = result.acknowledged && result.inserted_count > 0;
        if inserted {
            model.sync_original();
            if fire_events {
                self.context.events().fire(ModelEvent::Inserted, model, false);
            }
        }
        Ok(inserted)
    }

    async fn delete_model(&self, model: &mut Model, force: bool) -> OdmResult<bool> {
        if !self.fire_before(ModelEvent::Deleting, model) {
            return Ok(false);
        }
        let Some(id) = model.id().cloned() else {
            debug!(model = %model.model_type().name(), "Cannot delete a model without id");
            return Ok(false);
        };

        let filter = query::resolve(id, model.model_type(), true);
        let collection = self.collection_of(model)?;
        let soft_delete_field = model
            .model_type()
            .soft_delete_field()
            .filter(|_| !force)
            .map(str::to_string);

        let deleted = match soft_delete_field {
            Some(field) => {
                let now = bson::DateTime::now();
                debug!(collection = %collection.name(), field = %field, "Soft deleting model");
                let result = collection
                    .update_one(filter, operator("$set", &field, now), &self.options)
                    .await?;
                let deleted = result.acknowledged && result.modified_count > 0;
                if deleted {
                    let mut attributes = model.attributes().clone();
                    attributes.insert(field, now);
                    model.replace_attributes(attributes);
                    model.sync_original();
                }
                deleted
            }
            None => {
                debug!(collection = %collection.name(), "Deleting model");
                let result = collection.delete_one(filter, &self.options).await?;
                result.acknowledged && result.deleted_count > 0
            }
        };

        if deleted {
            self.context.events().fire(ModelEvent::Deleted, model, false);
        }
        Ok(deleted)
    }

    fn fire_before(&self, event: ModelEvent, model: &Model) -> bool {
        if self.context.events().fire(event, model, true) {
            return true;
        }
        warn!(event = %event.name_for(model.model_type().name()), "Write halted by listener");
        false
    }

    fn after_success(&self, event: ModelEvent, model: &mut Model) {
        model.sync_original();
        self.context.events().fire(event, model, false);
    }

    async fn map(&self, model: &Model) -> OdmResult<Document> {
        self.context
            .mapper()
            .map(model.attributes(), model.model_type().schema())
            .await
    }

    fn collection_of(&self, model: &Model) -> OdmResult<Arc<dyn Collection>> {
        Ok(self.context.connection().collection(model.model_type().collection()?))
    }

    // ==================== Reads ====================

    /// Models matching a query.
    ///
    /// With `use_cache`, an identical earlier query is answered from the
    /// cache store; results are cached only when they fit the eager-load
    /// limit.
    pub async fn r#where(
        &self,
        query: impl Into<Query>,
        projection: Option<Document>,
        use_cache: bool,
    ) -> OdmResult<Cursor> {
        let collection_name = self.model_type.collection()?;
        let filter = query::resolve(query, &self.model_type, self.with_trashed);
        let key = use_cache.then(|| CacheKey::query(collection_name, &filter, projection.as_ref()));

        if let Some(key) = &key {
            if let Some(cached) = self.cached(key).await {
                let documents = match cached.get(CACHED_DOCUMENTS_FIELD) {
                    Some(Bson::Array(items)) => items
                        .iter()
                        .filter_map(|item| item.as_document().cloned())
                        .collect(),
                    _ => Vec::new(),
                };
                return Ok(self.cursor(documents));
            }
        }

        debug!(collection = %collection_name, filter = %filter, "Querying models");
        let options = FindOptions::projection(projection.unwrap_or_default());
        let documents = self
            .context
            .connection()
            .collection(collection_name)
            .find(filter, &options)
            .await?;
        self.eager_load(&documents).await?;

        if let Some(key) = &key {
            if !documents.is_empty() && documents.len() <= self.context.config().eager_load_limit {
                let items: Vec<Bson> = documents.iter().cloned().map(Bson::Document).collect();
                self.remember(key, &doc! { CACHED_DOCUMENTS_FIELD: items }).await;
            }
        }
        Ok(self.cursor(documents))
    }

    /// First model matching a query. A `null` id matches nothing.
    pub async fn first(
        &self,
        query: impl Into<Query>,
        projection: Option<Document>,
        use_cache: bool,
    ) -> OdmResult<Option<Model>> {
        let query = query.into();
        if query.is_null_id() {
            return Ok(None);
        }
        let collection_name = self.model_type.collection()?;
        let filter = query::resolve(query, &self.model_type, self.with_trashed);
        let key = use_cache.then(|| CacheKey::first(collection_name, &filter, projection.as_ref()));

        let cached = match &key {
            Some(key) => self.cached(key).await,
            None => None,
        };
        let document = match cached {
            Some(document) => Some(document),
            None => {
                debug!(collection = %collection_name, filter = %filter, "Querying first model");
                let options = FindOptions::projection(projection.unwrap_or_default());
                let document = self
                    .context
                    .connection()
                    .collection(collection_name)
                    .find_one(filter, &options)
                    .await?;
                if let Some(document) = &document {
                    self.eager_load(std::slice::from_ref(document)).await?;
                    if let Some(key) = &key {
                        self.remember(key, document).await;
                    }
                }
                document
            }
        };

        match document {
            Some(document) => self
                .context
                .assembler()
                .assemble(document, self.model_type.schema()),
            None => Ok(None),
        }
    }

    /// First model matching a query, or a not-found error.
    pub async fn first_or_fail(
        &self,
        query: impl Into<Query>,
        projection: Option<Document>,
        use_cache: bool,
    ) -> OdmResult<Model> {
        let query = query.into();
        let description = format!("{query:?}");
        self.first(query, projection, use_cache).await?.ok_or_else(|| {
            OdmError::model_not_found(format!(
                "no query results for model '{}' ({description})",
                self.model_type.name()
            ))
        })
    }

    /// Every model of the type.
    pub async fn all(&self) -> OdmResult<Cursor> {
        self.r#where(Query::all(), None, false).await
    }

    /// Number of documents matching a query.
    pub async fn count(&self, query: impl Into<Query>) -> OdmResult<u64> {
        let filter = query::resolve(query, &self.model_type, self.with_trashed);
        self.context
            .connection()
            .collection(self.model_type.collection()?)
            .count(filter)
            .await
    }

    async fn eager_load(&self, documents: &[Document]) -> OdmResult<()> {
        let eager_loads = self.model_type.eager_loads();
        if eager_loads.is_empty() {
            return Ok(());
        }
        EagerLoadCache::new(self.context).cache(documents, eager_loads).await
    }

    async fn cached(&self, key: &CacheKey) -> Option<Document> {
        match self.context.cache().get(key).await {
            Ok(found) => found,
            Err(err) => {
                warn!(key = %key, error = %err, "Cache read failed, querying storage");
                None
            }
        }
    }

    async fn remember(&self, key: &CacheKey, document: &Document) {
        let ttl = Some(self.context.config().cache_ttl);
        if let Err(err) = self.context.cache().put(key, document, ttl).await {
            warn!(key = %key, error = %err, "Failed to cache query result");
        }
    }

    fn cursor(&self, documents: Vec<Document>) -> Cursor {
        Cursor::new(
            Arc::clone(self.context.registry()),
            Arc::clone(self.model_type.schema()),
            documents,
        )
    }
}

impl std::fmt::Debug for Builder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("model_type", &self.model_type.name())
            .field("options", &self.options)
            .field("with_trashed", &self.with_trashed)
            .finish()
    }
}

fn operator(operator: &str, field: &str, value: impl Into<Bson>) -> Document {
    let mut fields = Document::new();
    fields.insert(field, value);
    let mut update = Document::new();
    update.insert(operator, fields);
    update
}

fn id_filter(document: &Document) -> Document {
    doc! { ID_FIELD: document.get(ID_FIELD).cloned().unwrap_or(Bson::Null) }
}
