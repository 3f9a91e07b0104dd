//! The `Collection` seam over the official driver.

use async_trait::async_trait;
use bson::Document;
use futures::TryStreamExt;
use mongodb::options::{
    CountOptions, DeleteOptions, FindOneAndUpdateOptions, FindOneOptions, InsertOneOptions,
    ReplaceOptions, ReturnDocument, UpdateOptions,
};
use mongolid_core::{
    Collection, DeleteResult, FindOptions, InsertOneResult, OdmResult, UpdateResult, WriteConcern,
    WriteOptions,
};
use tracing::debug;

use crate::config::to_driver_write_concern;
use crate::error::driver;

/// A MongoDB collection of raw documents.
#[derive(Clone)]
pub struct MongoCollection {
    inner: mongodb::Collection<Document>,
    write_concern: Option<WriteConcern>,
}

impl MongoCollection {
    /// Wrap a driver collection. `write_concern` is the default the client
    /// was configured with.
    pub fn new(inner: mongodb::Collection<Document>, write_concern: Option<WriteConcern>) -> Self {
        Self { inner, write_concern }
    }

    /// Get the underlying driver collection.
    pub fn inner(&self) -> &mongodb::Collection<Document> {
        &self.inner
    }

    fn acknowledged(&self, options: &WriteOptions) -> bool {
        options.is_acknowledged(self.write_concern.as_ref())
    }

    fn driver_write_concern(options: &WriteOptions) -> Option<mongodb::options::WriteConcern> {
        options.write_concern.as_ref().map(to_driver_write_concern)
    }
}

impl std::fmt::Debug for MongoCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoCollection")
            .field("name", &self.inner.name())
            .field("write_concern", &self.write_concern)
            .finish()
    }
}

#[async_trait]
impl Collection for MongoCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn insert_one(&self, document: Document, options: &WriteOptions) -> OdmResult<InsertOneResult> {
        debug!(collection = %self.inner.name(), "insert_one");
        let mut driver_options = InsertOneOptions::default();
        driver_options.write_concern = Self::driver_write_concern(options);

        let result = self
            .inner
            .insert_one(document, driver_options)
            .await
            .map_err(driver)?;

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
            inserted_id: Some(result.inserted_id),
        })
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: &WriteOptions,
    ) -> OdmResult<UpdateResult> {
        debug!(collection = %self.inner.name(), filter = %filter, "update_one");
        let mut driver_options = UpdateOptions::default();
        driver_options.write_concern = Self::driver_write_concern(options);

        let result = self
            .inner
            .update_one(filter, update, driver_options)
            .await
            .map_err(driver)?;

        if !self.acknowledged(options) {
            return Ok(UpdateResult::unacknowledged());
        }
        Ok(UpdateResult {
            acknowledged: true,
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_count: u64::from(result.upserted_id.is_some()),
            upserted_id: result.upserted_id,
        })
    }

    async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        upsert: bool,
        options: &WriteOptions,
    ) -> OdmResult<UpdateResult> {
        debug!(collection = %self.inner.name(), filter = %filter, upsert, "replace_one");
        let mut driver_options = ReplaceOptions::default();
        driver_options.upsert = Some(upsert);
        driver_options.write_concern = Self::driver_write_concern(options);

        let result = self
            .inner
            .replace_one(filter, replacement, driver_options)
            .await
            .map_err(driver)?;

        if !self.acknowledged(options) {
            return Ok(UpdateResult::unacknowledged());
        }
        Ok(UpdateResult {
            acknowledged: true,
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_count: u64::from(result.upserted_id.is_some()),
            upserted_id: result.upserted_id,
        })
    }

    async fn delete_one(&self, filter: Document, options: &WriteOptions) -> OdmResult<DeleteResult> {
        debug!(collection = %self.inner.name(), filter = %filter, "delete_one");
        let mut driver_options = DeleteOptions::default();
        driver_options.write_concern = Self::driver_write_concern(options);

        let result = self
            .inner
            .delete_one(filter, driver_options)
            .await
            .map_err(driver)?;

        if !self.acknowledged(options) {
            return Ok(DeleteResult {
                acknowledged: false,
                deleted_count: 0,
            });
        }
        Ok(DeleteResult {
            acknowledged: true,
            deleted_count: result.deleted_count,
        })
    }

    async fn find_one(&self, filter: Document, options: &FindOptions) -> OdmResult<Option<Document>> {
        debug!(collection = %self.inner.name(), filter = %filter, "find_one");
        let mut driver_options = FindOneOptions::default();
        driver_options.projection = options.projection.clone();
        driver_options.sort = options.sort.clone();
        driver_options.skip = options.skip;

        self.inner
            .find_one(filter, driver_options)
            .await
            .map_err(driver)
    }

    async fn find(&self, filter: Document, options: &FindOptions) -> OdmResult<Vec<Document>> {
        debug!(collection = %self.inner.name(), filter = %filter, "find");
        let mut driver_options = mongodb::options::FindOptions::default();
        driver_options.projection = options.projection.clone();
        driver_options.sort = options.sort.clone();
        driver_options.skip = options.skip;
        driver_options.limit = options.limit;

        let cursor = self
            .inner
            .find(filter, driver_options)
            .await
            .map_err(driver)?;
        cursor.try_collect::<Vec<Document>>().await.map_err(driver)
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> OdmResult<Option<Document>> {
        debug!(collection = %self.inner.name(), filter = %filter, upsert, "find_one_and_update");
        let mut driver_options = FindOneAndUpdateOptions::default();
        driver_options.upsert = Some(upsert);
        driver_options.return_document = Some(ReturnDocument::After);

        self.inner
            .find_one_and_update(filter, update, driver_options)
            .await
            .map_err(driver)
    }

    async fn count(&self, filter: Document) -> OdmResult<u64> {
        debug!(collection = %self.inner.name(), filter = %filter, "count_documents");
        self.inner
            .count_documents(filter, CountOptions::default())
            .await
            .map_err(driver)
    }
}
