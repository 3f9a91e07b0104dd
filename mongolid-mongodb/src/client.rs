//! MongoDB client wrapper implementing the storage connection.

use std::sync::Arc;
use std::time::Duration;

use bson::{Document, doc};
use mongodb::{Client, Database};
use mongolid_core::{Collection, Connection, ContextBuilder, WriteConcern};
use tracing::{debug, info};

use crate::collection::MongoCollection;
use crate::config::{MongoConfig, MongoConfigBuilder};
use crate::error::{MongoError, MongoResult};

/// A MongoDB client bound to one database.
///
/// The driver pools connections internally; clones share the pool.
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    database: Database,
    config: Arc<MongoConfig>,
}

impl MongoClient {
    /// Create a new client from configuration.
    pub async fn new(config: MongoConfig) -> MongoResult<Self> {
        let options = config.to_client_options().await?;

        let client = Client::with_options(options)
            .map_err(|e| MongoError::connection(format!("failed to create client: {}", e)))?;

        let database = client.database(&config.database);

        info!(
            uri = %config.uri,
            database = %config.database,
            "MongoDB client created"
        );

        Ok(Self {
            client,
            database,
            config: Arc::new(config),
        })
    }

    /// Create a builder for the client.
    pub fn builder() -> MongoClientBuilder {
        MongoClientBuilder::new()
    }

    /// Start a Mongolid context over this client.
    pub fn context(&self) -> ContextBuilder {
        ContextBuilder::new(Arc::new(self.clone()))
    }

    /// Get the underlying database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Get the underlying MongoDB client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the configuration.
    pub fn config(&self) -> &MongoConfig {
        &self.config
    }

    /// Check if the client is healthy by pinging the server.
    pub async fn is_healthy(&self) -> bool {
        self.database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .is_ok()
    }

    /// List all collection names in the database.
    pub async fn list_collections(&self) -> MongoResult<Vec<String>> {
        let names = self.database.list_collection_names(None).await?;
        Ok(names)
    }

    /// Drop a collection.
    pub async fn drop_collection(&self, name: &str) -> MongoResult<()> {
        debug!(collection = %name, "Dropping collection");
        self.database
            .collection::<Document>(name)
            .drop(None)
            .await?;
        Ok(())
    }

    /// Create an index on a collection.
    pub async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        unique: bool,
    ) -> MongoResult<String> {
        use mongodb::IndexModel;
        use mongodb::options::IndexOptions;

        let options = IndexOptions::builder().unique(unique).build();
        let model = IndexModel::builder().keys(keys).options(options).build();

        let result = self
            .database
            .collection::<Document>(collection)
            .create_index(model, None)
            .await?;

        Ok(result.index_name)
    }
}

impl Connection for MongoClient {
    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        Arc::new(MongoCollection::new(
            self.database.collection(name),
            self.config.write_concern.clone(),
        ))
    }
}

impl std::fmt::Debug for MongoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoClient")
            .field("database", &self.config.database)
            .field("app_name", &self.config.app_name)
            .finish()
    }
}

/// Builder for MongoClient, configuring through [`MongoConfigBuilder`].
#[derive(Debug, Default)]
pub struct MongoClientBuilder {
    config: MongoConfigBuilder,
}

impl MongoClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the MongoDB URI.
    pub fn uri(self, uri: impl Into<String>) -> Self {
        self.map(|config| config.uri(uri))
    }

    /// Set the database name.
    pub fn database(self, database: impl Into<String>) -> Self {
        self.map(|config| config.database(database))
    }

    /// Set the application name.
    pub fn app_name(self, name: impl Into<String>) -> Self {
        self.map(|config| config.app_name(name))
    }

    /// Set the maximum pool size.
    pub fn max_pool_size(self, size: u32) -> Self {
        self.map(|config| config.max_pool_size(size))
    }

    /// Set the minimum pool size.
    pub fn min_pool_size(self, size: u32) -> Self {
        self.map(|config| config.min_pool_size(size))
    }

    /// Set the connection timeout.
    pub fn connect_timeout(self, duration: Duration) -> Self {
        self.map(|config| config.connect_timeout(duration))
    }

    /// Set the default write concern of every collection handle.
    pub fn write_concern(self, write_concern: WriteConcern) -> Self {
        self.map(|config| config.write_concern(write_concern))
    }

    /// Enable direct connection (bypass replica set discovery).
    pub fn direct_connection(self, enabled: bool) -> Self {
        self.map(|config| config.direct_connection(enabled))
    }

    fn map(self, f: impl FnOnce(MongoConfigBuilder) -> MongoConfigBuilder) -> Self {
        Self {
            config: f(self.config),
        }
    }

    /// Build the configuration without connecting.
    pub fn config(self) -> MongoResult<MongoConfig> {
        self.config.build()
    }

    /// Build the client.
    pub async fn build(self) -> MongoResult<MongoClient> {
        MongoClient::new(self.config()?).await
    }
}
