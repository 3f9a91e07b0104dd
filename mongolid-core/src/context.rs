//! Application context.
//!
//! A [`Context`] bundles the collaborators every operation needs: the
//! storage connection, the registry of schemas and model types, the event
//! dispatcher, the cache store, the sequence store and the configuration.
//! Build it once at startup and hand it to every builder; clones are cheap
//! and share everything.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mongolid_core::prelude::*;
//!
//! let registry = Registry::builder()
//!     .model_type(ModelType::builder("User").collection("users"))
//!     .build()?;
//! let context = Context::builder(Arc::new(MemoryConnection::new()))
//!     .registry(registry)
//!     .build()?;
//!
//! let mut user = context.new_model("User")?;
//! user.set("name", "John")?;
//! assert!(context.save(&mut user).await?);
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::assembler::EntityAssembler;
use crate::backend::Connection;
use crate::builder::Builder;
use crate::cache::{CacheStore, MemoryCache};
use crate::config::OdmConfig;
use crate::error::OdmResult;
use crate::events::{EventDispatcher, NullDispatcher};
use crate::mapper::ObjectMapper;
use crate::model::Model;
use crate::registry::Registry;
use crate::sequence::{CollectionSequences, SequenceStore};

/// Shared collaborators of every operation.
#[derive(Clone)]
pub struct Context {
    connection: Arc<dyn Connection>,
    registry: Arc<Registry>,
    events: Arc<dyn EventDispatcher>,
    cache: Arc<dyn CacheStore>,
    sequences: Arc<dyn SequenceStore>,
    config: Arc<OdmConfig>,
}

impl Context {
    /// Start building a context over a connection.
    pub fn builder(connection: Arc<dyn Connection>) -> ContextBuilder {
        ContextBuilder::new(connection)
    }

    /// Storage connection.
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Schemas and model types.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Event dispatcher.
    pub fn events(&self) -> &Arc<dyn EventDispatcher> {
        &self.events
    }

    /// Cache store.
    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Sequence store.
    pub fn sequences(&self) -> &Arc<dyn SequenceStore> {
        &self.sequences
    }

    /// Configuration.
    pub fn config(&self) -> &OdmConfig {
        &self.config
    }

    /// Mapper over this context's registry and sequences.
    pub fn mapper(&self) -> ObjectMapper<'_> {
        ObjectMapper::new(&self.registry, self.sequences.as_ref())
    }

    /// Assembler over this context's registry.
    pub fn assembler(&self) -> EntityAssembler<'_> {
        EntityAssembler::new(&self.registry)
    }

    /// A new, empty model of a registered type.
    pub fn new_model(&self, model_type: &str) -> OdmResult<Model> {
        self.registry.new_model(model_type)
    }

    /// Builder for a registered model type.
    pub fn query(&self, model_type: &str) -> OdmResult<Builder<'_>> {
        let model_type = self.registry.model_type(model_type)?;
        Ok(Builder::new(self, Arc::clone(model_type)))
    }

    /// Builder for the type of a model.
    pub fn builder_for(&self, model: &Model) -> Builder<'_> {
        Builder::new(self, Arc::clone(model.model_type()))
    }

    /// Save a model through its own type.
    pub async fn save(&self, model: &mut Model) -> OdmResult<bool> {
        self.builder_for(model).save(model).await
    }

    /// Insert a model through its own type.
    pub async fn insert(&self, model: &mut Model) -> OdmResult<bool> {
        self.builder_for(model).insert(model).await
    }

    /// Update a model through its own type.
    pub async fn update(&self, model: &mut Model) -> OdmResult<bool> {
        self.builder_for(model).update(model).await
    }

    /// Delete a model through its own type.
    pub async fn delete(&self, model: &mut Model) -> OdmResult<bool> {
        self.builder_for(model).delete(model).await
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("model_types", &self.registry.model_types().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`Context`].
pub struct ContextBuilder {
    connection: Arc<dyn Connection>,
    registry: Option<Arc<Registry>>,
    events: Option<Arc<dyn EventDispatcher>>,
    cache: Option<Arc<dyn CacheStore>>,
    sequences: Option<Arc<dyn SequenceStore>>,
    config: Option<OdmConfig>,
}

impl ContextBuilder {
    /// Create a builder over a connection.
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            registry: None,
            events: None,
            cache: None,
            sequences: None,
            config: None,
        }
    }

    /// Set the registry. Defaults to an empty one.
    pub fn registry(mut self, registry: impl Into<Arc<Registry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Set the event dispatcher. Defaults to one ignoring every event.
    pub fn events(mut self, events: Arc<dyn EventDispatcher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Set the cache store. Defaults to an in-process [`MemoryCache`].
    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the sequence store. Defaults to counters in the configured
    /// sequence collection of the connection.
    pub fn sequences(mut self, sequences: Arc<dyn SequenceStore>) -> Self {
        self.sequences = Some(sequences);
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: OdmConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the context.
    pub fn build(self) -> OdmResult<Context> {
        let config = self.config.unwrap_or_default();
        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(Registry::builder().config(&config).build()?),
        };
        let sequences = self.sequences.unwrap_or_else(|| {
            Arc::new(CollectionSequences::on(
                self.connection.as_ref(),
                &config.sequence_collection,
            ))
        });

        debug!(
            eager_load_limit = config.eager_load_limit,
            cache_ttl_secs = config.cache_ttl.as_secs(),
            "Built Mongolid context"
        );

        Ok(Context {
            connection: self.connection,
            registry,
            events: self.events.unwrap_or_else(|| Arc::new(NullDispatcher)),
            cache: self.cache.unwrap_or_else(|| Arc::new(MemoryCache::default())),
            sequences,
            config: Arc::new(config),
        })
    }
}
