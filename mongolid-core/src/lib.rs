//! # mongolid-core
//!
//! Driver-agnostic engine of the Mongolid object-document mapper.
//!
//! This crate turns declarative schemas into storage documents and back:
//! - Type coercion of declared fields (`int`, `float`, `string`, `objectId`,
//!   `sequence`, timestamps, embedded schemas)
//! - Mapping models to documents ([`ObjectMapper`]) and assembling models from
//!   documents ([`EntityAssembler`]), including polymorphic model types
//! - Minimal `$set` / `$unset` change sets for partial updates
//! - Eager-load prefetching of related documents into a cache store
//! - Query resolution with id conversion and soft-delete filtering
//! - Persistence orchestration with lifecycle events ([`Builder`])
//!
//! Storage is reached only through the [`Collection`] and [`Connection`]
//! traits. `mongolid-mongodb` implements them over the official driver and
//! [`memory`] implements them in-process.
//!
//! ## Schemas and model types
//!
//! ```rust
//! use mongolid_core::{ModelType, Registry, Schema};
//!
//! let registry = Registry::builder()
//!     .schema(
//!         Schema::builder("Product")
//!             .collection("products")
//!             .field("name", "string")
//!             .field("price", "float")
//!             .field("skus", "schema.Sku")
//!             .build()
//!             .unwrap(),
//!     )
//!     .schema(Schema::builder("Sku").field("shop_id", "int").build().unwrap())
//!     .model_type(ModelType::builder("Shop").collection("shops"))
//!     .build()
//!     .unwrap();
//!
//! assert!(registry.schema("Product").unwrap().is_declared("price"));
//! assert!(registry.model_type("Shop").unwrap().schema().is_dynamic());
//! ```
//!
//! ## Change sets
//!
//! ```rust
//! use bson::doc;
//! use mongolid_core::calculate_changes;
//!
//! let old = doc! { "name": "John", "address": { "city": "A", "zip": "1" } };
//! let new = doc! { "name": "John", "address": { "city": "B" } };
//!
//! let changes = calculate_changes(&new, &old);
//! assert_eq!(
//!     changes.to_update_document(),
//!     doc! { "$set": { "address.city": "B" }, "$unset": { "address.zip": "" } }
//! );
//! ```
//!
//! ## Error handling
//!
//! ```rust
//! use mongolid_core::OdmError;
//!
//! let err = OdmError::eager_loader("referenced key was not found on child model");
//! assert!(err.is_eager_loader());
//! ```

pub mod assembler;
pub mod backend;
pub mod builder;
pub mod cache;
pub mod cast;
pub mod changes;
pub mod coerce;
pub mod config;
pub mod context;
pub mod cursor;
pub mod eager;
pub mod error;
pub mod events;
pub mod logging;
pub mod mapper;
pub mod memory;
pub mod model;
pub mod query;
pub mod registry;
pub mod relations;
pub mod schema;
pub mod sequence;
pub mod value;

pub use assembler::EntityAssembler;
pub use backend::{
    Collection, Connection, DeleteResult, FindOptions, InsertOneResult, UpdateResult, WriteConcern,
    WriteOptions,
};
pub use builder::Builder;
pub use cache::{CacheKey, CacheStore, MemoryCache, MemoryCacheConfig};
pub use cast::{BackedEnum, BackedEnumCast, Cast, CastResolver, DateTimeCast, UuidCast};
pub use changes::{ChangeSet, calculate_changes};
pub use config::{OdmConfig, OdmConfigBuilder};
pub use context::{Context, ContextBuilder};
pub use cursor::Cursor;
pub use eager::{EagerLoad, EagerLoadCache, ExtractedIds, RelationExtractor};
pub use error::{OdmError, OdmResult};
pub use events::{EventDispatcher, EventRegistry, ModelEvent, NullDispatcher};
pub use mapper::ObjectMapper;
pub use memory::{MemoryCollection, MemoryConnection};
pub use model::{Model, ModelType, ModelTypeBuilder, Polymorphable};
pub use query::{Query, resolve as resolve_query};
pub use registry::{Registry, RegistryBuilder};
pub use relations::{Related, Relation, RelationKind};
pub use schema::{FieldType, Primitive, Schema, SchemaBuilder};
pub use sequence::{CollectionSequences, SequenceStore};

// Re-export logging utilities
pub use logging::{get_log_format, get_log_level, init as init_logging, is_debug_enabled};

// Re-export the value types of the public API
pub use bson;
pub use indexmap::IndexMap;
pub use smol_str::SmolStr;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::backend::{Collection, Connection, WriteConcern};
    pub use crate::builder::Builder;
    pub use crate::cache::CacheStore;
    pub use crate::config::OdmConfig;
    pub use crate::context::Context;
    pub use crate::eager::EagerLoad;
    pub use crate::error::{OdmError, OdmResult};
    pub use crate::events::{EventDispatcher, EventRegistry, ModelEvent};
    pub use crate::memory::MemoryConnection;
    pub use crate::model::{Model, ModelType};
    pub use crate::query::Query;
    pub use crate::registry::Registry;
    pub use crate::relations::{Related, RelationKind};
    pub use crate::schema::Schema;
    pub use bson::{Bson, Document, doc};
}
