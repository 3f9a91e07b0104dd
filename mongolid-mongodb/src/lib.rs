//! # mongolid-mongodb
//!
//! MongoDB storage backend for the Mongolid object-document mapper.
//!
//! This crate provides:
//! - Connection management with the official MongoDB driver
//! - The `Connection` and `Collection` seams of `mongolid-core` over it
//! - Write concern mapping, reporting unacknowledged writes as such
//! - Duplicate key detection surfaced as `OdmError::DuplicateKey`
//!
//! ## Example
//!
//! ```rust,ignore
//! use mongolid_core::prelude::*;
//! use mongolid_mongodb::MongoClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MongoClient::builder()
//!         .uri("mongodb://localhost:27017")
//!         .database("mydb")
//!         .build()
//!         .await?;
//!
//!     let registry = Registry::builder()
//!         .model_type(ModelType::builder("User").collection("users"))
//!         .build()?;
//!     let context = client.context().registry(registry).build()?;
//!
//!     let mut user = context.new_model("User")?;
//!     user.set("name", "Alice")?;
//!     context.save(&mut user).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod collection;
pub mod config;
pub mod error;

pub use bson::oid::ObjectId;
pub use bson::{Bson, Document, doc};
pub use client::{MongoClient, MongoClientBuilder};
pub use collection::MongoCollection;
pub use config::{MongoConfig, MongoConfigBuilder};
pub use error::{MongoError, MongoResult};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::client::{MongoClient, MongoClientBuilder};
    pub use crate::collection::MongoCollection;
    pub use crate::config::{MongoConfig, MongoConfigBuilder};
    pub use crate::error::{MongoError, MongoResult};
    pub use bson::oid::ObjectId;
    pub use bson::{Bson, Document, doc};
}
