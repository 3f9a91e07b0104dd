//! # Mongolid
//!
//! An object-document mapper for MongoDB built around declarative schemas.
//!
//! Mongolid provides:
//! - Schemas with coerced field types, embedded schemas and polymorphism
//! - Smart partial updates from `$set` / `$unset` change sets
//! - Reference and embedded relations
//! - Eager loading of referenced documents into a shared cache
//! - Soft deletes and lifecycle events
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mongolid::prelude::*;
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
//!         .schema(
//!             Schema::builder("User")
//!                 .collection("users")
//!                 .field("name", "string")
//!                 .field("age", "int")
//!                 .build()?,
//!         )
//!         .model_type(ModelType::builder("User").schema("User"))
//!         .build()?;
//!     let context = client.context().registry(registry).build()?;
//!
//!     let mut user = context.new_model("User")?;
//!     user.set("name", "John")?;
//!     context.save(&mut user).await?;
//!
//!     let adults = context
//!         .query("User")?
//!         .r#where(doc! { "age": { "$gte": 18 } }, None, false)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use mongolid_core::*;

/// MongoDB storage backend.
#[cfg(feature = "mongodb")]
#[cfg_attr(docsrs, doc(cfg(feature = "mongodb")))]
pub mod mongodb {
    pub use mongolid_mongodb::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use mongolid_core::prelude::*;

    #[cfg(feature = "mongodb")]
    pub use mongolid_mongodb::{MongoClient, MongoClientBuilder, MongoConfig};
}
