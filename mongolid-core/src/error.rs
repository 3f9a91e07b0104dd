//! Error types for mapping, persistence and eager-loading operations.

use thiserror::Error;

/// Result type for Mongolid operations.
pub type OdmResult<T> = Result<T, OdmError>;

/// Errors that can occur while mapping or persisting models.
#[derive(Error, Debug)]
pub enum OdmError {
    /// Configuration error (unknown type tag, unresolvable cast, missing collection).
    #[error("configuration error: {0}")]
    Config(String),

    /// A value could not be cast to the type declared for its field.
    #[error("invalid type for field '{field}': {message}")]
    InvalidType {
        /// The field being cast.
        field: String,
        /// What went wrong.
        message: String,
    },

    /// A declared eager-load relation could not be satisfied.
    #[error("eager loader error: {0}")]
    EagerLoader(String),

    /// No model matched a query issued through an `*_or_fail` method.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The storage backend rejected a write because the id already exists.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The cache store failed.
    #[error("cache error: {0}")]
    Cache(String),

    /// Document serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid ObjectId.
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),
}

impl OdmError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid type error.
    pub fn invalid_type(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidType {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an eager loader error.
    pub fn eager_loader(message: impl Into<String>) -> Self {
        Self::EagerLoader(message.into())
    }

    /// Create a model not found error.
    pub fn model_not_found(message: impl Into<String>) -> Self {
        Self::ModelNotFound(message.into())
    }

    /// Create a duplicate key error.
    pub fn duplicate_key(message: impl Into<String>) -> Self {
        Self::DuplicateKey(message.into())
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Check if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is an invalid type error.
    pub fn is_invalid_type(&self) -> bool {
        matches!(self, Self::InvalidType { .. })
    }

    /// Check if this is an eager loader error.
    pub fn is_eager_loader(&self) -> bool {
        matches!(self, Self::EagerLoader(_))
    }

    /// Check if this is a model not found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ModelNotFound(_))
    }

    /// Check if this is a duplicate key error.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }

    /// Check if this is a storage error.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Check if this is a cache error.
    pub fn is_cache(&self) -> bool {
        matches!(self, Self::Cache(_))
    }
}

impl From<bson::oid::Error> for OdmError {
    fn from(err: bson::oid::Error) -> Self {
        OdmError::InvalidObjectId(err.to_string())
    }
}

impl From<bson::ser::Error> for OdmError {
    fn from(err: bson::ser::Error) -> Self {
        OdmError::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for OdmError {
    fn from(err: bson::de::Error) -> Self {
        OdmError::Serialization(err.to_string())
    }
}
