//! Error types for MongoDB operations.

use mongodb::error::{ErrorKind, WriteFailure};
use mongolid_core::OdmError;
use thiserror::Error;

/// Server error code for a duplicate key.
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// Result type for MongoDB operations.
pub type MongoResult<T> = Result<T, MongoError>;

/// Errors that can occur during MongoDB operations.
#[derive(Error, Debug)]
pub enum MongoError {
    /// MongoDB driver error.
    #[error("mongodb error: {0}")]
    Driver(#[from] mongodb::error::Error),

    /// BSON serialization error.
    #[error("bson error: {0}")]
    Bson(#[from] bson::ser::Error),

    /// BSON deserialization error.
    #[error("bson deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),
}

impl MongoError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Check if the server rejected a write for a duplicate key.
    pub fn is_duplicate_key(&self) -> bool {
        let Self::Driver(err) = self else {
            return false;
        };
        match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == DUPLICATE_KEY_CODE,
            ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY_CODE,
            _ => false,
        }
    }
}

impl From<MongoError> for OdmError {
    fn from(err: MongoError) -> Self {
        if err.is_duplicate_key() {
            return OdmError::duplicate_key(err.to_string());
        }
        match err {
            MongoError::Driver(e) => OdmError::storage(e.to_string()),
            MongoError::Bson(e) => OdmError::serialization(e.to_string()),
            MongoError::BsonDe(e) => OdmError::serialization(e.to_string()),
            MongoError::Config(msg) => OdmError::config(msg),
            MongoError::Connection(msg) => OdmError::storage(format!("connection error: {msg}")),
        }
    }
}

/// Map a driver error straight into the engine's error type.
pub(crate) fn driver(err: mongodb::error::Error) -> OdmError {
    MongoError::from(err).into()
}
