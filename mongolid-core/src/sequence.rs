//! Auto-increment counters.
//!
//! Counters are stored one document per name, `{_id: name, seq: n}`, and
//! advanced with a single atomic find-and-update so concurrent writers never
//! observe the same value.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, doc};
use tracing::debug;

use crate::backend::{Collection, Connection};
use crate::error::{OdmError, OdmResult};

/// Field holding the counter value.
pub const SEQUENCE_FIELD: &str = "seq";

/// Atomic fetch-and-increment counters.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Increment the named counter, creating it at 1 if absent, and return
    /// the new value.
    async fn next_value(&self, name: &str) -> OdmResult<i64>;
}

/// Counters kept in a collection.
pub struct CollectionSequences {
    collection: Arc<dyn Collection>,
}

impl CollectionSequences {
    /// Counters stored in the given collection.
    pub fn new(collection: Arc<dyn Collection>) -> Self {
        Self { collection }
    }

    /// Counters stored in a named collection of a connection.
    pub fn on(connection: &dyn Connection, collection: &str) -> Self {
        Self::new(connection.collection(collection))
    }
}

#[async_trait]
impl SequenceStore for CollectionSequences {
    async fn next_value(&self, name: &str) -> OdmResult<i64> {
        let counter = self
            .collection
            .find_one_and_update(doc! { "_id": name }, doc! { "$inc": { SEQUENCE_FIELD: 1_i64 } }, true)
            .await?
            .ok_or_else(|| OdmError::storage(format!("sequence '{name}' was not upserted")))?;

        let value = match counter.get(SEQUENCE_FIELD) {
            Some(Bson::Int64(n)) => *n,
            Some(Bson::Int32(n)) => i64::from(*n),
            Some(Bson::Double(n)) => *n as i64,
            other => {
                return Err(OdmError::storage(format!(
                    "sequence '{name}' holds a non-numeric value: {other:?}"
                )));
            }
        };

        debug!(sequence = %name, value, "Advanced sequence");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnection;

    #[tokio::test]
    async fn test_sequence_starts_at_one_and_increments() {
        let connection = MemoryConnection::new();
        let sequences = CollectionSequences::on(&connection, "mongolid_sequences");

        assert_eq!(sequences.next_value("users").await.unwrap(), 1);
        assert_eq!(sequences.next_value("users").await.unwrap(), 2);
        assert_eq!(sequences.next_value("posts").await.unwrap(), 1);

        let stored = connection
            .collection("mongolid_sequences")
            .find_one(doc! { "_id": "users" }, &Default::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.get_i64(SEQUENCE_FIELD).unwrap(), 2);
    }
}
