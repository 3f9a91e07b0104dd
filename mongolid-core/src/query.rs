//! Query resolution.
//!
//! Turns whatever the caller passed to `where` / `first` into the filter
//! sent to storage: bare values become id lookups, hex ids become native
//! ObjectIds and soft-deleted documents are excluded by default.

use bson::{Bson, Document, doc, oid::ObjectId};

use crate::model::ModelType;
use crate::schema::ID_FIELD;
use crate::value::to_object_id;

/// A query as given by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// A bare id value.
    Id(Bson),
    /// A filter document.
    Filter(Document),
}

impl Query {
    /// Query matching every document.
    pub fn all() -> Self {
        Self::Filter(Document::new())
    }

    /// Whether this is a lookup by a `null` id, which can never match.
    pub fn is_null_id(&self) -> bool {
        matches!(self, Self::Id(Bson::Null))
    }
}

impl From<Document> for Query {
    fn from(filter: Document) -> Self {
        Self::Filter(filter)
    }
}

impl From<Bson> for Query {
    fn from(value: Bson) -> Self {
        match value {
            Bson::Document(filter) => Self::Filter(filter),
            other => Self::Id(other),
        }
    }
}

impl From<ObjectId> for Query {
    fn from(id: ObjectId) -> Self {
        Self::Id(Bson::ObjectId(id))
    }
}

impl From<&str> for Query {
    fn from(id: &str) -> Self {
        Self::Id(Bson::String(id.to_string()))
    }
}

impl From<String> for Query {
    fn from(id: String) -> Self {
        Self::Id(Bson::String(id))
    }
}

impl From<i32> for Query {
    fn from(id: i32) -> Self {
        Self::Id(Bson::Int32(id))
    }
}

impl From<i64> for Query {
    fn from(id: i64) -> Self {
        Self::Id(Bson::Int64(id))
    }
}

/// Resolve a query into a storage filter for a model type.
pub fn resolve(query: impl Into<Query>, model_type: &ModelType, ignore_soft_delete: bool) -> Document {
    let mut filter = match query.into() {
        Query::Id(id) => doc! { ID_FIELD: id },
        Query::Filter(filter) => filter,
    };

    if let Some(id) = filter.get_mut(ID_FIELD) {
        *id = resolve_id(std::mem::take(id));
    }

    if !ignore_soft_delete {
        if let Some(field) = model_type.soft_delete_field() {
            if !filter.contains_key(field) {
                filter.insert(field, doc! { "$exists": false });
            }
        }
    }

    filter
}

fn resolve_id(id: Bson) -> Bson {
    match id {
        Bson::Document(operators) => Bson::Document(
            operators
                .into_iter()
                .map(|(op, value)| match value {
                    Bson::Array(ids) => (op, Bson::Array(ids.into_iter().map(to_object_id).collect())),
                    other => (op, other),
                })
                .collect(),
        ),
        other => to_object_id(other),
    }
}
