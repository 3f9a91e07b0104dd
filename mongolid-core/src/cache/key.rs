//! Cache key generation.

use std::collections::hash_map::DefaultHasher;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

use bson::{Bson, Document};

use crate::value::id_string;

/// Key of a cached document.
///
/// Keys render as `namespace:identifier`. Documents prefetched for a
/// relation use the related collection as namespace and the id's string form
/// as identifier, so point lookups can rebuild the key from a reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: String,
    identifier: String,
}

impl CacheKey {
    /// Create a new cache key.
    pub fn new(namespace: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            identifier: identifier.into(),
        }
    }

    /// Key for a single document of a collection: `"{collection}:{id}"`.
    pub fn document(collection: &str, id: &Bson) -> Self {
        Self::new(collection, id_string(id))
    }

    /// Key for the result of a `where` query against a collection.
    pub fn query(collection: &str, filter: &Document, projection: Option<&Document>) -> Self {
        Self::new(collection, format!("query:{:x}", query_hash(filter, projection)))
    }

    /// Key for the result of a `first` query against a collection.
    pub fn first(collection: &str, filter: &Document, projection: Option<&Document>) -> Self {
        Self::new(collection, format!("first:{:x}", query_hash(filter, projection)))
    }

    /// Get the full key string.
    pub fn as_str(&self) -> String {
        let mut key = String::with_capacity(self.namespace.len() + self.identifier.len() + 1);
        key.push_str(&self.namespace);
        key.push(':');
        key.push_str(&self.identifier);
        key
    }

    /// Get the namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get the identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.identifier)
    }
}

/// Stable hash of a filter and projection.
///
/// Hashes the canonical extended JSON, which keeps value types apart
/// (`10` and `"10"` hash differently).
pub fn query_hash(filter: &Document, projection: Option<&Document>) -> u64 {
    let mut hasher = DefaultHasher::new();
    Bson::Document(filter.clone())
        .into_canonical_extjson()
        .to_string()
        .hash(&mut hasher);
    if let Some(projection) = projection {
        Bson::Document(projection.clone())
            .into_canonical_extjson()
            .to_string()
            .hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    #[test]
    fn test_document_key() {
        let oid = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        let key = CacheKey::document("shops", &Bson::ObjectId(oid));
        assert_eq!(key.as_str(), "shops:507f1f77bcf86cd799439011");
        assert_eq!(key.to_string(), key.as_str());

        assert_eq!(CacheKey::document("shops", &Bson::Int32(10)).as_str(), "shops:10");
    }

    #[test]
    fn test_query_key_depends_on_filter_and_projection() {
        let a = CacheKey::query("users", &doc! { "name": "x" }, None);
        let b = CacheKey::query("users", &doc! { "name": "x" }, None);
        let c = CacheKey::query("users", &doc! { "name": "y" }, None);
        let d = CacheKey::query("users", &doc! { "name": "x" }, Some(&doc! { "name": 1 }));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert!(a.identifier().starts_with("query:"));
        assert_ne!(a, CacheKey::first("users", &doc! { "name": "x" }, None));
    }

    #[test]
    fn test_query_hash_keeps_types_apart() {
        assert_ne!(
            query_hash(&doc! { "age": 10 }, None),
            query_hash(&doc! { "age": "10" }, None)
        );
    }
}
