//! Model to document mapping.
//!
//! [`ObjectMapper::map`] produces the document written to storage: undeclared
//! fields are dropped unless the schema is dynamic, every declared field is
//! coerced by its type (missing fields are coerced from `null`, so ids and
//! timestamps are generated), and `null` results are left out entirely.
//! Embedded schemas are mapped recursively and always stored as lists.

use bson::{Bson, Document};
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::coerce;
use crate::error::{OdmError, OdmResult};
use crate::registry::Registry;
use crate::schema::{FieldType, Schema};
use crate::sequence::SequenceStore;
use crate::value::{is_blank, is_falsy};

/// Maps attributes to storable documents.
pub struct ObjectMapper<'a> {
    registry: &'a Registry,
    sequences: &'a dyn SequenceStore,
}

impl<'a> ObjectMapper<'a> {
    /// Create a mapper.
    pub fn new(registry: &'a Registry, sequences: &'a dyn SequenceStore) -> Self {
        Self { registry, sequences }
    }

    /// Map attributes through a schema. The attributes are copied, never
    /// shared with the result.
    pub fn map<'b>(&'b self, attributes: &'b Document, schema: &'b Schema) -> BoxFuture<'b, OdmResult<Document>> {
        async move {
            let mut document: Document = attributes
                .iter()
                .filter(|(field, _)| schema.is_dynamic() || schema.is_declared(field))
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect();

            for (field, field_type) in schema.fields() {
                let value = document.get(field).cloned().unwrap_or(Bson::Null);
                let value = self.coerce(field, value, field_type, schema).await?;
                document.insert(field.clone(), value);
            }

            Ok(document
                .into_iter()
                .filter(|(_, value)| !matches!(value, Bson::Null))
                .collect())
        }
        .boxed()
    }

    async fn coerce(&self, field: &str, value: Bson, field_type: &FieldType, schema: &Schema) -> OdmResult<Bson> {
        match field_type {
            FieldType::Primitive(primitive) => coerce::primitive(field, value, *primitive),
            FieldType::ObjectId => Ok(coerce::object_id(value)),
            FieldType::Sequence if is_falsy(&value) => {
                let next = self.sequences.next_value(schema.collection()?).await?;
                Ok(Bson::Int64(next))
            }
            FieldType::Sequence => Ok(value),
            FieldType::CreatedAtTimestamp => Ok(coerce::created_at(value)),
            FieldType::UpdatedAtTimestamp => Ok(coerce::updated_at(value)),
            FieldType::Schema(name) => self.map_embedded(field, value, name).await,
        }
    }

    async fn map_embedded(&self, field: &str, value: Bson, schema_name: &str) -> OdmResult<Bson> {
        if is_blank(&value) {
            return Ok(Bson::Null);
        }
        let schema = self.registry.schema(schema_name)?;

        let items = match value {
            Bson::Array(items) => items,
            Bson::Document(doc) => vec![Bson::Document(doc)],
            other => {
                return Err(OdmError::invalid_type(
                    field,
                    format!("expected embedded {schema_name} documents, got {:?}", other.element_type()),
                ));
            }
        };

        let mut mapped = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Bson::Null => {}
                Bson::Document(doc) => mapped.push(Bson::Document(self.map(&doc, schema).await?)),
                other => {
                    return Err(OdmError::invalid_type(
                        field,
                        format!("expected an embedded {schema_name} document, got {:?}", other.element_type()),
                    ));
                }
            }
        }
        Ok(Bson::Array(mapped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnection;
    use crate::sequence::CollectionSequences;
    use bson::{doc, oid::ObjectId};
    use pretty_assertions::assert_eq;

    fn registry() -> Registry {
        Registry::builder()
            .schema(
                Schema::builder("Product")
                    .collection("products")
                    .field("name", "string")
                    .field("price", "float")
                    .field("skus", "schema.Sku")
                    .build()
                    .unwrap(),
            )
            .schema(
                Schema::builder("Sku")
                    .timestamps(false)
                    .field("shop_id", "int")
                    .build()
                    .unwrap(),
            )
            .schema(
                Schema::builder("Counter")
                    .collection("counters")
                    .timestamps(false)
                    .field("_id", "sequence")
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    fn sequences() -> CollectionSequences {
        CollectionSequences::on(&MemoryConnection::new(), "mongolid_sequences")
    }

    #[tokio::test]
    async fn test_map_strips_undeclared_fields_and_casts() {
        let registry = registry();
        let sequences = sequences();
        let mapper = ObjectMapper::new(&registry, &sequences);
        let schema = registry.schema("Product").unwrap();

        let doc = mapper
            .map(&doc! { "name": 10, "price": "9.5", "junk": true }, schema)
            .await
            .unwrap();

        assert_eq!(doc.get_str("name").unwrap(), "10");
        assert_eq!(doc.get_f64("price").unwrap(), 9.5);
        assert!(!doc.contains_key("junk"));
        assert!(matches!(doc.get("_id"), Some(Bson::ObjectId(_))));
        assert!(matches!(doc.get("created_at"), Some(Bson::DateTime(_))));
        assert!(matches!(doc.get("updated_at"), Some(Bson::DateTime(_))));
        assert!(!doc.contains_key("skus"));
    }

    #[tokio::test]
    async fn test_map_converts_hex_id_and_keeps_created_at() {
        let registry = registry();
        let sequences = sequences();
        let mapper = ObjectMapper::new(&registry, &sequences);
        let created = bson::DateTime::from_millis(1_000);

        let doc = mapper
            .map(
                &doc! { "_id": "507f1f77bcf86cd799439011", "created_at": created },
                registry.schema("Product").unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            doc.get("_id"),
            Some(&Bson::ObjectId(ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap()))
        );
        assert_eq!(doc.get_datetime("created_at").unwrap(), &created);
    }

    #[tokio::test]
    async fn test_map_does_not_share_attributes() {
        let registry = registry();
        let sequences = sequences();
        let mapper = ObjectMapper::new(&registry, &sequences);
        let attributes = doc! { "name": "x" };

        let mut doc = mapper.map(&attributes, registry.schema("Product").unwrap()).await.unwrap();
        doc.insert("name", "y");
        assert_eq!(attributes, doc! { "name": "x" });
    }

    #[tokio::test]
    async fn test_map_drops_nulls() {
        let registry = registry();
        let sequences = sequences();
        let mapper = ObjectMapper::new(&registry, &sequences);

        let doc = mapper
            .map(&doc! { "name": null, "price": null }, registry.schema("Product").unwrap())
            .await
            .unwrap();
        assert!(!doc.contains_key("name"));
        assert!(!doc.contains_key("price"));
    }

    #[tokio::test]
    async fn test_map_embedded_documents_as_lists() {
        let registry = registry();
        let sequences = sequences();
        let mapper = ObjectMapper::new(&registry, &sequences);
        let schema = registry.schema("Product").unwrap();

        let doc = mapper
            .map(&doc! { "skus": { "shop_id": "10", "junk": 1 } }, schema)
            .await
            .unwrap();
        let skus = doc.get_array("skus").unwrap();
        assert_eq!(skus.len(), 1);
        let sku = skus[0].as_document().unwrap();
        assert_eq!(sku.get("shop_id"), Some(&Bson::Int32(10)));
        assert!(sku.contains_key("_id"));
        assert!(!sku.contains_key("junk"));

        let doc = mapper
            .map(&doc! { "skus": [{ "shop_id": 1 }, null, { "shop_id": 2 }] }, schema)
            .await
            .unwrap();
        assert_eq!(doc.get_array("skus").unwrap().len(), 2);

        let doc = mapper.map(&doc! { "skus": [] }, schema).await.unwrap();
        assert!(!doc.contains_key("skus"));

        let err = mapper.map(&doc! { "skus": "nope" }, schema).await.unwrap_err();
        assert!(err.is_invalid_type());
    }

    #[tokio::test]
    async fn test_map_sequence_ids() {
        let registry = registry();
        let sequences = sequences();
        let mapper = ObjectMapper::new(&registry, &sequences);
        let schema = registry.schema("Counter").unwrap();

        let first = mapper.map(&doc! {}, schema).await.unwrap();
        let second = mapper.map(&doc! { "_id": 0 }, schema).await.unwrap();
        let kept = mapper.map(&doc! { "_id": 42 }, schema).await.unwrap();

        assert_eq!(first, doc! { "_id": 1_i64 });
        assert_eq!(second, doc! { "_id": 2_i64 });
        assert_eq!(kept, doc! { "_id": 42 });
    }

    #[tokio::test]
    async fn test_sequence_needs_a_collection() {
        let registry = Registry::builder()
            .schema(Schema::builder("Line").field("_id", "sequence").build().unwrap())
            .build()
            .unwrap();
        let sequences = sequences();
        let mapper = ObjectMapper::new(&registry, &sequences);

        let err = mapper.map(&doc! {}, registry.schema("Line").unwrap()).await.unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_dynamic_schema_keeps_everything() {
        let registry = Registry::builder()
            .model_type(crate::model::ModelType::builder("Note").collection("notes"))
            .build()
            .unwrap();
        let sequences = sequences();
        let mapper = ObjectMapper::new(&registry, &sequences);
        let schema = registry.model_type("Note").unwrap().schema();

        let doc = mapper
            .map(&doc! { "title": "x", "tags": ["a"], "gone": null }, schema)
            .await
            .unwrap();
        assert_eq!(doc.get_str("title").unwrap(), "x");
        assert!(doc.contains_key("tags"));
        assert!(!doc.contains_key("gone"));
    }
}
