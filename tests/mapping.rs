//! Integration tests for coercion, mapping and assembly.

use std::sync::Arc;

use bson::{Bson, Document, doc, oid::ObjectId};
use mongolid::coerce;
use mongolid::{
    Collection, Connection, Context, MemoryConnection, ModelType, Registry, Schema, SmolStr,
};
use pretty_assertions::assert_eq;

fn context() -> Context {
    let registry = Registry::builder()
        .schema(
            Schema::builder("Product")
                .collection("products")
                .field("name", "string")
                .field("price", "float")
                .field("stock", "int")
                .field("active", "bool")
                .field("skus", "schema.Sku")
                .build()
                .unwrap(),
        )
        .schema(
            Schema::builder("Sku")
                .timestamps(false)
                .field("code", "string")
                .field("shop_id", "int")
                .build()
                .unwrap(),
        )
        .schema(
            Schema::builder("Animal")
                .collection("animals")
                .field("kind", "string")
                .field("name", "string")
                .build()
                .unwrap(),
        )
        .model_type(ModelType::builder("Animal").polymorph(|attributes: &Document| {
            match attributes.get_str("kind") {
                Ok("dog") => Some(SmolStr::new("Dog")),
                _ => None,
            }
        }))
        .model_type(ModelType::builder("Dog").schema("Animal"))
        .build()
        .unwrap();

    Context::builder(Arc::new(MemoryConnection::new()))
        .registry(registry)
        .build()
        .unwrap()
}

#[test]
fn test_object_id_coercion_is_stable() {
    let inputs = [
        Bson::String("507f1f77bcf86cd799439011".to_string()),
        Bson::ObjectId(ObjectId::new()),
        Bson::String("not-an-object-id".to_string()),
        Bson::String("507F1F77BCF86CD799439011".to_string()),
        Bson::Int32(42),
        Bson::Int64(7),
    ];

    for input in inputs {
        let once = coerce::object_id(input.clone());
        let twice = coerce::object_id(once.clone());
        assert_eq!(twice, once, "input: {input}");
    }
}

#[test]
fn test_object_id_coercion_converts_hex_and_generates_for_null() {
    let hex = "507f1f77bcf86cd799439011";
    assert_eq!(
        coerce::object_id(Bson::String(hex.to_string())),
        Bson::ObjectId(ObjectId::parse_str(hex).unwrap())
    );
    assert!(matches!(coerce::object_id(Bson::Null), Bson::ObjectId(_)));
}

#[tokio::test]
async fn test_assembling_a_mapped_model_keeps_declared_fields() {
    let context = context();
    let mut product = context.new_model("Product").unwrap();
    product.set("name", "Bacon").unwrap();
    product.set("price", 10.5).unwrap();
    product.set("stock", 3).unwrap();
    product.set("active", true).unwrap();
    product
        .set("skus", vec![
            doc! { "_id": 1, "code": "B-1", "shop_id": 10 },
            doc! { "_id": 2, "code": "B-2", "shop_id": 20 },
        ])
        .unwrap();
    product.set("undeclared", "dropped").unwrap();

    let schema = Arc::clone(product.model_type().schema());
    let mapped = context.mapper().map(product.attributes(), &schema).await.unwrap();
    let assembled = context
        .assembler()
        .assemble(mapped.clone(), &schema)
        .unwrap()
        .unwrap();

    assert_eq!(assembled.model_type().name(), "Product");
    for field in ["name", "price", "stock", "active", "skus"] {
        assert_eq!(assembled.attribute(field), product.attribute(field), "field: {field}");
    }
    assert!(assembled.attribute("undeclared").is_none());
    assert!(matches!(assembled.id(), Some(Bson::ObjectId(_))));
    assert_eq!(assembled.attribute("created_at"), mapped.get("created_at"));
    assert!(!assembled.is_dirty());
}

#[tokio::test]
async fn test_mapping_casts_primitive_fields() {
    let context = context();
    let mut product = context.new_model("Product").unwrap();
    product.set("name", 123).unwrap();
    product.set("price", "10.50").unwrap();
    product.set("stock", "7").unwrap();
    product.set("active", 0).unwrap();

    let mapped = context
        .mapper()
        .map(product.attributes(), product.model_type().schema())
        .await
        .unwrap();

    assert_eq!(mapped.get("name"), Some(&Bson::String("123".to_string())));
    assert_eq!(mapped.get("price"), Some(&Bson::Double(10.5)));
    assert_eq!(mapped.get("stock"), Some(&Bson::Int32(7)));
    assert_eq!(mapped.get("active"), Some(&Bson::Boolean(false)));
}

#[tokio::test]
async fn test_polymorphic_documents_assemble_into_concrete_types() {
    let context = context();
    context
        .connection()
        .collection("animals")
        .insert_one(doc! { "_id": 1, "kind": "dog", "name": "Rex" }, &Default::default())
        .await
        .unwrap();
    context
        .connection()
        .collection("animals")
        .insert_one(doc! { "_id": 2, "kind": "cat", "name": "Tom" }, &Default::default())
        .await
        .unwrap();

    let animals = context.query("Animal").unwrap().all().await.unwrap().all().unwrap();
    let types: Vec<&str> = animals.iter().map(|animal| animal.model_type().name()).collect();
    assert_eq!(types, vec!["Dog", "Animal"]);
}
