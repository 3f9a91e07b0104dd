//! Integration tests for eager loading.
//!
//! A counting cache store records every write so the prefetch cost can be
//! checked alongside the storage statistics of the in-memory backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use mongolid::{
    CacheKey, CacheStore, Collection, Connection, Context, EagerLoad, IndexMap, MemoryCache,
    MemoryConnection, ModelType, OdmError, OdmResult, Query, Registry, RelationExtractor, SmolStr,
    WriteOptions,
};
use pretty_assertions::assert_eq;

#[derive(Default)]
struct CountingCache {
    inner: MemoryCache,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl CountingCache {
    fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for CountingCache {
    async fn get(&self, key: &CacheKey) -> OdmResult<Option<Document>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn put(&self, key: &CacheKey, value: &Document, ttl: Option<Duration>) -> OdmResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value, ttl).await
    }

    async fn has(&self, key: &CacheKey) -> OdmResult<bool> {
        self.inner.has(key).await
    }

    async fn forget(&self, key: &CacheKey) -> OdmResult<bool> {
        self.inner.forget(key).await
    }
}

/// Stores writes but fails every read.
#[derive(Default)]
struct UnreadableCache {
    inner: MemoryCache,
}

#[async_trait]
impl CacheStore for UnreadableCache {
    async fn get(&self, _key: &CacheKey) -> OdmResult<Option<Document>> {
        Err(OdmError::cache("connection refused"))
    }

    async fn put(&self, key: &CacheKey, value: &Document, ttl: Option<Duration>) -> OdmResult<()> {
        self.inner.put(key, value, ttl).await
    }

    async fn has(&self, key: &CacheKey) -> OdmResult<bool> {
        self.inner.has(key).await
    }

    async fn forget(&self, key: &CacheKey) -> OdmResult<bool> {
        self.inner.forget(key).await
    }
}

struct Fixture {
    context: Context,
    connection: MemoryConnection,
    cache: Arc<CountingCache>,
}

async fn fixture(products: i32, key: &str) -> Fixture {
    let connection = MemoryConnection::new();
    let options = WriteOptions::default();

    let shops = connection.collection("shops");
    for id in 0..products {
        shops
            .insert_one(doc! { "_id": id, "name": format!("shop {id}") }, &options)
            .await
            .unwrap();
    }
    let collection = connection.collection("products");
    for id in 0..products {
        collection
            .insert_one(
                doc! { "_id": id, "shop_id": id, "skus": [{ "shop_id": id }] },
                &options,
            )
            .await
            .unwrap();
    }

    let registry = Registry::builder()
        .model_type(ModelType::builder("Shop").collection("shops"))
        .model_type(
            ModelType::builder("Product")
                .collection("products")
                .references_one("shop", "Shop", "shop_id")
                .with("shop", EagerLoad::new("Shop").key(key)),
        )
        .build()
        .unwrap();

    let cache = Arc::new(CountingCache::default());
    let context = Context::builder(Arc::new(connection.clone()))
        .registry(registry)
        .cache(cache.clone())
        .build()
        .unwrap();

    connection.memory_collection("shops").stats().reset();
    Fixture {
        context,
        connection,
        cache,
    }
}

#[tokio::test]
async fn test_eager_loading_is_capped_to_the_first_hundred_documents() {
    let fixture = fixture(250, "shop_id").await;

    let products = fixture
        .context
        .query("Product")
        .unwrap()
        .r#where(Query::all(), None, false)
        .await
        .unwrap();
    assert_eq!(products.len(), 250);

    let shops = fixture.connection.memory_collection("shops");
    assert_eq!(shops.stats().finds(), 1);
    assert_eq!(fixture.cache.puts(), 100);

    let cache = fixture.context.cache();
    assert!(cache.has(&CacheKey::document("shops", &Bson::Int32(99))).await.unwrap());
    assert!(!cache.has(&CacheKey::document("shops", &Bson::Int32(100))).await.unwrap());
}

#[tokio::test]
async fn test_eager_loaded_references_are_read_from_the_cache() {
    let fixture = fixture(3, "shop_id").await;
    let builder = fixture.context.query("Product").unwrap();

    let product = builder.first(1, None, false).await.unwrap().unwrap();
    let shops = fixture.connection.memory_collection("shops");
    assert_eq!(shops.stats().finds(), 1);

    let relation = product.model_type().relation("shop").unwrap().clone();
    let shop = relation
        .get(&fixture.context, &product)
        .await
        .unwrap()
        .into_one()
        .unwrap();

    assert_eq!(shop.attribute("name"), Some(&Bson::String("shop 1".to_string())));
    assert_eq!(shops.stats().finds(), 1);
    assert!(fixture.cache.gets() >= 1);
}

#[tokio::test]
async fn test_cache_read_failures_fall_back_to_storage() {
    let fixture = fixture(3, "shop_id").await;
    let registry = fixture.context.registry().clone();
    let context = Context::builder(Arc::new(fixture.connection.clone()))
        .registry(registry)
        .cache(Arc::new(UnreadableCache::default()))
        .build()
        .unwrap();
    let shops = fixture.connection.memory_collection("shops");

    let product = context.query("Product").unwrap().first(1, None, false).await.unwrap().unwrap();
    assert!(context.cache().has(&CacheKey::document("shops", &Bson::Int32(1))).await.unwrap());
    shops.stats().reset();

    let relation = product.model_type().relation("shop").unwrap().clone();
    let shop = relation.get(&context, &product).await.unwrap().into_one().unwrap();
    assert_eq!(shop.attribute("name"), Some(&Bson::String("shop 1".to_string())));
    assert_eq!(shops.stats().finds(), 1);

    let builder = context.query("Shop").unwrap();
    let found = builder.r#where(doc! { "name": "shop 2" }, None, true).await.unwrap();
    assert_eq!(found.len(), 1);
    let first = builder.first(doc! { "name": "shop 0" }, None, true).await.unwrap().unwrap();
    assert_eq!(first.id(), Some(&Bson::Int32(0)));
    assert_eq!(shops.stats().finds(), 3);
}

#[tokio::test]
async fn test_dotted_keys_read_embedded_documents() {
    let fixture = fixture(5, "skus.shop_id").await;

    fixture
        .context
        .query("Product")
        .unwrap()
        .r#where(doc! { "_id": { "$in": [1, 2] } }, None, false)
        .await
        .unwrap();

    assert_eq!(fixture.connection.memory_collection("shops").stats().finds(), 1);
    assert_eq!(fixture.cache.puts(), 2);
}

#[tokio::test]
async fn test_missing_relation_key_is_an_eager_loader_error() {
    let fixture = fixture(0, "shop_id").await;
    fixture
        .connection
        .collection("products")
        .insert_one(doc! { "_id": 1, "name": "orphan" }, &WriteOptions::default())
        .await
        .unwrap();

    let err = fixture
        .context
        .query("Product")
        .unwrap()
        .r#where(Query::all(), None, false)
        .await
        .unwrap_err();
    assert!(err.is_eager_loader());
    assert_eq!(fixture.connection.memory_collection("shops").stats().finds(), 0);
}

#[test]
fn test_extractor_collects_ids_from_embedded_lists() {
    let mut loads = IndexMap::new();
    loads.insert(SmolStr::new("shops"), EagerLoad::new("Shop").key("skus.shop_id"));

    let mut extractor = RelationExtractor::new(&loads);
    extractor
        .extract_from(&doc! { "skus": [{ "shop_id": 10 }, { "shop_id": 20 }] })
        .unwrap();

    let ids = extractor.ids("shops").unwrap();
    assert_eq!(ids.values(), vec![Bson::Int32(10), Bson::Int32(20)]);
}

#[test]
fn test_extractor_rejects_missing_plain_key() {
    let mut loads = IndexMap::new();
    loads.insert(SmolStr::new("shops"), EagerLoad::new("Shop").key("nonexistent_field"));

    let mut extractor = RelationExtractor::new(&loads);
    let err = extractor.extract_from(&doc! { "name": "x" }).unwrap_err();
    assert!(err.is_eager_loader());
}
