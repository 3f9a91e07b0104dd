//! Integration tests for persistence through the builder.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bson::{Bson, doc};
use mongolid::{
    CacheKey, Context, EventRegistry, MemoryConnection, ModelEvent, ModelType, Query, Registry,
    WriteConcern, resolve_query,
};
use pretty_assertions::assert_eq;

struct Fixture {
    context: Context,
    connection: MemoryConnection,
    events: Arc<EventRegistry>,
}

fn fixture() -> Fixture {
    let connection = MemoryConnection::new();
    let registry = Registry::builder()
        .model_type(ModelType::builder("User").collection("users"))
        .model_type(ModelType::builder("Post").collection("posts").soft_deletes())
        .build()
        .unwrap();
    let events = Arc::new(EventRegistry::new());
    let context = Context::builder(Arc::new(connection.clone()))
        .registry(registry)
        .events(events.clone())
        .build()
        .unwrap();
    Fixture {
        context,
        connection,
        events,
    }
}

fn count_events(events: &EventRegistry, model_type: &str, event: ModelEvent) -> Arc<AtomicUsize> {
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&counter);
    events.listen(event, model_type, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        true
    });
    counter
}

#[tokio::test]
async fn test_unacknowledged_writes_report_false_without_after_events() {
    let fixture = fixture();
    let after: Vec<Arc<AtomicUsize>> = [
        ModelEvent::Saved,
        ModelEvent::Inserted,
        ModelEvent::Updated,
        ModelEvent::Deleted,
    ]
    .into_iter()
    .map(|event| count_events(&fixture.events, "User", event))
    .collect();

    let unacknowledged = fixture
        .context
        .query("User")
        .unwrap()
        .write_concern(WriteConcern::W(0));

    let mut saved = fixture.context.new_model("User").unwrap();
    saved.set("name", "John").unwrap();
    assert!(!unacknowledged.save(&mut saved).await.unwrap());
    assert!(saved.is_dirty());

    let mut inserted = fixture.context.new_model("User").unwrap();
    inserted.set("name", "Jane").unwrap();
    assert!(!unacknowledged.insert(&mut inserted).await.unwrap());

    let mut existing = fixture.context.new_model("User").unwrap();
    existing.set("name", "Bob").unwrap();
    assert!(fixture.context.insert(&mut existing).await.unwrap());
    let inserted_events = after[1].load(Ordering::SeqCst);
    assert_eq!(inserted_events, 1);

    existing.set("name", "Robert").unwrap();
    assert!(!unacknowledged.update(&mut existing).await.unwrap());
    assert!(!unacknowledged.delete(&mut existing).await.unwrap());

    assert_eq!(after[0].load(Ordering::SeqCst), 0);
    assert_eq!(after[1].load(Ordering::SeqCst), inserted_events);
    assert_eq!(after[2].load(Ordering::SeqCst), 0);
    assert_eq!(after[3].load(Ordering::SeqCst), 0);

    // The writes were still performed.
    let users = fixture.connection.memory_collection("users");
    assert_eq!(users.len(), 2);
    assert_eq!(users.stats().deletes(), 1);
}

#[tokio::test]
async fn test_before_listener_halts_the_write() {
    let fixture = fixture();
    fixture.events.listen(ModelEvent::Saving, "User", |model| {
        !matches!(model.attribute("name"), Some(Bson::String(name)) if name.is_empty())
    });

    let mut user = fixture.context.new_model("User").unwrap();
    user.set("name", "").unwrap();
    assert!(!fixture.context.save(&mut user).await.unwrap());
    assert_eq!(fixture.connection.memory_collection("users").stats().updates(), 0);

    user.set("name", "John").unwrap();
    assert!(fixture.context.save(&mut user).await.unwrap());
    assert_eq!(fixture.connection.memory_collection("users").len(), 1);
}

#[tokio::test]
async fn test_inserting_an_existing_id_is_a_duplicate_key_error() {
    let fixture = fixture();
    let mut user = fixture.context.new_model("User").unwrap();
    user.set("name", "John").unwrap();
    assert!(fixture.context.insert(&mut user).await.unwrap());

    let mut copy = fixture.context.new_model("User").unwrap();
    copy.set_id(user.id().cloned().unwrap());
    let err = fixture.context.insert(&mut copy).await.unwrap_err();
    assert!(err.is_duplicate_key());
}

#[tokio::test]
async fn test_update_without_id_inserts() {
    let fixture = fixture();
    let updated = count_events(&fixture.events, "User", ModelEvent::Updated);
    let inserted = count_events(&fixture.events, "User", ModelEvent::Inserted);

    let mut user = fixture.context.new_model("User").unwrap();
    user.set("name", "John").unwrap();
    assert!(fixture.context.update(&mut user).await.unwrap());

    assert!(user.id().is_some());
    assert_eq!(updated.load(Ordering::SeqCst), 1);
    assert_eq!(inserted.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.connection.memory_collection("users").len(), 1);
}

#[test]
fn test_soft_delete_filter_injection() {
    let fixture = fixture();
    let post = fixture.context.registry().model_type("Post").unwrap();

    assert_eq!(
        resolve_query(doc! { "name": "x" }, post, false),
        doc! { "name": "x", "deleted_at": { "$exists": false } }
    );
    assert_eq!(resolve_query(doc! { "name": "x" }, post, true), doc! { "name": "x" });
}

#[tokio::test]
async fn test_soft_delete_restore_and_force_delete() {
    let fixture = fixture();
    let posts = fixture.context.query("Post").unwrap();

    let mut post = fixture.context.new_model("Post").unwrap();
    post.set("title", "Hello").unwrap();
    assert!(fixture.context.save(&mut post).await.unwrap());
    let id = post.id().cloned().unwrap();

    assert!(fixture.context.delete(&mut post).await.unwrap());
    assert!(post.is_trashed());
    assert_eq!(posts.count(Query::all()).await.unwrap(), 0);
    assert!(posts.first(id.clone(), None, false).await.unwrap().is_none());
    assert_eq!(posts.clone().with_trashed().count(Query::all()).await.unwrap(), 1);

    assert!(posts.restore(&mut post).await.unwrap());
    assert!(!post.is_trashed());
    assert_eq!(posts.count(Query::all()).await.unwrap(), 1);

    assert!(posts.force_delete(&mut post).await.unwrap());
    assert!(fixture.connection.memory_collection("posts").is_empty());
    assert!(posts.first_or_fail(id, None, false).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_restore_requires_soft_deletes() {
    let fixture = fixture();
    let mut user = fixture.context.new_model("User").unwrap();
    user.set("name", "John").unwrap();
    assert!(fixture.context.save(&mut user).await.unwrap());

    let err = fixture
        .context
        .query("User")
        .unwrap()
        .restore(&mut user)
        .await
        .unwrap_err();
    assert!(err.is_config());
}

#[tokio::test]
async fn test_cached_queries_skip_storage() {
    let fixture = fixture();
    for name in ["John", "Jane"] {
        let mut user = fixture.context.new_model("User").unwrap();
        user.set("name", name).unwrap();
        assert!(fixture.context.save(&mut user).await.unwrap());
    }

    let users = fixture.connection.memory_collection("users");
    users.stats().reset();
    let builder = fixture.context.query("User").unwrap();

    let first = builder.r#where(doc! { "name": "John" }, None, true).await.unwrap();
    let second = builder.r#where(doc! { "name": "John" }, None, true).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(
        second.documents().collect::<Vec<_>>(),
        first.documents().collect::<Vec<_>>()
    );
    assert_eq!(users.stats().finds(), 1);

    let key = CacheKey::query("users", &doc! { "name": "John" }, None);
    assert!(fixture.context.cache().has(&key).await.unwrap());

    let jane = builder.first(doc! { "name": "Jane" }, None, true).await.unwrap().unwrap();
    let again = builder.first(doc! { "name": "Jane" }, None, true).await.unwrap().unwrap();
    assert_eq!(again.id(), jane.id());
    assert_eq!(users.stats().finds(), 2);

    // Empty results are not cached.
    builder.r#where(doc! { "name": "Nobody" }, None, true).await.unwrap();
    builder.r#where(doc! { "name": "Nobody" }, None, true).await.unwrap();
    assert_eq!(users.stats().finds(), 4);
}

#[tokio::test]
async fn test_first_with_null_id_matches_nothing() {
    let fixture = fixture();
    let users = fixture.context.query("User").unwrap();

    assert!(users.first(Bson::Null, None, false).await.unwrap().is_none());
    assert_eq!(fixture.connection.memory_collection("users").stats().finds(), 0);
}
