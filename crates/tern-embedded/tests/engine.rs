//! End-to-end checks of the embedded engine through its public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tern_embedded::{
    Context, EmbeddedError, Key, KvStore, MemoryKvStore, Query, StorageResult, datastore,
};

/// Memory store that yields before every read and can stall its next one.
#[derive(Default)]
struct SlowStore {
    inner: MemoryKvStore,
    stall_next_get: AtomicBool,
}

#[async_trait]
impl KvStore for SlowStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        tokio::task::yield_now().await;
        if self.stall_next_get.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        self.inner.get(namespace, key).await
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        tokio::task::yield_now().await;
        self.inner.set(namespace, key, value).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        self.inner.delete(namespace, key).await
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        self.inner.list_keys(namespace).await
    }

    async fn increment(&self, namespace: &str, key: &str, by: i64) -> StorageResult<i64> {
        tokio::task::yield_now().await;
        self.inner.increment(namespace, key, by).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    body: String,
    stars: i64,
}

fn note(body: &str, stars: i64) -> Note {
    Note {
        body: body.into(),
        stars,
    }
}

#[tokio::test]
async fn contexts_sharing_a_store_see_the_same_entities() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let a = Context::new(Arc::clone(&store), "shared").unwrap();
    let b = Context::new(store, "shared").unwrap();

    let key = datastore::put(&a, &Key::new(&a, "Note", "n1", 0, None), &note("hi", 1))
        .await
        .unwrap();
    let got: Note = datastore::get(&b, &key).await.unwrap();
    assert_eq!(got, note("hi", 1));
}

#[tokio::test]
async fn apps_on_one_store_are_isolated() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let a = Context::new(Arc::clone(&store), "app-a").unwrap();
    let b = Context::new(store, "app-b").unwrap();

    datastore::put(&a, &Key::new_incomplete(&a, "Note", None), &note("a", 1))
        .await
        .unwrap();
    let (keys, _) = Query::new("Note").get_all::<Note>(&b).await.unwrap();
    assert!(keys.is_empty());
}

#[tokio::test]
async fn concurrent_puts_through_two_contexts_get_distinct_ids() {
    let store: Arc<dyn KvStore> = Arc::new(SlowStore::default());
    let a = Context::new(Arc::clone(&store), "shared").unwrap();
    let b = Context::new(store, "shared").unwrap();

    let (key_a, note_a) = (Key::new_incomplete(&a, "Note", None), note("a", 1));
    let (key_b, note_b) = (Key::new_incomplete(&b, "Note", None), note("b", 2));
    let (left, right) = tokio::join!(
        datastore::put(&a, &key_a, &note_a),
        datastore::put(&b, &key_b, &note_b),
    );
    let (left, right) = (left.unwrap(), right.unwrap());
    assert_ne!(left, right);
    assert_eq!(datastore::get::<Note>(&a, &left).await.unwrap(), note("a", 1));
    assert_eq!(datastore::get::<Note>(&a, &right).await.unwrap(), note("b", 2));
}

#[tokio::test]
async fn colon_in_app_id_does_not_leak_into_other_apps() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let a = Context::new(Arc::clone(&store), "a").unwrap();
    let ab = Context::new(store, "a:b").unwrap();

    datastore::put(&ab, &Key::new_incomplete(&ab, "c", None), &note("other", 1))
        .await
        .unwrap();
    let (keys, _) = Query::new("b:c").get_all::<Note>(&a).await.unwrap();
    assert!(keys.is_empty());
}

#[tokio::test]
async fn deadline_during_load_does_not_skip_results() {
    let store = Arc::new(SlowStore::default());
    let ctx = Context::new(Arc::clone(&store) as Arc<dyn KvStore>, "slow").unwrap();
    for id in 1..=3 {
        datastore::put(&ctx, &Key::new(&ctx, "Note", "", id, None), &note("n", id))
            .await
            .unwrap();
    }

    let mut it = Query::new("Note").run(&ctx.with_timeout(Duration::from_millis(20)));
    store.stall_next_get.store(true, Ordering::SeqCst);
    assert!(matches!(
        it.next::<Note>().await,
        Err(EmbeddedError::DeadlineExceeded)
    ));

    let mut stars = Vec::new();
    loop {
        match it.next::<Note>().await {
            Ok((_, n)) => stars.push(n.stars),
            Err(EmbeddedError::Done) => break,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(stars, vec![1, 2, 3]);
}

#[tokio::test]
async fn hierarchical_keys_survive_storage() {
    let ctx = Context::in_memory("tree").unwrap();
    let book = Key::new(&ctx, "Book", "rust", 0, None);
    let chapter = Key::new(&ctx, "Chapter", "", 3, Some(&book));
    let key = datastore::put(&ctx, &Key::new_incomplete(&ctx, "Note", Some(&chapter)), &note("x", 2))
        .await
        .unwrap();

    let (keys, _) = Query::new("Note")
        .ancestor(&book)
        .get_all::<Note>(&ctx)
        .await
        .unwrap();
    assert_eq!(keys, vec![key.clone()]);
    assert_eq!(keys[0].parent(), Some(&chapter));
    assert_eq!(keys[0].parent().and_then(Key::parent), Some(&book));
}

#[tokio::test]
async fn deadline_context_applies_to_queries() {
    let ctx = Context::in_memory("quick").unwrap();
    datastore::put(&ctx, &Key::new_incomplete(&ctx, "Note", None), &note("a", 1))
        .await
        .unwrap();
    let generous = ctx.with_timeout(Duration::from_secs(30));
    let mut it = Query::new("Note").run(&generous);
    assert!(it.next::<Note>().await.is_ok());
    assert!(matches!(it.next::<Note>().await, Err(EmbeddedError::Done)));
}

#[tokio::test]
async fn sorted_query_with_limit_stops_at_limit() {
    let ctx = Context::in_memory("sorted").unwrap();
    for stars in [3, 1, 5, 4, 2] {
        datastore::put(&ctx, &Key::new_incomplete(&ctx, "Note", None), &note("n", stars))
            .await
            .unwrap();
    }
    let mut it = Query::new("Note").order("stars").limit(2).run(&ctx);
    let (_, first) = it.next::<Note>().await.unwrap();
    let (_, second) = it.next::<Note>().await.unwrap();
    assert_eq!((first.stars, second.stars), (1, 2));
    assert!(matches!(it.next::<Note>().await, Err(EmbeddedError::Done)));
}
