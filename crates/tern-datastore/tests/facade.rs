//! Facade behavior, run against both backends.

use serde::{Deserialize, Serialize};
use tern_datastore::{Backend, Client, Context, DatastoreError, KEY_FIELD, Settings};
use tern_embedded::EmbeddedError;
use tern_remote::RemoteError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Task {
    title: String,
    done: bool,
    priority: i64,
}

fn task(title: &str, priority: i64) -> Task {
    Task {
        title: title.into(),
        done: priority.rem_euclid(2) == 0,
        priority,
    }
}

fn embedded() -> Client {
    Client::embedded(Context::in_memory("test-app").unwrap())
}

async fn remote() -> Client {
    let settings = Settings {
        endpoint: "mem://".into(),
        page_size: 2,
        ..Settings::default()
    };
    Client::connect_remote("test-project", &settings).await.unwrap()
}

async fn both() -> Vec<Client> {
    vec![embedded(), remote().await]
}

async fn seed(c: &Client, n: i64) {
    for i in 1..=n {
        let key = c.id_key("Task", i, None).unwrap();
        c.put(&key, &task(&format!("t{i}"), i)).await.unwrap();
    }
}

#[tokio::test]
async fn key_ids_and_names() {
    for c in both().await {
        let id = c.id_key("Task", 17, None).unwrap();
        assert_eq!((id.id(), id.name()), (17, ""), "{:?}", c.backend());
        let named = c.name_key("Task", "alpha", None).unwrap();
        assert_eq!((named.id(), named.name()), (0, "alpha"));
        assert_eq!(named.backend(), c.backend());
    }
}

#[tokio::test]
async fn incomplete_put_then_get() {
    for c in both().await {
        let key = c
            .put(&c.incomplete_key("Task", None).unwrap(), &task("write docs", 1))
            .await
            .unwrap();
        assert_ne!(key.id(), 0);
        assert!(!key.is_incomplete());
        let got: Task = c.get(&key).await.unwrap();
        assert_eq!(got.title, "write docs");
    }
}

#[tokio::test]
async fn delete_twice_succeeds() {
    for c in both().await {
        let key = c.name_key("Task", "gone", None).unwrap();
        c.put(&key, &task("gone", 1)).await.unwrap();
        c.delete(&key).await.unwrap();
        c.delete(&key).await.unwrap();
        let err = c.get::<Task>(&key).await.unwrap_err();
        assert!(err.is_not_found());
    }
}

#[tokio::test]
async fn not_found_is_the_native_error() {
    let e = embedded();
    let err = e
        .get::<Task>(&e.name_key("Task", "ghost", None).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, DatastoreError::Embedded(EmbeddedError::NoSuchEntity)));

    let r = remote().await;
    let err = r
        .get::<Task>(&r.name_key("Task", "ghost", None).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, DatastoreError::Remote(RemoteError::NoSuchEntity)));
}

#[tokio::test]
async fn exhausted_iterator_keeps_reporting_done() {
    for c in both().await {
        seed(&c, 2).await;
        let mut it = c.run(&c.new_query("Task"));
        it.next::<Task>().await.unwrap();
        it.next::<Task>().await.unwrap();
        for _ in 0..3 {
            assert!(it.next::<Task>().await.unwrap_err().is_done());
        }
    }
}

#[tokio::test]
async fn limit_five_then_done() {
    for c in both().await {
        seed(&c, 8).await;
        let mut it = c.run(&c.new_query("Task").limit(5));
        for _ in 0..5 {
            it.next::<Task>().await.unwrap();
        }
        assert!(matches!(it.next::<Task>().await, Err(DatastoreError::Done)));
        assert!(matches!(it.next_key().await, Err(DatastoreError::Done)));
    }
}

#[tokio::test]
async fn filters_and_orders_apply_in_order() {
    for c in both().await {
        seed(&c, 6).await;
        let q = c
            .new_query("Task")
            .filter("done", true)
            .filter("priority >", 2)
            .order("-priority");
        let (_, tasks) = c.get_all::<Task>(&q).await.unwrap();
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["t6", "t4"], "{:?}", c.backend());
    }
}

#[tokio::test]
async fn offset_skips_leading_results() {
    for c in both().await {
        seed(&c, 5).await;
        let q = c.new_query("Task").order("priority").offset(2);
        let (_, tasks) = c.get_all::<Task>(&q).await.unwrap();
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["t3", "t4", "t5"], "{:?}", c.backend());
    }
}

#[tokio::test]
async fn distinct_projection_collapses_rows() {
    #[derive(Debug, PartialEq, Deserialize)]
    struct Done {
        done: bool,
    }

    for c in both().await {
        seed(&c, 6).await;
        let q = c.new_query("Task").project(&["done"]).distinct().order("done");
        let (keys, rows) = c.get_all::<Done>(&q).await.unwrap();
        assert_eq!(keys.len(), 2, "{:?}", c.backend());
        assert_eq!(rows, vec![Done { done: false }, Done { done: true }]);
    }
}

#[tokio::test]
async fn eventual_consistency_still_returns_results() {
    for c in both().await {
        seed(&c, 3).await;
        let (keys, _) = c
            .get_all::<Task>(&c.new_query("Task").eventual_consistency())
            .await
            .unwrap();
        assert_eq!(keys.len(), 3, "{:?}", c.backend());
    }
}

#[tokio::test]
async fn key_filter_and_ancestor() {
    for c in both().await {
        let list = c.name_key("List", "home", None).unwrap();
        let other = c.name_key("List", "work", None).unwrap();
        let a = c
            .put(&c.incomplete_key("Task", Some(&list)).unwrap(), &task("a", 1))
            .await
            .unwrap();
        c.put(&c.incomplete_key("Task", Some(&other)).unwrap(), &task("b", 1))
            .await
            .unwrap();

        let (keys, _) = c
            .get_all::<Task>(&c.new_query("Task").ancestor(&list))
            .await
            .unwrap();
        assert_eq!(keys, vec![a.clone()]);
        assert_eq!(keys[0].parent(), Some(list));

        let (keys, _) = c
            .get_all::<Task>(&c.new_query("Task").filter(KEY_FIELD, &a))
            .await
            .unwrap();
        assert_eq!(keys, vec![a]);
    }
}

#[tokio::test]
async fn keys_only_get_all() {
    for c in both().await {
        seed(&c, 3).await;
        let (keys, values) = c
            .get_all::<Task>(&c.new_query("Task").keys_only())
            .await
            .unwrap();
        assert_eq!((keys.len(), values.len()), (3, 0));
    }
}

#[tokio::test]
async fn get_multi_reports_failed_slots() {
    for c in both().await {
        seed(&c, 2).await;
        let keys = vec![
            c.id_key("Task", 1, None).unwrap(),
            c.id_key("Task", 99, None).unwrap(),
            c.id_key("Task", 2, None).unwrap(),
        ];
        let err = c.get_multi::<Task>(&keys).await.unwrap_err();
        let failed: Vec<usize> = err.multi_errors().iter().map(|(i, _)| *i).collect();
        assert_eq!(failed, vec![1], "{:?}", c.backend());
    }
}

#[tokio::test]
async fn put_multi_and_allocate_ids() {
    for c in both().await {
        let incomplete = c.incomplete_key("Task", None).unwrap();
        let keys = c
            .put_multi(
                &[incomplete.clone(), c.name_key("Task", "n", None).unwrap()],
                &[task("x", 1), task("n", 2)],
            )
            .await
            .unwrap();
        assert_ne!(keys[0].id(), 0);
        assert_eq!(keys[1].name(), "n");

        let reserved = c
            .allocate_ids(&[incomplete.clone(), incomplete])
            .await
            .unwrap();
        assert_ne!(reserved[0].id(), reserved[1].id());
        assert!(reserved.iter().all(|k| k.id() != keys[0].id()));

        c.delete_multi(&keys).await.unwrap();
        let (left, _) = c.get_all::<Task>(&c.new_query("Task")).await.unwrap();
        assert!(left.is_empty());
    }
}

#[tokio::test]
async fn foreign_keys_are_rejected() {
    let e = embedded();
    let r = remote().await;
    let remote_key = r.name_key("List", "home", None).unwrap();

    assert!(matches!(
        e.id_key("Task", 1, Some(&remote_key)),
        Err(DatastoreError::ForeignKey {
            expected: Backend::Embedded
        })
    ));
    assert!(matches!(
        e.get::<Task>(&remote_key).await,
        Err(DatastoreError::ForeignKey { .. })
    ));

    let mut it = e.run(&e.new_query("Task").ancestor(&remote_key));
    for _ in 0..2 {
        assert!(matches!(
            it.next::<Task>().await,
            Err(DatastoreError::ForeignKey { .. })
        ));
    }

    let mut it = r.run(&e.new_query("Task"));
    assert!(matches!(
        it.next_key().await,
        Err(DatastoreError::ForeignKey {
            expected: Backend::Remote
        })
    ));
}

#[tokio::test]
async fn malformed_filter_surfaces_on_next() {
    for c in both().await {
        let mut it = c.run(&c.new_query("Task").filter("priority ~", 1));
        let err = it.next::<Task>().await.unwrap_err();
        assert!(!err.is_done());
        assert!(matches!(
            err,
            DatastoreError::Remote(RemoteError::InvalidQuery(_))
                | DatastoreError::Embedded(EmbeddedError::InvalidQuery(_))
        ));
    }
}

#[tokio::test]
async fn closed_remote_client_rejects_calls() {
    let r = remote().await;
    let key = r.name_key("Task", "a", None).unwrap();
    r.close().unwrap();
    r.close().unwrap();
    assert!(matches!(
        r.get::<Task>(&key).await,
        Err(DatastoreError::Remote(RemoteError::Closed))
    ));
}

#[tokio::test]
async fn from_config_builds_remote() {
    let config = tern_config::Config::from_toml_str(
        "[store]\nbackend = \"remote\"\n[store.remote]\nendpoint = \"mem://\"\nproject_id = \"cfg\"\n",
    )
    .unwrap();
    let c = Client::from_config(&config).await.unwrap();
    assert_eq!(c.backend(), Backend::Remote);
    let key = c
        .put(&c.name_key("Task", "cfg", None).unwrap(), &task("cfg", 1))
        .await
        .unwrap();
    assert_eq!(c.get::<Task>(&key).await.unwrap().title, "cfg");
}

#[cfg(feature = "kv")]
#[tokio::test]
async fn from_config_opens_persistent_embedded_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = tern_config::Config::default();
    config.store.embedded.path = dir.path().join("entities");
    let c = Client::from_config(&config).await.unwrap();
    let key = c
        .put(&c.name_key("Task", "kept", None).unwrap(), &task("kept", 1))
        .await
        .unwrap();
    assert_eq!(c.get::<Task>(&key).await.unwrap().title, "kept");
}
