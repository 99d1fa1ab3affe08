//! Remote store behavior against an in-process database.

use serde::{Deserialize, Serialize};
use tern_remote::{Client, Key, Query, RemoteError, Settings};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Task {
    title: String,
    priority: i64,
    tags: Vec<String>,
}

fn task(title: &str, priority: i64) -> Task {
    Task {
        title: title.into(),
        priority,
        tags: vec!["work".into()],
    }
}

async fn client(page_size: usize) -> Client {
    let settings = Settings {
        endpoint: "mem://".into(),
        page_size,
        ..Settings::default()
    };
    Client::connect("test-project", &settings).await.unwrap()
}

async fn seed(c: &Client, n: i64) -> Vec<Key> {
    let mut keys = Vec::new();
    for i in 1..=n {
        let key = Key::id_key("Task", i, None);
        keys.push(c.put(&key, &task(&format!("t{i}"), i % 3)).await.unwrap());
    }
    keys
}

#[tokio::test]
async fn put_get_round_trip() {
    let c = client(10).await;
    let key = c
        .put(&Key::name_key("Task", "alpha", None), &task("alpha", 2))
        .await
        .unwrap();
    let got: Task = c.get(&key).await.unwrap();
    assert_eq!(got, task("alpha", 2));
}

#[tokio::test]
async fn incomplete_put_assigns_distinct_ids() {
    let c = client(10).await;
    let a = c
        .put(&Key::incomplete_key("Task", None), &task("a", 1))
        .await
        .unwrap();
    let b = c
        .put(&Key::incomplete_key("Task", None), &task("b", 1))
        .await
        .unwrap();
    assert!(a.id() > 0);
    assert_ne!(a.id(), b.id());
}

#[tokio::test]
async fn missing_entity_and_idempotent_delete() {
    let c = client(10).await;
    let key = Key::name_key("Task", "ghost", None);
    assert!(matches!(
        c.get::<Task>(&key).await,
        Err(RemoteError::NoSuchEntity)
    ));
    c.delete(&key).await.unwrap();
    c.delete(&key).await.unwrap();
}

#[tokio::test]
async fn get_multi_reports_missing_slot() {
    let c = client(10).await;
    let keys = seed(&c, 2).await;
    let lookup = vec![keys[0].clone(), Key::id_key("Task", 99, None), keys[1].clone()];
    let Err(RemoteError::Multi(multi)) = c.get_multi::<Task>(&lookup).await else {
        panic!("expected multi error");
    };
    assert!(multi.get(0).is_none());
    assert!(matches!(multi.get(1), Some(RemoteError::NoSuchEntity)));
    assert!(multi.get(2).is_none());
}

#[tokio::test]
async fn put_multi_length_mismatch() {
    let c = client(10).await;
    let err = c
        .put_multi(&[Key::incomplete_key("Task", None)], &[] as &[Task])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RemoteError::LengthMismatch { keys: 1, values: 0 }
    ));
}

#[tokio::test]
async fn limit_stops_after_five_across_pages() {
    let c = client(2).await;
    seed(&c, 8).await;
    let mut it = c.run(&Query::new("Task").limit(5));
    for _ in 0..5 {
        it.next::<Task>().await.unwrap();
    }
    for _ in 0..3 {
        assert!(matches!(it.next::<Task>().await, Err(RemoteError::Done)));
    }
}

#[tokio::test]
async fn default_order_is_key_order() {
    let c = client(3).await;
    let keys = seed(&c, 7).await;
    let (got, _) = c.get_all::<Task>(&Query::new("Task")).await.unwrap();
    assert_eq!(got, keys);
}

#[tokio::test]
async fn filters_orders_and_offset() {
    let c = client(4).await;
    seed(&c, 9).await;
    let q = Query::new("Task")
        .filter("priority >=", 1)
        .order("-priority")
        .order("title")
        .offset(1)
        .limit(3);
    let (_, tasks) = c.get_all::<Task>(&q).await.unwrap();
    let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["t5", "t8", "t1"]);
}

#[tokio::test]
async fn array_properties_match_any_element() {
    let c = client(10).await;
    seed(&c, 2).await;
    let (keys, _) = c
        .get_all::<Task>(&Query::new("Task").filter("tags =", "work"))
        .await
        .unwrap();
    assert_eq!(keys.len(), 2);
}

#[tokio::test]
async fn ancestor_queries_see_descendants_only() {
    let c = client(10).await;
    let list = Key::name_key("List", "home", None);
    let other = Key::name_key("List", "work", None);
    c.put(&Key::incomplete_key("Task", Some(&list)), &task("a", 1))
        .await
        .unwrap();
    c.put(&Key::incomplete_key("Task", Some(&other)), &task("b", 1))
        .await
        .unwrap();
    let (keys, tasks) = c
        .get_all::<Task>(&Query::new("Task").ancestor(&list))
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(keys[0].parent(), Some(&list));
}

#[tokio::test]
async fn keys_only_and_distinct_projection() {
    let c = client(10).await;
    seed(&c, 6).await;
    let (keys, values) = c
        .get_all::<Task>(&Query::new("Task").keys_only())
        .await
        .unwrap();
    assert_eq!((keys.len(), values.len()), (6, 0));

    let q = Query::new("Task").project(&["priority"]).distinct();
    let (_, rows) = c.get_all::<serde_json::Value>(&q).await.unwrap();
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn allocate_ids_reserves_without_writing() {
    let c = client(10).await;
    let keys = c
        .allocate_ids(&[
            Key::incomplete_key("Task", None),
            Key::incomplete_key("Task", None),
        ])
        .await
        .unwrap();
    assert_ne!(keys[0].id(), keys[1].id());
    assert!(matches!(
        c.get::<Task>(&keys[0]).await,
        Err(RemoteError::NoSuchEntity)
    ));
    assert!(c.allocate_ids(&[Key::id_key("Task", 1, None)]).await.is_err());
}

#[tokio::test]
async fn closed_client_rejects_calls() {
    let c = client(10).await;
    let clone = c.clone();
    c.close().unwrap();
    c.close().unwrap();
    assert!(matches!(
        clone.get::<Task>(&Key::id_key("Task", 1, None)).await,
        Err(RemoteError::Closed)
    ));
}

#[tokio::test]
async fn id_counter_table_is_not_a_usable_kind() {
    let c = client(10).await;
    c.put(&Key::incomplete_key("Task", None), &task("a", 1))
        .await
        .unwrap();
    assert!(matches!(
        c.put(&Key::name_key("tern_sequence", "Task", None), &task("x", 1))
            .await,
        Err(RemoteError::InvalidKey(_))
    ));
    let mut it = Query::new("tern_sequence").run(&c);
    assert!(matches!(
        it.next::<Task>().await,
        Err(RemoteError::InvalidQuery(_))
    ));
}
