//! Integration tests for the async record store session.

use recordb_core::{
    ConnectionError, CoreError, CoreResult, Direction, Factory, Key, KeyRange, KeyedCollection,
    Record, RecordStore, UpgradeContext,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn task(id: &str, title: &str) -> Record {
    Record::new().with("id", id).with("title", title)
}

fn ids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.get("id").and_then(|v| v.as_text()).unwrap().to_string())
        .collect()
}

async fn store() -> RecordStore {
    RecordStore::open(
        &Factory::in_memory(),
        "todos",
        1,
        KeyedCollection::new("tasks", "id"),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn inserted_record_is_readable() {
    let store = store().await;
    let record = task("t1", "Buy milk");
    store.insert(record.clone()).await.unwrap();

    assert_eq!(store.get("t1").await.unwrap(), Some(record.clone()));
    assert_eq!(store.require("t1").await.unwrap(), record);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn duplicate_insert_aborts_with_constraint_cause() {
    let store = store().await;
    store.insert(task("t1", "first")).await.unwrap();

    let err = store.insert(task("t1", "second")).await.unwrap_err();
    assert!(matches!(err, CoreError::TransactionAborted { .. }));
    assert!(err.abort_cause().is_some_and(CoreError::is_constraint));

    let kept = store.require("t1").await.unwrap();
    assert_eq!(kept.get("title").and_then(|v| v.as_text()), Some("first"));
}

#[tokio::test]
async fn duplicate_keys_in_one_batch_persist_nothing() {
    let store = store().await;
    let err = store
        .insert_batch(vec![task("t1", "a"), task("t2", "b"), task("t1", "c")])
        .await
        .unwrap_err();

    assert!(err.abort_cause().is_some_and(CoreError::is_constraint));
    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(store.get("t2").await.unwrap(), None);
}

#[tokio::test]
async fn upsert_replaces_every_field() {
    let store = store().await;
    store
        .insert(task("t1", "old").with("done", false))
        .await
        .unwrap();

    let key = store.upsert(task("t1", "new")).await.unwrap();
    assert_eq!(key, Key::from("t1"));

    let replaced = store.require("t1").await.unwrap();
    assert_eq!(replaced, task("t1", "new"));
    assert!(replaced.get("done").is_none());
}

#[tokio::test]
async fn remove_is_idempotent() {
    let store = store().await;
    store.insert(task("t1", "a")).await.unwrap();

    store.remove("t1").await.unwrap();
    store.remove("t1").await.unwrap();
    store.remove("missing").await.unwrap();

    assert_eq!(store.get("t1").await.unwrap(), None);
    let err = store.require("t1").await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { ref collection, .. } if collection == "tasks"));
}

#[tokio::test]
async fn scan_yields_keys_in_order_once() {
    let store = store().await;
    for id in ["c", "a", "b"] {
        store.insert(task(id, id)).await.unwrap();
    }

    let all = store.scan().await.unwrap().collect().await.unwrap();
    assert_eq!(ids(&all), ["a", "b", "c"]);

    store.remove("b").await.unwrap();
    let rest = store.scan().await.unwrap().collect().await.unwrap();
    assert_eq!(ids(&rest), ["a", "c"]);
}

#[tokio::test]
async fn batch_then_remove_walkthrough() {
    let store = store().await;
    let outcome = store
        .insert_batch(vec![task("t1", "a"), task("t2", "b"), task("t3", "c")])
        .await
        .unwrap();
    assert_eq!(outcome.inserted, 3);

    let scanned = store.scan().await.unwrap().collect().await.unwrap();
    assert_eq!(ids(&scanned), ["t1", "t2", "t3"]);

    store.remove("t2").await.unwrap();
    let scanned = store.scan().await.unwrap().collect().await.unwrap();
    assert_eq!(ids(&scanned), ["t1", "t3"]);
}

#[tokio::test]
async fn reverse_and_bounded_scans() {
    let store = store().await;
    store
        .insert_batch(["a", "b", "c", "d"].map(|id| task(id, id)).to_vec())
        .await
        .unwrap();

    let reversed = store
        .scan_range(KeyRange::all(), Direction::Prev)
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(ids(&reversed), ["d", "c", "b", "a"]);

    let range = KeyRange::bound(Key::from("b"), Key::from("d"), false, true).unwrap();
    let bounded = store
        .scan_range(range, Direction::Next)
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(ids(&bounded), ["b", "c"]);
}

#[tokio::test]
async fn stream_ends_and_stays_ended() {
    let store = store().await;
    store.insert(task("t1", "a")).await.unwrap();

    let mut stream = store.scan().await.unwrap();
    assert!(stream.next().await.unwrap().is_ok());
    assert!(stream.next().await.is_none());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn stream_observes_later_commits() {
    let store = store().await;
    store.insert(task("a", "a")).await.unwrap();

    let mut stream = store.scan().await.unwrap();
    assert!(stream.next().await.unwrap().is_ok());
    store.insert(task("b", "b")).await.unwrap();

    let next = stream.next().await.unwrap().unwrap();
    assert_eq!(ids(&[next]), ["b"]);
}

#[tokio::test]
async fn upgrade_runs_once_per_version() {
    let factory = Factory::in_memory();
    let runs = Arc::new(AtomicUsize::new(0));
    let counting = {
        let runs = Arc::clone(&runs);
        move |ctx: &mut UpgradeContext| -> CoreResult<()> {
            runs.fetch_add(1, Ordering::SeqCst);
            if !ctx.has_collection("tasks") {
                ctx.create_collection("tasks", "id")?;
            }
            Ok(())
        }
    };

    factory.open("todos", 1, &counting).unwrap().close();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let conn = factory.open("todos", 2, &counting).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    conn.close();

    let conn = factory.open("todos", 2, &counting).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(conn.version(), 2);
}

#[tokio::test]
async fn failed_upgrade_keeps_version_and_schema() {
    let factory = Factory::in_memory();
    factory
        .open("todos", 1, &KeyedCollection::new("tasks", "id"))
        .unwrap()
        .close();

    let failing = |ctx: &mut UpgradeContext| -> CoreResult<()> {
        ctx.create_collection("notes", "id")?;
        Err(CoreError::migration_failed("boom"))
    };
    let err = factory.open("todos", 2, &failing).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Connection(ConnectionError::UpgradeFailed { version: 2, .. })
    ));

    let conn = factory
        .open("todos", 1, &KeyedCollection::new("tasks", "id"))
        .unwrap();
    assert_eq!(conn.version(), 1);
    assert_eq!(conn.collection_names(), vec!["tasks"]);
}

#[tokio::test]
async fn unknown_collection_is_rejected() {
    let factory = Factory::in_memory();
    let conn = factory
        .open("todos", 1, &KeyedCollection::new("tasks", "id"))
        .unwrap();
    assert!(matches!(
        RecordStore::new(conn, "notes"),
        Err(CoreError::CollectionNotFound { .. })
    ));
}

#[tokio::test]
async fn closed_store_reports_closed() {
    let store = store().await;
    store.close();
    assert!(matches!(
        store.get("t1").await,
        Err(CoreError::DatabaseClosed)
    ));
}

#[tokio::test]
async fn concurrent_inserts_all_land() {
    let store = store().await;
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.insert(task(&format!("t{i:02}"), "x")).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(store.count().await.unwrap(), 16);
}
