//! Bounded cursor enumeration.

use idbkv_core::{Config, CursorDirection, ErrorKind, Key, KvError, MemoryHost, Operation};
use idbkv_host::Fault;
use idbkv_testkit::{items_descriptor, sample_record, Record, TestDatabase};

async fn seeded(count: i64, config: Config) -> TestDatabase {
    let db = TestDatabase::open_on(MemoryHost::new(), items_descriptor(), config).await;
    for n in 1..=count {
        db.set(n, &sample_record(n)).await.unwrap();
    }
    db
}

fn keys<T>(entries: &[(Key, T)]) -> Vec<i64> {
    entries.iter().filter_map(|(k, _)| k.as_integer()).collect()
}

#[tokio::test]
async fn limit_below_count_returns_exactly_limit_in_order() {
    let db = seeded(10, Config::default()).await;

    let forward: Vec<(Key, Record)> = db.enumerate(4, CursorDirection::Next).await.unwrap();
    assert_eq!(keys(&forward), vec![1, 2, 3, 4]);
    assert_eq!(forward[0].1, sample_record(1));

    let backward: Vec<(Key, Record)> = db.enumerate(4, CursorDirection::Prev).await.unwrap();
    assert_eq!(keys(&backward), vec![10, 9, 8, 7]);
}

#[tokio::test]
async fn limit_at_or_above_count_returns_everything() {
    let db = seeded(5, Config::default()).await;

    let exact: Vec<(Key, Record)> = db.enumerate(5, CursorDirection::Next).await.unwrap();
    assert_eq!(keys(&exact), vec![1, 2, 3, 4, 5]);

    let all: Vec<(Key, Record)> = db.enumerate(100, CursorDirection::Prev).await.unwrap();
    assert_eq!(keys(&all), vec![5, 4, 3, 2, 1]);
}

#[tokio::test]
async fn zero_limit_and_empty_store_yield_nothing() {
    let db = seeded(0, Config::default()).await;
    assert!(db.enumerate::<Record>(10, CursorDirection::Next).await.unwrap().is_empty());

    db.set(1, &sample_record(1)).await.unwrap();
    assert!(db.enumerate::<Record>(0, CursorDirection::Next).await.unwrap().is_empty());
}

#[tokio::test]
async fn entries_use_the_configured_default_limit() {
    let db = seeded(6, Config::new().default_limit(3)).await;
    let entries: Vec<(Key, Record)> = db.entries().await.unwrap();
    assert_eq!(keys(&entries), vec![1, 2, 3]);
}

#[tokio::test]
async fn mixed_key_types_follow_key_order() {
    let db = seeded(0, Config::default()).await;
    db.set("b", &2).await.unwrap();
    db.set(10, &1).await.unwrap();
    db.set("a", &3).await.unwrap();

    let entries: Vec<(Key, i64)> = db.enumerate(10, CursorDirection::Next).await.unwrap();
    let order: Vec<Key> = entries.into_iter().map(|(k, _)| k).collect();
    assert_eq!(order, vec![Key::from(10), Key::from("a"), Key::from("b")]);
}

#[tokio::test]
async fn cursor_stops_at_the_limit_without_advancing() {
    let db = seeded(5, Config::default()).await;

    // A failure armed after the third entry never fires when the walk
    // stops on the third entry.
    db.host.inject(Fault::Cursor { after: 3 });
    let first: Vec<(Key, Record)> = db.enumerate(3, CursorDirection::Next).await.unwrap();
    assert_eq!(keys(&first), vec![1, 2, 3]);
}

#[tokio::test]
async fn cursor_failure_discards_partial_results() {
    let db = seeded(5, Config::default()).await;
    db.host.inject(Fault::Cursor { after: 2 });

    let err = db.enumerate::<Record>(10, CursorDirection::Next).await.unwrap_err();
    assert!(matches!(
        err,
        KvError::OperationFailed { operation: Operation::Enumerate, .. }
    ));

    // The next walk is unaffected.
    let all: Vec<(Key, Record)> = db.enumerate(10, CursorDirection::Next).await.unwrap();
    assert_eq!(all.len(), 5);
}

#[tokio::test]
async fn cursor_failure_at_the_end_of_the_store_fails_the_call() {
    let db = seeded(3, Config::default()).await;
    db.host.inject(Fault::Cursor { after: 3 });

    let err = db.enumerate::<Record>(10, CursorDirection::Next).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationFailed);
}

#[tokio::test]
async fn decode_failure_names_the_offending_key() {
    let db = seeded(2, Config::default()).await;
    db.set(3, &"not a record").await.unwrap();

    let err = db.enumerate::<Record>(10, CursorDirection::Next).await.unwrap_err();
    assert_eq!(err.key(), Some(&Key::from(3)));
}

#[tokio::test]
async fn enumeration_is_restartable() {
    let db = seeded(4, Config::default()).await;
    let once: Vec<(Key, Record)> = db.entries().await.unwrap();
    let twice: Vec<(Key, Record)> = db.entries().await.unwrap();
    assert_eq!(once, twice);
    assert_eq!(db.host.record_count("db", "items"), Some(4));
}
