//! Tests for the concurrent batcher

use sqlio::batcher::State;
use sqlio::prelude::*;
use sqlio::testing::MockDatabase;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
struct Event {
    id: i64,
    name: String,
}

sqlio::impl_entity!(Event {
    id => "name=id,generator=autoincrement",
    name => "name",
});

fn event(name: impl Into<String>) -> Event {
    Event {
        id: 0,
        name: name.into(),
    }
}

async fn batcher(db: &MockDatabase, ctx: Context, config: BatcherConfig) -> Batcher<Event> {
    let ins = Inserter::new(&background(), db.connect(), "events", Options::new())
        .await
        .unwrap();
    Batcher::new(ctx, Arc::new(ins), config)
}

fn events_db() -> MockDatabase {
    let db = MockDatabase::new();
    db.create_table("events", &["id", "name"], Some("id"));
    db
}

// ==================== Coalescing Tests ====================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_share_batches() {
    let db = events_db();
    let config = BatcherConfig::default()
        .with_max_elements(100)
        .with_max_duration(Duration::from_millis(50))
        .with_batch_size(100);
    let batcher = batcher(&db, background(), config).await;

    let mut handles = Vec::new();
    for i in 0..200 {
        let b = batcher.clone();
        handles.push(tokio::spawn(async move {
            b.collect(event(format!("e{i}")))?.wait().await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    assert_eq!(db.row_count("events"), 200);
    let ids: HashSet<i64> = db
        .rows("events")
        .iter()
        .filter_map(|r| r.get_by_name("id").and_then(Value::as_i64))
        .collect();
    assert_eq!(ids.len(), 200);

    let inserts = db.count_statements("INSERT INTO events");
    assert!((1..=4).contains(&inserts), "{inserts} INSERT statements");

    // one connection, so batches never overlap in separate transactions
    assert_eq!(db.peak_open_transactions(), 1);

    let stats = batcher.stats();
    assert_eq!(stats.records_collected, 200);
    assert_eq!(stats.records_written, 200);
    assert_eq!(stats.batches_failed, 0);
    assert!(stats.batches_flushed >= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_flushes_share_one_connection() {
    let db = events_db();
    db.delay_on("INSERT INTO events", Duration::from_millis(40));
    let config = BatcherConfig::default()
        .with_max_elements(2)
        .with_max_duration(Duration::from_millis(10))
        .with_batch_size(2);
    let batcher = batcher(&db, background(), config).await;

    let states: Vec<State> = (0..8)
        .map(|i| batcher.collect(event(format!("e{i}"))).unwrap())
        .collect();
    for state in states {
        state.wait().await.unwrap();
    }

    assert_eq!(db.row_count("events"), 8);
    let inserts = db.count_statements("INSERT INTO events");
    assert!((4..=8).contains(&inserts), "{inserts} INSERT statements");
    assert_eq!(db.peak_open_transactions(), 1);
    assert_eq!(db.open_transactions(), 0);
    assert_eq!(batcher.stats().batches_failed, 0);
}

#[tokio::test]
async fn test_flush_writes_partial_batch() {
    let db = events_db();
    let config = BatcherConfig::default()
        .with_max_elements(10)
        .with_max_duration(Duration::from_secs(60));
    let batcher = batcher(&db, background(), config).await;

    let a = batcher.collect(event("a")).unwrap();
    let b = batcher.collect(event("b")).unwrap();
    assert!(!a.is_done());

    batcher.flush().await.unwrap();
    assert!(a.is_done() && b.is_done());
    a.wait().await.unwrap();
    b.wait().await.unwrap();

    assert_eq!(db.row_count("events"), 2);
    assert_eq!(db.count_statements("INSERT INTO events"), 1);
    // nothing left to flush
    batcher.flush().await.unwrap();
    assert_eq!(db.count_statements("INSERT INTO events"), 1);
}

#[tokio::test]
async fn test_failed_batch_reports_to_every_producer() {
    let db = events_db();
    db.fail_on("INSERT INTO events", 1);
    let config = BatcherConfig::default()
        .with_max_elements(2)
        .with_max_duration(Duration::from_millis(20));
    let batcher = batcher(&db, background(), config).await;

    let first = batcher.collect(event("a")).unwrap();
    let second = batcher.collect(event("b")).unwrap();
    let e1 = first.wait().await.unwrap_err();
    let e2 = second.wait().await.unwrap_err();
    assert_eq!(e1.category(), ErrorCategory::Driver);
    assert_eq!(e1.to_string(), e2.to_string());

    // the next batch goes through
    batcher.collect(event("c")).unwrap().wait().await.unwrap();
    assert_eq!(db.row_count("events"), 1);
    assert_eq!(batcher.stats().batches_failed, 1);
}

// ==================== Cancellation Tests ====================

#[tokio::test]
async fn test_cancel_during_flush_leaves_nothing_behind() {
    let db = events_db();
    db.delay_on("INSERT INTO events", Duration::from_millis(300));
    let ctx = background();
    let config = BatcherConfig::default()
        .with_max_elements(2)
        .with_max_duration(Duration::from_secs(60))
        .with_batch_size(2);
    let batcher = batcher(&db, ctx.clone(), config).await;

    let s1 = batcher.collect(event("a")).unwrap();
    let s2 = batcher.collect(event("b")).unwrap();
    // third record closes the first batch, whose INSERT is now in flight
    let s3 = batcher.collect(event("c")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(db.count_statements("INSERT INTO events") >= 1);

    ctx.cancel();
    for state in [s1, s2, s3] {
        let err = state.wait().await.unwrap_err();
        assert!(err.is_cancelled(), "{err}");
    }

    assert_eq!(db.row_count("events"), 0);
    assert_eq!(db.open_statements(), 0);
    assert_eq!(db.open_transactions(), 0);
    assert!(db.held_locks().is_empty());

    let err = batcher.collect(event("d")).unwrap_err();
    assert!(err.is_cancelled());
}
