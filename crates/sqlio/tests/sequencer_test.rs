//! Tests for identity reservation

use sqlio::prelude::*;
use sqlio::testing::MockDatabase;
use std::time::Duration;

fn orders_db() -> MockDatabase {
    let db = MockDatabase::new();
    db.create_table("orders", &["id", "note"], Some("id"));
    db
}

fn probe(id: i64) -> Result<(String, Vec<Value>)> {
    Ok((
        "INSERT INTO orders(id,note) VALUES (?,?)".to_string(),
        vec![Value::Int64(id), Value::from("probe")],
    ))
}

fn transient(count: i64) -> Options {
    Options::new()
        .with_preset_id_strategy(PresetIdStrategy::Transient)
        .with_record_count(count)
}

async fn sequencer(db: &MockDatabase) -> Sequencer {
    Sequencer::connect(&background(), db.connect(), &Options::new())
        .await
        .unwrap()
}

// ==================== Arithmetic Tests ====================

#[test]
fn test_reservation_on_offset_progression() {
    let seq = Sequence::new("t", 10).with_progression(5, 10);
    let r = Reservation::from_sequence(seq, 3).unwrap();

    assert_eq!(r.ids().collect::<Vec<_>>(), vec![15, 25, 35]);
    assert_eq!(r.last(), 35);
    assert_eq!(r.sequence.value, 45);
}

#[test]
fn test_reservation_rejects_empty_block() {
    let err = Reservation::from_sequence(Sequence::new("t", 1), 0).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Sequencer);
}

// ==================== Transient Tests ====================

#[tokio::test]
async fn test_transient_reservation() {
    let db = orders_db();
    db.set_auto_increment("orders", 40);
    let seq = sequencer(&db).await;
    assert_eq!(seq.dialect().name, "mysql");

    let r = seq
        .reserve(&background(), "orders", "id", &transient(5), Some(&probe))
        .await
        .unwrap();

    assert_eq!(r.ids().collect::<Vec<_>>(), vec![40, 41, 42, 43, 44]);
    assert_eq!(db.auto_increment("orders"), 45);
    // the probe row is rolled back, the counter is not
    assert_eq!(db.row_count("orders"), 0);
    assert_eq!(db.count_statements("SELECT GET_LOCK"), 1);
    assert_eq!(db.count_statements("ROLLBACK"), 1);
    assert!(db.held_locks().is_empty());
    assert_eq!(db.open_transactions(), 0);
}

#[tokio::test]
async fn test_concurrent_transient_reservations_are_disjoint() {
    let db = orders_db();
    let a = sequencer(&db).await;
    let b = sequencer(&db).await;
    let opts = transient(10);

    let ctx = background();
    let (ra, rb) = tokio::join!(
        a.reserve(&ctx, "orders", "id", &opts, Some(&probe)),
        b.reserve(&ctx, "orders", "id", &opts, Some(&probe)),
    );
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    let (lo, hi) = if ra.first < rb.first { (ra, rb) } else { (rb, ra) };
    assert_eq!(lo.ids().collect::<Vec<_>>(), (1..=10).collect::<Vec<_>>());
    assert_eq!(hi.ids().collect::<Vec<_>>(), (11..=20).collect::<Vec<_>>());
    assert!(lo.last() < hi.first);

    assert!(db.auto_increment("orders") >= 21);
    assert_eq!(db.row_count("orders"), 0);
    assert!(db.held_locks().is_empty());
    assert_eq!(db.open_transactions(), 0);
}

#[tokio::test]
async fn test_lock_timeout() {
    let db = orders_db();
    assert!(db.hold_lock("def.test.orders"));
    let seq = sequencer(&db).await;

    let opts = transient(3).with_lock_timeout(Duration::from_millis(150));
    let err = seq
        .reserve(&background(), "orders", "id", &opts, Some(&probe))
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Sequencer);
    assert!(err.to_string().contains("not acquired within"), "{err}");
    assert_eq!(db.count_statements("INSERT"), 0);
    assert_eq!(db.count_statements("ROLLBACK"), 1);
    assert_eq!(db.held_locks(), vec!["def.test.orders".to_string()]);
    assert_eq!(db.auto_increment("orders"), 1);
}

#[tokio::test]
async fn test_retriable_failure_is_retried() {
    let db = orders_db();
    db.fail_retriable_on("SHOW CREATE TABLE", 1);
    let seq = sequencer(&db).await;

    let r = seq
        .reserve(&background(), "orders", "id", &transient(2), Some(&probe))
        .await
        .unwrap();

    assert_eq!(r.ids().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(db.count_statements("SELECT GET_LOCK"), 2);
    assert_eq!(db.count_statements("ROLLBACK"), 2);
    assert!(db.held_locks().is_empty());
}

#[tokio::test]
async fn test_transient_requires_probe() {
    let db = orders_db();
    let seq = sequencer(&db).await;

    let err = seq
        .reserve(&background(), "orders", "id", &transient(2), None)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert_eq!(db.count_statements("SELECT GET_LOCK"), 0);
}

#[tokio::test]
async fn test_probe_failure_releases_lock() {
    let db = orders_db();
    db.fail_on("INSERT INTO orders", 1);
    let seq = sequencer(&db).await;

    let err = seq
        .reserve(&background(), "orders", "id", &transient(2), Some(&probe))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Driver);
    assert!(db.held_locks().is_empty());
    assert_eq!(db.count_statements("ROLLBACK"), 1);
    assert_eq!(db.open_transactions(), 0);
}

// ==================== Max Id Tests ====================

#[tokio::test]
async fn test_max_id_reservation() {
    let db = orders_db();
    db.insert_row("orders", vec![Value::Int64(7), Value::from("x")])
        .unwrap();
    let seq = sequencer(&db).await;

    let opts = Options::new()
        .with_preset_id_strategy(PresetIdStrategy::MaxId)
        .with_record_count(3);
    let r = seq
        .reserve(&background(), "orders", "id", &opts, None)
        .await
        .unwrap();

    assert_eq!(r.ids().collect::<Vec<_>>(), vec![8, 9, 10]);
    assert_eq!(db.count_statements("SELECT GET_LOCK"), 0);
    assert_eq!(db.row_count("orders"), 1);
}

#[tokio::test]
async fn test_transient_in_caller_transaction_scans_max_id() {
    let db = orders_db();
    db.insert_row("orders", vec![Value::Int64(3), Value::from("x")])
        .unwrap();
    let conn = db.connect();
    let seq = Sequencer::connect(&background(), conn.clone(), &Options::new())
        .await
        .unwrap();
    let tx = conn.begin().await.unwrap();

    let opts = transient(2).with_transaction(tx.clone());
    let r = seq
        .reserve(&background(), "orders", "id", &opts, Some(&probe))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(r.ids().collect::<Vec<_>>(), vec![4, 5]);
    assert_eq!(db.count_statements("SELECT GET_LOCK"), 0);
    assert_eq!(db.count_statements("SELECT COALESCE(MAX(id), 0) FROM orders"), 1);
}

#[tokio::test]
async fn test_reservation_disabled_without_strategy() {
    let db = orders_db();
    let seq = Sequencer::new(
        db.connect(),
        Product::new("postgresql", 16, 0, 0),
        lookup_dialect("postgresql").unwrap(),
    );

    let opts = Options::new().with_record_count(1);
    let err = seq
        .reserve(&background(), "orders", "id", &opts, None)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Unsupported);
}

#[tokio::test]
async fn test_non_positive_count() {
    let db = orders_db();
    let seq = sequencer(&db).await;
    let err = seq
        .reserve(&background(), "orders", "id", &Options::new(), None)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Sequencer);
}
