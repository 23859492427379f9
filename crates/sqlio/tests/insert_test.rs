//! Tests for the batched insert engine

use sqlio::prelude::*;
use sqlio::testing::MockDatabase;

#[derive(Debug, Default, Clone, PartialEq)]
struct User {
    id: i64,
    name: String,
}

sqlio::impl_entity!(User {
    id => "name=id,generator=autoincrement",
    name => "name",
});

fn users(names: &[&str]) -> Vec<User> {
    names
        .iter()
        .map(|n| User {
            id: 0,
            name: n.to_string(),
        })
        .collect()
}

fn users_db() -> MockDatabase {
    let db = MockDatabase::new();
    db.create_table("users", &["id", "name"], Some("id"));
    db
}

async fn inserter(db: &MockDatabase, options: Options) -> Inserter {
    Inserter::new(&background(), db.connect(), "users", options)
        .await
        .unwrap()
}

fn names_by_id(db: &MockDatabase) -> Vec<(i64, String)> {
    let mut rows: Vec<_> = db
        .rows("users")
        .iter()
        .map(|r| {
            (
                r.get_by_name("id").and_then(Value::as_i64).unwrap(),
                r.get_by_name("name").and_then(Value::as_string).unwrap(),
            )
        })
        .collect();
    rows.sort();
    rows
}

// ==================== Batching Tests ====================

#[tokio::test]
async fn test_batched_insert_back_fills_identities() {
    let db = users_db();
    let ins = inserter(&db, Options::new().with_batch_size(2)).await;
    assert_eq!(ins.dialect().name, "mysql");

    let mut records = users(&["a", "b", "c"]);
    let res = ins.exec(&background(), &mut records, None).await.unwrap();

    assert_eq!(res.rows_affected, 3);
    assert_eq!(res.last_insert_id, 3);
    assert_eq!(records.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    // one full batch and the tail
    assert_eq!(db.count_statements("INSERT INTO users"), 2);
    assert_eq!(db.count_statements("COMMIT"), 1);
    assert_eq!(db.open_statements(), 0);
    assert_eq!(db.open_transactions(), 0);
}

#[tokio::test]
async fn test_empty_input_touches_nothing() {
    let db = users_db();
    let ins = inserter(&db, Options::new()).await;
    db.clear_log();

    let res = ins
        .exec(&background(), &mut Vec::<User>::new(), None)
        .await
        .unwrap();
    assert_eq!(res, InsertResult::default());
    assert!(db.statements().is_empty());
}

#[tokio::test]
async fn test_on_duplicate_key_tail() {
    let db = users_db();
    db.insert_row("users", vec![Value::Int64(1), Value::from("a")])
        .unwrap();
    let ins = inserter(&db, Options::new()).await;

    let mut records = vec![
        User {
            id: 1,
            name: "a2".into(),
        },
        User {
            id: 0,
            name: "b".into(),
        },
    ];
    let opts = Options::new().with_on_duplicate_key_sql("ON DUPLICATE KEY UPDATE name=VALUES(name)");
    let res = ins.exec(&background(), &mut records, Some(opts)).await.unwrap();

    // a replaced row counts twice
    assert_eq!(res.rows_affected, 3);
    assert_eq!(names_by_id(&db), vec![(1, "a2".into()), (2, "b".into())]);
}

#[tokio::test]
async fn test_per_call_tail_is_not_shadowed_by_cached_session() {
    let db = users_db();
    let ins = inserter(&db, Options::new()).await;

    let mut first = users(&["a"]);
    ins.exec(&background(), &mut first, None).await.unwrap();

    let mut second = vec![User {
        id: first[0].id,
        name: "a2".into(),
    }];
    let opts = Options::new().with_on_duplicate_key_sql("ON DUPLICATE KEY UPDATE name=VALUES(name)");
    ins.exec(&background(), &mut second, Some(opts)).await.unwrap();

    let inserts: Vec<String> = db
        .statements()
        .into_iter()
        .filter(|s| s.starts_with("INSERT INTO users"))
        .collect();
    assert_eq!(inserts.len(), 2);
    assert!(!inserts[0].contains("ON DUPLICATE KEY"));
    assert!(inserts[1].ends_with("ON DUPLICATE KEY UPDATE name=VALUES(name)"), "{}", inserts[1]);
    assert_eq!(names_by_id(&db), vec![(1, "a2".into())]);

    // the plain shape is still used without the tail
    let mut third = users(&["b"]);
    ins.exec(&background(), &mut third, None).await.unwrap();
    assert_eq!(db.count_statements("INSERT INTO users"), 3);
    assert_eq!(names_by_id(&db), vec![(1, "a2".into()), (2, "b".into())]);
}

// ==================== Preset Identity Tests ====================

#[tokio::test]
async fn test_transient_preset_assigns_reserved_block() {
    let db = users_db();
    db.set_auto_increment("users", 100);
    let ins = inserter(&db, Options::new().with_batch_size(3)).await;

    let mut records = users(&["a", "b", "c"]);
    let opts = Options::new().with_preset_id_strategy(PresetIdStrategy::Transient);
    let res = ins.exec(&background(), &mut records, Some(opts)).await.unwrap();

    assert_eq!(records.iter().map(|u| u.id).collect::<Vec<_>>(), vec![100, 101, 102]);
    assert_eq!(res.rows_affected, 3);
    assert_eq!(res.last_insert_id, 102);
    assert_eq!(
        names_by_id(&db),
        vec![(100, "a".into()), (101, "b".into()), (102, "c".into())]
    );

    // probe insert plus the real one
    assert_eq!(db.count_statements("INSERT INTO users"), 2);
    assert_eq!(db.count_statements("ROLLBACK"), 1);
    assert_eq!(db.count_statements("COMMIT"), 1);
    assert!(db.held_locks().is_empty());
    assert_eq!(db.auto_increment("users"), 103);
}

#[tokio::test]
async fn test_transient_preset_in_caller_transaction() {
    let db = users_db();
    db.insert_row("users", vec![Value::Int64(7), Value::from("x")])
        .unwrap();
    let conn = db.connect();
    let ins = Inserter::new(&background(), conn.clone(), "users", Options::new())
        .await
        .unwrap();
    let tx = conn.begin().await.unwrap();

    let mut records = users(&["a", "b"]);
    let opts = Options::new()
        .with_preset_id_strategy(PresetIdStrategy::Transient)
        .with_transaction(tx.clone());
    ins.exec(&background(), &mut records, Some(opts)).await.unwrap();

    // the caller owns the transaction
    assert_eq!(db.count_statements("COMMIT"), 0);
    tx.commit().await.unwrap();

    assert_eq!(records.iter().map(|u| u.id).collect::<Vec<_>>(), vec![8, 9]);
    assert_eq!(db.count_statements("SELECT GET_LOCK"), 0);
    assert_eq!(db.row_count("users"), 3);
}

#[tokio::test]
async fn test_explicit_identities_are_kept() {
    let db = users_db();
    let ins = inserter(&db, Options::new()).await;

    let mut records = vec![
        User {
            id: 50,
            name: "x".into(),
        },
        User {
            id: 60,
            name: "y".into(),
        },
    ];
    ins.exec(&background(), &mut records, None).await.unwrap();

    assert_eq!(records[0].id, 50);
    assert_eq!(names_by_id(&db), vec![(50, "x".into()), (60, "y".into())]);
    assert_eq!(db.auto_increment("users"), 61);
}

// ==================== Failure Tests ====================

#[tokio::test]
async fn test_failed_batch_stops_and_rolls_back() {
    let db = users_db();
    db.insert_row("users", vec![Value::Int64(1), Value::from("seed")])
        .unwrap();
    let ins = inserter(&db, Options::new().with_batch_size(2)).await;
    db.fail_on("INSERT INTO users", 1);

    let mut records = users(&["a", "b", "c", "d"]);
    let err = ins.exec(&background(), &mut records, None).await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Driver);
    assert!(!err.is_retriable());
    // the second batch is never sent
    assert_eq!(db.count_statements("INSERT INTO users"), 1);
    assert_eq!(db.row_count("users"), 1);
    assert!(records.iter().all(|u| u.id == 0));
    assert_eq!(db.count_statements("ROLLBACK"), 1);
    assert_eq!(db.open_statements(), 0);
    assert_eq!(db.open_transactions(), 0);
}
