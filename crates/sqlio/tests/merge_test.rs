//! Tests for the merge executor against the in-memory database

use sqlio::prelude::*;
use sqlio::testing::MockDatabase;
use std::collections::HashMap;

#[derive(Debug, Default, Clone, PartialEq)]
struct Item {
    id: i64,
    key: String,
}

sqlio::impl_entity!(Item {
    id => "name=id,generator=autoincrement",
    key => "name=item_key",
});

const FETCH: &str = "SELECT id, item_key FROM items";

fn items(rows: &[(i64, &str)]) -> Vec<Item> {
    rows.iter()
        .map(|(id, key)| Item {
            id: *id,
            key: key.to_string(),
        })
        .collect()
}

fn seed(rows: &[(i64, &str)]) -> MockDatabase {
    let db = MockDatabase::new();
    db.create_table("items", &["id", "item_key"], Some("id"));
    for (id, key) in rows {
        db.insert_row("items", vec![Value::Int64(*id), Value::from(*key)])
            .unwrap();
    }
    db
}

/// key -> id of the destination rows
fn contents(db: &MockDatabase) -> HashMap<String, i64> {
    db.rows("items")
        .iter()
        .map(|r| {
            (
                r.get_by_name("item_key").and_then(Value::as_string).unwrap(),
                r.get_by_name("id").and_then(Value::as_i64).unwrap(),
            )
        })
        .collect()
}

fn config(strategy: MergeStrategy) -> MergeConfig<Item> {
    MergeConfig::new("items", FETCH, |r: &Item| Ok(MatchKey::new(r.key.clone(), r.id)))
        .with_strategy(strategy)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn merger(db: &MockDatabase) -> Merger {
    init_tracing();
    Merger::new(&background(), db.connect(), &Options::new())
        .await
        .unwrap()
}

// ==================== Batched Tests ====================

#[tokio::test]
async fn test_ins_del_merge() {
    let db = seed(&[(1, "k1"), (2, "k2"), (3, "k3")]);
    let merger = merger(&db).await;

    let res = merger
        .exec(&background(), items(&[(0, "k2"), (0, "k4")]), &config(MergeStrategy::InsDel))
        .await
        .unwrap();

    assert_eq!(res.inserted, 1);
    assert_eq!(res.deleted, 2);
    assert_eq!(res.updated, 0);
    assert_eq!(res.unchanged, 1);
    assert_eq!(res.affected(), 3);

    let rows = contents(&db);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows["k2"], 2);
    assert_eq!(rows["k4"], 4);
    assert_eq!(db.count_statements("COMMIT"), 1);
    assert_eq!(db.open_transactions(), 0);
}

#[tokio::test]
async fn test_merge_is_idempotent() {
    let db = seed(&[(1, "k1"), (2, "k2"), (3, "k3")]);
    let merger = merger(&db).await;
    let cfg = config(MergeStrategy::InsDel);

    merger
        .exec(&background(), items(&[(0, "k2"), (0, "k4")]), &cfg)
        .await
        .unwrap();
    let commits = db.count_statements("COMMIT");

    let again = merger
        .exec(&background(), items(&[(0, "k2"), (0, "k4")]), &cfg)
        .await
        .unwrap();
    assert_eq!(again.affected(), 0);
    assert_eq!(again.unchanged, 2);
    assert_eq!(db.count_statements("COMMIT"), commits);
}

#[tokio::test]
async fn test_ins_upd_del_merge() {
    let db = seed(&[(1, "k1"), (2, "k2")]);
    let merger = merger(&db).await;

    let res = merger
        .exec(
            &background(),
            items(&[(1, "k1-renamed"), (0, "k3")]),
            &config(MergeStrategy::InsUpdDel),
        )
        .await
        .unwrap();

    assert_eq!((res.inserted, res.updated, res.deleted), (1, 1, 1));
    let rows = contents(&db);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows["k1-renamed"], 1);
    assert_eq!(rows["k3"], 3);
    assert_eq!(db.count_statements("UPDATE `items`"), 1);
    assert_eq!(db.open_statements(), 0);
}

#[tokio::test]
async fn test_ups_del_merge() {
    let db = seed(&[(1, "k1"), (2, "k2")]);
    let merger = merger(&db).await;

    let res = merger
        .exec(
            &background(),
            items(&[(1, "k1b"), (0, "k3")]),
            &config(MergeStrategy::UpsDel),
        )
        .await
        .unwrap();

    assert!(res.upserted >= 2, "{}", res.report());
    assert_eq!(res.inserted, 0);
    assert_eq!(res.updated, 0);
    assert_eq!(res.deleted, 1);

    let rows = contents(&db);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows["k1b"], 1);
    assert!(rows.contains_key("k3"));
    assert_eq!(db.count_statements("UPDATE"), 0);
}

#[tokio::test]
async fn test_custom_order() {
    let db = seed(&[(1, "k1")]);
    let merger = merger(&db).await;
    let cfg = config(MergeStrategy::InsDel)
        .with_order(vec![Operation::Insert, Operation::Delete, Operation::Update]);

    merger
        .exec(&background(), items(&[(0, "k2")]), &cfg)
        .await
        .unwrap();

    let dml: Vec<String> = db
        .statements()
        .into_iter()
        .filter(|s| s.starts_with("INSERT") || s.starts_with("DELETE"))
        .collect();
    assert_eq!(dml.len(), 2);
    assert!(dml[0].starts_with("INSERT"));
    assert!(dml[1].starts_with("DELETE"));
}

// ==================== Failure Tests ====================

#[tokio::test]
async fn test_failure_rolls_back_every_operation() {
    let db = seed(&[(1, "k1"), (2, "k2"), (3, "k3")]);
    db.fail_on("INSERT INTO items", 1);
    let merger = merger(&db).await;

    let err = merger
        .exec(&background(), items(&[(0, "k2"), (0, "k4")]), &config(MergeStrategy::InsDel))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Driver);

    // the delete ran first and is undone
    assert_eq!(db.row_count("items"), 3);
    assert_eq!(db.count_statements("ROLLBACK"), 1);
    assert_eq!(db.count_statements("COMMIT"), 0);
    assert_eq!(db.open_transactions(), 0);
    assert_eq!(db.open_statements(), 0);
}

#[tokio::test]
async fn test_duplicate_source_key() {
    let db = seed(&[]);
    let merger = merger(&db).await;

    let err = merger
        .exec(&background(), items(&[(0, "a"), (0, "a")]), &config(MergeStrategy::InsDel))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Merge);
    assert_eq!(db.row_count("items"), 0);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let db = seed(&[(1, "k1")]);
    let merger = merger(&db).await;
    let ctx = background();
    ctx.cancel();

    let err = merger
        .exec(&ctx, items(&[(0, "k2")]), &config(MergeStrategy::InsDel))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(db.row_count("items"), 1);
}

// ==================== Staging Tests ====================

#[tokio::test]
async fn test_transient_staging() {
    let db = seed(&[(1, "k1"), (2, "k2"), (3, "k3")]);
    let merger = merger(&db).await;

    let staging = |pattern: &str| {
        Transient::new(pattern)
            .with_init_sql("CREATE TABLE IF NOT EXISTS ${Transient} LIKE ${Table}")
            .with_init_sql("TRUNCATE TABLE ${Transient}")
    };
    let cfg = config(MergeStrategy::InsDel)
        .with_insert(
            OperationConfig::new(OperationStrategy::WithTransient)
                .with_sql("INSERT INTO ${Table}(item_key) SELECT item_key FROM ${Transient}")
                .with_transient(staging("${Table}_ins")),
        )
        .with_delete(
            OperationConfig::new(OperationStrategy::WithTransient)
                .with_sql("DELETE FROM ${Table} WHERE id IN (SELECT id FROM ${Transient})")
                .with_transient(staging("${Table}_del")),
        );

    let res = merger
        .exec(&background(), items(&[(0, "k2"), (0, "k4"), (0, "k5")]), &cfg)
        .await
        .unwrap();

    assert_eq!(res.inserted, 2);
    assert_eq!(res.deleted, 2);
    let rows = contents(&db);
    let mut keys: Vec<_> = rows.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["k2", "k4", "k5"]);
    assert_eq!(rows["k2"], 2);

    assert_eq!(db.row_count("items_ins"), 2);
    assert_eq!(db.row_count("items_del"), 2);
    assert_eq!(db.count_statements("LOAD DATA LOCAL INFILE"), 2);
    assert_eq!(db.count_statements("TRUNCATE TABLE items_"), 2);
}

#[tokio::test]
async fn test_by_load_insert() {
    let db = seed(&[(1, "k1")]);
    let merger = merger(&db).await;
    let cfg = config(MergeStrategy::InsDel)
        .with_insert(OperationConfig::new(OperationStrategy::ByLoad));

    let res = merger
        .exec(&background(), items(&[(0, "k1"), (0, "k2"), (0, "k3")]), &cfg)
        .await
        .unwrap();

    assert_eq!(res.inserted, 2);
    let rows = contents(&db);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows["k2"], 2);
    assert_eq!(rows["k3"], 3);
    assert_eq!(db.count_statements("LOAD DATA LOCAL INFILE"), 1);
    assert_eq!(db.count_statements("INSERT"), 0);
}

#[tokio::test]
async fn test_by_load_rejected_for_deletes() {
    let db = seed(&[]);
    let merger = merger(&db).await;
    let cfg = config(MergeStrategy::InsDel)
        .with_delete(OperationConfig::new(OperationStrategy::ByLoad));

    let err = merger
        .exec(&background(), items(&[(0, "k1")]), &cfg)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Merge);
    assert!(db.statements().iter().all(|s| !s.starts_with("INSERT")));
}
