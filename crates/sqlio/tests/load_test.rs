//! Tests for bulk loads and record reads

use sqlio::prelude::*;
use sqlio::testing::MockDatabase;

#[derive(Debug, Default, Clone, PartialEq)]
struct Note {
    id: i64,
    body: String,
    author: Option<String>,
}

sqlio::impl_entity!(Note {
    id => "name=id,generator=autoincrement",
    body => "body",
    author => "author",
});

fn notes_db() -> MockDatabase {
    let db = MockDatabase::new();
    db.create_table("notes", &["id", "body", "author"], Some("id"));
    db
}

fn note(id: i64, body: &str, author: Option<&str>) -> Note {
    Note {
        id,
        body: body.into(),
        author: author.map(str::to_string),
    }
}

async fn read_all(db: &MockDatabase) -> Vec<Note> {
    Reader::default()
        .read(
            &background(),
            &Executor::Connection(db.connect()),
            "SELECT id, body, author FROM notes ORDER BY id",
            &[],
        )
        .await
        .unwrap()
}

// ==================== Load Tests ====================

#[tokio::test]
async fn test_load_escapes_and_nulls() {
    let db = notes_db();
    let loader = Loader::new::<Note>(lookup_dialect("mysql").unwrap(), "notes", LoadOptions::default())
        .unwrap();
    let records = vec![
        note(0, "tab\there", Some("ann")),
        note(0, "two\nlines", None),
        note(0, "back\\slash", Some("bo")),
    ];

    let rows = loader
        .load(&background(), &Executor::Connection(db.connect()), &records)
        .await
        .unwrap();
    assert_eq!(rows, 3);

    let loaded = read_all(&db).await;
    assert_eq!(
        loaded,
        vec![
            note(1, "tab\there", Some("ann")),
            note(2, "two\nlines", None),
            note(3, "back\\slash", Some("bo")),
        ]
    );
}

#[tokio::test]
async fn test_load_replace_mode() {
    let db = notes_db();
    db.insert_row("notes", vec![Value::Int64(1), Value::from("old"), Value::Null])
        .unwrap();
    let options = LoadOptions::default()
        .with_field_separator(',')
        .with_enclosed_by('"')
        .with_mode(LoadMode::Replace);
    let loader = Loader::new::<Note>(lookup_dialect("mysql").unwrap(), "notes", options).unwrap();

    loader
        .load(
            &background(),
            &Executor::Connection(db.connect()),
            &[note(1, "new, with comma", Some("cy"))],
        )
        .await
        .unwrap();

    assert_eq!(read_all(&db).await, vec![note(1, "new, with comma", Some("cy"))]);
    assert_eq!(db.count_statements("LOAD DATA LOCAL INFILE"), 1);
}

#[test]
fn test_load_unsupported_dialect() {
    let err = Loader::new::<Note>(lookup_dialect("postgresql").unwrap(), "notes", LoadOptions::default())
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Unsupported);
}

// ==================== Read Tests ====================

#[tokio::test]
async fn test_read_reuses_cached_plan() {
    let db = notes_db();
    db.insert_row("notes", vec![Value::Null, Value::from("a"), Value::from("x")])
        .unwrap();
    db.insert_row("notes", vec![Value::Null, Value::from("b"), Value::Null])
        .unwrap();

    let reader = Reader::default();
    let exec = Executor::Connection(db.connect());
    for _ in 0..3 {
        let notes: Vec<Note> = reader
            .read(&background(), &exec, "SELECT * FROM notes ORDER BY id", &[])
            .await
            .unwrap();
        assert_eq!(notes, vec![note(1, "a", Some("x")), note(2, "b", None)]);
    }
    assert_eq!(reader.cache().len(), 1);

    // a different column layout is a different plan
    let partial: Vec<Note> = reader
        .read(&background(), &exec, "SELECT body FROM notes ORDER BY body", &[])
        .await
        .unwrap();
    assert_eq!(partial[1], note(0, "b", None));
    assert_eq!(reader.cache().len(), 2);
}
