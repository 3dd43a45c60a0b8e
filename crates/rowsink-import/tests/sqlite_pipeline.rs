//! End-to-end import runs against in-memory SQLite.
//!
//! These tests drive the full pipeline — staging, duplicate resolution,
//! merge, commit discipline — through the real embedded backend.

use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use rowsink_core::{Connection, ConnectionParams, Value, Vendor};
use rowsink_dialects::dialect_for;
use rowsink_driver_sqlite::{SqliteConnection, SqliteConnectionFactory};
use rowsink_import::{
    ColumnMapping, DuplicateMode, ImportDefinition, ImportMode, ImportWorker, MemoryRowSource,
    RowSource,
};

fn definition(table: &str, mode: ImportMode) -> ImportDefinition {
    ImportDefinition::new(ConnectionParams::file(Vendor::Sqlite, ":memory:"), table, mode)
}

fn mapping(columns: &[&str]) -> ColumnMapping {
    let mut mapping = ColumnMapping::new();
    for column in columns {
        mapping.insert(*column, *column, None).unwrap();
    }
    mapping
}

fn row(values: &[(&str, Value)]) -> IndexMap<String, Value> {
    values
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

async fn open() -> SqliteConnection {
    SqliteConnection::open(":memory:", true).unwrap()
}

async fn all_rows(conn: &SqliteConnection, sql: &str) -> Vec<Vec<Value>> {
    conn.query(sql, &[])
        .await
        .unwrap()
        .rows
        .into_iter()
        .map(|r| r.values)
        .collect()
}

/// With a `*_drop` duplicate mode, the surviving row per key group is the
/// one with the minimum sequence value, i.e. the earliest row.
#[tokio::test]
async fn test_drop_strategy_keeps_earliest_row_per_key() {
    let conn = open().await;
    conn.execute("CREATE TABLE people (id INTEGER, name TEXT)", &[])
        .await
        .unwrap();
    let definition = definition("people", ImportMode::Insert)
        .with_key_columns(["id"])
        .with_duplicate_mode(DuplicateMode::CheckSourceOnlyDrop);
    let mapping = mapping(&["id", "name"]);
    let mut source = MemoryRowSource::new(vec![
        row(&[("id", Value::Int(1)), ("name", Value::String("first".into()))]),
        row(&[("id", Value::Int(2)), ("name", Value::String("only".into()))]),
        row(&[("id", Value::Int(1)), ("name", Value::String("second".into()))]),
        row(&[("id", Value::Int(1)), ("name", Value::String("third".into()))]),
    ]);
    let worker = ImportWorker::new(&definition, &mapping).unwrap();
    let outcome = worker.run_on_connection(&conn, &mut source).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.statistics.duplicates_removed, 2);
    assert_eq!(outcome.statistics.destination_row_count, 2);
    let rows = all_rows(&conn, "SELECT id, name FROM people ORDER BY id").await;
    assert_eq!(rows[0], vec![Value::Int(1), Value::String("first".into())]);
    assert_eq!(rows[1], vec![Value::Int(2), Value::String("only".into())]);
}

/// The two-row join scenario: `{a: "x", b: NULL}` then `{a: NULL, b: "y"}`
/// under update_all_join without NULL overwrites merges to `{a: "x", b: "y"}`.
#[tokio::test]
async fn test_join_strategy_coalesces_without_null_overwrites() {
    let conn = open().await;
    conn.execute("CREATE TABLE kv (k INTEGER, a TEXT, b TEXT)", &[])
        .await
        .unwrap();
    let definition = definition("kv", ImportMode::Upsert)
        .with_key_columns(["k"])
        .with_duplicate_mode(DuplicateMode::UpdateAllJoin)
        .with_update_with_null_values(false);
    let mapping = mapping(&["k", "a", "b"]);
    let mut source = MemoryRowSource::new(vec![
        row(&[("k", Value::Int(1)), ("a", Value::String("x".into())), ("b", Value::Null)]),
        row(&[("k", Value::Int(1)), ("a", Value::Null), ("b", Value::String("y".into()))]),
    ]);
    let worker = ImportWorker::new(&definition, &mapping).unwrap();
    let outcome = worker.run_on_connection(&conn, &mut source).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.statistics.duplicates_removed, 1);
    let rows = all_rows(&conn, "SELECT k, a, b FROM kv").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0],
        vec![
            Value::Int(1),
            Value::String("x".into()),
            Value::String("y".into())
        ]
    );
    // No bookkeeping columns leak into the destination
    let columns = conn.query("SELECT * FROM kv", &[]).await.unwrap().columns;
    assert_eq!(columns, vec!["k", "a", "b"]);
}

/// Running the same clear-insert twice produces the identical row set.
#[tokio::test]
async fn test_clear_insert_is_idempotent() {
    let conn = open().await;
    conn.execute("CREATE TABLE items (id INTEGER, label TEXT)", &[])
        .await
        .unwrap();
    let definition = definition("items", ImportMode::ClearInsert);
    let mapping = mapping(&["id", "label"]);
    let rows_data = vec![
        row(&[("id", Value::Int(1)), ("label", Value::String("a".into()))]),
        row(&[("id", Value::Int(2)), ("label", Value::String("b".into()))]),
    ];

    let worker = ImportWorker::new(&definition, &mapping).unwrap();
    let mut source = MemoryRowSource::new(rows_data.clone());
    let first = worker.run_on_connection(&conn, &mut source).await.unwrap();
    assert!(first.success);
    assert_eq!(first.statistics.rows_deleted, 0);
    let after_first = all_rows(&conn, "SELECT id, label FROM items ORDER BY id").await;

    let mut source = MemoryRowSource::new(rows_data);
    let second = worker.run_on_connection(&conn, &mut source).await.unwrap();
    assert!(second.success);
    assert_eq!(second.statistics.rows_deleted, 2);
    let after_second = all_rows(&conn, "SELECT id, label FROM items ORDER BY id").await;
    assert_eq!(after_first, after_second);
    assert_eq!(after_second.len(), 2);
}

/// Upsert: a present key triggers exactly one update and no insert; an
/// absent key exactly one insert and no update.
#[tokio::test]
async fn test_upsert_update_and_insert_counts() {
    let conn = open().await;
    conn.execute("CREATE TABLE accounts (id INTEGER, name TEXT)", &[])
        .await
        .unwrap();
    conn.execute(
        "INSERT INTO accounts (id, name) VALUES (1, 'stale')",
        &[],
    )
    .await
    .unwrap();
    let definition = definition("accounts", ImportMode::Upsert).with_key_columns(["id"]);
    let mapping = mapping(&["id", "name"]);
    let mut source = MemoryRowSource::new(vec![
        row(&[("id", Value::Int(1)), ("name", Value::String("fresh".into()))]),
        row(&[("id", Value::Int(2)), ("name", Value::String("new".into()))]),
    ]);
    let worker = ImportWorker::new(&definition, &mapping).unwrap();
    let outcome = worker.run_on_connection(&conn, &mut source).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.statistics.rows_updated, 1);
    assert_eq!(outcome.statistics.rows_inserted, 1);
    let rows = all_rows(&conn, "SELECT id, name FROM accounts ORDER BY id").await;
    assert_eq!(rows[0], vec![Value::Int(1), Value::String("fresh".into())]);
    assert_eq!(rows[1], vec![Value::Int(2), Value::String("new".into())]);
}

/// Update mode never inserts; unknown keys are left alone.
#[tokio::test]
async fn test_update_mode_skips_unknown_keys() {
    let conn = open().await;
    conn.execute("CREATE TABLE accounts (id INTEGER, name TEXT)", &[])
        .await
        .unwrap();
    conn.execute("INSERT INTO accounts (id, name) VALUES (1, 'old')", &[])
        .await
        .unwrap();
    let definition = definition("accounts", ImportMode::Update).with_key_columns(["id"]);
    let mapping = mapping(&["id", "name"]);
    let mut source = MemoryRowSource::new(vec![
        row(&[("id", Value::Int(1)), ("name", Value::String("updated".into()))]),
        row(&[("id", Value::Int(99)), ("name", Value::String("ghost".into()))]),
    ]);
    let worker = ImportWorker::new(&definition, &mapping).unwrap();
    let outcome = worker.run_on_connection(&conn, &mut source).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.statistics.rows_updated, 1);
    assert_eq!(outcome.statistics.rows_inserted, 0);
    assert_eq!(outcome.statistics.destination_row_count, 1);
    let rows = all_rows(&conn, "SELECT name FROM accounts").await;
    assert_eq!(rows[0], vec![Value::String("updated".into())]);
}

/// Without duplicate checking, every source row feeds the update and the
/// highest sequence number wins.
#[tokio::test]
async fn test_update_all_without_dedup_is_last_write_wins() {
    let conn = open().await;
    conn.execute("CREATE TABLE accounts (id INTEGER, name TEXT)", &[])
        .await
        .unwrap();
    conn.execute("INSERT INTO accounts (id, name) VALUES (1, 'old')", &[])
        .await
        .unwrap();
    let definition = definition("accounts", ImportMode::Update).with_key_columns(["id"]);
    let mapping = mapping(&["id", "name"]);
    let mut source = MemoryRowSource::new(vec![
        row(&[("id", Value::Int(1)), ("name", Value::String("first".into()))]),
        row(&[("id", Value::Int(1)), ("name", Value::String("second".into()))]),
    ]);
    let worker = ImportWorker::new(&definition, &mapping).unwrap();
    let outcome = worker.run_on_connection(&conn, &mut source).await.unwrap();
    assert!(outcome.success);
    let rows = all_rows(&conn, "SELECT name FROM accounts").await;
    assert_eq!(rows[0], vec![Value::String("second".into())]);
}

/// Check-source-only combined with insert mode also purges staging rows
/// whose key already exists in the destination.
#[tokio::test]
async fn test_check_source_only_purges_keys_already_in_destination() {
    let conn = open().await;
    conn.execute("CREATE TABLE people (id INTEGER, name TEXT)", &[])
        .await
        .unwrap();
    conn.execute("INSERT INTO people (id, name) VALUES (1, 'kept')", &[])
        .await
        .unwrap();
    let definition = definition("people", ImportMode::Insert)
        .with_key_columns(["id"])
        .with_duplicate_mode(DuplicateMode::CheckSourceOnlyDrop);
    let mapping = mapping(&["id", "name"]);
    let mut source = MemoryRowSource::new(vec![
        row(&[("id", Value::Int(1)), ("name", Value::String("clash".into()))]),
        row(&[("id", Value::Int(2)), ("name", Value::String("new".into()))]),
    ]);
    let worker = ImportWorker::new(&definition, &mapping).unwrap();
    let outcome = worker.run_on_connection(&conn, &mut source).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.statistics.duplicates_removed, 1);
    let rows = all_rows(&conn, "SELECT id, name FROM people ORDER BY id").await;
    assert_eq!(rows[0], vec![Value::Int(1), Value::String("kept".into())]);
    assert_eq!(rows[1], vec![Value::Int(2), Value::String("new".into())]);
}

/// All-or-nothing discipline: one malformed row leaves the destination
/// completely unchanged.
#[tokio::test]
async fn test_full_success_only_rolls_back_everything() {
    let conn = open().await;
    conn.execute("CREATE TABLE people (id INTEGER, name TEXT)", &[])
        .await
        .unwrap();
    conn.execute("INSERT INTO people (id, name) VALUES (42, 'seed')", &[])
        .await
        .unwrap();
    let definition =
        definition("people", ImportMode::Insert).with_commit_on_full_success_only(true);
    let mapping = mapping(&["id", "name"]);
    let mut source = MemoryRowSource::new(vec![
        row(&[("id", Value::Int(1)), ("name", Value::String("ok".into()))]),
        row(&[
            ("id", Value::String("not a number".into())),
            ("name", Value::String("bad".into())),
        ]),
        row(&[("id", Value::Int(3)), ("name", Value::String("ok too".into()))]),
    ]);
    let worker = ImportWorker::new(&definition, &mapping).unwrap();
    let outcome = worker.run_on_connection(&conn, &mut source).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.statistics.rows_invalid, 1);
    assert_eq!(outcome.statistics.invalid_rows[0].index, 1);
    let rows = all_rows(&conn, "SELECT id, name FROM people").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0], vec![Value::Int(42), Value::String("seed".into())]);
}

/// Function-wrapped key columns apply to both sides of the key equation.
#[tokio::test]
async fn test_function_wrapped_keys_match_case_insensitively() {
    let conn = open().await;
    conn.execute("CREATE TABLE subscribers (email TEXT, plan TEXT)", &[])
        .await
        .unwrap();
    conn.execute(
        "INSERT INTO subscribers (email, plan) VALUES ('ADA@EXAMPLE.COM', 'free')",
        &[],
    )
    .await
    .unwrap();
    let definition =
        definition("subscribers", ImportMode::Update).with_key_columns(["UPPER(email)"]);
    let mapping = mapping(&["email", "plan"]);
    let mut source = MemoryRowSource::new(vec![row(&[
        ("email", Value::String("ada@example.com".into())),
        ("plan", Value::String("pro".into())),
    ])]);
    let worker = ImportWorker::new(&definition, &mapping).unwrap();
    let outcome = worker.run_on_connection(&conn, &mut source).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.statistics.rows_updated, 1);
    let rows = all_rows(&conn, "SELECT plan FROM subscribers").await;
    assert_eq!(rows[0], vec![Value::String("pro".into())]);
}

/// Dropping a column from a 4-column SQLite table through the emulation
/// plan preserves the remaining data and the row count.
#[tokio::test]
async fn test_sqlite_drop_column_emulation() {
    let conn = open().await;
    conn.execute(
        "CREATE TABLE wide (a INTEGER, b TEXT, c TEXT, d REAL)",
        &[],
    )
    .await
    .unwrap();
    for i in 0..3 {
        conn.execute(
            "INSERT INTO wide (a, b, c, d) VALUES (?, ?, ?, ?)",
            &[
                Value::Int(i),
                Value::String(format!("b{}", i)),
                Value::String(format!("c{}", i)),
                Value::Float(i as f64),
            ],
        )
        .await
        .unwrap();
    }
    let dialect = dialect_for(Vendor::Sqlite);
    let columns = dialect.table_columns(&conn, "wide").await.unwrap();
    assert_eq!(columns.len(), 4);
    let plan = dialect.drop_column_plan("wide", "c", &columns, &[]);

    conn.set_auto_commit(false).await.unwrap();
    for statement in &plan {
        conn.execute(statement, &[]).await.unwrap();
    }
    conn.commit().await.unwrap();
    conn.set_auto_commit(true).await.unwrap();

    let columns = dialect.table_columns(&conn, "wide").await.unwrap();
    assert_eq!(columns.len(), 3);
    assert!(!columns.keys().any(|c| c == "c"));
    let rows = all_rows(&conn, "SELECT a, b, d FROM wide ORDER BY a").await;
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[1],
        vec![Value::Int(1), Value::String("b1".into()), Value::Float(1.0)]
    );
}

/// Auto-creation derives the destination structure from the scanned source
/// property types, through the factory and a real database file.
#[tokio::test]
async fn test_create_table_if_missing_via_factory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("imports.db");
    let mut definition = ImportDefinition::new(
        ConnectionParams::file(Vendor::Sqlite, path.to_string_lossy().to_string()),
        "measurements",
        ImportMode::Insert,
    )
    .with_create_table();
    definition.batch_size = 2;
    let mapping = mapping(&["sensor", "reading"]);
    let mut source = MemoryRowSource::new(vec![
        row(&[
            ("sensor", Value::String("s1".into())),
            ("reading", Value::Float(21.5)),
        ]),
        row(&[
            ("sensor", Value::String("s2".into())),
            ("reading", Value::Float(19.0)),
        ]),
        row(&[
            ("sensor", Value::String("s3".into())),
            ("reading", Value::Float(20.25)),
        ]),
    ]);
    let factory = SqliteConnectionFactory::create_if_missing();
    let worker = ImportWorker::new(&definition, &mapping).unwrap();
    let outcome = worker.run(&factory, &mut source).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.statistics.rows_inserted, 3);

    let conn = SqliteConnection::open(&path.to_string_lossy(), false).unwrap();
    let count = conn
        .query_count("SELECT COUNT(*) FROM measurements", &[])
        .await
        .unwrap();
    assert_eq!(count, 3);
}

/// The erroneous-row extract covers every invalid row, beyond the reported
/// reason prefix.
#[tokio::test]
async fn test_invalid_rows_can_be_extracted() {
    let conn = open().await;
    conn.execute("CREATE TABLE nums (n INTEGER)", &[]).await.unwrap();
    let definition = definition("nums", ImportMode::Insert);
    let mapping = mapping(&["n"]);
    let rows_data = vec![
        row(&[("n", Value::Int(1))]),
        row(&[("n", Value::String("bad".into()))]),
        row(&[("n", Value::Int(3))]),
    ];
    let mut source = MemoryRowSource::new(rows_data);
    let worker = ImportWorker::new(&definition, &mapping).unwrap();
    let outcome = worker.run_on_connection(&conn, &mut source).await.unwrap();
    assert!(outcome.success);
    let indices = outcome.statistics.invalid_indices();
    assert_eq!(indices, vec![1]);
    let extract = MemoryRowSource::new(vec![
        row(&[("n", Value::Int(1))]),
        row(&[("n", Value::String("bad".into()))]),
        row(&[("n", Value::Int(3))]),
    ])
    .extract_items(&indices, "rejected")
    .unwrap();
    let text = std::fs::read_to_string(&extract).unwrap();
    assert!(text.contains("bad"));
    std::fs::remove_file(extract).ok();
}
