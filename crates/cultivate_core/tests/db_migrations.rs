use chrono::NaiveDate;
use cultivate_core::db::migrations::latest_version;
use cultivate_core::db::{open_db, open_db_in_memory, DbError};
use cultivate_core::{AttributeSet, Character, CharacterRepository, RepoError, SqliteStore};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "characters");
    assert_table_exists(&conn, "character_attributes");
    assert_table_exists(&conn, "tasks");
    assert_table_exists(&conn, "task_logs");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cultivate.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "tasks");
}

#[test]
fn file_databases_use_wal_and_foreign_keys() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db(dir.path().join("cultivate.db")).unwrap();

    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(journal_mode.to_ascii_lowercase(), "wal");
    let foreign_keys: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(foreign_keys, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn store_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    match SqliteStore::try_new(&conn) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        }) => {
            assert_eq!(expected_version, latest_version());
            assert_eq!(actual_version, 0);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("unmigrated connection must be rejected"),
    }
}

#[test]
fn task_logs_reject_update_and_delete() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO task_logs (task_id, user_id, action, source, created_at)
         VALUES ('00000000-0000-0000-0000-000000000001', 1, 'complete', 'web', 0);",
        [],
    )
    .unwrap();

    let update = conn.execute("UPDATE task_logs SET source = 'system';", []);
    assert!(update.is_err());
    let delete = conn.execute("DELETE FROM task_logs;", []);
    assert!(delete.is_err());

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM task_logs;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn character_rows_round_trip_through_store() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

    let character = Character::new(7, today);
    store
        .insert_character(&character, &AttributeSet::initial(7))
        .unwrap();

    let loaded = store.load_character(7).unwrap().unwrap();
    assert_eq!(loaded, character);
    assert_eq!(store.load_attributes(7).unwrap().len(), 7);
    assert!(store.load_character(8).unwrap().is_none());

    let mut missing = character.clone();
    missing.user_id = 8;
    assert!(matches!(
        store.save_character(&missing),
        Err(RepoError::NotFound(_))
    ));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
