mod common;

use std::error::Error as _;
use std::sync::Arc;

use envsnap::error::CleanupAction;
use envsnap::{
    CaptureOptions, CleanupError, DatabaseCleanupError, DatabaseEnvironmentUnit, DbConnection, DbTable, DbType,
    EnvironmentUnit, HandlerError,
};
use rusqlite::Connection;
use tempfile::TempDir;

use common::{Call, RecordingFactory, identity};

fn connection() -> Arc<DbConnection> {
    Arc::new(DbConnection::new(DbType::Mysql, "db.local", "shop").with_credentials("ats", "secret"))
}

fn unit_with(factory: &Arc<RecordingFactory>, backup_dir: &std::path::Path, tables: &[&str]) -> DatabaseEnvironmentUnit {
    DatabaseEnvironmentUnit::with_factory(
        backup_dir,
        "db1.sql",
        connection(),
        tables.iter().map(|t| DbTable::new(*t)).collect(),
        factory.clone(),
    )
}

#[test]
fn backup_applies_options_then_tables_then_captures() {
    let tmp = TempDir::new().unwrap();
    let backup_dir = tmp.path().join("env");
    let factory = Arc::new(RecordingFactory::default());
    let mut unit = unit_with(&factory, &backup_dir, &["users", "orders"]);
    let conn_id = identity(unit.connection());

    unit.backup().unwrap();

    assert_eq!(
        factory.calls(),
        vec![
            Call::CreateBackupHandler(conn_id),
            Call::SetLockTables(true),
            Call::SetForeignKeyCheck(true),
            Call::SetIncludeDeleteStatements(true),
            Call::AddTable("users".into()),
            Call::AddTable("orders".into()),
            Call::CreateBackup(backup_dir.join("db1.sql")),
            Call::Disconnect,
        ]
    );
    assert!(backup_dir.join("db1.sql").is_file());
}

#[test]
fn every_option_combination_precedes_table_registration() {
    let tmp = TempDir::new().unwrap();
    let tables = ["a", "b", "c"];

    for bits in 0..8u8 {
        let options = CaptureOptions {
            lock_tables: bits & 1 != 0,
            disable_foreign_keys: bits & 2 != 0,
            include_delete_statements: bits & 4 != 0,
        };
        let factory = Arc::new(RecordingFactory::default());
        let mut unit = unit_with(&factory, tmp.path(), &tables);
        unit.set_options(options);
        unit.backup().unwrap();

        let calls = factory.calls();
        assert_eq!(
            &calls[1..4],
            &[
                Call::SetLockTables(options.lock_tables),
                Call::SetForeignKeyCheck(options.disable_foreign_keys),
                Call::SetIncludeDeleteStatements(options.include_delete_statements),
            ]
        );
        let added: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::AddTable(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(added, tables);
        assert!(matches!(calls[4], Call::AddTable(_)));
    }
}

#[test]
fn failed_capture_still_disconnects_once() {
    let tmp = TempDir::new().unwrap();
    let factory = Arc::new(RecordingFactory { fail_backup: true, ..Default::default() });
    let mut unit = unit_with(&factory, tmp.path(), &["users", "orders"]);

    let err = unit.backup().unwrap_err();

    assert!(matches!(err, CleanupError::Database(DatabaseCleanupError::Capture { .. })));
    assert!(matches!(err.root_cause(), Some(HandlerError::Io(_))));
    assert_eq!(factory.disconnects(), 1);
    assert_eq!(factory.calls().last(), Some(&Call::Disconnect));
}

#[test]
fn failed_handler_creation_creates_nothing() {
    let tmp = TempDir::new().unwrap();
    let backup_dir = tmp.path().join("never");
    let factory = Arc::new(RecordingFactory { fail_create: true, ..Default::default() });
    let mut unit = unit_with(&factory, &backup_dir, &["users"]);
    unit.set_temp_backup_dir(Some(tmp.path().join("worker")));

    let err = unit.backup().unwrap_err();

    assert!(matches!(
        &err,
        CleanupError::Database(DatabaseCleanupError::Connection { action: CleanupAction::Backup, .. })
    ));
    assert!(matches!(err.source(), Some(_)));
    assert!(matches!(err.root_cause(), Some(HandlerError::Connection { reason, .. }) if reason == "connection refused"));
    assert!(!backup_dir.exists());
    assert!(!tmp.path().join("worker").exists());
    assert!(unit.temp_backup_dir().is_none());
    assert_eq!(factory.disconnects(), 0);
}

#[test]
fn temp_dir_redirects_backup_and_is_cleared() {
    let tmp = TempDir::new().unwrap();
    let worker_dir = tmp.path().join("worker-1");
    let factory = Arc::new(RecordingFactory::default());
    let mut unit = unit_with(&factory, &tmp.path().join("env"), &["users"]);

    unit.set_temp_backup_dir(Some(worker_dir.clone()));
    assert_eq!(unit.backup_file(), worker_dir.join("db1.sql"));
    unit.backup().unwrap();

    assert!(worker_dir.join("db1.sql").is_file());
    assert!(!tmp.path().join("env").exists());
    assert!(unit.temp_backup_dir().is_none());
    assert_eq!(unit.backup_file(), tmp.path().join("env").join("db1.sql"));
}

#[test]
fn temp_dir_is_cleared_when_backup_fails() {
    let tmp = TempDir::new().unwrap();
    let factory = Arc::new(RecordingFactory { fail_backup: true, ..Default::default() });
    let mut unit = unit_with(&factory, tmp.path(), &["users"]);

    unit.set_temp_backup_dir(Some(tmp.path().join("worker-2")));
    assert!(unit.backup().is_err());
    assert!(unit.temp_backup_dir().is_none());
}

#[test]
fn restore_after_backup_always_reports_true() {
    let tmp = TempDir::new().unwrap();
    for tables in [&[][..], &["users"][..], &["users", "orders", "items"][..]] {
        let factory = Arc::new(RecordingFactory::default());
        let mut unit = unit_with(&factory, tmp.path(), tables);
        unit.set_options(CaptureOptions { lock_tables: false, ..Default::default() });

        unit.backup().unwrap();
        assert!(unit.execute_restore_if_necessary().unwrap());

        let calls = factory.calls();
        assert!(calls.contains(&Call::Restore(tmp.path().join("db1.sql"))));
        assert_eq!(factory.disconnects(), 2);
    }
}

#[test]
fn failed_restore_disconnects_and_wraps_cause() {
    let tmp = TempDir::new().unwrap();
    let factory = Arc::new(RecordingFactory { fail_restore: true, ..Default::default() });
    let mut unit = unit_with(&factory, tmp.path(), &["users"]);

    let err = unit.execute_restore_if_necessary().unwrap_err();

    assert!(matches!(err, CleanupError::Database(DatabaseCleanupError::Restore { .. })));
    assert!(matches!(err.root_cause(), Some(HandlerError::MissingBackup(_))));
    assert_eq!(factory.disconnects(), 1);
}

#[test]
fn copies_have_independent_tables_and_shared_connection() {
    let tmp = TempDir::new().unwrap();
    let factory = Arc::new(RecordingFactory::default());
    let original = unit_with(&factory, tmp.path(), &["users", "orders"]);

    let mut copy = original.duplicate();
    assert_eq!(copy.tables(), original.tables());
    assert!(Arc::ptr_eq(copy.connection(), original.connection()));

    copy.tables_mut().push(DbTable::new("audit"));
    copy.tables_mut()[0].filter = Some("id < 100".into());
    assert_eq!(original.tables().len(), 2);
    assert!(original.tables()[0].filter.is_none());
}

#[test]
fn boxed_copy_captures_on_the_same_connection() {
    let tmp = TempDir::new().unwrap();
    let factory = Arc::new(RecordingFactory::default());
    let mut original = unit_with(&factory, tmp.path(), &["users"]);
    original.set_temp_backup_dir(Some(tmp.path().join("w1")));
    let conn_id = identity(original.connection());

    let mut copy = original.new_copy();
    assert!(copy.temp_backup_dir().is_none());
    assert_eq!(copy.description(), format!("MySQL database in file {}", tmp.path().join("db1.sql").display()));

    original.tables_mut().push(DbTable::new("orders"));
    copy.backup().unwrap();

    let calls = factory.calls();
    assert_eq!(calls[0], Call::CreateBackupHandler(conn_id));
    assert_eq!(calls.iter().filter(|c| matches!(c, Call::AddTable(_))).count(), 1);
}

fn names(db: &std::path::Path, sql: &str) -> Vec<String> {
    let conn = Connection::open(db).unwrap();
    let mut stmt = conn.prepare(sql).unwrap();
    let rows = stmt.query_map([], |row| row.get::<_, String>(0)).unwrap().map(Result::unwrap).collect();
    rows
}

#[test]
fn sqlite_round_trip_leaves_undeclared_tables_alone() {
    let tmp = TempDir::new().unwrap();
    let db_file = tmp.path().join("app.sqlite");
    Connection::open(&db_file)
        .unwrap()
        .execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
             CREATE TABLE audit (id INTEGER PRIMARY KEY, entry TEXT);
             INSERT INTO users VALUES (1, 'alice'), (2, 'bob');
             INSERT INTO audit VALUES (1, 'seeded');",
        )
        .unwrap();

    let mut unit = DatabaseEnvironmentUnit::new(
        tmp.path().join("backups"),
        "app.sql",
        Arc::new(DbConnection::sqlite(&db_file)),
        vec![DbTable::new("users")],
    );
    unit.backup().unwrap();
    assert!(tmp.path().join("backups/app.sql").is_file());

    Connection::open(&db_file)
        .unwrap()
        .execute_batch(
            "DELETE FROM users WHERE id = 2;
             INSERT INTO users VALUES (3, 'written by a test');
             INSERT INTO audit VALUES (2, 'test ran');",
        )
        .unwrap();

    assert!(unit.execute_restore_if_necessary().unwrap());
    assert_eq!(names(&db_file, "SELECT name FROM users ORDER BY id"), vec!["alice", "bob"]);
    assert_eq!(names(&db_file, "SELECT entry FROM audit ORDER BY id"), vec!["seeded", "test ran"]);
}

#[test]
fn sqlite_unknown_table_fails_capture_without_artifact() {
    let tmp = TempDir::new().unwrap();
    let db_file = tmp.path().join("app.sqlite");
    Connection::open(&db_file).unwrap().execute_batch("CREATE TABLE users (id INTEGER);").unwrap();

    let mut unit = DatabaseEnvironmentUnit::new(
        tmp.path(),
        "app.sql",
        Arc::new(DbConnection::sqlite(&db_file)),
        vec![DbTable::new("users"), DbTable::new("ghosts")],
    );
    let err = unit.backup().unwrap_err();
    assert!(matches!(err, CleanupError::Database(DatabaseCleanupError::Capture { .. })));
    assert!(matches!(err.root_cause(), Some(HandlerError::InvalidState(_))));
    assert!(!tmp.path().join("app.sql").exists());
}

#[test]
fn engines_without_handlers_fail_at_backup() {
    let tmp = TempDir::new().unwrap();
    let mut unit = DatabaseEnvironmentUnit::new(tmp.path(), "db.sql", connection(), vec![DbTable::new("users")]);

    let err = unit.backup().unwrap_err();
    assert!(matches!(err.root_cause(), Some(HandlerError::NoHandler(_))));
    assert!(!tmp.path().join("db.sql").exists());
}
