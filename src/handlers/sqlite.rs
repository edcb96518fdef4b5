use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, TransactionBehavior, params};
use tracing::debug;

use super::{BackupHandler, DbConnection, DbTable, DbType, Disconnect, RestoreHandler};
use crate::error::HandlerError;
use crate::utils::io::write_file_atomically;

fn open(connection: &DbConnection) -> Result<(PathBuf, Connection), HandlerError> {
    if connection.db_type != DbType::Sqlite {
        return Err(HandlerError::UnsupportedDbType(connection.db_type.to_string()));
    }
    let path = PathBuf::from(&connection.db_name);
    if !path.is_file() {
        return Err(HandlerError::Connection {
            target: connection.target(),
            reason: "database file not found".into(),
        });
    }
    let session = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX)
        .map_err(|e| HandlerError::Connection {
            target: connection.target(),
            reason: e.to_string(),
        })?;
    Ok((path, session))
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn qualified_name(table: &DbTable) -> String {
    match &table.schema {
        Some(schema) => format!("{}.{}", quote(schema), quote(&table.name)),
        None => quote(&table.name),
    }
}

/// Columns of `table` that get captured, in declaration order.
fn captured_columns(session: &Connection, table: &DbTable) -> Result<Vec<String>, HandlerError> {
    let mut stmt = session.prepare("SELECT name FROM pragma_table_info(?1, ?2) ORDER BY cid")?;
    let all = stmt
        .query_map(params![table.name, table.schema.as_deref().unwrap_or("main")], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    if all.is_empty() {
        return Err(HandlerError::InvalidState(format!("table '{}' does not exist", table.full_name())));
    }
    if let Some(unknown) = table.columns_to_exclude.iter().find(|c| !all.contains(c)) {
        return Err(HandlerError::InvalidState(format!(
            "table '{}' has no column '{}' to exclude",
            table.full_name(),
            unknown
        )));
    }

    let kept: Vec<String> = all.into_iter().filter(|c| !table.columns_to_exclude.contains(c)).collect();
    if kept.is_empty() {
        return Err(HandlerError::InvalidState(format!("every column of '{}' is excluded", table.full_name())));
    }
    Ok(kept)
}

fn sql_literal(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".into(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(f) if f.is_nan() => "NULL".into(),
        ValueRef::Real(f) if f.is_infinite() => (if f > 0.0 { "9e999" } else { "-9e999" }).to_string(),
        // Debug keeps the fraction, so 1.0 stays a REAL
        ValueRef::Real(f) => format!("{:?}", f),
        ValueRef::Text(t) => format!("'{}'", String::from_utf8_lossy(t).replace('\'', "''")),
        ValueRef::Blob(b) => format!("X'{}'", hex::encode(b)),
    }
}

/// SQL script that puts the current rows of `tables` back when replayed.
fn dump_tables(
    session: &Connection,
    tables: &[DbTable],
    disable_foreign_keys: bool,
    include_delete_statements: bool,
) -> Result<String, HandlerError> {
    let mut script = format!("-- envsnap sqlite backup of {} table(s)\n", tables.len());
    // must precede BEGIN, sqlite ignores it inside a transaction
    script.push_str(if disable_foreign_keys {
        "PRAGMA foreign_keys = OFF;\n"
    } else {
        "PRAGMA foreign_keys = ON;\n"
    });
    script.push_str("BEGIN;\n");

    for table in tables {
        let columns = captured_columns(session, table)?;
        let column_list = columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ");
        let target = qualified_name(table);
        let condition = table.filter.as_deref().map(|f| format!(" WHERE ({})", f)).unwrap_or_default();

        if include_delete_statements {
            script.push_str(&format!("DELETE FROM {}{};\n", target, condition));
        }

        let mut stmt = session.prepare(&format!("SELECT {} FROM {}{}", column_list, target, condition))?;
        let mut rows = stmt.query([])?;
        let mut count = 0usize;
        while let Some(row) = rows.next()? {
            let values = (0..columns.len())
                .map(|i| row.get_ref(i).map(sql_literal))
                .collect::<Result<Vec<_>, _>>()?;
            script.push_str(&format!("INSERT INTO {} ({}) VALUES ({});\n", target, column_list, values.join(", ")));
            count += 1;
        }
        debug!(table = %table.full_name(), rows = count, "dumped table");
    }

    script.push_str("COMMIT;\n");
    Ok(script)
}

/// Captures the registered tables of an SQLite database as a replayable SQL
/// script. Tables that were not registered are never touched.
#[derive(Debug)]
pub struct SqliteBackupHandler {
    db_file: PathBuf,
    session: Option<Connection>,
    lock_tables: bool,
    disable_foreign_keys: bool,
    include_delete_statements: bool,
    tables: Vec<DbTable>,
}

impl SqliteBackupHandler {
    pub fn new(connection: &DbConnection) -> Result<Self, HandlerError> {
        let (db_file, session) = open(connection)?;
        Ok(Self {
            db_file,
            session: Some(session),
            lock_tables: true,
            disable_foreign_keys: true,
            include_delete_statements: true,
            tables: Vec::new(),
        })
    }

    fn session(&self) -> Result<&Connection, HandlerError> {
        self.session
            .as_ref()
            .ok_or_else(|| HandlerError::InvalidState("backup handler is disconnected".into()))
    }
}

impl Disconnect for SqliteBackupHandler {
    fn disconnect(&mut self) {
        if self.session.take().is_some() {
            debug!(db = %self.db_file.display(), "closed sqlite backup session");
        }
    }
}

impl BackupHandler for SqliteBackupHandler {
    fn set_lock_tables(&mut self, lock_tables: bool) -> Result<(), HandlerError> {
        self.session()?;
        self.lock_tables = lock_tables;
        Ok(())
    }

    fn set_foreign_key_check(&mut self, disable_foreign_keys: bool) -> Result<(), HandlerError> {
        self.session()?;
        self.disable_foreign_keys = disable_foreign_keys;
        Ok(())
    }

    fn set_include_delete_statements(&mut self, include: bool) -> Result<(), HandlerError> {
        self.session()?;
        self.include_delete_statements = include;
        Ok(())
    }

    fn add_table(&mut self, table: &DbTable) -> Result<(), HandlerError> {
        if self.tables.iter().any(|t| t.full_name() == table.full_name()) {
            return Err(HandlerError::InvalidState(format!("table '{}' registered twice", table.full_name())));
        }
        captured_columns(self.session()?, table)?;
        self.tables.push(table.clone());
        Ok(())
    }

    fn create_backup(&mut self, path: &Path) -> Result<(), HandlerError> {
        // a write lock keeps other writers out while the tables are read
        let behavior = if self.lock_tables && self.tables.iter().any(|t| t.lock) {
            TransactionBehavior::Immediate
        } else {
            TransactionBehavior::Deferred
        };
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| HandlerError::InvalidState("backup handler is disconnected".into()))?;

        let tx = session.transaction_with_behavior(behavior)?;
        let script = dump_tables(&tx, &self.tables, self.disable_foreign_keys, self.include_delete_statements)?;
        tx.finish()?;

        debug!(db = %self.db_file.display(), backup = %path.display(), tables = self.tables.len(), "writing sqlite backup");
        write_file_atomically(path, script.as_bytes())?;
        Ok(())
    }
}

/// Replays an SQLite backup script in one transaction; on failure the
/// database is left as it was.
#[derive(Debug)]
pub struct SqliteRestoreHandler {
    db_file: PathBuf,
    session: Option<Connection>,
}

impl SqliteRestoreHandler {
    pub fn new(connection: &DbConnection) -> Result<Self, HandlerError> {
        let (db_file, session) = open(connection)?;
        Ok(Self { db_file, session: Some(session) })
    }
}

impl Disconnect for SqliteRestoreHandler {
    fn disconnect(&mut self) {
        if self.session.take().is_some() {
            debug!(db = %self.db_file.display(), "closed sqlite restore session");
        }
    }
}

impl RestoreHandler for SqliteRestoreHandler {
    fn restore(&mut self, path: &Path) -> Result<(), HandlerError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| HandlerError::InvalidState("restore handler is disconnected".into()))?;
        if !path.is_file() {
            return Err(HandlerError::MissingBackup(path.to_path_buf()));
        }
        let script = fs::read_to_string(path)?;
        debug!(db = %self.db_file.display(), backup = %path.display(), "replaying sqlite backup");

        if let Err(err) = session.execute_batch(&script) {
            if !session.is_autocommit() {
                let _ = session.execute_batch("ROLLBACK;");
            }
            return Err(err.into());
        }
        Ok(())
    }
}
