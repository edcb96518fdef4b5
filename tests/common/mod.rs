#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use envsnap::handlers::Disconnect;
use envsnap::{BackupHandler, DbConnection, DbTable, HandlerError, HandlerFactory, RestoreHandler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateBackupHandler(usize),
    CreateRestoreHandler(usize),
    SetLockTables(bool),
    SetForeignKeyCheck(bool),
    SetIncludeDeleteStatements(bool),
    AddTable(String),
    CreateBackup(PathBuf),
    Restore(PathBuf),
    Disconnect,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// Factory whose handlers record every call and fail where told to.
#[derive(Default)]
pub struct RecordingFactory {
    pub calls: CallLog,
    pub fail_create: bool,
    pub fail_backup: bool,
    pub fail_restore: bool,
}

impl RecordingFactory {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.calls().iter().filter(|c| **c == Call::Disconnect).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Address of the connection a handler was created for.
pub fn identity(connection: &DbConnection) -> usize {
    connection as *const DbConnection as usize
}

impl HandlerFactory for RecordingFactory {
    fn create_backup_handler(&self, connection: &DbConnection) -> Result<Box<dyn BackupHandler>, HandlerError> {
        self.record(Call::CreateBackupHandler(identity(connection)));
        if self.fail_create {
            return Err(HandlerError::Connection {
                target: connection.target(),
                reason: "connection refused".into(),
            });
        }
        Ok(Box::new(RecordingBackup { calls: self.calls.clone(), fail: self.fail_backup }))
    }

    fn create_restore_handler(&self, connection: &DbConnection) -> Result<Box<dyn RestoreHandler>, HandlerError> {
        self.record(Call::CreateRestoreHandler(identity(connection)));
        if self.fail_create {
            return Err(HandlerError::Connection {
                target: connection.target(),
                reason: "connection refused".into(),
            });
        }
        Ok(Box::new(RecordingRestore { calls: self.calls.clone(), fail: self.fail_restore }))
    }
}

struct RecordingBackup {
    calls: CallLog,
    fail: bool,
}

impl Disconnect for RecordingBackup {
    fn disconnect(&mut self) {
        self.calls.lock().unwrap().push(Call::Disconnect);
    }
}

impl BackupHandler for RecordingBackup {
    fn set_lock_tables(&mut self, lock_tables: bool) -> Result<(), HandlerError> {
        self.calls.lock().unwrap().push(Call::SetLockTables(lock_tables));
        Ok(())
    }

    fn set_foreign_key_check(&mut self, disable_foreign_keys: bool) -> Result<(), HandlerError> {
        self.calls.lock().unwrap().push(Call::SetForeignKeyCheck(disable_foreign_keys));
        Ok(())
    }

    fn set_include_delete_statements(&mut self, include: bool) -> Result<(), HandlerError> {
        self.calls.lock().unwrap().push(Call::SetIncludeDeleteStatements(include));
        Ok(())
    }

    fn add_table(&mut self, table: &DbTable) -> Result<(), HandlerError> {
        self.calls.lock().unwrap().push(Call::AddTable(table.name.clone()));
        Ok(())
    }

    fn create_backup(&mut self, path: &Path) -> Result<(), HandlerError> {
        self.calls.lock().unwrap().push(Call::CreateBackup(path.to_path_buf()));
        if self.fail {
            return Err(HandlerError::Io(std::io::Error::other("disk full")));
        }
        fs::write(path, "-- backup")?;
        Ok(())
    }
}

struct RecordingRestore {
    calls: CallLog,
    fail: bool,
}

impl Disconnect for RecordingRestore {
    fn disconnect(&mut self) {
        self.calls.lock().unwrap().push(Call::Disconnect);
    }
}

impl RestoreHandler for RecordingRestore {
    fn restore(&mut self, path: &Path) -> Result<(), HandlerError> {
        self.calls.lock().unwrap().push(Call::Restore(path.to_path_buf()));
        if self.fail {
            return Err(HandlerError::MissingBackup(path.to_path_buf()));
        }
        Ok(())
    }
}
