use std::sync::Arc;

use once_cell::sync::Lazy;

use super::sqlite::{SqliteBackupHandler, SqliteRestoreHandler};
use super::{BackupHandler, DbConnection, DbType, RestoreHandler};
use crate::error::HandlerError;

/// Produces the backup/restore handler pair matching a connection.
pub trait HandlerFactory: Send + Sync {
    fn create_backup_handler(&self, connection: &DbConnection) -> Result<Box<dyn BackupHandler>, HandlerError>;

    fn create_restore_handler(&self, connection: &DbConnection) -> Result<Box<dyn RestoreHandler>, HandlerError>;
}

/// Stateless factory choosing handlers by the connection's database type.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentHandlerFactory;

static SHARED: Lazy<Arc<EnvironmentHandlerFactory>> = Lazy::new(|| Arc::new(EnvironmentHandlerFactory));

impl EnvironmentHandlerFactory {
    /// The process-wide instance.
    pub fn shared() -> Arc<dyn HandlerFactory> {
        let shared: Arc<EnvironmentHandlerFactory> = Arc::clone(&SHARED);
        shared
    }
}

impl HandlerFactory for EnvironmentHandlerFactory {
    fn create_backup_handler(&self, connection: &DbConnection) -> Result<Box<dyn BackupHandler>, HandlerError> {
        match connection.db_type {
            DbType::Sqlite => Ok(Box::new(SqliteBackupHandler::new(connection)?)),
            other => Err(HandlerError::NoHandler(other.to_string())),
        }
    }

    fn create_restore_handler(&self, connection: &DbConnection) -> Result<Box<dyn RestoreHandler>, HandlerError> {
        match connection.db_type {
            DbType::Sqlite => Ok(Box::new(SqliteRestoreHandler::new(connection)?)),
            other => Err(HandlerError::NoHandler(other.to_string())),
        }
    }
}
