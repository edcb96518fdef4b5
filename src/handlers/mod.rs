use std::ops::{Deref, DerefMut};
use std::path::Path;

use crate::error::HandlerError;

pub mod factory;
pub mod model;
pub mod sqlite;

pub use factory::{EnvironmentHandlerFactory, HandlerFactory};
pub use model::{DbConnection, DbTable, DbType, TestBox};

/// Releases whatever the handler holds on the live resource.
///
/// Must be safe to call more than once.
pub trait Disconnect {
    fn disconnect(&mut self);
}

/// Captures the current state of a database into a backup artifact.
///
/// Options are applied before any table is registered; implementations may
/// validate their accumulated state on every call.
pub trait BackupHandler: Disconnect {
    fn set_lock_tables(&mut self, lock_tables: bool) -> Result<(), HandlerError>;

    /// `true` suspends foreign key checks while the backup is replayed.
    fn set_foreign_key_check(&mut self, disable_foreign_keys: bool) -> Result<(), HandlerError>;

    fn set_include_delete_statements(&mut self, include: bool) -> Result<(), HandlerError>;

    fn add_table(&mut self, table: &DbTable) -> Result<(), HandlerError>;

    /// Write the backup artifact, overwriting any previous one at `path`.
    fn create_backup(&mut self, path: &Path) -> Result<(), HandlerError>;
}

/// Replays a backup artifact onto the live database.
pub trait RestoreHandler: Disconnect {
    fn restore(&mut self, path: &Path) -> Result<(), HandlerError>;
}

/// A handler that gets disconnected exactly once when the guard goes out of
/// scope, whichever way the scope is left.
pub struct Connected<H: Disconnect + ?Sized> {
    handler: Box<H>,
}

impl<H: Disconnect + ?Sized> Connected<H> {
    pub fn new(handler: Box<H>) -> Self {
        Self { handler }
    }
}

impl<H: Disconnect + ?Sized> Deref for Connected<H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.handler
    }
}

impl<H: Disconnect + ?Sized> DerefMut for Connected<H> {
    fn deref_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}

impl<H: Disconnect + ?Sized> Drop for Connected<H> {
    fn drop(&mut self) {
        self.handler.disconnect();
    }
}
