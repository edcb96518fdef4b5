//! Snapshot and restore of test-environment resources.
//!
//! An [`EnvironmentUnit`] protects one resource (a set of database tables, a
//! directory tree): it is backed up before a test suite mutates it and
//! restored afterwards. Resource-specific work is delegated to handlers
//! obtained from a [`HandlerFactory`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod runner;
pub mod units;
mod utils;

pub use error::{CleanupError, DatabaseCleanupError, HandlerError, Result};
pub use handlers::{
    BackupHandler, DbConnection, DbTable, DbType, EnvironmentHandlerFactory, HandlerFactory, RestoreHandler,
    TestBox,
};
pub use runner::{RestoreReport, UnitSet};
pub use units::{
    BackupLocation, CaptureOptions, DatabaseEnvironmentUnit, DirectoryEnvironmentUnit, EnvironmentUnit,
};
