use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{BackupLocation, EnvironmentUnit};
use crate::error::{CleanupAction, DatabaseCleanupError, HandlerError, Result};
use crate::handlers::{
    BackupHandler, Connected, DbConnection, DbTable, EnvironmentHandlerFactory, HandlerFactory, TestBox,
};

/// How tables are captured. Everything is on unless turned off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    pub lock_tables: bool,
    pub disable_foreign_keys: bool,
    pub include_delete_statements: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            lock_tables: true,
            disable_foreign_keys: true,
            include_delete_statements: true,
        }
    }
}

/// Backs up and restores a set of tables of one database.
///
/// The connection is borrowed: the unit never closes it, it only releases the
/// handlers it creates on top of it.
pub struct DatabaseEnvironmentUnit {
    factory: Arc<dyn HandlerFactory>,
    connection: Arc<DbConnection>,
    tables: Vec<DbTable>,
    options: CaptureOptions,
    location: BackupLocation,
}

impl DatabaseEnvironmentUnit {
    pub fn new(
        backup_dir: impl Into<PathBuf>,
        backup_file_name: impl Into<String>,
        connection: Arc<DbConnection>,
        tables: Vec<DbTable>,
    ) -> Self {
        Self::with_factory(
            backup_dir,
            backup_file_name,
            connection,
            tables,
            EnvironmentHandlerFactory::shared(),
        )
    }

    /// Build the unit from test box credentials, deriving the connection.
    pub fn from_test_box(
        backup_dir: impl Into<PathBuf>,
        backup_file_name: impl Into<String>,
        test_box: &TestBox,
        custom_properties: BTreeMap<String, serde_json::Value>,
        tables: Vec<DbTable>,
    ) -> Result<Self> {
        let connection = DbConnection::from_test_box(test_box, custom_properties).map_err(|source| {
            DatabaseCleanupError::InvalidDescriptor {
                unit: format!("{} database {} on {}", test_box.db_type, test_box.db_name, test_box.host),
                source,
            }
        })?;
        Ok(Self::new(backup_dir, backup_file_name, Arc::new(connection), tables))
    }

    pub fn with_factory(
        backup_dir: impl Into<PathBuf>,
        backup_file_name: impl Into<String>,
        connection: Arc<DbConnection>,
        tables: Vec<DbTable>,
        factory: Arc<dyn HandlerFactory>,
    ) -> Self {
        Self {
            factory,
            connection,
            tables,
            options: CaptureOptions::default(),
            location: BackupLocation::new(backup_dir, backup_file_name),
        }
    }

    pub fn set_factory(&mut self, factory: Arc<dyn HandlerFactory>) {
        self.factory = factory;
    }

    pub fn connection(&self) -> &Arc<DbConnection> {
        &self.connection
    }

    pub fn set_connection(&mut self, connection: Arc<DbConnection>) {
        self.connection = connection;
    }

    pub fn tables(&self) -> &[DbTable] {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut Vec<DbTable> {
        &mut self.tables
    }

    pub fn options(&self) -> CaptureOptions {
        self.options
    }

    pub fn set_options(&mut self, options: CaptureOptions) {
        self.options = options;
    }

    /// A copy with its own table list and no temporary override, sharing the
    /// connection and the factory.
    pub fn duplicate(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            connection: Arc::clone(&self.connection),
            tables: self.tables.clone(),
            options: self.options,
            location: self.location.without_temp_dir(),
        }
    }

    /// Create the handler into `slot` and run the capture through it. The
    /// caller owns the slot so it decides when the handler gets released.
    fn capture(&self, slot: &mut Option<Connected<dyn BackupHandler>>, unit: &str) -> Result<()> {
        let created = self.factory.create_backup_handler(&self.connection).map_err(|source| {
            DatabaseCleanupError::Connection {
                action: CleanupAction::Backup,
                unit: unit.to_string(),
                source,
            }
        })?;
        let handler = slot.insert(Connected::new(created));
        let failed = |source: HandlerError| DatabaseCleanupError::Capture {
            unit: unit.to_string(),
            source,
        };

        handler.set_lock_tables(self.options.lock_tables).map_err(failed)?;
        handler.set_foreign_key_check(self.options.disable_foreign_keys).map_err(failed)?;
        handler
            .set_include_delete_statements(self.options.include_delete_statements)
            .map_err(failed)?;
        debug!(options = ?self.options, "applied capture options");

        for table in &self.tables {
            handler.add_table(table).map_err(failed)?;
            debug!(table = %table.full_name(), "registered table");
        }

        let backup_file = self.location.prepare().map_err(|e| failed(e.into()))?;
        handler.create_backup(&backup_file).map_err(failed)?;
        Ok(())
    }
}

impl EnvironmentUnit for DatabaseEnvironmentUnit {
    fn backup(&mut self) -> Result<()> {
        let description = self.description();
        info!("Creating backup of environment unit {}...", description);

        let mut handler = None;
        let outcome = self.capture(&mut handler, &description);
        self.location.clear_temp_dir();
        drop(handler);

        match &outcome {
            Ok(()) => info!("Successfully created backup of environment unit {}", description),
            Err(err) => warn!(error = %err, "Backup of environment unit {} failed", description),
        }
        outcome
    }

    fn execute_restore_if_necessary(&mut self) -> Result<bool> {
        let description = self.description();
        let backup_file = self.location.effective_path();

        let created = self.factory.create_restore_handler(&self.connection).map_err(|source| {
            DatabaseCleanupError::Connection {
                action: CleanupAction::Restore,
                unit: description.clone(),
                source,
            }
        })?;
        let mut handler = Connected::new(created);

        info!("Restoring environment unit {}...", description);
        handler.restore(&backup_file).map_err(|source| DatabaseCleanupError::Restore {
            unit: description.clone(),
            source,
        })?;
        info!("Restored environment unit {}", description);

        // database data is always restored, changed or not
        Ok(true)
    }

    fn description(&self) -> String {
        format!(
            "{} database in file {}",
            self.connection.db_type,
            self.location.effective_path().display()
        )
    }

    fn new_copy(&self) -> Box<dyn EnvironmentUnit> {
        Box::new(self.duplicate())
    }

    fn location(&self) -> &BackupLocation {
        &self.location
    }

    fn location_mut(&mut self) -> &mut BackupLocation {
        &mut self.location
    }
}
