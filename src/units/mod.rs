use std::path::{Path, PathBuf};

use crate::error::Result;

pub mod database;
pub mod directory;
pub mod location;

pub use database::{CaptureOptions, DatabaseEnvironmentUnit};
pub use directory::DirectoryEnvironmentUnit;
pub use location::BackupLocation;

/// One independently backed up and restored resource of the test
/// environment.
///
/// Calls on a single instance must be serialized by the caller. Parallel
/// workers each take their own instance from [`EnvironmentUnit::new_copy`].
pub trait EnvironmentUnit: Send {
    /// Capture the resource into the unit's artifact, overwriting any earlier
    /// one. Any temporary directory override is cleared afterwards, whether
    /// the backup succeeded or not.
    fn backup(&mut self) -> Result<()>;

    /// Restore the resource from the artifact. Returns whether a restore was
    /// actually performed.
    fn execute_restore_if_necessary(&mut self) -> Result<bool>;

    /// Resource identity and effective artifact path, for logs.
    fn description(&self) -> String;

    /// An independent unit for the same resource: per-run state is copied,
    /// identity (such as the connection) is shared.
    fn new_copy(&self) -> Box<dyn EnvironmentUnit>;

    fn location(&self) -> &BackupLocation;

    fn location_mut(&mut self) -> &mut BackupLocation;

    fn temp_backup_dir(&self) -> Option<&Path> {
        self.location().temp_dir()
    }

    fn set_temp_backup_dir(&mut self, dir: Option<PathBuf>) {
        self.location_mut().set_temp_dir(dir);
    }

    fn backup_file(&self) -> PathBuf {
        self.location().effective_path()
    }
}
