use std::io;
use std::path::{Path, PathBuf};

use crate::utils::io::ensure_parent_dir;

/// Where a unit keeps its single backup artifact.
///
/// The artifact lives at `temp_dir.unwrap_or(backup_dir) / file_name`. The
/// temporary directory lets a runner redirect a unit copy to a location
/// private to one parallel worker; it belongs to this instance only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLocation {
    backup_dir: PathBuf,
    file_name: String,
    temp_dir: Option<PathBuf>,
}

impl BackupLocation {
    pub fn new(backup_dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            file_name: file_name.into(),
            temp_dir: None,
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn temp_dir(&self) -> Option<&Path> {
        self.temp_dir.as_deref()
    }

    pub fn set_temp_dir(&mut self, dir: Option<PathBuf>) {
        self.temp_dir = dir;
    }

    pub fn clear_temp_dir(&mut self) {
        self.temp_dir = None;
    }

    pub fn effective_path(&self) -> PathBuf {
        self.temp_dir
            .as_deref()
            .unwrap_or(&self.backup_dir)
            .join(&self.file_name)
    }

    /// Resolve the artifact path and create its directory when missing.
    pub fn prepare(&self) -> io::Result<PathBuf> {
        let path = self.effective_path();
        ensure_parent_dir(&path)?;
        Ok(path)
    }

    /// Same addressing, no temporary override.
    pub fn without_temp_dir(&self) -> Self {
        Self {
            backup_dir: self.backup_dir.clone(),
            file_name: self.file_name.clone(),
            temp_dir: None,
        }
    }
}
