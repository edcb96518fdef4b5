use std::fs;
use std::path::{Path, PathBuf};

use ignore::gitignore::Gitignore;
use tracing::{debug, info, warn};

use super::{BackupLocation, EnvironmentUnit};
use crate::error::{CleanupError, HandlerError, Result};
use crate::utils::hash::{TreeNode, build_merkle_tree, diff_trees};
use crate::utils::io::{
    copy_dir_recursive, copy_selected_files, delete_selected_paths, ensure_parent_dir, exclusion_matcher,
    path_with_suffix, remove_if_exists, replace_dir,
};

const FILES_DIR: &str = "files";
const MANIFEST_FILE: &str = "manifest.json";

/// Backs up a directory tree and restores it only when its content changed.
///
/// The artifact is a directory holding a copy of the tree under `files/` and
/// the content-hash tree of that copy in `manifest.json`.
#[derive(Debug, Clone)]
pub struct DirectoryEnvironmentUnit {
    source_dir: PathBuf,
    exclude: Vec<String>,
    location: BackupLocation,
}

impl DirectoryEnvironmentUnit {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        backup_name: impl Into<String>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            exclude: Vec::new(),
            location: BackupLocation::new(backup_dir, backup_name),
        }
    }

    /// Leave out entries matching the given gitignore-style patterns.
    pub fn with_exclusions(mut self, patterns: Vec<String>) -> Self {
        self.exclude = patterns;
        self
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn exclusions(&self) -> &[String] {
        &self.exclude
    }

    fn matcher(&self) -> std::result::Result<Gitignore, HandlerError> {
        Ok(exclusion_matcher(&self.source_dir, &self.exclude)?)
    }

    fn live_tree(&self, matcher: &Gitignore) -> std::result::Result<TreeNode, HandlerError> {
        Ok(build_merkle_tree(&self.source_dir, |path, is_dir| {
            matcher.matched(path, is_dir).is_ignore()
        })?)
    }

    fn capture(&self) -> std::result::Result<PathBuf, HandlerError> {
        if !self.source_dir.is_dir() {
            return Err(HandlerError::Connection {
                target: self.source_dir.display().to_string(),
                reason: "directory not found".into(),
            });
        }
        let matcher = self.matcher()?;
        let artifact = self.location.effective_path();
        ensure_parent_dir(&artifact)?;

        let staging = path_with_suffix(&artifact, ".staging");
        remove_if_exists(&staging)?;
        if let Err(err) = self.write_artifact(&staging, &matcher) {
            let _ = remove_if_exists(&staging);
            return Err(err);
        }
        replace_dir(&staging, &artifact)?;
        Ok(artifact)
    }

    fn write_artifact(&self, staging: &Path, matcher: &Gitignore) -> std::result::Result<(), HandlerError> {
        let files = staging.join(FILES_DIR);
        let copied = copy_dir_recursive(&self.source_dir, &files, |path, is_dir| {
            matcher.matched(path, is_dir).is_ignore()
        })?;
        // hash the copy, not the live tree, so the manifest matches what was saved
        let tree = build_merkle_tree(&files, |_, _| false)?;
        fs::write(staging.join(MANIFEST_FILE), serde_json::to_string_pretty(&tree)?)?;
        debug!(files = copied, hash = %tree.hash, "wrote directory backup");
        Ok(())
    }

    fn restore_from(&self, artifact: &Path) -> std::result::Result<bool, HandlerError> {
        let manifest = artifact.join(MANIFEST_FILE);
        if !manifest.is_file() {
            return Err(HandlerError::MissingBackup(artifact.to_path_buf()));
        }
        let saved: TreeNode = serde_json::from_str(&fs::read_to_string(&manifest)?)?;

        fs::create_dir_all(&self.source_dir)?;
        let matcher = self.matcher()?;
        let live = self.live_tree(&matcher)?;

        let diff = diff_trees(&saved, &live);
        if diff.is_empty() {
            return Ok(false);
        }
        debug!(
            added = diff.added.len(),
            modified = diff.modified.len(),
            deleted = diff.deleted.len(),
            "directory changed since backup"
        );

        // `deleted` holds entries created after the backup
        delete_selected_paths(&self.source_dir, &diff.deleted, |path, is_dir| {
            matcher.matched(path, is_dir).is_ignore()
        })?;
        let mut to_copy = diff.added;
        to_copy.extend(diff.modified);
        to_copy.sort();
        copy_selected_files(&artifact.join(FILES_DIR), &self.source_dir, &to_copy)?;
        Ok(true)
    }
}

impl EnvironmentUnit for DirectoryEnvironmentUnit {
    fn backup(&mut self) -> Result<()> {
        let description = self.description();
        info!("Creating backup of environment unit {}...", description);

        let outcome = self.capture();
        self.location.clear_temp_dir();

        match outcome {
            Ok(artifact) => {
                info!("Successfully created backup of environment unit {} at {}", description, artifact.display());
                Ok(())
            }
            Err(source) => {
                warn!(error = %source, "Backup of environment unit {} failed", description);
                Err(CleanupError::Backup { unit: description, source })
            }
        }
    }

    fn execute_restore_if_necessary(&mut self) -> Result<bool> {
        let description = self.description();
        let artifact = self.location.effective_path();

        let restored = self
            .restore_from(&artifact)
            .map_err(|source| CleanupError::Restore { unit: description.clone(), source })?;
        if restored {
            info!("Restored environment unit {}", description);
        } else {
            info!("No changes in environment unit {}, restore skipped", description);
        }
        Ok(restored)
    }

    fn description(&self) -> String {
        format!(
            "directory {} in backup {}",
            self.source_dir.display(),
            self.location.effective_path().display()
        )
    }

    fn new_copy(&self) -> Box<dyn EnvironmentUnit> {
        Box::new(Self {
            source_dir: self.source_dir.clone(),
            exclude: self.exclude.clone(),
            location: self.location.without_temp_dir(),
        })
    }

    fn location(&self) -> &BackupLocation {
        &self.location
    }

    fn location_mut(&mut self) -> &mut BackupLocation {
        &mut self.location
    }
}
