use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CleanupError, Result};
use crate::handlers::{DbTable, DbType, EnvironmentHandlerFactory, HandlerFactory, TestBox};
use crate::runner::UnitSet;
use crate::units::{CaptureOptions, DatabaseEnvironmentUnit, DirectoryEnvironmentUnit, EnvironmentUnit};

pub const MANIFEST_NAME: &str = "envsnap.json";

/// The environment manifest: which resources a test run protects and where
/// their backups go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Default backup directory for units that do not name one.
    pub backup_dir: PathBuf,
    pub units: Vec<UnitConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UnitConfig {
    Database {
        file_name: String,
        #[serde(default)]
        backup_dir: Option<PathBuf>,
        test_box: TestBox,
        #[serde(default)]
        custom_properties: BTreeMap<String, serde_json::Value>,
        #[serde(default)]
        tables: Vec<DbTable>,
        #[serde(default)]
        options: CaptureOptions,
    },
    Directory {
        path: PathBuf,
        file_name: String,
        #[serde(default)]
        backup_dir: Option<PathBuf>,
        #[serde(default)]
        exclude: Vec<String>,
    },
}

impl EnvironmentConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CleanupError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let mut cfg: EnvironmentConfig = serde_json::from_str(&content)
            .map_err(|e| CleanupError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        if let Some(base) = path.parent() {
            cfg.resolve_relative_to(base);
        }
        Ok(cfg)
    }

    /// Make every relative path in the manifest relative to `base`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.backup_dir);
        for unit in &mut self.units {
            match unit {
                UnitConfig::Database { backup_dir, test_box, .. } => {
                    if let Some(dir) = backup_dir {
                        resolve(dir);
                    }
                    if test_box.db_type.parse::<DbType>().ok() == Some(DbType::Sqlite) {
                        let mut db_file = PathBuf::from(&test_box.db_name);
                        resolve(&mut db_file);
                        test_box.db_name = db_file.to_string_lossy().into_owned();
                    }
                }
                UnitConfig::Directory { path, backup_dir, .. } => {
                    resolve(path);
                    if let Some(dir) = backup_dir {
                        resolve(dir);
                    }
                }
            }
        }
    }

    pub fn build_units(&self) -> Result<UnitSet> {
        self.build_units_with(EnvironmentHandlerFactory::shared())
    }

    /// Construct every unit; connections are derived from their test boxes
    /// here, so a bad descriptor fails before anything is backed up.
    pub fn build_units_with(&self, factory: Arc<dyn HandlerFactory>) -> Result<UnitSet> {
        if self.units.is_empty() {
            return Err(CleanupError::Config("manifest declares no units".into()));
        }

        let mut set = UnitSet::default();
        for unit in &self.units {
            let built: Box<dyn EnvironmentUnit> = match unit {
                UnitConfig::Database { file_name, backup_dir, test_box, custom_properties, tables, options } => {
                    let dir = backup_dir.clone().unwrap_or_else(|| self.backup_dir.clone());
                    let mut unit = DatabaseEnvironmentUnit::from_test_box(
                        dir,
                        file_name.clone(),
                        test_box,
                        custom_properties.clone(),
                        tables.clone(),
                    )?;
                    unit.set_factory(Arc::clone(&factory));
                    unit.set_options(*options);
                    Box::new(unit)
                }
                UnitConfig::Directory { path, file_name, backup_dir, exclude } => {
                    let dir = backup_dir.clone().unwrap_or_else(|| self.backup_dir.clone());
                    Box::new(DirectoryEnvironmentUnit::new(path.clone(), dir, file_name.clone()).with_exclusions(exclude.clone()))
                }
            };
            set.push(built);
        }
        Ok(set)
    }
}

/// Look for the manifest in `start` and its parents.
pub fn find_manifest(start: &Path) -> Result<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(MANIFEST_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }
    Err(CleanupError::Config(format!(
        "no {} found in {} or its parents",
        MANIFEST_NAME,
        start.display()
    )))
}
