use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::Result;
use crate::units::EnvironmentUnit;

/// Outcome of restoring a whole set of units.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub skipped: usize,
}

/// The units protected during one test run, processed in declaration order.
#[derive(Default)]
pub struct UnitSet {
    units: Vec<Box<dyn EnvironmentUnit>>,
    temp_dir: Option<PathBuf>,
}

impl UnitSet {
    pub fn new(units: Vec<Box<dyn EnvironmentUnit>>) -> Self {
        Self { units, temp_dir: None }
    }

    pub fn push(&mut self, unit: Box<dyn EnvironmentUnit>) {
        self.units.push(unit);
    }

    pub fn units(&self) -> &[Box<dyn EnvironmentUnit>] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn temp_dir(&self) -> Option<&Path> {
        self.temp_dir.as_deref()
    }

    /// Send every artifact to `dir` instead of each unit's backup directory.
    /// Units clear their override after each backup, so it is re-applied
    /// before every call. With `None`, overrides placed on the units
    /// themselves are left in charge.
    pub fn set_temp_dir(&mut self, dir: Option<PathBuf>) {
        self.temp_dir = dir;
    }

    /// Independent copies of all units, redirected to `temp_dir`, for one
    /// parallel worker.
    pub fn fork(&self, temp_dir: impl Into<PathBuf>) -> UnitSet {
        UnitSet {
            units: self.units.iter().map(|u| u.new_copy()).collect(),
            temp_dir: Some(temp_dir.into()),
        }
    }

    /// Back up every unit, stopping at the first failure.
    pub fn backup_all(&mut self) -> Result<()> {
        for unit in &mut self.units {
            if let Some(dir) = &self.temp_dir {
                unit.set_temp_backup_dir(Some(dir.clone()));
            }
            unit.backup()?;
        }
        info!(units = self.units.len(), "environment backed up");
        Ok(())
    }

    /// Restore every unit. All units are attempted; the first failure is
    /// returned once the rest have been processed.
    pub fn restore_all(&mut self) -> Result<RestoreReport> {
        let mut report = RestoreReport::default();
        let mut first_error = None;

        for unit in &mut self.units {
            let outcome = match &self.temp_dir {
                Some(dir) => {
                    unit.set_temp_backup_dir(Some(dir.clone()));
                    let outcome = unit.execute_restore_if_necessary();
                    unit.set_temp_backup_dir(None);
                    outcome
                }
                None => unit.execute_restore_if_necessary(),
            };
            match outcome {
                Ok(true) => report.restored += 1,
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    warn!(error = %err, "restore failed, continuing with remaining units");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                info!(restored = report.restored, skipped = report.skipped, "environment restored");
                Ok(report)
            }
        }
    }
}
