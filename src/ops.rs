use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use colored::*;
use comfy_table::{Attribute, Cell, ContentArrangement, Table, presets::UTF8_FULL};
use indicatif::{ProgressBar, ProgressStyle};

use envsnap::UnitSet;
use envsnap::config::{EnvironmentConfig, find_manifest};

fn load_units(config: Option<PathBuf>) -> Result<UnitSet> {
    let path = match config {
        Some(path) => path,
        None => find_manifest(&std::env::current_dir()?)?,
    };
    let cfg = EnvironmentConfig::load(&path)?;
    let units = cfg
        .build_units()
        .with_context(|| format!("invalid units in {}", path.display()))?;
    Ok(units)
}

pub fn do_backup(config: Option<PathBuf>, temp_dir: Option<PathBuf>) -> Result<()> {
    let mut units = load_units(config)?;
    units.set_temp_dir(temp_dir);

    let bar = create_progress_bar(&format!("Backing up {} unit(s)", units.len()));
    let outcome = units.backup_all();
    bar.finish_and_clear();
    outcome?;

    println!(
        "{} {}",
        "✔".green().bold(),
        format!("Backed up {} unit(s)", units.len()).green()
    );
    Ok(())
}

pub fn do_restore(config: Option<PathBuf>, temp_dir: Option<PathBuf>) -> Result<()> {
    let mut units = load_units(config)?;
    units.set_temp_dir(temp_dir);

    let bar = create_progress_bar(&format!("Restoring {} unit(s)", units.len()));
    let outcome = units.restore_all();
    bar.finish_and_clear();
    let report = outcome?;

    println!(
        "{} {}",
        "✔".green().bold(),
        format!("Restored {} unit(s)", report.restored).green()
    );
    if report.skipped > 0 {
        println!(
            "{} {}",
            "i".yellow().bold(),
            format!("{} unit(s) unchanged, restore skipped", report.skipped).yellow()
        );
    }
    Ok(())
}

pub fn do_describe(config: Option<PathBuf>) -> Result<()> {
    let units = load_units(config)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("Unit").add_attribute(Attribute::Bold),
            Cell::new("Backup").add_attribute(Attribute::Bold),
            Cell::new("Taken").add_attribute(Attribute::Bold),
        ]);

    for (i, unit) in units.units().iter().enumerate() {
        let artifact = unit.backup_file();
        let taken = std::fs::metadata(&artifact)
            .and_then(|m| m.modified())
            .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string());
        let (present, taken) = match taken {
            Ok(ts) => ("yes", ts),
            Err(_) => ("no", "-".to_string()),
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(unit.description()),
            Cell::new(present),
            Cell::new(taken),
        ]);
    }

    println!("{}", table);
    Ok(())
}

fn create_progress_bar(prefix: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style.tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "));
    }
    bar.set_message(prefix.to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(80));
    bar
}

pub fn do_version() {
    println!("{} {}", "envsnap".bold(), env!("CARGO_PKG_VERSION").cyan());
}
