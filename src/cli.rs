use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// envsnap: back up test-environment resources before a run and restore them after
#[derive(Parser, Debug)]
#[command(name = "envsnap", version, about = "Back up and restore the resources a test run mutates.", long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Environment manifest (defaults to envsnap.json in the current directory or a parent)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
    /// Log handler steps as well
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Back up every unit of the manifest
    Backup {
        /// Write artifacts here instead of each unit's backup directory
        #[arg(long, value_name = "dir")]
        temp_dir: Option<PathBuf>,
    },

    /// Restore every unit whose resource needs it
    Restore {
        /// Read artifacts from here instead of each unit's backup directory
        #[arg(long, value_name = "dir")]
        temp_dir: Option<PathBuf>,
    },

    /// Show the units of the manifest and their backup artifacts
    Describe,

    /// Print CLI version
    Version,
}
