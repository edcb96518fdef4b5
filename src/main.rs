mod cli;
mod ops;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "envsnap=debug" } else { "envsnap=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Backup { temp_dir } => {
            ops::do_backup(cli.config, temp_dir)?;
        }
        Commands::Restore { temp_dir } => {
            ops::do_restore(cli.config, temp_dir)?;
        }
        Commands::Describe => {
            ops::do_describe(cli.config)?;
        }
        Commands::Version => {
            ops::do_version();
        }
    }

    Ok(())
}
