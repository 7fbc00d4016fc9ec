//! Finalize command implementation.

use crate::core::config::Config;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// Retry the final rename of a migration.
#[derive(Args, Debug)]
pub struct FinalizeArgs {
    /// Legacy file (default: migration.legacy_path).
    #[arg(short, long)]
    pub path: Option<PathBuf>,
}

/// Run the finalize command.
pub fn run_finalize(config: &Config, args: FinalizeArgs) -> Result<()> {
    let migrator = config.migration.migrator(args.path.as_deref())?;
    let marker = migrator.finalize()?;
    println!("Finalized: {}", marker.display());
    Ok(())
}
