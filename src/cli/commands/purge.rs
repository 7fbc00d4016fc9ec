//! Purge command implementation.

use crate::core::config::Config;
use crate::core::runtime::StateDb;
use crate::ops::retention::WorkerSelector;
use crate::state::WorkerIdentity;
use anyhow::Result;
use clap::Args;
use std::time::Duration;

/// Purge old revoked entries.
#[derive(Args, Debug)]
#[command(group(clap::ArgGroup::new("target").required(true).args(["worker", "all"])))]
pub struct PurgeArgs {
    /// Remove entries revoked more than this many seconds ago.
    #[arg(long)]
    pub older_than_secs: u64,

    /// Purge a single worker.
    #[arg(short, long)]
    pub worker: Option<String>,

    /// Purge every worker under the key prefix.
    #[arg(long)]
    pub all: bool,
}

/// Run the purge command.
pub fn run_purge(config: &Config, args: PurgeArgs) -> Result<()> {
    let target = match args.worker {
        Some(worker) => WorkerSelector::One(WorkerIdentity::new(worker)),
        None => WorkerSelector::All,
    };

    let db = StateDb::from_config(config)?;
    let removed = db.purge_old(Duration::from_secs(args.older_than_secs), &target)?;
    println!("Removed {} revoked entries", removed);
    Ok(())
}
