//! Load command implementation.

use crate::core::config::Config;
use crate::core::runtime::StateDb;
use crate::state::WorkerIdentity;
use anyhow::Result;
use clap::Args;

/// Print a worker's revoked set and clock.
#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Worker identity, e.g. `celery@host`.
    #[arg(short, long)]
    pub worker: String,
}

/// Run the load command.
pub fn run_load(config: &Config, args: LoadArgs) -> Result<()> {
    let db = StateDb::from_config(config)?;
    let worker = WorkerIdentity::new(args.worker);
    let (revoked, clock) = db.load_state(&worker)?;

    println!("Worker: {}", worker);
    match clock {
        Some(clock) => println!("Clock:  {}", clock),
        None => println!("Clock:  (none)"),
    }
    println!("Revoked: {}", revoked.len());
    for entry in revoked.by_revocation_time() {
        println!("  {}  {}", entry.revoked_at.to_rfc3339(), entry.task_id);
    }
    Ok(())
}
