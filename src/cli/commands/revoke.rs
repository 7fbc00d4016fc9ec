//! Revoke command implementation.

use crate::core::config::Config;
use crate::core::runtime::StateDb;
use crate::core::time::Timestamp;
use crate::state::WorkerIdentity;
use anyhow::{Context, Result};
use clap::Args;

/// Record a task revocation.
#[derive(Args, Debug)]
pub struct RevokeArgs {
    /// Worker identity.
    #[arg(short, long)]
    pub worker: String,

    /// Task id to revoke.
    #[arg(short, long)]
    pub task_id: String,

    /// Revocation time in seconds since the epoch (default: now).
    #[arg(long)]
    pub at: Option<f64>,
}

/// Run the revoke command.
pub fn run_revoke(config: &Config, args: RevokeArgs) -> Result<()> {
    let revoked_at = match args.at {
        Some(secs) => Timestamp::from_secs_f64(secs)
            .with_context(|| format!("invalid revocation time: {}", secs))?,
        None => Timestamp::now(),
    };

    let db = StateDb::from_config(config)?;
    let worker = WorkerIdentity::new(args.worker);
    db.record_revocation(&worker, &args.task_id, revoked_at)?;

    println!(
        "Revoked {} for {} at {}",
        args.task_id,
        worker,
        revoked_at.to_rfc3339()
    );
    Ok(())
}
