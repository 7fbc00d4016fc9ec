//! Inspect command implementation.

use crate::legacy;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// Decode a legacy state file without touching the store.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Legacy state file.
    pub path: PathBuf,

    /// Print every revoked entry.
    #[arg(short, long)]
    pub entries: bool,
}

/// Run the inspect command.
pub fn run_inspect(args: InspectArgs) -> Result<()> {
    let snapshot = legacy::read(&args.path)?;

    println!("File:    {}", args.path.display());
    println!("Schema:  {}", snapshot.schema_version);
    match snapshot.clock {
        Some(clock) => println!("Clock:   {}", clock),
        None => println!("Clock:   (none)"),
    }
    println!("Revoked: {}", snapshot.revoked.len());
    if args.entries {
        for entry in snapshot.revoked.by_revocation_time() {
            println!("  {}  {}", entry.revoked_at.to_rfc3339(), entry.task_id);
        }
    }
    Ok(())
}
