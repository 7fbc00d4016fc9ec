//! Ping command implementation.

use crate::core::config::Config;
use crate::core::runtime::StateDb;
use anyhow::Result;
use clap::Args;

/// Check store connectivity.
#[derive(Args, Debug)]
pub struct PingArgs {}

/// Run the ping command.
pub fn run_ping(config: &Config, _args: PingArgs) -> Result<()> {
    let db = StateDb::from_config(config)?;
    db.ping()?;
    println!("PONG from {}", db.store().backend().url());
    Ok(())
}
