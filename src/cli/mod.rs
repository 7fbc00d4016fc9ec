//! Command-line interface.
//!
//! Administrative CLI over the worker state database.

pub mod commands;

use crate::core::config::ConfigOverrides;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// worker-statedb - revoked task persistence for workers.
#[derive(Parser, Debug)]
#[command(name = "worker-statedb")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Store URL, overriding the configuration.
    #[arg(long, global = true)]
    pub store_url: Option<String>,

    /// Key prefix, overriding the configuration.
    #[arg(long, global = true)]
    pub key_prefix: Option<String>,

    /// Legacy state file, overriding `migration.legacy_path`.
    #[arg(long, global = true)]
    pub legacy_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Configuration overrides taken from the global flags.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log_level: self.log_level.clone(),
            store_url: self.store_url.clone(),
            key_prefix: self.key_prefix.clone(),
            legacy_path: self.legacy_path.clone(),
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a worker's revoked set and clock.
    Load(commands::LoadArgs),
    /// Record a task revocation.
    Revoke(commands::RevokeArgs),
    /// Migrate a legacy state file into the store.
    Migrate(commands::MigrateArgs),
    /// Retry the final rename of a migration.
    Finalize(commands::FinalizeArgs),
    /// Purge old revoked entries.
    Purge(commands::PurgeArgs),
    /// Decode a legacy state file without touching the store.
    Inspect(commands::InspectArgs),
    /// Check store connectivity.
    Ping(commands::PingArgs),
}
