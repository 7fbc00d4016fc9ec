//! Migrate command implementation.

use crate::core::config::Config;
use crate::core::runtime::StateDb;
use crate::migration::MigrationOutcome;
use crate::state::WorkerIdentity;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// Migrate a legacy state file into the store.
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Worker identity whose namespace receives the state.
    #[arg(short, long)]
    pub worker: String,

    /// Legacy file (default: migration.legacy_path).
    #[arg(short, long)]
    pub path: Option<PathBuf>,
}

/// Run the migrate command.
pub fn run_migrate(config: &Config, args: MigrateArgs) -> Result<()> {
    let migrator = config.migration.migrator(args.path.as_deref())?;
    let db = StateDb::from_config(config)?;
    let worker = WorkerIdentity::new(args.worker);

    let report = match db.migrate_with(&migrator, &worker) {
        Ok(report) => report,
        Err(failure) if failure.is_partial_success() => {
            println!("State merged into the store, but the legacy file was not renamed.");
            if let Some(backup) = &failure.backup_path {
                println!("Backup: {}", backup.display());
            }
            println!("Run `worker-statedb finalize` to retry the rename.");
            return Err(failure.into());
        }
        Err(failure) => return Err(failure.into()),
    };

    match report.outcome {
        MigrationOutcome::NoLegacyFile => {
            println!("No legacy file at {}", migrator.legacy_path().display());
        }
        MigrationOutcome::AlreadyFinalized => {
            println!("Already migrated: {}", migrator.marker_path().display());
        }
        MigrationOutcome::Completed => {
            if let Some(version) = report.schema_version {
                println!("Schema:  {}", version);
            }
            println!("Merged:  {} entries", report.entries_merged);
            println!("Clock:   {}", if report.clock_applied { "applied" } else { "unchanged" });
            if let Some(backup) = &report.backup_path {
                println!("Backup:  {}", backup.display());
            }
            if let Some(marker) = &report.marker_path {
                println!("Renamed: {}", marker.display());
            }
        }
    }
    Ok(())
}
