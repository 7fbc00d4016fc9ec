//! worker-statedb - CLI entrypoint.
//!
//! Usage:
//!   worker-statedb load --worker celery@host
//!   worker-statedb revoke --worker celery@host --task-id <id>
//!   worker-statedb migrate --worker celery@host --path /var/run/celery/worker.db
//!   worker-statedb finalize --path /var/run/celery/worker.db
//!   worker-statedb purge --older-than-secs 86400 --all
//!   worker-statedb inspect /var/run/celery/worker.db
//!   worker-statedb ping

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use worker_statedb::cli::commands::{
    load_config, run_finalize, run_inspect, run_load, run_migrate, run_ping, run_purge,
    run_revoke,
};
use worker_statedb::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = cli.overrides();
    let config_path = cli.config.map(PathBuf::from);
    let config = load_config(config_path.as_deref(), &overrides)?;

    match cli.command {
        Commands::Load(args) => run_load(&config, args),
        Commands::Revoke(args) => run_revoke(&config, args),
        Commands::Migrate(args) => run_migrate(&config, args),
        Commands::Finalize(args) => run_finalize(&config, args),
        Commands::Purge(args) => run_purge(&config, args),
        Commands::Inspect(args) => run_inspect(args),
        Commands::Ping(args) => run_ping(&config, args),
    }
}
