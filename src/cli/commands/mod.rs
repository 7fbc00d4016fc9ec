//! CLI command implementations.

mod finalize;
mod inspect;
mod load;
mod migrate;
mod ping;
mod purge;
mod revoke;

pub use finalize::{run_finalize, FinalizeArgs};
pub use inspect::{run_inspect, InspectArgs};
pub use load::{run_load, LoadArgs};
pub use migrate::{run_migrate, MigrateArgs};
pub use ping::{run_ping, PingArgs};
pub use purge::{run_purge, PurgeArgs};
pub use revoke::{run_revoke, RevokeArgs};

use crate::core::config::{Config, ConfigOverrides};
use crate::ops::telemetry::init_tracing;
use anyhow::{Context, Result};
use std::path::Path;

/// Default configuration file, used when present and no `--config` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/worker-statedb.toml";

/// Load configuration, apply overrides and install logging.
pub fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {:?}", path))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Config::from_file(Path::new(DEFAULT_CONFIG_PATH))?
        }
        None => Config::default(),
    };
    config.apply_overrides(overrides);
    config.validate().context("invalid configuration")?;

    init_tracing(&config.telemetry.log_level);
    Ok(config)
}
