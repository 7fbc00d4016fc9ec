//! Administrative operations.
//!
//! - [`retention`] - Age-based purge of revoked entries
//! - [`telemetry`] - Log subscriber setup

pub mod retention;
pub mod telemetry;
