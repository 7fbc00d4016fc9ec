//! Core infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Caller-facing facade and retry policy
//! - [`time`] - Wall-clock timestamps
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod runtime;
pub mod time;
