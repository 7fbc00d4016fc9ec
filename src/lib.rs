//! worker-statedb - Networked persistence for a worker's revoked tasks.
//!
//! Each worker process keeps the set of task ids it must never execute plus
//! a logical clock. This crate stores both in a shared key-value store
//! (Redis protocol), one independent namespace per worker identity, and
//! migrates the single-file snapshots older deployments kept on local disk.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   StateDb (caller facade)                       │
//! │  load_state │ record_revocation │ sync │ migrate │ purge_old     │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                      │                      │
//! ┌─────────────────┐  ┌─────────────────────┐  ┌──────────────────┐
//! │  StateMigrator  │  │  RevocationStore    │  │ RetentionSweeper │
//! │ backup → merge  │─▶│  per-worker ZSET    │◀─│  scan + purge    │
//! │    → rename     │  │  + clock string     │  │                  │
//! └─────────────────┘  └─────────────────────┘  └──────────────────┘
//!          │                      │
//! ┌─────────────────┐  ┌─────────────────────┐
//! │ Legacy reader   │  │ KvBackend           │
//! │ v1 │ v2 │ v3    │  │ RespBackend (RESP2) │
//! └─────────────────┘  └─────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - `StateDb` facade and retry policy
//! - [`core::time`] - Wall-clock timestamps
//! - [`core::error`] - Error types
//!
//! ## State
//! - [`state`] - Worker identity, revoked entries, clock
//! - [`state::namespace`] - Per-worker key derivation
//!
//! ## Storage
//! - [`storage::backend`] - Backend trait and in-memory backend
//! - [`storage::store`] - Revocation store
//!
//! ## Adapters
//! - [`adapters::redis`] - RESP2 client backend
//!
//! ## Legacy and migration
//! - [`legacy`] - Legacy snapshot decoding (schemas 1-3)
//! - [`migration`] - Backup, merge and rename state machine
//!
//! ## Operations
//! - [`ops::retention`] - Age-based purge
//! - [`ops::telemetry`] - Log subscriber setup
//!
//! ## CLI
//! - [`cli::commands`] - CLI command implementations
//!
//! # Key Invariants
//!
//! - Worker namespaces never share keys; no locking is needed between workers
//! - An absent clock never overwrites a stored clock; a present one always does
//! - Purge removes entries strictly older than the cutoff
//! - Migration never deletes or rewrites the legacy file; it is backed up and renamed

// Core infrastructure
pub mod core;

// State model
pub mod state;

// Storage layer
pub mod storage;

// Backing store adapters
pub mod adapters;

// Legacy snapshot decoding
pub mod legacy;

// Migration
pub mod migration;

// Operations
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::error::{StateDbError, StateDbResult};
pub use self::core::runtime::{RetryPolicy, StateDb};
pub use self::core::time::Timestamp;
pub use self::core::{config, error, runtime, time};
pub use adapters::{RedisUrl, RespBackend};
pub use legacy::{LegacySnapshot, SchemaVersion};
pub use migration::{MigrationFailure, MigrationOutcome, MigrationReport, MigrationState, StateMigrator};
pub use ops::retention::{RetentionSweeper, WorkerSelector};
pub use state::{ClockValue, KeyNamespace, RevokedEntry, RevokedSet, WorkerIdentity, WorkerKeys};
pub use storage::{KvBackend, MemoryBackend, MergeOutcome, RevocationStore};
