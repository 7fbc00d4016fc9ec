//! Storage layer.
//!
//! # Modules
//!
//! - [`backend`] - Backing store trait and the in-process backend
//! - [`store`] - Per-worker revoked set and clock persistence
//!
//! # Invariants
//!
//! - **Namespace isolation**: a worker only ever touches its own two keys
//! - **Clock no-regression**: a bulk merge without a clock leaves the stored clock as is
//! - **Strict retention cutoff**: purges remove `revoked_at < cutoff`, never `==`

pub mod backend;
pub mod store;

pub use backend::{KvBackend, MemoryBackend};
pub use store::{MergeOutcome, RevocationStore};
