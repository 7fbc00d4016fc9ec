//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use worker_statedb::{
    KeyNamespace, MemoryBackend, RevocationStore, RevokedEntry, RevokedSet, Timestamp,
    WorkerIdentity,
};

/// A store over a fresh in-memory backend with the default prefix.
pub fn memory_store() -> RevocationStore<MemoryBackend> {
    RevocationStore::new(MemoryBackend::new(), KeyNamespace::default())
}

/// A store over a fresh in-memory backend with a custom prefix.
pub fn memory_store_with_prefix(prefix: &str) -> RevocationStore<MemoryBackend> {
    RevocationStore::new(
        MemoryBackend::new(),
        KeyNamespace::new(prefix).expect("valid prefix"),
    )
}

/// A worker identity.
pub fn worker(name: &str) -> WorkerIdentity {
    WorkerIdentity::new(name)
}

/// Build a revoked set from `(task_id, seconds)` pairs.
pub fn revoked(entries: &[(&str, u64)]) -> RevokedSet {
    entries
        .iter()
        .map(|(id, secs)| RevokedEntry::new(*id, Timestamp::from_secs(*secs)))
        .collect()
}

/// Write legacy snapshot bytes to `dir/name`.
pub fn write_legacy(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("Failed to write legacy file");
    path
}

/// Create a configuration file with the given TOML content.
pub fn create_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Task ids of a set, in task-id order.
pub fn task_ids(set: &RevokedSet) -> Vec<String> {
    set.task_ids().map(str::to_string).collect()
}
