//! Worker state model.
//!
//! A worker's persisted state is its revoked-task set plus an optional
//! logical clock. Each worker identity owns an independent namespace; there
//! is no state shared between workers.
//!
//! - [`namespace`] - Key derivation per worker identity

pub mod namespace;

use crate::core::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use namespace::{KeyNamespace, WorkerKeys};

/// Stable name scoping one process's persisted state, typically `name@host`.
///
/// Opaque: never parsed for structure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerIdentity(String);

impl WorkerIdentity {
    /// Wrap a worker name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The raw identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for WorkerIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A single revoked task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevokedEntry {
    /// Opaque task identifier, never reused.
    pub task_id: String,
    /// Wall-clock moment of revocation.
    pub revoked_at: Timestamp,
}

impl RevokedEntry {
    /// Create a new entry.
    pub fn new(task_id: impl Into<String>, revoked_at: Timestamp) -> Self {
        Self {
            task_id: task_id.into(),
            revoked_at,
        }
    }
}

/// Revoked entries keyed by task id.
///
/// Inserting a task id that is already present replaces its timestamp
/// (last write wins).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokedSet {
    entries: BTreeMap<String, Timestamp>,
}

impl RevokedSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert an entry, returning the timestamp it replaced.
    pub fn insert(&mut self, entry: RevokedEntry) -> Option<Timestamp> {
        self.entries.insert(entry.task_id, entry.revoked_at)
    }

    /// Look up the revocation time of a task.
    pub fn get(&self, task_id: &str) -> Option<Timestamp> {
        self.entries.get(task_id).copied()
    }

    /// Check membership.
    pub fn contains(&self, task_id: &str) -> bool {
        self.entries.contains_key(task_id)
    }

    /// Number of distinct task ids.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in task-id order.
    pub fn iter(&self) -> impl Iterator<Item = RevokedEntry> + '_ {
        self.entries
            .iter()
            .map(|(task_id, ts)| RevokedEntry::new(task_id.clone(), *ts))
    }

    /// Task ids in task-id order.
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries ordered oldest first, ties broken by task id.
    pub fn by_revocation_time(&self) -> Vec<RevokedEntry> {
        let mut entries: Vec<RevokedEntry> = self.iter().collect();
        entries.sort_by(|a, b| {
            a.revoked_at
                .cmp(&b.revoked_at)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        entries
    }
}

impl FromIterator<RevokedEntry> for RevokedSet {
    fn from_iter<I: IntoIterator<Item = RevokedEntry>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<RevokedEntry> for RevokedSet {
    fn extend<I: IntoIterator<Item = RevokedEntry>>(&mut self, iter: I) {
        for entry in iter {
            self.insert(entry);
        }
    }
}

/// A worker's logical clock value.
///
/// Absence is expressed as `Option<ClockValue>`, never as a sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClockValue(pub u64);

impl ClockValue {
    /// Raw counter value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ClockValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
