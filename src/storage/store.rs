//! Revocation store.
//!
//! Steady-state persistence for every worker: a sorted set scored by
//! revocation time plus a scalar clock, both addressed through
//! [`KeyNamespace`]. Every call names the worker explicitly; the store keeps
//! no per-worker state of its own.
//!
//! Writes go straight to the backend with no local buffering. Within one
//! worker, writes are applied in call order.

use crate::core::error::{StateDbError, StateDbResult};
use crate::core::time::Timestamp;
use crate::state::{ClockValue, KeyNamespace, RevokedEntry, RevokedSet, WorkerIdentity};
use crate::storage::backend::KvBackend;

/// Result of a bulk merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// Entries written (new or updated).
    pub entries_merged: usize,
    /// Whether the clock was overwritten.
    pub clock_applied: bool,
}

/// Per-worker revoked set and clock persistence.
#[derive(Debug)]
pub struct RevocationStore<B> {
    backend: B,
    namespace: KeyNamespace,
}

impl<B: KvBackend> RevocationStore<B> {
    /// Create a store over a backend and namespace.
    pub fn new(backend: B, namespace: KeyNamespace) -> Self {
        Self { backend, namespace }
    }

    /// The key namespace.
    pub fn namespace(&self) -> &KeyNamespace {
        &self.namespace
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Read every revoked entry for a worker. A missing key yields an empty set.
    pub fn load(&self, worker: &WorkerIdentity) -> StateDbResult<RevokedSet> {
        let keys = self.namespace.keys_for(worker)?;
        let members = self.backend.zrange_with_scores(&keys.revoked_key)?;
        let mut set = RevokedSet::new();
        for (task_id, score) in members {
            let revoked_at = score_to_timestamp(&keys.revoked_key, score)?;
            set.insert(RevokedEntry::new(task_id, revoked_at));
        }
        tracing::debug!(worker = %worker, entries = set.len(), "loaded revoked set");
        Ok(set)
    }

    /// Read the worker's clock. A missing key yields `None`.
    pub fn load_clock(&self, worker: &WorkerIdentity) -> StateDbResult<Option<ClockValue>> {
        let keys = self.namespace.keys_for(worker)?;
        let Some(raw) = self.backend.get(&keys.clock_key)? else {
            return Ok(None);
        };
        let text = std::str::from_utf8(&raw)
            .map_err(|_| StateDbError::invalid_value(&keys.clock_key, "clock is not UTF-8"))?;
        let value = text.trim().parse::<u64>().map_err(|_| {
            StateDbError::invalid_value(
                &keys.clock_key,
                format!("clock is not a non-negative integer: {:?}", text),
            )
        })?;
        Ok(Some(ClockValue(value)))
    }

    /// Upsert one entry. A repeated task id takes the latest timestamp written.
    pub fn add_revoked(&self, worker: &WorkerIdentity, entry: &RevokedEntry) -> StateDbResult<()> {
        let keys = self.namespace.keys_for(worker)?;
        self.backend.zadd(
            &keys.revoked_key,
            &[(entry.task_id.clone(), entry.revoked_at.as_secs_f64())],
        )?;
        tracing::debug!(worker = %worker, task_id = %entry.task_id, "added revoked task");
        Ok(())
    }

    /// Record a revocation stamped with the current wall clock.
    pub fn record_now(&self, worker: &WorkerIdentity, task_id: &str) -> StateDbResult<RevokedEntry> {
        let entry = RevokedEntry::new(task_id, Timestamp::now());
        self.add_revoked(worker, &entry)?;
        Ok(entry)
    }

    /// Check whether a task id is in the worker's revoked set.
    pub fn is_revoked(&self, worker: &WorkerIdentity, task_id: &str) -> StateDbResult<bool> {
        let keys = self.namespace.keys_for(worker)?;
        Ok(self.backend.zscore(&keys.revoked_key, task_id)?.is_some())
    }

    /// Overwrite the worker's clock unconditionally.
    pub fn set_clock(&self, worker: &WorkerIdentity, value: ClockValue) -> StateDbResult<()> {
        let keys = self.namespace.keys_for(worker)?;
        self.backend
            .set(&keys.clock_key, value.get().to_string().as_bytes())?;
        tracing::debug!(worker = %worker, clock = value.get(), "set clock");
        Ok(())
    }

    /// Increment the worker's clock and return the new value.
    pub fn increment_clock(&self, worker: &WorkerIdentity) -> StateDbResult<ClockValue> {
        let keys = self.namespace.keys_for(worker)?;
        let value = self.backend.incr(&keys.clock_key)?;
        let value = u64::try_from(value).map_err(|_| {
            StateDbError::invalid_value(&keys.clock_key, format!("negative clock {}", value))
        })?;
        Ok(ClockValue(value))
    }

    /// Bulk upsert used by migration and shutdown sync.
    ///
    /// Every entry is upserted as in [`add_revoked`](Self::add_revoked). The
    /// clock is overwritten only when one is given; `None` leaves whatever the
    /// store already holds for the worker.
    pub fn merge(
        &self,
        worker: &WorkerIdentity,
        entries: &RevokedSet,
        clock: Option<ClockValue>,
    ) -> StateDbResult<MergeOutcome> {
        let keys = self.namespace.keys_for(worker)?;
        let mut outcome = MergeOutcome::default();

        if !entries.is_empty() {
            let members: Vec<(String, f64)> = entries
                .iter()
                .map(|entry| (entry.task_id, entry.revoked_at.as_secs_f64()))
                .collect();
            self.backend.zadd(&keys.revoked_key, &members)?;
            outcome.entries_merged = members.len();
        }

        if let Some(clock) = clock {
            self.set_clock(worker, clock)?;
            outcome.clock_applied = true;
        }

        tracing::debug!(
            worker = %worker,
            entries = outcome.entries_merged,
            clock_applied = outcome.clock_applied,
            "merged revoked state"
        );
        Ok(outcome)
    }

    /// Remove entries with `revoked_at < cutoff`. Returns the removed count.
    pub fn purge_older_than(&self, worker: &WorkerIdentity, cutoff: Timestamp) -> StateDbResult<u64> {
        let keys = self.namespace.keys_for(worker)?;
        let removed = self
            .backend
            .zremrange_below(&keys.revoked_key, cutoff.as_secs_f64())?;
        if removed > 0 {
            tracing::info!(worker = %worker, removed, cutoff = %cutoff, "purged revoked tasks");
        }
        Ok(removed)
    }

    /// Delete the worker's whole revoked set. The clock is kept.
    pub fn clear_revoked(&self, worker: &WorkerIdentity) -> StateDbResult<bool> {
        let keys = self.namespace.keys_for(worker)?;
        let existed = self.backend.del(&keys.revoked_key)?;
        tracing::info!(worker = %worker, existed, "cleared revoked tasks");
        Ok(existed)
    }

    /// Every worker with a revoked set under this namespace.
    pub fn discover_workers(&self) -> StateDbResult<Vec<WorkerIdentity>> {
        let keys = self
            .backend
            .scan_keys(&self.namespace.revoked_scan_pattern())?;
        let mut workers: Vec<WorkerIdentity> = keys
            .iter()
            .filter_map(|key| self.namespace.worker_from_revoked_key(key))
            .collect();
        workers.sort();
        workers.dedup();
        Ok(workers)
    }

    /// Check the backend is reachable.
    pub fn ping(&self) -> StateDbResult<()> {
        self.backend.ping()
    }
}

fn score_to_timestamp(key: &str, score: f64) -> StateDbResult<Timestamp> {
    Timestamp::from_secs_f64(score)
        .ok_or_else(|| StateDbError::invalid_value(key, format!("invalid score {}", score)))
}
