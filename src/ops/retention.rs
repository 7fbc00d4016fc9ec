//! Retention sweeping.
//!
//! Administrative batch purge of old revoked entries. Runs out of band, on
//! an operator schedule, never on a worker's hot path. Sweeping every
//! worker scans the store's keyspace and is O(number of keys).

use crate::core::error::StateDbResult;
use crate::core::time::Timestamp;
use crate::state::WorkerIdentity;
use crate::storage::{KvBackend, RevocationStore};
use std::time::Duration;

/// Which worker namespaces a sweep covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerSelector {
    /// A single worker.
    One(WorkerIdentity),
    /// Every worker with a revoked set under the store's prefix.
    All,
}

impl From<WorkerIdentity> for WorkerSelector {
    fn from(worker: WorkerIdentity) -> Self {
        Self::One(worker)
    }
}

/// Per-worker results of a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub cutoff: Option<Timestamp>,
    pub removed: Vec<(WorkerIdentity, u64)>,
}

impl SweepReport {
    /// Total entries removed across all workers.
    pub fn total(&self) -> u64 {
        self.removed.iter().map(|(_, n)| n).sum()
    }
}

/// Purges revoked entries older than a threshold.
#[derive(Debug)]
pub struct RetentionSweeper<'a, B> {
    store: &'a RevocationStore<B>,
}

impl<'a, B: KvBackend> RetentionSweeper<'a, B> {
    pub fn new(store: &'a RevocationStore<B>) -> Self {
        Self { store }
    }

    /// Remove entries revoked more than `older_than` ago. Returns the total.
    pub fn purge_old_revoked_tasks(
        &self,
        older_than: Duration,
        target: &WorkerSelector,
    ) -> StateDbResult<u64> {
        Ok(self.sweep(older_than, target, Timestamp::now())?.total())
    }

    /// Sweep with an explicit notion of "now".
    ///
    /// Entries with `revoked_at < now - older_than` are removed. The first
    /// store failure stops the sweep and is returned.
    pub fn sweep(
        &self,
        older_than: Duration,
        target: &WorkerSelector,
        now: Timestamp,
    ) -> StateDbResult<SweepReport> {
        let cutoff = now.saturating_sub(older_than);
        let workers = match target {
            WorkerSelector::One(worker) => vec![worker.clone()],
            WorkerSelector::All => self.store.discover_workers()?,
        };
        tracing::debug!(workers = workers.len(), cutoff = %cutoff, "retention sweep starting");

        let mut report = SweepReport {
            cutoff: Some(cutoff),
            removed: Vec::with_capacity(workers.len()),
        };
        for worker in workers {
            let removed = self.store.purge_older_than(&worker, cutoff).map_err(|e| {
                tracing::error!(worker = %worker, error = %e, "retention sweep failed");
                e
            })?;
            report.removed.push((worker, removed));
        }

        tracing::info!(
            workers = report.removed.len(),
            removed = report.total(),
            cutoff = %cutoff.to_rfc3339(),
            "retention sweep finished"
        );
        Ok(report)
    }
}
