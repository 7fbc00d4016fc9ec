//! Caller-facing facade.
//!
//! [`StateDb`] bundles a [`RevocationStore`] with a [`RetryPolicy`] and
//! exposes the operations a host process calls:
//! - startup: [`load_state`](StateDb::load_state), optionally [`migrate`](StateDb::migrate)
//! - on revoke: [`record_revocation`](StateDb::record_revocation)
//! - on shutdown: [`sync`](StateDb::sync)
//! - on an operator schedule: [`purge_old`](StateDb::purge_old)
//!
//! Every failure is logged here before being returned, so a store outage is
//! visible even when the host ignores the error.

use crate::adapters::RespBackend;
use crate::core::config::Config;
use crate::core::error::StateDbResult;
use crate::core::time::Timestamp;
use crate::migration::{MigrationFailure, MigrationReport, StateMigrator};
use crate::ops::retention::{RetentionSweeper, WorkerSelector};
use crate::state::{ClockValue, RevokedEntry, RevokedSet, WorkerIdentity};
use crate::storage::{KvBackend, MergeOutcome, RevocationStore};
use anyhow::Context;
use std::path::Path;
use std::time::Duration;

/// Longest pause between two attempts.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Exponential backoff for [`StoreUnavailable`](crate::StateDbError::StoreUnavailable).
///
/// The store never retries on its own; this policy is applied by the facade.
/// Any other error is returned on the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }

    /// Run `op`, retrying while it fails with a retriable error.
    pub fn run<T>(
        &self,
        operation: &str,
        mut op: impl FnMut() -> StateDbResult<T>,
    ) -> StateDbResult<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retriable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "store unavailable, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Worker state database.
#[derive(Debug)]
pub struct StateDb<B> {
    store: RevocationStore<B>,
    retry: RetryPolicy,
}

impl StateDb<RespBackend> {
    /// Build a database talking to the configured store.
    ///
    /// No connection is opened until the first operation.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let backend = RespBackend::from_url(&config.store.url, config.store.connect_options())
            .with_context(|| format!("invalid store url: {}", config.store.url))?;
        let store = RevocationStore::new(backend, config.store.namespace()?);
        Ok(Self::new(store, config.retry.policy()))
    }
}

impl<B: KvBackend> StateDb<B> {
    pub fn new(store: RevocationStore<B>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &RevocationStore<B> {
        &self.store
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Revoked set and clock for a worker, read at startup.
    pub fn load_state(
        &self,
        worker: &WorkerIdentity,
    ) -> StateDbResult<(RevokedSet, Option<ClockValue>)> {
        self.observed("load_state", worker, || {
            let revoked = self.store.load(worker)?;
            let clock = self.store.load_clock(worker)?;
            Ok((revoked, clock))
        })
    }

    /// Persist one revocation immediately.
    pub fn record_revocation(
        &self,
        worker: &WorkerIdentity,
        task_id: &str,
        revoked_at: Timestamp,
    ) -> StateDbResult<()> {
        let entry = RevokedEntry::new(task_id, revoked_at);
        self.observed("record_revocation", worker, || {
            self.store.add_revoked(worker, &entry)
        })
    }

    /// Check whether a task is revoked for a worker.
    pub fn is_revoked(&self, worker: &WorkerIdentity, task_id: &str) -> StateDbResult<bool> {
        self.observed("is_revoked", worker, || self.store.is_revoked(worker, task_id))
    }

    /// Bulk write of in-memory state, typically at shutdown.
    ///
    /// Same rule as migration: the clock is written only when present.
    pub fn sync(
        &self,
        worker: &WorkerIdentity,
        revoked: &RevokedSet,
        clock: Option<ClockValue>,
    ) -> StateDbResult<MergeOutcome> {
        self.observed("sync", worker, || self.store.merge(worker, revoked, clock))
    }

    /// Migrate the legacy file at `path` with default backup and marker names.
    pub fn migrate(
        &self,
        path: &Path,
        worker: &WorkerIdentity,
    ) -> Result<MigrationReport, MigrationFailure> {
        self.migrate_with(&StateMigrator::new(path), worker)
    }

    /// Migrate using a preconfigured migrator.
    ///
    /// Not retried: a failed run is safe to repeat and the caller decides when.
    pub fn migrate_with(
        &self,
        migrator: &StateMigrator,
        worker: &WorkerIdentity,
    ) -> Result<MigrationReport, MigrationFailure> {
        migrator.migrate(&self.store, worker)
    }

    /// Purge entries revoked more than `older_than` ago.
    pub fn purge_old(&self, older_than: Duration, target: &WorkerSelector) -> StateDbResult<u64> {
        let sweeper = RetentionSweeper::new(&self.store);
        self.retry
            .run("purge_old", || sweeper.purge_old_revoked_tasks(older_than, target))
            .map_err(|e| {
                tracing::error!(target_workers = ?target, error = %e, "purge_old failed");
                e
            })
    }

    /// Check the store is reachable.
    pub fn ping(&self) -> StateDbResult<()> {
        self.retry.run("ping", || self.store.ping())
    }

    fn observed<T>(
        &self,
        operation: &str,
        worker: &WorkerIdentity,
        op: impl FnMut() -> StateDbResult<T>,
    ) -> StateDbResult<T> {
        self.retry.run(operation, op).map_err(|e| {
            tracing::error!(operation, worker = %worker, error = %e, "state operation failed");
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::StateDbError;
    use std::cell::Cell;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(40), MAX_RETRY_DELAY);
    }

    #[test]
    fn retries_only_unavailable() {
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let calls = Cell::new(0);
        let result: StateDbResult<()> = policy.run("test", || {
            calls.set(calls.get() + 1);
            Err(StateDbError::unavailable("down"))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);

        calls.set(0);
        let result: StateDbResult<()> = policy.run("test", || {
            calls.set(calls.get() + 1);
            Err(StateDbError::invalid_value("k", "bad"))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn zero_attempts_clamps_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }
}
