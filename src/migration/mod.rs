//! Legacy snapshot migration.
//!
//! Moves a worker's legacy file into the [`RevocationStore`] through a
//! small state machine:
//!
//! ```text
//! NotStarted --backup--> BackedUp --decode+merge--> Merged --rename--> Finalized
//!      |                    |                          |
//!      +--------------------+------------> Aborted <---+
//! ```
//!
//! Progress is never kept in memory across runs. Each run observes which
//! files exist (original, backup, marker) and resumes from there:
//!
//! | original | backup | marker | state |
//! |----------|--------|--------|-------|
//! | present  | absent | -      | NotStarted |
//! | present  | present| -      | BackedUp |
//! | absent   | -      | present| Finalized |
//!
//! Re-running after a crash repeats the backup (a no-op when an identical
//! copy exists) and the merge (upserts are idempotent). The original file
//! is renamed, never deleted, and only after the store write succeeded.
//!
//! - [`files`] - Backup and marker file operations

pub mod files;

use crate::core::error::StateDbError;
use crate::legacy::{self, SchemaVersion};
use crate::state::WorkerIdentity;
use crate::storage::{KvBackend, RevocationStore};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default suffix for the pre-migration backup copy.
pub const DEFAULT_BACKUP_SUFFIX: &str = ".bak";
/// Default suffix the original is renamed to once migration completes.
pub const DEFAULT_MARKER_SUFFIX: &str = ".migrated";

/// Migration progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationState {
    NotStarted,
    BackedUp,
    Merged,
    Finalized,
    Aborted,
}

impl std::fmt::Display for MigrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotStarted => "not-started",
            Self::BackedUp => "backed-up",
            Self::Merged => "merged",
            Self::Finalized => "finalized",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The legacy file was merged and renamed during this run.
    Completed,
    /// An earlier run already finished; nothing was written.
    AlreadyFinalized,
    /// No legacy file and no marker; there is nothing to migrate.
    NoLegacyFile,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub outcome: MigrationOutcome,
    pub schema_version: Option<SchemaVersion>,
    pub entries_merged: usize,
    pub clock_applied: bool,
    pub backup_path: Option<PathBuf>,
    pub marker_path: Option<PathBuf>,
}

impl MigrationReport {
    fn empty(outcome: MigrationOutcome, marker_path: Option<PathBuf>) -> Self {
        Self {
            outcome,
            schema_version: None,
            entries_merged: 0,
            clock_applied: false,
            backup_path: None,
            marker_path,
        }
    }

    /// Final state of the machine.
    pub fn state(&self) -> MigrationState {
        match self.outcome {
            MigrationOutcome::NoLegacyFile => MigrationState::NotStarted,
            _ => MigrationState::Finalized,
        }
    }
}

/// A run that stopped before `Finalized`.
///
/// `state` is the last state the run reached; the machine itself is
/// `Aborted`. When `state` is `Merged`, the store already holds the legacy
/// state and only [`StateMigrator::finalize`] needs retrying.
#[derive(Debug, Error)]
#[error("migration aborted after reaching {state}: {source}")]
pub struct MigrationFailure {
    pub state: MigrationState,
    pub backup_path: Option<PathBuf>,
    #[source]
    pub source: StateDbError,
}

impl MigrationFailure {
    /// Check if only the rename step failed.
    pub fn is_partial_success(&self) -> bool {
        self.state == MigrationState::Merged && self.source.is_partial_success()
    }
}

/// Migrates one legacy file into the store.
#[derive(Debug, Clone)]
pub struct StateMigrator {
    legacy_path: PathBuf,
    backup_path: PathBuf,
    marker_path: PathBuf,
}

impl StateMigrator {
    /// Create a migrator using the default `.bak` and `.migrated` suffixes.
    pub fn new(legacy_path: impl Into<PathBuf>) -> Self {
        Self::with_suffixes(legacy_path, DEFAULT_BACKUP_SUFFIX, DEFAULT_MARKER_SUFFIX)
    }

    /// Create a migrator with custom suffixes.
    pub fn with_suffixes(
        legacy_path: impl Into<PathBuf>,
        backup_suffix: &str,
        marker_suffix: &str,
    ) -> Self {
        let legacy_path = legacy_path.into();
        Self {
            backup_path: files::with_suffix(&legacy_path, backup_suffix),
            marker_path: files::with_suffix(&legacy_path, marker_suffix),
            legacy_path,
        }
    }

    pub fn legacy_path(&self) -> &Path {
        &self.legacy_path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    /// Derive the current state from the filesystem.
    ///
    /// `Merged` is never observable: a crash after the merge looks like
    /// `BackedUp`, and re-running the merge is harmless.
    pub fn observe(&self) -> MigrationState {
        if self.legacy_path.exists() {
            let backed_up = std::fs::read(&self.legacy_path)
                .ok()
                .and_then(|contents| files::existing_backup(&self.backup_path, &contents).ok())
                .flatten()
                .is_some();
            if backed_up {
                MigrationState::BackedUp
            } else {
                MigrationState::NotStarted
            }
        } else if self.marker_path.exists() {
            MigrationState::Finalized
        } else {
            MigrationState::NotStarted
        }
    }

    /// Run the migration for `worker` against `store`.
    pub fn migrate<B: KvBackend>(
        &self,
        store: &RevocationStore<B>,
        worker: &WorkerIdentity,
    ) -> Result<MigrationReport, MigrationFailure> {
        let legacy = self.legacy_path.display();

        if !self.legacy_path.exists() {
            if self.marker_path.exists() {
                tracing::info!(path = %legacy, worker = %worker, "legacy state already migrated");
                return Ok(MigrationReport::empty(
                    MigrationOutcome::AlreadyFinalized,
                    Some(self.marker_path.clone()),
                ));
            }
            tracing::debug!(path = %legacy, "no legacy state file");
            return Ok(MigrationReport::empty(MigrationOutcome::NoLegacyFile, None));
        }

        let mut run = Run::new(worker);

        // NotStarted -> BackedUp
        let (backup_path, written) = files::write_backup(&self.legacy_path, &self.backup_path)
            .map_err(|e| run.abort(None, e))?;
        if written {
            tracing::info!(path = %legacy, backup = %backup_path.display(), "wrote legacy backup");
        } else {
            tracing::info!(backup = %backup_path.display(), "reusing existing legacy backup");
        }
        run.advance(MigrationState::BackedUp);

        // BackedUp -> Merged
        let snapshot = legacy::read(&self.legacy_path)
            .map_err(|e| run.abort(Some(&backup_path), e))?;
        let merged = store
            .merge(worker, &snapshot.revoked, snapshot.clock)
            .map_err(|e| run.abort(Some(&backup_path), e))?;
        run.advance(MigrationState::Merged);

        // Merged -> Finalized
        let marker_path = files::rename_to_marker(&self.legacy_path, &self.marker_path)
            .map_err(|e| run.abort(Some(&backup_path), e))?;
        run.advance(MigrationState::Finalized);

        tracing::info!(
            worker = %worker,
            schema = %snapshot.schema_version,
            entries = merged.entries_merged,
            clock_applied = merged.clock_applied,
            marker = %marker_path.display(),
            "legacy state migrated"
        );

        Ok(MigrationReport {
            outcome: MigrationOutcome::Completed,
            schema_version: Some(snapshot.schema_version),
            entries_merged: merged.entries_merged,
            clock_applied: merged.clock_applied,
            backup_path: Some(backup_path),
            marker_path: Some(marker_path),
        })
    }

    /// Retry the rename step alone.
    ///
    /// Idempotent: when the original is already gone and the marker exists,
    /// returns the marker path. Refuses to rename without a backup.
    pub fn finalize(&self) -> Result<PathBuf, StateDbError> {
        if !self.legacy_path.exists() {
            if self.marker_path.exists() {
                return Ok(self.marker_path.clone());
            }
            return Err(StateDbError::invalid_argument(format!(
                "nothing to finalize: {} does not exist",
                self.legacy_path.display()
            )));
        }
        if self.observe() != MigrationState::BackedUp {
            return Err(StateDbError::invalid_argument(format!(
                "refusing to finalize {} without a matching backup",
                self.legacy_path.display()
            )));
        }

        match files::rename_to_marker(&self.legacy_path, &self.marker_path) {
            Ok(marker) => {
                tracing::info!(marker = %marker.display(), "legacy state finalized");
                Ok(marker)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    backup = %self.backup_path.display(),
                    "finalize rename failed; store and backup hold the migrated state"
                );
                Err(e)
            }
        }
    }
}

/// In-memory progress of a single run, for logging and failure reports.
struct Run<'a> {
    worker: &'a WorkerIdentity,
    state: MigrationState,
}

impl<'a> Run<'a> {
    fn new(worker: &'a WorkerIdentity) -> Self {
        Self {
            worker,
            state: MigrationState::NotStarted,
        }
    }

    fn advance(&mut self, next: MigrationState) {
        tracing::debug!(worker = %self.worker, from = %self.state, to = %next, "migration step");
        self.state = next;
    }

    fn abort(&self, backup_path: Option<&Path>, source: StateDbError) -> MigrationFailure {
        let backup = backup_path.map(|p| p.display().to_string()).unwrap_or_default();
        if source.is_partial_success() {
            tracing::warn!(
                worker = %self.worker,
                error = %source,
                backup = %backup,
                "migration merged but not finalized; retry finalize"
            );
        } else {
            tracing::error!(
                worker = %self.worker,
                state = %self.state,
                error = %source,
                backup = %backup,
                "migration aborted"
            );
        }
        MigrationFailure {
            state: self.state,
            backup_path: backup_path.map(Path::to_path_buf),
            source,
        }
    }
}
