//! Migration integration tests.
//!
//! End-to-end runs of the backup, merge and rename state machine.

mod common;

use common::{memory_store, revoked, task_ids, worker, write_legacy};
use tempfile::TempDir;
use worker_statedb::legacy::{v1, v2, v3};
use worker_statedb::{
    ClockValue, MigrationOutcome, MigrationState, RevokedSet, StateDbError, StateMigrator,
    Timestamp,
};

// ============================================================================
// End-to-End Tests
// ============================================================================

#[test]
fn v3_file_migrates_end_to_end() {
    let dir = TempDir::new().unwrap();
    let t0 = Timestamp::from_millis(1_700_000_000_250);
    let t1 = Timestamp::from_millis(1_700_000_100_500);
    let set: RevokedSet = [
        worker_statedb::RevokedEntry::new("task-1", t0),
        worker_statedb::RevokedEntry::new("task-2", t1),
    ]
    .into_iter()
    .collect();
    let original_bytes = v3::encode(&set, Some(ClockValue(42))).unwrap();
    let path = write_legacy(dir.path(), "worker.db", &original_bytes);

    let store = memory_store();
    let w = worker("celery@host");
    let migrator = StateMigrator::new(&path);

    let report = migrator.migrate(&store, &w).unwrap();
    assert_eq!(report.outcome, MigrationOutcome::Completed);
    assert_eq!(report.entries_merged, 2);
    assert!(report.clock_applied);
    assert_eq!(report.state(), MigrationState::Finalized);

    let backup = report.backup_path.clone().unwrap();
    assert_eq!(backup, migrator.backup_path());
    assert_eq!(std::fs::read(&backup).unwrap(), original_bytes);

    let loaded = store.load(&w).unwrap();
    assert_eq!(loaded.get("task-1"), Some(t0));
    assert_eq!(loaded.get("task-2"), Some(t1));
    assert_eq!(store.load_clock(&w).unwrap(), Some(ClockValue(42)));

    assert!(!path.exists());
    assert_eq!(report.marker_path.as_deref(), Some(migrator.marker_path()));
    assert_eq!(std::fs::read(migrator.marker_path()).unwrap(), original_bytes);
    assert_eq!(migrator.observe(), MigrationState::Finalized);

    let again = migrator.migrate(&store, &w).unwrap();
    assert_eq!(again.outcome, MigrationOutcome::AlreadyFinalized);
    assert_eq!(again.entries_merged, 0);
    assert!(!again.clock_applied);
    assert_eq!(store.load_clock(&w).unwrap(), Some(ClockValue(42)));
    assert_eq!(store.load(&w).unwrap(), loaded);
}

#[test]
fn v2_file_with_empty_set_applies_clock() {
    let dir = TempDir::new().unwrap();
    let path = write_legacy(
        dir.path(),
        "worker.db",
        &v2::encode(&RevokedSet::new(), 50_000, ClockValue(17)),
    );
    let store = memory_store();
    let w = worker("celery@host");

    let report = StateMigrator::new(&path).migrate(&store, &w).unwrap();
    assert_eq!(report.entries_merged, 0);
    assert!(report.clock_applied);
    assert_eq!(store.load_clock(&w).unwrap(), Some(ClockValue(17)));
    assert!(store.load(&w).unwrap().is_empty());
}

#[test]
fn v1_file_without_clock_keeps_stored_clock() {
    let dir = TempDir::new().unwrap();
    let path = write_legacy(dir.path(), "worker.db", &v1::encode(&["a", "b"], None));
    let store = memory_store();
    let w = worker("celery@host");
    store.set_clock(&w, ClockValue(500)).unwrap();

    let report = StateMigrator::new(&path).migrate(&store, &w).unwrap();
    assert_eq!(report.entries_merged, 2);
    assert!(!report.clock_applied);
    assert_eq!(store.load_clock(&w).unwrap(), Some(ClockValue(500)));
}

#[test]
fn custom_suffixes_are_used() {
    let dir = TempDir::new().unwrap();
    let path = write_legacy(dir.path(), "worker.db", &v1::encode(&["a"], None));
    let migrator = StateMigrator::with_suffixes(&path, ".orig", ".done");

    migrator.migrate(&memory_store(), &worker("w@h")).unwrap();
    assert!(dir.path().join("worker.db.orig").exists());
    assert!(dir.path().join("worker.db.done").exists());
}

#[test]
fn no_legacy_file_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let store = memory_store();
    let report = StateMigrator::new(dir.path().join("worker.db"))
        .migrate(&store, &worker("w@h"))
        .unwrap();
    assert_eq!(report.outcome, MigrationOutcome::NoLegacyFile);
    assert_eq!(store.backend().key_count(), 0);
}

// ============================================================================
// Failure and Resume Tests
// ============================================================================

#[test]
fn store_failure_mid_merge_leaves_backed_up_state() {
    let dir = TempDir::new().unwrap();
    let bytes = v3::encode(&revoked(&[("a", 1), ("b", 2)]), Some(ClockValue(9))).unwrap();
    let path = write_legacy(dir.path(), "worker.db", &bytes);
    let store = memory_store();
    let w = worker("celery@host");
    let migrator = StateMigrator::new(&path);

    // The entries land, the clock write fails.
    store.backend().fail_writes_after(1);
    let failure = migrator.migrate(&store, &w).unwrap_err();
    assert_eq!(failure.state, MigrationState::BackedUp);
    assert!(matches!(failure.source, StateDbError::StoreUnavailable { .. }));
    assert!(!failure.is_partial_success());
    assert_eq!(failure.backup_path.as_deref(), Some(migrator.backup_path()));
    assert_eq!(std::fs::read(&path).unwrap(), bytes);
    assert!(migrator.backup_path().exists());
    assert_eq!(migrator.observe(), MigrationState::BackedUp);

    store.backend().set_available(true);
    let report = migrator.migrate(&store, &w).unwrap();
    assert_eq!(report.outcome, MigrationOutcome::Completed);
    assert_eq!(report.entries_merged, 2);
    assert_eq!(report.backup_path.as_deref(), Some(migrator.backup_path()));
    assert_eq!(store.load_clock(&w).unwrap(), Some(ClockValue(9)));
    assert_eq!(task_ids(&store.load(&w).unwrap()), vec!["a", "b"]);

    let backups: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".bak"))
        .collect();
    assert_eq!(backups.len(), 1);
}

#[test]
fn store_offline_before_merge_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let path = write_legacy(dir.path(), "worker.db", &v1::encode(&["a"], None));
    let store = memory_store();
    store.backend().set_available(false);

    let failure = StateMigrator::new(&path)
        .migrate(&store, &worker("w@h"))
        .unwrap_err();
    assert_eq!(failure.state, MigrationState::BackedUp);
    assert!(failure.source.is_retriable());
    assert!(path.exists());
    assert_eq!(store.backend().key_count(), 0);
}

#[test]
fn corrupt_file_is_left_untouched() {
    let dir = TempDir::new().unwrap();
    let path = write_legacy(
        dir.path(),
        "worker.db",
        br#"{"__proto__": 3, "zrevoked": "not base64!", "clock": 1}"#,
    );
    let store = memory_store();

    let failure = StateMigrator::new(&path)
        .migrate(&store, &worker("w@h"))
        .unwrap_err();
    assert!(failure.source.is_legacy_decode_failure());
    assert!(path.exists());
    assert_eq!(store.backend().key_count(), 0);
}

#[test]
fn unwritable_backup_aborts_before_anything_else() {
    let dir = TempDir::new().unwrap();
    let path = write_legacy(dir.path(), "worker.db", &v1::encode(&["a"], None));
    // A backup target inside a missing directory cannot be created.
    let migrator = StateMigrator::with_suffixes(&path, "/missing/backup", ".migrated");
    let store = memory_store();

    let failure = migrator.migrate(&store, &worker("w@h")).unwrap_err();
    assert_eq!(failure.state, MigrationState::NotStarted);
    assert!(matches!(failure.source, StateDbError::BackupWriteFailed { .. }));
    assert!(failure.backup_path.is_none());
    assert!(path.exists());
    assert_eq!(store.backend().key_count(), 0);
}

#[test]
fn finalize_alone_completes_a_merged_migration() {
    let dir = TempDir::new().unwrap();
    let bytes = v1::encode(&["a"], Some(ClockValue(3)));
    let path = write_legacy(dir.path(), "worker.db", &bytes);
    let migrator = StateMigrator::new(&path);

    // Simulate a crash after backup and merge, before rename.
    std::fs::write(migrator.backup_path(), &bytes).unwrap();
    assert_eq!(migrator.observe(), MigrationState::BackedUp);

    let marker = migrator.finalize().unwrap();
    assert!(!path.exists());
    assert_eq!(std::fs::read(&marker).unwrap(), bytes);
    assert_eq!(migrator.finalize().unwrap(), marker);
}
