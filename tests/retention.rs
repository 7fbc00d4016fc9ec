//! Retention sweeper integration tests.

mod common;

use common::{memory_store, memory_store_with_prefix, revoked, task_ids, worker};
use std::time::Duration;
use worker_statedb::storage::KvBackend;
use worker_statedb::{RetentionSweeper, RevokedEntry, StateDbError, Timestamp, WorkerSelector};

const NOW: Timestamp = Timestamp::from_secs(10_000);

#[test]
fn entry_at_exact_cutoff_survives() {
    let store = memory_store();
    let w = worker("w1@host");
    store
        .merge(&w, &revoked(&[("at-cutoff", 9_000), ("one-second-older", 8_999)]), None)
        .unwrap();

    let report = RetentionSweeper::new(&store)
        .sweep(Duration::from_secs(1_000), &WorkerSelector::One(w.clone()), NOW)
        .unwrap();

    assert_eq!(report.total(), 1);
    assert_eq!(task_ids(&store.load(&w).unwrap()), vec!["at-cutoff"]);
}

#[test]
fn all_sweeps_every_worker_under_prefix() {
    let store = memory_store_with_prefix("app:");
    for name in ["a@h", "b@h", "c@h"] {
        store
            .merge(&worker(name), &revoked(&[("old", 100), ("new", 9_999)]), None)
            .unwrap();
    }
    store.backend().zadd("elsewhere:z@h:revoked", &[("old".into(), 100.0)]).unwrap();

    let report = RetentionSweeper::new(&store)
        .sweep(Duration::from_secs(60), &WorkerSelector::All, NOW)
        .unwrap();

    assert_eq!(report.removed.len(), 3);
    assert_eq!(report.total(), 3);
    for name in ["a@h", "b@h", "c@h"] {
        assert_eq!(task_ids(&store.load(&worker(name)).unwrap()), vec!["new"]);
    }
    assert_eq!(
        store.backend().zrange_with_scores("elsewhere:z@h:revoked").unwrap().len(),
        1
    );
}

#[test]
fn single_worker_sweep_leaves_others_alone() {
    let store = memory_store();
    let a = worker("a@h");
    let b = worker("b@h");
    store.merge(&a, &revoked(&[("old", 1)]), None).unwrap();
    store.merge(&b, &revoked(&[("old", 1)]), None).unwrap();

    let removed = RetentionSweeper::new(&store)
        .purge_old_revoked_tasks(Duration::from_secs(60), &WorkerSelector::One(a.clone()))
        .unwrap();

    assert_eq!(removed, 1);
    assert!(store.load(&a).unwrap().is_empty());
    assert!(store.is_revoked(&b, "old").unwrap());
}

#[test]
fn recent_entries_are_kept_with_real_clock() {
    let store = memory_store();
    let w = worker("w1@host");
    store.record_now(&w, "fresh").unwrap();
    store
        .add_revoked(&w, &RevokedEntry::new("ancient", Timestamp::from_secs(1)))
        .unwrap();

    let removed = RetentionSweeper::new(&store)
        .purge_old_revoked_tasks(Duration::from_secs(3_600), &WorkerSelector::All)
        .unwrap();

    assert_eq!(removed, 1);
    assert_eq!(task_ids(&store.load(&w).unwrap()), vec!["fresh"]);
}

#[test]
fn empty_store_sweeps_nothing() {
    let store = memory_store();
    let report = RetentionSweeper::new(&store)
        .sweep(Duration::from_secs(1), &WorkerSelector::All, NOW)
        .unwrap();
    assert_eq!(report.total(), 0);
    assert!(report.removed.is_empty());
}

#[test]
fn offline_store_fails_the_sweep() {
    let store = memory_store();
    store.backend().set_available(false);
    let err = RetentionSweeper::new(&store)
        .purge_old_revoked_tasks(Duration::from_secs(1), &WorkerSelector::All)
        .unwrap_err();
    assert!(matches!(err, StateDbError::StoreUnavailable { .. }));
}

#[test]
fn over_range_threshold_purges_nothing() {
    let store = memory_store();
    let w = worker("w1@host");
    let now = Timestamp::from_secs(1_700_000_000);
    store
        .add_revoked(&w, &RevokedEntry::new("recent", Timestamp::from_secs(1_699_999_990)))
        .unwrap();

    let report = RetentionSweeper::new(&store)
        .sweep(
            Duration::from_secs(18_446_744_073_709_552),
            &WorkerSelector::One(w.clone()),
            now,
        )
        .unwrap();

    assert_eq!(report.cutoff, Some(Timestamp::from_millis(0)));
    assert_eq!(report.total(), 0);
    assert!(store.is_revoked(&w, "recent").unwrap());
}
