//! Legacy snapshot reader integration tests.
//!
//! Tests for reading schema 1-3 files from disk and normalizing them.

mod common;

use common::{memory_store, revoked, task_ids, worker, write_legacy};
use tempfile::TempDir;
use worker_statedb::legacy::{self, v1, v2, v3};
use worker_statedb::{ClockValue, SchemaVersion, StateDbError, Timestamp};

// ============================================================================
// Schema Round-Trip Tests
// ============================================================================

#[test]
fn every_schema_merges_to_the_same_task_ids() {
    let dir = TempDir::new().unwrap();
    let set = revoked(&[("a", 10), ("b", 20), ("c", 30)]);

    let files = [
        write_legacy(dir.path(), "v1.db", &v1::encode(&["a", "b", "c"], None)),
        write_legacy(dir.path(), "v2.db", &v2::encode(&set, 100, ClockValue(1))),
        write_legacy(dir.path(), "v3.db", &v3::encode(&set, None).unwrap()),
    ];

    for (i, path) in files.iter().enumerate() {
        let snapshot = legacy::read(path).unwrap();
        let store = memory_store();
        let w = worker(&format!("w{}@host", i));
        store.merge(&w, &snapshot.revoked, snapshot.clock).unwrap();
        assert_eq!(
            task_ids(&store.load(&w).unwrap()),
            vec!["a", "b", "c"],
            "schema {}",
            snapshot.schema_version
        );
    }
}

#[test]
fn v1_entries_use_file_mtime() {
    let dir = TempDir::new().unwrap();
    let path = write_legacy(dir.path(), "worker.db", &v1::encode(&["a", "b"], None));
    let mtime = Timestamp::from_system_time(std::fs::metadata(&path).unwrap().modified().unwrap());

    let snapshot = legacy::read(&path).unwrap();
    assert_eq!(snapshot.schema_version, SchemaVersion::V1);
    assert_eq!(snapshot.clock, None);
    assert_eq!(snapshot.revoked.get("a"), Some(mtime));
    assert_eq!(snapshot.revoked.get("b"), Some(mtime));
}

#[test]
fn v2_keeps_timestamps_and_clock() {
    let dir = TempDir::new().unwrap();
    let set = revoked(&[("a", 10), ("b", 20)]);
    let path = write_legacy(dir.path(), "worker.db", &v2::encode(&set, 100, ClockValue(8)));

    let snapshot = legacy::read(&path).unwrap();
    assert_eq!(snapshot.schema_version, SchemaVersion::V2);
    assert_eq!(snapshot.revoked, set);
    assert_eq!(snapshot.clock, Some(ClockValue(8)));
}

#[test]
fn v3_with_null_clock_has_no_clock() {
    let dir = TempDir::new().unwrap();
    let set = revoked(&[("a", 10)]);
    let path = write_legacy(dir.path(), "worker.db", &v3::encode(&set, None).unwrap());

    let snapshot = legacy::read(&path).unwrap();
    assert_eq!(snapshot.schema_version, SchemaVersion::V3);
    assert_eq!(snapshot.revoked, set);
    assert_eq!(snapshot.clock, None);
}

#[test]
fn unmarked_file_is_detected_by_shape() {
    let dir = TempDir::new().unwrap();
    let path = write_legacy(
        dir.path(),
        "worker.db",
        br#"{"revoked": {"maxlen": 10, "items": [["a", 5.5]]}, "clock": 3}"#,
    );

    let snapshot = legacy::read(&path).unwrap();
    assert_eq!(snapshot.schema_version, SchemaVersion::V2);
    assert_eq!(snapshot.revoked.get("a"), Some(Timestamp::from_millis(5_500)));
}

#[test]
fn clock_only_file_decodes_with_empty_set() {
    let dir = TempDir::new().unwrap();
    let path = write_legacy(dir.path(), "worker.db", br#"{"clock": 12}"#);

    let snapshot = legacy::read(&path).unwrap();
    assert!(snapshot.revoked.is_empty());
    assert_eq!(snapshot.clock, Some(ClockValue(12)));
}

#[test]
fn encode_matches_snapshot_version() {
    let set = revoked(&[("a", 1)]);
    let snapshot = legacy::LegacySnapshot {
        revoked: set.clone(),
        clock: Some(ClockValue(2)),
        schema_version: SchemaVersion::V3,
    };
    let dir = TempDir::new().unwrap();
    let path = write_legacy(dir.path(), "worker.db", &legacy::encode(&snapshot).unwrap());
    assert_eq!(legacy::read(&path).unwrap(), snapshot);
}

// ============================================================================
// Failure Tests
// ============================================================================

#[test]
fn missing_file_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let err = legacy::read(&dir.path().join("absent.db")).unwrap_err();
    assert!(matches!(err, StateDbError::CorruptLegacyFile { .. }));
}

#[test]
fn directory_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let err = legacy::read(dir.path()).unwrap_err();
    assert!(matches!(err, StateDbError::CorruptLegacyFile { .. }));
}

#[test]
fn unknown_marker_is_unsupported() {
    let dir = TempDir::new().unwrap();
    let path = write_legacy(dir.path(), "worker.db", br#"{"__proto__": 9, "revoked": []}"#);

    let err = legacy::read(&path).unwrap_err();
    assert!(matches!(err, StateDbError::UnsupportedSchemaVersion { version: 9, .. }));
    assert!(err.is_legacy_decode_failure());
}

#[test]
fn truncated_file_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let full = v3::encode(&revoked(&[("a", 1)]), Some(ClockValue(1))).unwrap();
    let path = write_legacy(dir.path(), "worker.db", &full[..full.len() / 2]);

    let err = legacy::read(&path).unwrap_err();
    assert!(matches!(err, StateDbError::CorruptLegacyFile { .. }));
}

#[test]
fn corrupted_compressed_payload_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = write_legacy(
        dir.path(),
        "worker.db",
        br#"{"__proto__": 3, "zrevoked": "eJzLSM3JyVcozy/KSQEAGgQEXQ==AAAA", "clock": 1}"#,
    );

    let err = legacy::read(&path).unwrap_err();
    assert!(err.is_legacy_decode_failure());
}

#[test]
fn v2_over_its_bound_keeps_every_entry() {
    let dir = TempDir::new().unwrap();
    let set = revoked(&[("a", 10), ("b", 20), ("c", 30)]);
    let path = write_legacy(dir.path(), "worker.db", &v2::encode(&set, 2, ClockValue(5)));

    let snapshot = legacy::read(&path).unwrap();
    let store = memory_store();
    let w = worker("w@host");
    store.merge(&w, &snapshot.revoked, snapshot.clock).unwrap();
    assert_eq!(task_ids(&store.load(&w).unwrap()), vec!["a", "b", "c"]);
}
