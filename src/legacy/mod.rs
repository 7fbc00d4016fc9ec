//! Legacy snapshot reader.
//!
//! Before the networked store, each worker kept its revoked set and clock
//! in a single local file. That file is a keyed container (a JSON object)
//! that went through three schema versions:
//!
//! | Version | Revoked set | Clock |
//! |---------|-------------|-------|
//! | 1 | `revoked`: flat list of task ids, no timestamps | optional |
//! | 2 | `revoked`: bounded set `{maxlen, items: [[id, ts], ..]}` | always present |
//! | 3 | `zrevoked`: base64 zlib-compressed `{id: ts}` | present, may be null |
//!
//! Decoding detects the version, dispatches to one decoder per schema and
//! normalizes the result into a single [`LegacySnapshot`]. Everything
//! downstream of this module sees one model.
//!
//! - [`v1`] - Flat task-id list, stamped with the file's mtime
//! - [`v2`] - Bounded set with mandatory clock
//! - [`v3`] - Compressed mapping with optional clock

pub mod v1;
pub mod v2;
pub mod v3;

use crate::core::error::{StateDbError, StateDbResult};
use crate::core::time::Timestamp;
use crate::state::{ClockValue, RevokedSet};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Version marker key.
pub const PROTO_KEY: &str = "__proto__";
/// Revoked set key for schemas 1 and 2.
pub const REVOKED_KEY: &str = "revoked";
/// Compressed revoked mapping key for schema 3.
pub const ZREVOKED_KEY: &str = "zrevoked";
/// Clock key.
pub const CLOCK_KEY: &str = "clock";

/// Largest legacy file the reader will load.
pub const MAX_LEGACY_FILE_BYTES: u64 = 256 * 1024 * 1024;

/// Decoded container.
pub type Container = Map<String, Value>;

/// Supported legacy schema versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaVersion {
    V1 = 1,
    V2 = 2,
    V3 = 3,
}

impl SchemaVersion {
    /// Map a marker value to a version.
    pub fn from_marker(marker: i64) -> Option<Self> {
        match marker {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            _ => None,
        }
    }

    /// The marker written for this version.
    pub fn marker(self) -> i64 {
        self as i64
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.marker())
    }
}

/// A decoded legacy snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacySnapshot {
    pub revoked: RevokedSet,
    pub clock: Option<ClockValue>,
    pub schema_version: SchemaVersion,
}

/// Inputs a decoder may need besides the container itself.
#[derive(Debug, Clone)]
pub struct DecodeContext {
    /// File being decoded, for error reporting.
    pub path: PathBuf,
    /// File modification time, used where entries carry no timestamp.
    pub modified: Timestamp,
}

impl DecodeContext {
    pub(crate) fn corrupt(&self, reason: impl Into<String>) -> StateDbError {
        StateDbError::corrupt(&self.path, reason)
    }
}

/// Read and decode a legacy snapshot file.
pub fn read(path: &Path) -> StateDbResult<LegacySnapshot> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| StateDbError::corrupt(path, format!("cannot open: {}", e)))?;
    if !metadata.is_file() {
        return Err(StateDbError::corrupt(path, "not a regular file"));
    }
    if metadata.len() > MAX_LEGACY_FILE_BYTES {
        return Err(StateDbError::corrupt(
            path,
            format!("file too large: {} bytes", metadata.len()),
        ));
    }
    let modified = metadata
        .modified()
        .map(Timestamp::from_system_time)
        .unwrap_or_else(|_| Timestamp::now());
    let bytes = std::fs::read(path)
        .map_err(|e| StateDbError::corrupt(path, format!("cannot read: {}", e)))?;

    let ctx = DecodeContext {
        path: path.to_path_buf(),
        modified,
    };
    let snapshot = decode(&bytes, &ctx)?;
    tracing::info!(
        path = %path.display(),
        schema = %snapshot.schema_version,
        entries = snapshot.revoked.len(),
        clock = ?snapshot.clock.map(ClockValue::get),
        "decoded legacy snapshot"
    );
    Ok(snapshot)
}

/// Decode snapshot bytes.
pub fn decode(bytes: &[u8], ctx: &DecodeContext) -> StateDbResult<LegacySnapshot> {
    let container = parse_container(bytes, ctx)?;
    match detect_version(&container, ctx)? {
        SchemaVersion::V1 => v1::decode(&container, ctx),
        SchemaVersion::V2 => v2::decode(&container, ctx),
        SchemaVersion::V3 => v3::decode(&container, ctx),
    }
}

/// Encode a snapshot in its own schema version.
pub fn encode(snapshot: &LegacySnapshot) -> StateDbResult<Vec<u8>> {
    match snapshot.schema_version {
        SchemaVersion::V1 => {
            let ids: Vec<&str> = snapshot.revoked.task_ids().collect();
            Ok(v1::encode(&ids, snapshot.clock))
        }
        SchemaVersion::V2 => {
            let clock = snapshot
                .clock
                .ok_or_else(|| StateDbError::invalid_argument("v2 snapshots require a clock"))?;
            Ok(v2::encode(&snapshot.revoked, v2::DEFAULT_MAXLEN, clock))
        }
        SchemaVersion::V3 => v3::encode(&snapshot.revoked, snapshot.clock),
    }
}

fn parse_container(bytes: &[u8], ctx: &DecodeContext) -> StateDbResult<Container> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ctx.corrupt(format!("header does not match any known schema: {}", e)))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ctx.corrupt("header does not match any known schema: not a keyed container")),
    }
}

/// Determine the schema version of a container.
///
/// An explicit marker wins. Without one the version is inferred from which
/// keys are present and their shape.
pub fn detect_version(container: &Container, ctx: &DecodeContext) -> StateDbResult<SchemaVersion> {
    if let Some(marker) = container.get(PROTO_KEY) {
        let marker = marker
            .as_i64()
            .ok_or_else(|| ctx.corrupt(format!("version marker is not an integer: {}", marker)))?;
        return SchemaVersion::from_marker(marker).ok_or_else(|| {
            StateDbError::UnsupportedSchemaVersion {
                path: ctx.path.clone(),
                version: marker,
            }
        });
    }

    if container.contains_key(ZREVOKED_KEY) {
        return Ok(SchemaVersion::V3);
    }
    match container.get(REVOKED_KEY) {
        Some(Value::Object(_)) => Ok(SchemaVersion::V2),
        Some(Value::Array(_)) => Ok(SchemaVersion::V1),
        Some(other) => Err(ctx.corrupt(format!("unrecognized revoked set shape: {}", kind_of(other)))),
        // A bare clock is the oldest layout of all.
        None if container.contains_key(CLOCK_KEY) => Ok(SchemaVersion::V1),
        None => Err(ctx.corrupt("header does not match any known schema: no state keys")),
    }
}

/// Read an optional clock. `null` and a missing key are both absent.
pub(crate) fn optional_clock(
    container: &Container,
    ctx: &DecodeContext,
) -> StateDbResult<Option<ClockValue>> {
    match container.get(CLOCK_KEY) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|v| Some(ClockValue(v)))
            .ok_or_else(|| ctx.corrupt(format!("clock is not a non-negative integer: {}", value))),
    }
}

/// Read a per-entry timestamp in fractional seconds.
pub(crate) fn timestamp_from(
    value: &Value,
    task_id: &str,
    ctx: &DecodeContext,
) -> StateDbResult<Timestamp> {
    value
        .as_f64()
        .and_then(Timestamp::from_secs_f64)
        .ok_or_else(|| ctx.corrupt(format!("bad timestamp for {}: {}", task_id, value)))
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
