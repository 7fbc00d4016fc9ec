//! Schema 1: flat list of task ids.
//!
//! Version 1 never recorded per-entry revocation times. Every entry is
//! stamped with the file's modification time, which is a lossy
//! reconstruction: the true revocation times cannot be recovered.

use super::{kind_of, optional_clock, Container, DecodeContext, LegacySnapshot, SchemaVersion};
use super::{CLOCK_KEY, PROTO_KEY, REVOKED_KEY};
use crate::core::error::StateDbResult;
use crate::state::{ClockValue, RevokedEntry, RevokedSet};
use serde_json::Value;

/// Decode a schema 1 container.
pub fn decode(container: &Container, ctx: &DecodeContext) -> StateDbResult<LegacySnapshot> {
    let mut revoked = RevokedSet::new();

    match container.get(REVOKED_KEY) {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                let task_id = item.as_str().ok_or_else(|| {
                    ctx.corrupt(format!("v1 task id is not a string: {}", kind_of(item)))
                })?;
                revoked.insert(RevokedEntry::new(task_id, ctx.modified));
            }
        }
        Some(other) => {
            return Err(ctx.corrupt(format!(
                "v1 revoked set must be a list, found {}",
                kind_of(other)
            )))
        }
    }

    Ok(LegacySnapshot {
        revoked,
        clock: optional_clock(container, ctx)?,
        schema_version: SchemaVersion::V1,
    })
}

/// Encode a schema 1 container.
pub fn encode(task_ids: &[&str], clock: Option<ClockValue>) -> Vec<u8> {
    let mut container = Container::new();
    container.insert(PROTO_KEY.to_string(), Value::from(SchemaVersion::V1.marker()));
    container.insert(
        REVOKED_KEY.to_string(),
        Value::Array(task_ids.iter().map(|id| Value::from(*id)).collect()),
    );
    if let Some(clock) = clock {
        container.insert(CLOCK_KEY.to_string(), Value::from(clock.get()));
    }
    Value::Object(container).to_string().into_bytes()
}
