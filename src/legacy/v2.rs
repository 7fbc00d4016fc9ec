//! Schema 2: bounded revoked set with a mandatory clock.
//!
//! The set is `{"maxlen": N, "items": [[task_id, ts], ..]}`. Every item is
//! decoded even when a file holds more than its `maxlen`; the overflow is
//! only logged.

use super::{kind_of, timestamp_from, Container, DecodeContext, LegacySnapshot, SchemaVersion};
use super::{CLOCK_KEY, PROTO_KEY, REVOKED_KEY};
use crate::core::error::StateDbResult;
use crate::state::{ClockValue, RevokedEntry, RevokedSet};
use serde_json::{json, Value};

/// Bound assumed when a file does not record one.
pub const DEFAULT_MAXLEN: usize = 50_000;

/// Decode a schema 2 container.
pub fn decode(container: &Container, ctx: &DecodeContext) -> StateDbResult<LegacySnapshot> {
    let clock = match container.get(CLOCK_KEY) {
        None | Some(Value::Null) => return Err(ctx.corrupt("v2 snapshot is missing its clock")),
        Some(value) => value.as_u64().map(ClockValue).ok_or_else(|| {
            ctx.corrupt(format!("clock is not a non-negative integer: {}", value))
        })?,
    };

    let mut revoked = RevokedSet::new();
    match container.get(REVOKED_KEY) {
        None | Some(Value::Null) => {}
        Some(Value::Object(set)) => {
            let maxlen = match set.get("maxlen") {
                None | Some(Value::Null) => DEFAULT_MAXLEN,
                Some(value) => value
                    .as_u64()
                    .map(|n| n as usize)
                    .ok_or_else(|| ctx.corrupt(format!("bad v2 maxlen: {}", value)))?,
            };

            let items = match set.get("items") {
                None | Some(Value::Null) => &[][..],
                Some(Value::Array(items)) => items.as_slice(),
                Some(other) => {
                    return Err(ctx.corrupt(format!(
                        "v2 items must be a list, found {}",
                        kind_of(other)
                    )))
                }
            };

            for item in items {
                revoked.insert(decode_item(item, ctx)?);
            }

            // maxlen 0 means unbounded.
            if maxlen > 0 && revoked.len() > maxlen {
                tracing::warn!(
                    path = %ctx.path.display(),
                    maxlen,
                    entries = revoked.len(),
                    "v2 snapshot exceeds its bound; keeping every entry"
                );
            }
        }
        Some(other) => {
            return Err(ctx.corrupt(format!(
                "v2 revoked set must be an object, found {}",
                kind_of(other)
            )))
        }
    }

    Ok(LegacySnapshot {
        revoked,
        clock: Some(clock),
        schema_version: SchemaVersion::V2,
    })
}

fn decode_item(item: &Value, ctx: &DecodeContext) -> StateDbResult<RevokedEntry> {
    let pair = match item.as_array() {
        Some(pair) if pair.len() == 2 => pair,
        _ => return Err(ctx.corrupt(format!("v2 item is not a [task_id, ts] pair: {}", item))),
    };
    let task_id = pair[0]
        .as_str()
        .ok_or_else(|| ctx.corrupt(format!("v2 task id is not a string: {}", pair[0])))?;
    let revoked_at = timestamp_from(&pair[1], task_id, ctx)?;
    Ok(RevokedEntry::new(task_id, revoked_at))
}

/// Encode a schema 2 container.
pub fn encode(revoked: &RevokedSet, maxlen: usize, clock: ClockValue) -> Vec<u8> {
    let items: Vec<Value> = revoked
        .by_revocation_time()
        .into_iter()
        .map(|entry| json!([entry.task_id, entry.revoked_at.as_secs_f64()]))
        .collect();
    let container = json!({
        PROTO_KEY: SchemaVersion::V2.marker(),
        REVOKED_KEY: { "maxlen": maxlen, "items": items },
        CLOCK_KEY: clock.get(),
    });
    container.to_string().into_bytes()
}
