//! Schema 3: compressed revoked mapping.
//!
//! `zrevoked` holds base64 text of a zlib stream whose payload is a JSON
//! object mapping task id to revocation time in seconds. The clock key is
//! present but may be `null`.

use super::{kind_of, optional_clock, timestamp_from, Container, DecodeContext, LegacySnapshot};
use super::{SchemaVersion, CLOCK_KEY, PROTO_KEY, ZREVOKED_KEY};
use crate::core::error::{StateDbError, StateDbResult};
use crate::state::{ClockValue, RevokedEntry, RevokedSet};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde_json::{Map, Value};
use std::io::{Read, Write};

/// Upper bound on the inflated payload.
pub const MAX_INFLATED_BYTES: u64 = 512 * 1024 * 1024;

/// Decode a schema 3 container.
pub fn decode(container: &Container, ctx: &DecodeContext) -> StateDbResult<LegacySnapshot> {
    let revoked = match container.get(ZREVOKED_KEY) {
        None | Some(Value::Null) => RevokedSet::new(),
        Some(Value::String(encoded)) => decode_payload(encoded, ctx)?,
        Some(other) => {
            return Err(ctx.corrupt(format!(
                "v3 zrevoked must be a string, found {}",
                kind_of(other)
            )))
        }
    };

    Ok(LegacySnapshot {
        revoked,
        clock: optional_clock(container, ctx)?,
        schema_version: SchemaVersion::V3,
    })
}

fn decode_payload(encoded: &str, ctx: &DecodeContext) -> StateDbResult<RevokedSet> {
    let compressed = BASE64
        .decode(encoded.trim())
        .map_err(|e| ctx.corrupt(format!("v3 payload is not base64: {}", e)))?;

    let mut inflated = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .take(MAX_INFLATED_BYTES + 1)
        .read_to_end(&mut inflated)
        .map_err(|e| ctx.corrupt(format!("v3 payload failed to decompress: {}", e)))?;
    if inflated.len() as u64 > MAX_INFLATED_BYTES {
        return Err(ctx.corrupt("v3 payload inflates beyond the size limit"));
    }

    let mapping: Map<String, Value> = serde_json::from_slice(&inflated)
        .map_err(|e| ctx.corrupt(format!("v3 payload is not a task mapping: {}", e)))?;

    let mut revoked = RevokedSet::new();
    for (task_id, ts) in &mapping {
        revoked.insert(RevokedEntry::new(task_id.as_str(), timestamp_from(ts, task_id, ctx)?));
    }
    Ok(revoked)
}

/// Encode a schema 3 container.
pub fn encode(revoked: &RevokedSet, clock: Option<ClockValue>) -> StateDbResult<Vec<u8>> {
    let mapping: Map<String, Value> = revoked
        .iter()
        .map(|entry| (entry.task_id, Value::from(entry.revoked_at.as_secs_f64())))
        .collect();
    let payload = Value::Object(mapping).to_string();

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(payload.as_bytes())
        .and_then(|_| encoder.flush())
        .map_err(|e| StateDbError::invalid_argument(format!("zlib encode failed: {}", e)))?;
    let compressed = encoder
        .finish()
        .map_err(|e| StateDbError::invalid_argument(format!("zlib encode failed: {}", e)))?;

    let mut container = Container::new();
    container.insert(PROTO_KEY.to_string(), Value::from(SchemaVersion::V3.marker()));
    container.insert(ZREVOKED_KEY.to_string(), Value::from(BASE64.encode(compressed)));
    container.insert(
        CLOCK_KEY.to_string(),
        clock.map_or(Value::Null, |c| Value::from(c.get())),
    );
    Ok(Value::Object(container).to_string().into_bytes())
}
