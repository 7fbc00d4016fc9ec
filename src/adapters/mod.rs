//! Backing store adapters.
//!
//! Adapters implement [`KvBackend`](crate::storage::KvBackend) over a
//! concrete wire protocol.
//!
//! Currently implemented:
//! - [`redis`] - Redis RESP2 over blocking TCP

pub mod redis;

pub use redis::{RedisUrl, RespBackend};
