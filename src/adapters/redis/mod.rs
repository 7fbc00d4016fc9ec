//! Redis RESP2 backend.
//!
//! The production [`KvBackend`](crate::storage::KvBackend) talks to a Redis
//! compatible server over RESP2 on a blocking TCP connection.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     RespBackend                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  KvBackend call (zadd, get, scan, ...)                      │
//! │    ↓                                                        │
//! │  RedisCommand builder                                       │
//! │    ↓                                                        │
//! │  RespCodec (RESP2 encode / buffered reply decode)           │
//! │    ↓                                                        │
//! │  RespConnection (TcpStream, connect + I/O timeouts,         │
//! │                  AUTH / SELECT on connect)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Commands Used
//!
//! | Backend op | Command |
//! |------------|---------|
//! | zadd | ZADD key score member ... |
//! | zrange_with_scores | ZRANGE key 0 -1 WITHSCORES |
//! | zscore | ZSCORE key member |
//! | zremrange_below | ZREMRANGEBYSCORE key -inf (max |
//! | get / set / incr / del | GET / SET / INCR / DEL |
//! | scan_keys | SCAN cursor MATCH pattern COUNT n |

pub mod client;
pub mod protocol;

use bytes::Bytes;

pub use client::{RedisUrl, RespBackend, RespConnection};

/// Redis value type (RESP2 type system).
#[derive(Debug, Clone, PartialEq)]
pub enum RedisValue {
    /// Simple string (+OK\r\n)
    SimpleString(String),

    /// Error (-ERR message\r\n)
    Error(RedisError),

    /// Integer (:1000\r\n)
    Integer(i64),

    /// Bulk string ($6\r\nfoobar\r\n)
    BulkString(Bytes),

    /// Array (*2\r\n...)
    Array(Vec<RedisValue>),

    /// Null ($-1\r\n or *-1\r\n)
    Null,
}

impl RedisValue {
    /// Create an OK response.
    pub fn ok() -> Self {
        Self::SimpleString("OK".to_string())
    }

    /// Create an error.
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(RedisError {
            kind: kind.into(),
            message: message.into(),
        })
    }

    /// Create a bulk string from a string.
    pub fn bulk_string(s: impl AsRef<str>) -> Self {
        Self::BulkString(Bytes::from(s.as_ref().to_string()))
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to get as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::SimpleString(s) => Some(s),
            Self::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Try to get as integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::SimpleString(s) => s.parse().ok(),
            Self::BulkString(b) => std::str::from_utf8(b).ok().and_then(|s| s.parse().ok()),
            _ => None,
        }
    }

    /// Try to get as a float, accepting Redis' `inf` spellings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            _ => match self.as_str()? {
                "inf" | "+inf" => Some(f64::INFINITY),
                "-inf" => Some(f64::NEG_INFINITY),
                s => s.parse().ok(),
            },
        }
    }

    /// Try to get as array.
    pub fn as_array(&self) -> Option<&[RedisValue]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }
}

/// Redis error reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisError {
    /// Error kind (ERR, WRONGTYPE, NOAUTH, etc.)
    pub kind: String,
    /// Error message.
    pub message: String,
}

impl std::fmt::Display for RedisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.message)
    }
}

impl std::error::Error for RedisError {}

/// Redis command under construction.
#[derive(Debug, Clone)]
pub struct RedisCommand {
    /// Command name followed by its arguments.
    args: Vec<Bytes>,
}

impl RedisCommand {
    /// Start a command (name is upper-cased).
    pub fn new(name: &str) -> Self {
        Self {
            args: vec![Bytes::from(name.to_uppercase())],
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    /// Append a float argument in a form Redis parses back exactly.
    pub fn arg_f64(self, value: f64) -> Self {
        let text = if value == f64::INFINITY {
            "+inf".to_string()
        } else if value == f64::NEG_INFINITY {
            "-inf".to_string()
        } else {
            format!("{}", value)
        };
        self.arg(text)
    }

    /// Command name.
    pub fn name(&self) -> &str {
        self.args
            .first()
            .and_then(|b| std::str::from_utf8(b).ok())
            .unwrap_or("")
    }

    /// Name and arguments as sent on the wire.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }
}
