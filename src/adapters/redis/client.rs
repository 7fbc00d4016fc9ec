//! Blocking RESP2 client and the Redis backend.
//!
//! One connection is held per backend and opened lazily. Any I/O failure
//! drops the connection and surfaces as `StoreUnavailable`; the next call
//! reconnects. Nothing is retried here.

use super::protocol::codec::{DecodeResult, RespCodec};
use super::{RedisCommand, RedisValue};
use crate::core::error::{StateDbError, StateDbResult};
use crate::storage::backend::KvBackend;
use bytes::Bytes;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

const DEFAULT_PORT: u16 = 6379;
const SCAN_COUNT: &str = "500";
const READ_CHUNK: usize = 16 * 1024;

/// Parsed `redis://[[user]:password@]host[:port][/db]` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisUrl {
    pub host: String,
    pub port: u16,
    pub db: u32,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl RedisUrl {
    /// Parse a URL. Only the plaintext `redis://` scheme is supported.
    pub fn parse(url: &str) -> StateDbResult<Self> {
        let invalid = |reason: &str| {
            StateDbError::invalid_argument(format!("invalid redis url {:?}: {}", url, reason))
        };

        let rest = match url.split_once("://") {
            Some(("redis", rest)) => rest,
            Some(("rediss", _)) => return Err(invalid("TLS (rediss://) is not supported")),
            Some((scheme, _)) => return Err(invalid(&format!("unsupported scheme {:?}", scheme))),
            None => return Err(invalid("missing scheme")),
        };

        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, path),
            None => (rest, ""),
        };

        let (userinfo, hostport) = match authority.rsplit_once('@') {
            Some((userinfo, hostport)) => (Some(userinfo), hostport),
            None => (None, authority),
        };

        let (username, password) = match userinfo {
            None => (None, None),
            Some(info) => match info.split_once(':') {
                Some((user, pass)) => (
                    (!user.is_empty()).then(|| user.to_string()),
                    Some(pass.to_string()),
                ),
                None => (None, Some(info.to_string())),
            },
        };

        let (host, port) = if let Some(bracketed) = hostport.strip_prefix('[') {
            // [v6-addr] or [v6-addr]:port
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 host"))?;
            let port = match after.strip_prefix(':') {
                Some(port) => port.parse::<u16>().map_err(|_| invalid("bad port"))?,
                None if after.is_empty() => DEFAULT_PORT,
                None => return Err(invalid("bad host")),
            };
            (host, port)
        } else {
            match hostport.rsplit_once(':') {
                Some((host, port)) => {
                    (host, port.parse::<u16>().map_err(|_| invalid("bad port"))?)
                }
                None => (hostport, DEFAULT_PORT),
            }
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let db = if path.is_empty() {
            0
        } else {
            path.parse::<u32>().map_err(|_| invalid("bad database index"))?
        };

        Ok(Self {
            host: host.to_string(),
            port,
            db,
            username,
            password,
        })
    }
}

impl std::fmt::Display for RedisUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Credentials are never rendered.
        write!(f, "redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(5),
        }
    }
}

/// A single blocking RESP2 connection.
#[derive(Debug)]
pub struct RespConnection {
    stream: TcpStream,
    codec: RespCodec,
}

impl RespConnection {
    /// Connect, authenticate and select the database.
    pub fn connect(url: &RedisUrl, options: &ConnectOptions) -> StateDbResult<Self> {
        let addrs = (url.host.as_str(), url.port)
            .to_socket_addrs()
            .map_err(|e| io_unavailable("resolve", e))?;

        let mut last_err = None;
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, options.connect_timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let stream = match (stream, last_err) {
            (Some(stream), _) => stream,
            (None, Some(e)) => return Err(io_unavailable("connect", e)),
            (None, None) => {
                return Err(StateDbError::unavailable(format!(
                    "no addresses for {}",
                    url
                )))
            }
        };

        stream
            .set_read_timeout(Some(options.io_timeout))
            .and_then(|_| stream.set_write_timeout(Some(options.io_timeout)))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(|e| io_unavailable("configure socket", e))?;

        let mut conn = Self {
            stream,
            codec: RespCodec::new(),
        };

        if let Some(password) = &url.password {
            let cmd = match &url.username {
                Some(user) => RedisCommand::new("AUTH").arg(user).arg(password),
                None => RedisCommand::new("AUTH").arg(password),
            };
            expect_ok(conn.request(&cmd)?)?;
        }
        if url.db != 0 {
            expect_ok(conn.request(&RedisCommand::new("SELECT").arg(url.db.to_string()))?)?;
        }

        tracing::debug!(url = %url, "connected to store");
        Ok(conn)
    }

    /// Send a command and wait for its reply.
    ///
    /// Error replies are returned as `RedisValue::Error`; only transport
    /// failures are `Err`.
    pub fn request(&mut self, command: &RedisCommand) -> StateDbResult<RedisValue> {
        let frame = self.codec.encode(command);
        self.stream
            .write_all(&frame)
            .and_then(|_| self.stream.flush())
            .map_err(|e| io_unavailable(command.name(), e))?;

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.codec.decode() {
                DecodeResult::Complete(value) => return Ok(value),
                DecodeResult::Invalid(reason) => {
                    self.codec.clear();
                    return Err(StateDbError::unavailable(format!(
                        "protocol error on {}: {}",
                        command.name(),
                        reason
                    )));
                }
                DecodeResult::Incomplete => {}
            }
            let n = self
                .stream
                .read(&mut chunk)
                .map_err(|e| io_unavailable(command.name(), e))?;
            if n == 0 {
                return Err(StateDbError::unavailable(format!(
                    "connection closed during {}",
                    command.name()
                )));
            }
            self.codec.feed(&chunk[..n]);
        }
    }
}

fn io_unavailable(op: &str, err: std::io::Error) -> StateDbError {
    match err.kind() {
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
            StateDbError::unavailable(format!("{} timed out", op))
        }
        _ => StateDbError::unavailable(format!("{}: {}", op, err)),
    }
}

fn reject(value: RedisValue) -> StateDbResult<RedisValue> {
    match value {
        RedisValue::Error(e) => Err(StateDbError::StoreRejected {
            kind: e.kind,
            message: e.message,
        }),
        other => Ok(other),
    }
}

fn expect_ok(value: RedisValue) -> StateDbResult<()> {
    reject(value).map(|_| ())
}

fn unexpected(command: &str, value: &RedisValue) -> StateDbError {
    StateDbError::StoreRejected {
        kind: "PROTOCOL".to_string(),
        message: format!("unexpected reply to {}: {:?}", command, value),
    }
}

/// [`KvBackend`] over a Redis-compatible server.
#[derive(Debug)]
pub struct RespBackend {
    url: RedisUrl,
    options: ConnectOptions,
    connection: parking_lot::Mutex<Option<RespConnection>>,
}

impl RespBackend {
    /// Create a backend. No connection is made until the first call.
    pub fn new(url: RedisUrl, options: ConnectOptions) -> Self {
        Self {
            url,
            options,
            connection: parking_lot::Mutex::new(None),
        }
    }

    /// Parse a URL and create a backend.
    pub fn from_url(url: &str, options: ConnectOptions) -> StateDbResult<Self> {
        Ok(Self::new(RedisUrl::parse(url)?, options))
    }

    /// The target URL.
    pub fn url(&self) -> &RedisUrl {
        &self.url
    }

    fn call(&self, command: RedisCommand) -> StateDbResult<RedisValue> {
        let mut guard = self.connection.lock();
        if guard.is_none() {
            *guard = Some(RespConnection::connect(&self.url, &self.options)?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(StateDbError::unavailable("no connection"));
        };
        match conn.request(&command) {
            Ok(value) => reject(value),
            Err(err) => {
                *guard = None;
                tracing::warn!(url = %self.url, command = command.name(), error = %err, "store call failed");
                Err(err)
            }
        }
    }
}

impl KvBackend for RespBackend {
    fn zadd(&self, key: &str, members: &[(String, f64)]) -> StateDbResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut cmd = RedisCommand::new("ZADD").arg(key);
        for (member, score) in members {
            cmd = cmd.arg_f64(*score).arg(member);
        }
        let reply = self.call(cmd)?;
        reply
            .as_int()
            .map(|n| n.max(0) as u64)
            .ok_or_else(|| unexpected("ZADD", &reply))
    }

    fn zrange_with_scores(&self, key: &str) -> StateDbResult<Vec<(String, f64)>> {
        let reply = self.call(
            RedisCommand::new("ZRANGE")
                .arg(key)
                .arg("0")
                .arg("-1")
                .arg("WITHSCORES"),
        )?;
        let items = match reply {
            RedisValue::Null => return Ok(Vec::new()),
            RedisValue::Array(items) => items,
            other => return Err(unexpected("ZRANGE", &other)),
        };
        if items.len() % 2 != 0 {
            return Err(StateDbError::invalid_value(key, "odd WITHSCORES reply"));
        }
        items
            .chunks(2)
            .map(|pair| {
                let member = pair[0]
                    .as_str()
                    .ok_or_else(|| StateDbError::invalid_value(key, "member is not UTF-8"))?;
                let score = pair[1].as_f64().ok_or_else(|| {
                    StateDbError::invalid_value(key, format!("bad score for {}", member))
                })?;
                Ok((member.to_string(), score))
            })
            .collect()
    }

    fn zscore(&self, key: &str, member: &str) -> StateDbResult<Option<f64>> {
        let reply = self.call(RedisCommand::new("ZSCORE").arg(key).arg(member))?;
        if reply.is_null() {
            return Ok(None);
        }
        reply
            .as_f64()
            .map(Some)
            .ok_or_else(|| unexpected("ZSCORE", &reply))
    }

    fn zremrange_below(&self, key: &str, max_exclusive: f64) -> StateDbResult<u64> {
        let reply = self.call(
            RedisCommand::new("ZREMRANGEBYSCORE")
                .arg(key)
                .arg("-inf")
                .arg(format!("({}", max_exclusive)),
        )?;
        reply
            .as_int()
            .map(|n| n.max(0) as u64)
            .ok_or_else(|| unexpected("ZREMRANGEBYSCORE", &reply))
    }

    fn get(&self, key: &str) -> StateDbResult<Option<Bytes>> {
        match self.call(RedisCommand::new("GET").arg(key))? {
            RedisValue::Null => Ok(None),
            RedisValue::BulkString(b) => Ok(Some(b)),
            RedisValue::SimpleString(s) => Ok(Some(Bytes::from(s))),
            other => Err(unexpected("GET", &other)),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> StateDbResult<()> {
        expect_ok(self.call(RedisCommand::new("SET").arg(key).arg(value))?)
    }

    fn incr(&self, key: &str) -> StateDbResult<i64> {
        let reply = self.call(RedisCommand::new("INCR").arg(key))?;
        reply.as_int().ok_or_else(|| unexpected("INCR", &reply))
    }

    fn del(&self, key: &str) -> StateDbResult<bool> {
        let reply = self.call(RedisCommand::new("DEL").arg(key))?;
        reply
            .as_int()
            .map(|n| n > 0)
            .ok_or_else(|| unexpected("DEL", &reply))
    }

    fn scan_keys(&self, pattern: &str) -> StateDbResult<Vec<String>> {
        let mut cursor = "0".to_string();
        let mut keys = Vec::new();
        loop {
            let reply = self.call(
                RedisCommand::new("SCAN")
                    .arg(&cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_COUNT),
            )?;
            let parts = match reply.as_array() {
                Some([next, batch]) => (next.as_str().map(str::to_string), batch.as_array()),
                _ => return Err(unexpected("SCAN", &reply)),
            };
            let (Some(next), Some(batch)) = parts else {
                return Err(unexpected("SCAN", &reply));
            };
            keys.extend(batch.iter().filter_map(|k| k.as_str().map(str::to_string)));
            if next == "0" {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn ping(&self) -> StateDbResult<()> {
        match self.call(RedisCommand::new("PING"))? {
            RedisValue::SimpleString(s) if s == "PONG" => Ok(()),
            other => Err(unexpected("PING", &other)),
        }
    }
}
