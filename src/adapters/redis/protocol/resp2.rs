//! RESP2 reply parser and command encoder.
//!
//! RESP2 is the default Redis protocol, supporting:
//! - Simple Strings (+)
//! - Errors (-)
//! - Integers (:)
//! - Bulk Strings ($)
//! - Arrays (*)
//! - Null (represented as $-1 or *-1)

use super::{ParseResult, RespType, MAX_BULK_SIZE, MAX_ELEMENTS, MAX_NESTING_DEPTH};
use crate::adapters::redis::{RedisError, RedisValue};
use bytes::Bytes;

/// RESP2 parser.
#[derive(Debug, Default)]
pub struct Resp2Parser {
    /// Current nesting depth.
    depth: usize,
}

impl Resp2Parser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one value from the front of the buffer.
    pub fn parse(&mut self, data: &[u8]) -> ParseResult {
        self.depth = 0;
        self.parse_value(data)
    }

    fn parse_value(&mut self, data: &[u8]) -> ParseResult {
        if data.is_empty() {
            return ParseResult::Incomplete;
        }

        if self.depth > MAX_NESTING_DEPTH {
            return ParseResult::Error("maximum nesting depth exceeded".to_string());
        }

        match RespType::from_byte(data[0]) {
            Some(RespType::SimpleString) => parse_simple_string(&data[1..]),
            Some(RespType::Error) => parse_error(&data[1..]),
            Some(RespType::Integer) => parse_integer(&data[1..]),
            Some(RespType::BulkString) => parse_bulk_string(&data[1..]),
            Some(RespType::Array) => self.parse_array(&data[1..]),
            None => ParseResult::Error(format!("unexpected type byte 0x{:02x}", data[0])),
        }
    }

    /// Parse an array (*2\r\n...).
    fn parse_array(&mut self, data: &[u8]) -> ParseResult {
        let Some(len_pos) = find_crlf(data) else {
            return ParseResult::Incomplete;
        };
        let len = match parse_length(&data[..len_pos]) {
            Some(-1) => {
                return ParseResult::Ok {
                    value: RedisValue::Null,
                    consumed: len_pos + 3,
                }
            }
            Some(len) if len >= 0 => len as usize,
            _ => return ParseResult::Error("invalid array length".to_string()),
        };
        if len > MAX_ELEMENTS {
            return ParseResult::Error(format!("array too large: {} > {}", len, MAX_ELEMENTS));
        }

        self.depth += 1;
        let mut elements = Vec::with_capacity(len.min(1024));
        let mut offset = len_pos + 2;

        for _ in 0..len {
            match self.parse_value(&data[offset..]) {
                ParseResult::Ok { value, consumed } => {
                    elements.push(value);
                    offset += consumed;
                }
                other => {
                    self.depth -= 1;
                    return other;
                }
            }
        }

        self.depth -= 1;
        ParseResult::Ok {
            value: RedisValue::Array(elements),
            consumed: offset + 1, // +1 for prefix
        }
    }
}

/// Parse a simple string (+OK\r\n).
fn parse_simple_string(data: &[u8]) -> ParseResult {
    match find_crlf(data) {
        Some(pos) => ParseResult::Ok {
            value: RedisValue::SimpleString(String::from_utf8_lossy(&data[..pos]).to_string()),
            consumed: pos + 3, // +1 for prefix, +2 for CRLF
        },
        None => ParseResult::Incomplete,
    }
}

/// Parse an error (-ERR message\r\n).
fn parse_error(data: &[u8]) -> ParseResult {
    match find_crlf(data) {
        Some(pos) => {
            let s = String::from_utf8_lossy(&data[..pos]);
            let (kind, message) = parse_error_string(&s);
            ParseResult::Ok {
                value: RedisValue::Error(RedisError { kind, message }),
                consumed: pos + 3,
            }
        }
        None => ParseResult::Incomplete,
    }
}

/// Parse an integer (:1000\r\n).
fn parse_integer(data: &[u8]) -> ParseResult {
    match find_crlf(data) {
        Some(pos) => match parse_length(&data[..pos]) {
            Some(n) => ParseResult::Ok {
                value: RedisValue::Integer(n),
                consumed: pos + 3,
            },
            None => ParseResult::Error("invalid integer".to_string()),
        },
        None => ParseResult::Incomplete,
    }
}

/// Parse a bulk string ($6\r\nfoobar\r\n).
fn parse_bulk_string(data: &[u8]) -> ParseResult {
    let Some(len_pos) = find_crlf(data) else {
        return ParseResult::Incomplete;
    };
    let len = match parse_length(&data[..len_pos]) {
        Some(-1) => {
            return ParseResult::Ok {
                value: RedisValue::Null,
                consumed: len_pos + 3,
            }
        }
        Some(len) if len >= 0 => len as usize,
        _ => return ParseResult::Error("invalid bulk string length".to_string()),
    };
    if len > MAX_BULK_SIZE {
        return ParseResult::Error(format!(
            "bulk string too large: {} > {}",
            len, MAX_BULK_SIZE
        ));
    }

    let data_start = len_pos + 2;
    let data_end = data_start + len;
    if data.len() < data_end + 2 {
        return ParseResult::Incomplete;
    }
    if &data[data_end..data_end + 2] != b"\r\n" {
        return ParseResult::Error("missing CRLF after bulk string".to_string());
    }

    ParseResult::Ok {
        value: RedisValue::BulkString(Bytes::copy_from_slice(&data[data_start..data_end])),
        consumed: data_end + 3, // +1 for prefix, +2 for trailing CRLF
    }
}

/// RESP2 encoder.
#[derive(Debug, Default)]
pub struct Resp2Encoder;

impl Resp2Encoder {
    /// Encode a value to bytes.
    pub fn encode(value: &RedisValue) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        Self::encode_into(value, &mut buf);
        buf
    }

    /// Encode a value into a buffer.
    pub fn encode_into(value: &RedisValue, buf: &mut Vec<u8>) {
        match value {
            RedisValue::SimpleString(s) => {
                buf.push(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RedisValue::Error(e) => {
                buf.push(b'-');
                buf.extend_from_slice(e.kind.as_bytes());
                if !e.message.is_empty() {
                    buf.push(b' ');
                    buf.extend_from_slice(e.message.as_bytes());
                }
                buf.extend_from_slice(b"\r\n");
            }
            RedisValue::Integer(n) => {
                buf.push(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RedisValue::BulkString(data) => Self::encode_bulk(data, buf),
            RedisValue::Array(elements) => {
                buf.push(b'*');
                buf.extend_from_slice(elements.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                for elem in elements {
                    Self::encode_into(elem, buf);
                }
            }
            RedisValue::Null => {
                buf.extend_from_slice(b"$-1\r\n");
            }
        }
    }

    /// Encode a command as an array of bulk strings.
    pub fn encode_command(args: &[Bytes]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + args.iter().map(|a| a.len() + 16).sum::<usize>());
        buf.push(b'*');
        buf.extend_from_slice(args.len().to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
        for arg in args {
            Self::encode_bulk(arg, &mut buf);
        }
        buf
    }

    fn encode_bulk(data: &[u8], buf: &mut Vec<u8>) {
        buf.push(b'$');
        buf.extend_from_slice(data.len().to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(data);
        buf.extend_from_slice(b"\r\n");
    }
}

/// Find CRLF in data, returning position of first \r.
fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn parse_length(data: &[u8]) -> Option<i64> {
    std::str::from_utf8(data).ok()?.parse::<i64>().ok()
}

/// Parse error string into kind and message.
fn parse_error_string(s: &str) -> (String, String) {
    if let Some(pos) = s.find(' ') {
        (s[..pos].to_string(), s[pos + 1..].to_string())
    } else {
        (s.to_string(), String::new())
    }
}
