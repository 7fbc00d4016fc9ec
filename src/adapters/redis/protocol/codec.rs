//! Client-side RESP codec.
//!
//! Buffers bytes read from the connection and yields complete replies.

use super::{ParseResult, Resp2Encoder, Resp2Parser};
use crate::adapters::redis::{RedisCommand, RedisValue};
use bytes::{Buf, BytesMut};

/// Outcome of a decode attempt.
#[derive(Debug)]
pub enum DecodeResult {
    /// A complete reply was taken off the buffer.
    Complete(RedisValue),
    /// The buffer holds a partial reply.
    Incomplete,
    /// The buffer holds bytes that are not valid RESP2.
    Invalid(String),
}

/// RESP2 codec with an internal read buffer.
#[derive(Debug, Default)]
pub struct RespCodec {
    parser: Resp2Parser,
    buffer: BytesMut,
}

impl RespCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a command for the wire.
    pub fn encode(&self, command: &RedisCommand) -> Vec<u8> {
        Resp2Encoder::encode_command(command.args())
    }

    /// Append bytes read from the connection.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Drop any buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Take one complete reply off the buffer, if available.
    pub fn decode(&mut self) -> DecodeResult {
        if self.buffer.is_empty() {
            return DecodeResult::Incomplete;
        }
        match self.parser.parse(&self.buffer) {
            ParseResult::Ok { value, consumed } => {
                self.buffer.advance(consumed);
                DecodeResult::Complete(value)
            }
            ParseResult::Incomplete => DecodeResult::Incomplete,
            ParseResult::Error(e) => DecodeResult::Invalid(e),
        }
    }
}
