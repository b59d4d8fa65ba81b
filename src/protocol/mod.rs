//! Client wire protocol.
//!
//! Requests are frames of length-prefixed bulk segments terminated by a
//! double-CRLF sentinel:
//!
//! ```text
//! $5\r\nlpush\r\n$3\r\nkey\r\n$1\r\na\r\n\r\n
//! ```
//!
//! Responses use tagged prefixes — `+` simple string, `:` integer,
//! `$<len>` bulk string, `*<n>` array, `-` error — and every response frame
//! ends with one extra CRLF terminator.

pub mod codec;

pub use codec::{
    decode_request, decode_response, encode_error, encode_request, encode_response, DecodeResult,
};

use bytes::Bytes;

/// Maximum size of a single bulk segment.
pub const MAX_SEGMENT_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of segments in a request frame.
pub const MAX_SEGMENTS: usize = 65_536;

/// A response value, encoded by [`encode_response`].
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Simple string (`+OK`).
    Simple(String),

    /// Integer (`:42`).
    Integer(i64),

    /// Bulk string (`$5\r\nhello`).
    Bulk(Bytes),

    /// Array of responses (`*2\r\n...`).
    Array(Vec<Response>),
}

impl Response {
    /// The `+OK` response.
    pub fn ok() -> Self {
        Self::Simple("OK".to_string())
    }

    /// The `+PONG` response.
    pub fn pong() -> Self {
        Self::Simple("PONG".to_string())
    }

    /// Create a simple string response.
    pub fn simple(s: impl Into<String>) -> Self {
        Self::Simple(s.into())
    }

    /// Create a bulk string response.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Self::Bulk(data.into())
    }

    /// Create an array response.
    pub fn array(items: Vec<Response>) -> Self {
        Self::Array(items)
    }
}
