//! Incremental frame decoder and response encoder.

use super::{Response, MAX_SEGMENTS, MAX_SEGMENT_SIZE};
use crate::core::error::StoreError;
use bytes::{Bytes, BytesMut};

/// Outcome of an incremental decode over a partial buffer.
#[derive(Debug, PartialEq)]
pub enum DecodeResult<T> {
    /// A complete frame was decoded; `consumed` bytes may be discarded.
    Frame { frame: T, consumed: usize },

    /// More input is required.
    Incomplete,

    /// The stream is corrupt and the connection should be closed.
    Corrupt(String),
}

/// Decode one request frame from the front of `data`.
///
/// A request is a sequence of `$<len>\r\n<bytes>\r\n` segments ending with an
/// empty CRLF line. Returns the ordered segments.
pub fn decode_request(data: &[u8]) -> DecodeResult<Vec<Bytes>> {
    let mut segments = Vec::new();
    let mut pos = 0;

    loop {
        if data.len() < pos + 2 {
            return DecodeResult::Incomplete;
        }

        // Double CRLF sentinel closes the frame.
        if &data[pos..pos + 2] == b"\r\n" {
            if segments.is_empty() {
                return DecodeResult::Corrupt("empty request frame".to_string());
            }
            return DecodeResult::Frame {
                frame: segments,
                consumed: pos + 2,
            };
        }

        if data[pos] != b'$' {
            return DecodeResult::Corrupt(format!(
                "expected bulk segment prefix, found 0x{:02x}",
                data[pos]
            ));
        }

        let Some(line_end) = find_crlf(&data[pos + 1..]) else {
            return DecodeResult::Incomplete;
        };
        let len_str = match std::str::from_utf8(&data[pos + 1..pos + 1 + line_end]) {
            Ok(s) => s,
            Err(_) => return DecodeResult::Corrupt("non-utf8 segment length".to_string()),
        };
        let len = match len_str.parse::<usize>() {
            Ok(len) if len <= MAX_SEGMENT_SIZE => len,
            Ok(len) => {
                return DecodeResult::Corrupt(format!(
                    "segment too large: {} > {}",
                    len, MAX_SEGMENT_SIZE
                ))
            }
            Err(_) => return DecodeResult::Corrupt("invalid segment length".to_string()),
        };

        let payload_start = pos + 1 + line_end + 2;
        let payload_end = payload_start + len;
        if data.len() < payload_end + 2 {
            return DecodeResult::Incomplete;
        }
        if &data[payload_end..payload_end + 2] != b"\r\n" {
            return DecodeResult::Corrupt("missing CRLF after segment payload".to_string());
        }

        segments.push(Bytes::copy_from_slice(&data[payload_start..payload_end]));
        if segments.len() > MAX_SEGMENTS {
            return DecodeResult::Corrupt(format!("too many segments (> {})", MAX_SEGMENTS));
        }
        pos = payload_end + 2;
    }
}

/// Encode a command as a request frame (used for replication entries and
/// leader forwarding).
pub fn encode_request(args: &[Bytes]) -> Bytes {
    let mut buf = BytesMut::new();
    for arg in args {
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"\r\n");
    buf.freeze()
}

/// Encode a response value, including the extra frame-terminating CRLF.
pub fn encode_response(response: &Response) -> Bytes {
    let mut buf = BytesMut::new();
    encode_value(response, &mut buf);
    buf.extend_from_slice(b"\r\n");
    buf.freeze()
}

/// Encode an error onto the wire: `-<KIND> <message>` plus the frame
/// terminator.
pub fn encode_error(error: &StoreError) -> Bytes {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(b"-");
    buf.extend_from_slice(error.kind().as_bytes());
    buf.extend_from_slice(b" ");
    buf.extend_from_slice(error.to_string().as_bytes());
    buf.extend_from_slice(b"\r\n\r\n");
    buf.freeze()
}

fn encode_value(response: &Response, buf: &mut BytesMut) {
    match response {
        Response::Simple(s) => {
            buf.extend_from_slice(b"+");
            buf.extend_from_slice(s.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        Response::Integer(n) => {
            buf.extend_from_slice(format!(":{}\r\n", n).as_bytes());
        }
        Response::Bulk(data) => {
            buf.extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
            buf.extend_from_slice(data);
            buf.extend_from_slice(b"\r\n");
        }
        Response::Array(items) => {
            buf.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                encode_value(item, buf);
            }
        }
    }
}

/// Decode one complete response frame from the front of `data`, returning it
/// verbatim. Used when proxying a forwarded command's response back to the
/// client.
pub fn decode_response(data: &[u8]) -> DecodeResult<Bytes> {
    match scan_value(data, 0) {
        Ok(Some(end)) => {
            // The frame terminator follows the top-level value.
            if data.len() < end + 2 {
                return DecodeResult::Incomplete;
            }
            if &data[end..end + 2] != b"\r\n" {
                return DecodeResult::Corrupt("missing response frame terminator".to_string());
            }
            DecodeResult::Frame {
                frame: Bytes::copy_from_slice(&data[..end + 2]),
                consumed: end + 2,
            }
        }
        Ok(None) => DecodeResult::Incomplete,
        Err(message) => DecodeResult::Corrupt(message),
    }
}

/// Scan one tagged value starting at `pos`; returns the offset one past its
/// end, or `None` if the buffer is short.
fn scan_value(data: &[u8], pos: usize) -> Result<Option<usize>, String> {
    if data.len() <= pos {
        return Ok(None);
    }
    match data[pos] {
        b'+' | b'-' | b':' => match find_crlf(&data[pos..]) {
            Some(idx) => Ok(Some(pos + idx + 2)),
            None => Ok(None),
        },
        b'$' => {
            let Some(idx) = find_crlf(&data[pos + 1..]) else {
                return Ok(None);
            };
            let len: usize = std::str::from_utf8(&data[pos + 1..pos + 1 + idx])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| "invalid bulk length in response".to_string())?;
            let end = pos + 1 + idx + 2 + len + 2;
            if data.len() < end {
                return Ok(None);
            }
            Ok(Some(end))
        }
        b'*' => {
            let Some(idx) = find_crlf(&data[pos + 1..]) else {
                return Ok(None);
            };
            let count: usize = std::str::from_utf8(&data[pos + 1..pos + 1 + idx])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| "invalid array length in response".to_string())?;
            let mut cursor = pos + 1 + idx + 2;
            for _ in 0..count {
                match scan_value(data, cursor)? {
                    Some(next) => cursor = next,
                    None => return Ok(None),
                }
            }
            Ok(Some(cursor))
        }
        other => Err(format!("invalid response prefix 0x{:02x}", other)),
    }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(args: &[&str]) -> Vec<Bytes> {
        args.iter().map(|a| Bytes::copy_from_slice(a.as_bytes())).collect()
    }

    #[test]
    fn test_decode_request_complete() {
        let data = b"$5\r\nlpush\r\n$3\r\nkey\r\n$1\r\na\r\n\r\n";
        match decode_request(data) {
            DecodeResult::Frame { frame: f, consumed } => {
                assert_eq!(f, frame(&["lpush", "key", "a"]));
                assert_eq!(consumed, data.len());
            }
            other => panic!("unexpected decode result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_request_partial() {
        let data = b"$5\r\nlpush\r\n$3\r\nke";
        assert_eq!(decode_request(data), DecodeResult::Incomplete);
    }

    #[test]
    fn test_decode_request_pipelined() {
        let data = b"$4\r\nping\r\n\r\n$4\r\nping\r\n\r\n";
        match decode_request(data) {
            DecodeResult::Frame { frame: f, consumed } => {
                assert_eq!(f, frame(&["ping"]));
                assert_eq!(consumed, 12);
                match decode_request(&data[consumed..]) {
                    DecodeResult::Frame { frame: f2, .. } => assert_eq!(f2, frame(&["ping"])),
                    other => panic!("unexpected decode result: {:?}", other),
                }
            }
            other => panic!("unexpected decode result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_request_rejects_garbage() {
        assert!(matches!(
            decode_request(b"hello\r\n\r\n"),
            DecodeResult::Corrupt(_)
        ));
        assert!(matches!(
            decode_request(b"\r\n"),
            DecodeResult::Corrupt(_)
        ));
    }

    #[test]
    fn test_request_round_trip() {
        let args = frame(&["lmove", "src", "dst", "left", "right"]);
        let encoded = encode_request(&args);
        match decode_request(&encoded) {
            DecodeResult::Frame { frame: f, consumed } => {
                assert_eq!(f, args);
                assert_eq!(consumed, encoded.len());
            }
            other => panic!("unexpected decode result: {:?}", other),
        }
    }

    #[test]
    fn test_encode_simple_and_integer() {
        assert_eq!(&encode_response(&Response::ok())[..], b"+OK\r\n\r\n");
        assert_eq!(&encode_response(&Response::Integer(0))[..], b":0\r\n\r\n");
    }

    #[test]
    fn test_encode_bulk_and_array() {
        assert_eq!(
            &encode_response(&Response::bulk("hello"))[..],
            b"$5\r\nhello\r\n\r\n"
        );
        let arr = Response::array(vec![Response::bulk("a"), Response::bulk("b")]);
        assert_eq!(
            &encode_response(&arr)[..],
            b"*2\r\n$1\r\na\r\n$1\r\nb\r\n\r\n"
        );
    }

    #[test]
    fn test_encode_error() {
        let encoded = encode_error(&StoreError::WrongType);
        assert!(encoded.starts_with(b"-WRONGTYPE "));
        assert!(encoded.ends_with(b"\r\n\r\n"));
    }

    #[test]
    fn test_decode_response_frames() {
        let ok = encode_response(&Response::ok());
        match decode_response(&ok) {
            DecodeResult::Frame { frame, consumed } => {
                assert_eq!(frame, ok);
                assert_eq!(consumed, ok.len());
            }
            other => panic!("unexpected decode result: {:?}", other),
        }

        let arr = encode_response(&Response::array(vec![
            Response::bulk("1"),
            Response::Integer(2),
        ]));
        match decode_response(&arr) {
            DecodeResult::Frame { frame, .. } => assert_eq!(frame, arr),
            other => panic!("unexpected decode result: {:?}", other),
        }

        assert_eq!(decode_response(b"*2\r\n$1\r\na\r\n"), DecodeResult::Incomplete);
    }
}
