//! Upstream frame codec
//!
//! Every upstream unit is a 16-byte big-endian header followed by a body:
//!
//! ```text
//! +-------------+------------+-------------+-------------+-------------+------+
//! | total_len   | header_len | protover    | operation   | sequence    | body |
//! | u32         | u16 (=16)  | u16         | u32         | u32 (=1)    |      |
//! +-------------+------------+-------------+-------------+-------------+------+
//! ```
//!
//! protover 3 bodies are zlib streams holding further frames; `decode`
//! unwraps them recursively. Decoding is pure and never fails as a whole:
//! a broken frame is logged and skipped (or ends the buffer, when the header
//! itself cannot be trusted).

use std::borrow::Cow;
use std::io::Read;

use flate2::read::ZlibDecoder;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::CodecError;

/// Fixed header size in bytes
pub const HEADER_LEN: usize = 16;

/// Sequence number stamped on every outbound frame
pub const SEQUENCE: u32 = 1;

/// Client version advertised in the auth body
pub const CLIENT_VERSION: &str = "2.6.42";

/// Heartbeat body; upstream ignores the content
pub const HEARTBEAT_BODY: &str = "[object Object]";

/// Protocol versions
pub mod protover {
    pub const JSON: u16 = 0;
    pub const INT: u16 = 1;
    pub const PLAIN: u16 = 2;
    pub const ZLIB: u16 = 3;
}

/// Operation codes
pub mod op {
    pub const HEARTBEAT: u32 = 2;
    pub const HEARTBEAT_REPLY: u32 = 3;
    pub const MESSAGE: u32 = 5;
    pub const AUTH: u32 = 7;
    pub const AUTH_REPLY: u32 = 8;
}

/// One decoded logical frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: u16,
    pub operation: u32,
    pub sequence: u32,
    pub body: Vec<u8>,
}

impl Frame {
    /// Counter carried by a heartbeat reply (op 3)
    ///
    /// Returns None for other operations or bodies shorter than 4 bytes.
    pub fn heartbeat_count(&self) -> Option<u32> {
        if self.operation != op::HEARTBEAT_REPLY {
            return None;
        }
        let bytes: [u8; 4] = self.body.get(..4)?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    /// Body as text (op 5 and op 8 carry JSON)
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Parsed header of the frame at the start of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub total_len: u32,
    pub header_len: u16,
    pub version: u16,
    pub operation: u32,
    pub sequence: u32,
}

#[derive(Serialize)]
struct AuthBody<'a> {
    uid: u64,
    roomid: u64,
    protover: u16,
    platform: &'a str,
    #[serde(rename = "type")]
    kind: u8,
    key: &'a str,
    clientver: &'a str,
}

/// Build the anonymous auth request (op 7) for a resolved room id
pub fn encode_auth(real_room_id: u64) -> Vec<u8> {
    let body = AuthBody {
        uid: 0,
        roomid: real_room_id,
        protover: protover::ZLIB,
        platform: "web",
        kind: 2,
        key: "",
        clientver: CLIENT_VERSION,
    };
    // A struct of integers and static strings always serializes.
    let json = serde_json::to_vec(&body).unwrap_or_default();
    debug!(room = real_room_id, "encoding auth frame");
    encode_frame(op::AUTH, &json)
}

/// Build a heartbeat request (op 2)
pub fn encode_heartbeat() -> Vec<u8> {
    encode_frame(op::HEARTBEAT, HEARTBEAT_BODY.as_bytes())
}

/// Wrap `body` in a header stamped with protover 3, as upstream expects
/// for client frames
pub fn encode_frame(operation: u32, body: &[u8]) -> Vec<u8> {
    encode_frame_versioned(protover::ZLIB, operation, body)
}

/// Wrap `body` in a header with an explicit protocol version
pub fn encode_frame_versioned(version: u16, operation: u32, body: &[u8]) -> Vec<u8> {
    let total_len = (HEADER_LEN + body.len()) as u32;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&total_len.to_be_bytes());
    out.extend_from_slice(&(HEADER_LEN as u16).to_be_bytes());
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(&operation.to_be_bytes());
    out.extend_from_slice(&SEQUENCE.to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Read and validate the header at the start of `buf`
pub fn decode_header(buf: &[u8]) -> Result<FrameHeader, CodecError> {
    if buf.len() < HEADER_LEN {
        return Err(CodecError::Decode(format!(
            "need {} header bytes, have {}",
            HEADER_LEN,
            buf.len()
        )));
    }

    let header = FrameHeader {
        total_len: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
        header_len: u16::from_be_bytes([buf[4], buf[5]]),
        version: u16::from_be_bytes([buf[6], buf[7]]),
        operation: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        sequence: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
    };

    if header.header_len as usize != HEADER_LEN {
        return Err(CodecError::Decode(format!(
            "header length {} != {}",
            header.header_len, HEADER_LEN
        )));
    }
    let total = header.total_len as usize;
    if total < HEADER_LEN {
        return Err(CodecError::Decode(format!(
            "total length {} shorter than header",
            total
        )));
    }
    if total > buf.len() {
        return Err(CodecError::Decode(format!(
            "total length {} exceeds remaining {}",
            total,
            buf.len()
        )));
    }

    Ok(header)
}

/// Decode every complete frame in `buf`, unwrapping compressed containers
pub fn decode(buf: &[u8]) -> Vec<Frame> {
    let mut frames = Vec::new();
    decode_into(buf, &mut frames);
    frames
}

fn decode_into(buf: &[u8], frames: &mut Vec<Frame>) {
    let mut offset = 0;

    while offset < buf.len() {
        let header = match decode_header(&buf[offset..]) {
            Ok(header) => header,
            Err(e) => {
                warn!(
                    offset,
                    remaining = buf.len() - offset,
                    error = %e,
                    "discarding rest of buffer"
                );
                break;
            }
        };

        let end = offset + header.total_len as usize;
        let body = &buf[offset + HEADER_LEN..end];

        if header.version == protover::ZLIB {
            match inflate(body) {
                Ok(inner) => decode_into(&inner, frames),
                Err(e) => warn!(offset, error = %e, "skipping compressed frame"),
            }
        } else {
            frames.push(Frame {
                version: header.version,
                operation: header.operation,
                sequence: header.sequence,
                body: body.to_vec(),
            });
        }

        offset = end;
    }
}

fn inflate(body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    ZlibDecoder::new(body)
        .read_to_end(&mut out)
        .map_err(CodecError::Decompression)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    use super::*;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_header_layout() {
        let frame = encode_frame(op::AUTH, b"abc");
        assert_eq!(frame.len(), 19);
        assert_eq!(&frame[0..4], &19u32.to_be_bytes());
        assert_eq!(&frame[4..6], &16u16.to_be_bytes());
        assert_eq!(&frame[6..8], &3u16.to_be_bytes());
        assert_eq!(&frame[8..12], &7u32.to_be_bytes());
        assert_eq!(&frame[12..16], &1u32.to_be_bytes());
        assert_eq!(&frame[16..], b"abc");
    }

    #[test]
    fn test_auth_body() {
        let frame = encode_auth(456);
        let header = decode_header(&frame).unwrap();
        assert_eq!(header.operation, op::AUTH);

        let body: serde_json::Value = serde_json::from_slice(&frame[HEADER_LEN..]).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "uid": 0,
                "roomid": 456,
                "protover": 3,
                "platform": "web",
                "type": 2,
                "key": "",
                "clientver": "2.6.42",
            })
        );
    }

    #[test]
    fn test_heartbeat_frame() {
        let frame = encode_heartbeat();
        let header = decode_header(&frame).unwrap();
        assert_eq!(header.operation, op::HEARTBEAT);
        assert_eq!(&frame[HEADER_LEN..], HEARTBEAT_BODY.as_bytes());
    }

    #[test]
    fn test_decode_plain_frame() {
        let buf = encode_frame_versioned(protover::PLAIN, op::MESSAGE, b"{\"cmd\":\"X\"}");
        let frames = decode(&buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].operation, op::MESSAGE);
        assert_eq!(frames[0].text(), "{\"cmd\":\"X\"}");
    }

    #[test]
    fn test_heartbeat_reply_count() {
        let count = 1234u32.to_be_bytes();
        let buf = encode_frame_versioned(protover::INT, op::HEARTBEAT_REPLY, &count);
        let frames = decode(&buf);
        assert_eq!(frames[0].heartbeat_count(), Some(1234));

        let short = encode_frame_versioned(protover::INT, op::HEARTBEAT_REPLY, &[1, 2]);
        assert_eq!(decode(&short)[0].heartbeat_count(), None);
    }

    #[test]
    fn test_decode_compressed_container() {
        let mut inner = encode_frame_versioned(protover::PLAIN, op::MESSAGE, b"one");
        inner.extend(encode_frame_versioned(protover::PLAIN, op::MESSAGE, b"two"));
        let buf = encode_frame(op::MESSAGE, &zlib(&inner));

        let frames = decode(&buf);
        let bodies: Vec<_> = frames.iter().map(|f| f.text().into_owned()).collect();
        assert_eq!(bodies, vec!["one", "two"]);
    }

    #[test]
    fn test_corrupt_compressed_frame_is_skipped() {
        let mut buf = encode_frame(op::MESSAGE, b"definitely not zlib");
        buf.extend(encode_frame_versioned(protover::PLAIN, op::AUTH_REPLY, b"{\"code\":0}"));

        let frames = decode(&buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].operation, op::AUTH_REPLY);
    }

    #[test]
    fn test_bad_header_len_discards_rest() {
        let mut buf = encode_frame_versioned(protover::PLAIN, op::MESSAGE, b"ok");
        let mut bad = encode_frame_versioned(protover::PLAIN, op::MESSAGE, b"bad");
        bad[4..6].copy_from_slice(&12u16.to_be_bytes());
        buf.extend(bad);
        buf.extend(encode_frame_versioned(protover::PLAIN, op::MESSAGE, b"lost"));

        let frames = decode(&buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body, b"ok");
    }

    #[test]
    fn test_total_len_shorter_than_header() {
        let mut buf = encode_frame_versioned(protover::PLAIN, op::MESSAGE, b"");
        buf[0..4].copy_from_slice(&8u32.to_be_bytes());
        assert!(matches!(decode_header(&buf), Err(CodecError::Decode(_))));
        assert!(decode(&buf).is_empty());
    }
}
