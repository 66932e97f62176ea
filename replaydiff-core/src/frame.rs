//! Frame types for the replay input stream.
//!
//! # Record Layout
//!
//! Every input line is hex. Once decoded, a record looks like:
//!
//! ```text
//! <tag> <request-id> <timestamp-or-rtt>\n<raw HTTP bytes>
//! ```
//!
//! `tag` is a single ASCII digit: `1` request, `2` original response,
//! `3` replayed response. The three frames of one logical request share
//! the same `request-id`.

use std::fmt;

use bytes::Bytes;

use crate::error::ReplayError;

// ── Stage ────────────────────────────────────────────────────────

/// Which leg of a replayed exchange a frame carries.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// The live request as captured in production.
    Request = b'1',
    /// The response production returned.
    Response = b'2',
    /// The response the candidate server returned on replay.
    ReplayedResponse = b'3',
}

impl TryFrom<u8> for Stage {
    type Error = ReplayError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'1' => Ok(Stage::Request),
            b'2' => Ok(Stage::Response),
            b'3' => Ok(Stage::ReplayedResponse),
            _ => Err(ReplayError::UnknownStage(value)),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Stage {
    /// Returns `true` for either response variant.
    pub fn is_response(&self) -> bool {
        !matches!(self, Stage::Request)
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// One decoded unit of the input stream.
///
/// `payload` is a zero-copy view into `raw`, so cloning a frame is cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    stage: Stage,
    id: String,
    timestamp: i64,
    raw: Bytes,
    payload: Bytes,
}

impl Frame {
    /// Build a frame from its parts, producing the same record layout the
    /// input stream uses.
    pub fn new(stage: Stage, id: impl Into<String>, timestamp: i64, payload: &[u8]) -> Self {
        let id = id.into();
        let header = format!("{} {} {}\n", stage as u8 as char, id, timestamp);
        let mut raw = Vec::with_capacity(header.len() + payload.len());
        raw.extend_from_slice(header.as_bytes());
        raw.extend_from_slice(payload);
        let raw = Bytes::from(raw);
        let payload = raw.slice(header.len()..);
        Self {
            stage,
            id,
            timestamp,
            raw,
            payload,
        }
    }

    /// Decode one hex line (without its trailing newline).
    pub fn decode_hex(line: &[u8]) -> Result<Self, ReplayError> {
        let raw = hex::decode(line)?;
        Self::from_record(Bytes::from(raw))
    }

    /// Parse an already hex-decoded record.
    pub fn from_record(raw: Bytes) -> Result<Self, ReplayError> {
        if raw.is_empty() {
            return Err(ReplayError::MalformedFrame("empty record"));
        }
        let stage = Stage::try_from(raw[0])?;

        let newline = memchr::memchr(b'\n', &raw)
            .ok_or(ReplayError::MalformedFrame("missing header newline"))?;
        let header = std::str::from_utf8(&raw[..newline])
            .map_err(|_| ReplayError::MalformedFrame("header is not utf-8"))?;

        let mut meta = header.split(' ');
        if meta.next().map(str::len) != Some(1) {
            return Err(ReplayError::MalformedFrame("tag is not a single byte"));
        }
        let id = match meta.next() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err(ReplayError::MalformedFrame("missing request id")),
        };
        // Carried, never interpreted: an unreadable value reads as 0 and the
        // raw header still travels with the frame.
        let timestamp = meta
            .next()
            .and_then(|ts| ts.trim().parse().ok())
            .unwrap_or(0);

        let payload = raw.slice(newline + 1..);
        Ok(Self {
            stage,
            id,
            timestamp,
            raw,
            payload,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Request start time for requests, round-trip time for responses.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The HTTP bytes after the header line.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The whole decoded record, header line included.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("stage", &self.stage)
            .field("id", &self.id)
            .field("timestamp", &self.timestamp)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_roundtrip() {
        for stage in [Stage::Request, Stage::Response, Stage::ReplayedResponse] {
            assert_eq!(Stage::try_from(stage as u8).unwrap(), stage);
        }
    }

    #[test]
    fn stage_invalid() {
        assert!(matches!(
            Stage::try_from(b'9'),
            Err(ReplayError::UnknownStage(b'9'))
        ));
    }

    #[test]
    fn decode_request_record() {
        let record = b"1 8a2f3c 1530000000000\nGET /img.png HTTP/1.1\r\n\r\n";
        let frame = Frame::decode_hex(hex::encode(record).as_bytes()).unwrap();
        assert_eq!(frame.stage(), Stage::Request);
        assert_eq!(frame.id(), "8a2f3c");
        assert_eq!(frame.timestamp(), 1_530_000_000_000);
        assert_eq!(frame.payload().as_ref(), b"GET /img.png HTTP/1.1\r\n\r\n");
        assert_eq!(frame.raw().as_ref(), record);
    }

    #[test]
    fn new_matches_decoded_layout() {
        let built = Frame::new(Stage::ReplayedResponse, "abc", 42, b"HTTP/1.1 200 OK\r\n\r\n");
        let parsed = Frame::from_record(built.raw().clone()).unwrap();
        assert_eq!(built, parsed);
    }

    #[test]
    fn missing_timestamp_defaults_to_zero() {
        let frame = Frame::from_record(Bytes::from_static(b"2 abc\nHTTP/1.1 200 OK\r\n")).unwrap();
        assert_eq!(frame.timestamp(), 0);
        assert_eq!(frame.stage(), Stage::Response);
    }

    #[test]
    fn unreadable_timestamp_kept_raw() {
        let record = b"1 abc notanumber\nGET / HTTP/1.1\r\n\r\n";
        let frame = Frame::from_record(Bytes::from_static(record)).unwrap();
        assert_eq!(frame.timestamp(), 0);
        assert_eq!(frame.id(), "abc");
        assert_eq!(frame.raw().as_ref(), record);
        assert_eq!(frame.payload().as_ref(), b"GET / HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn empty_record_rejected() {
        assert!(matches!(
            Frame::from_record(Bytes::new()),
            Err(ReplayError::MalformedFrame(_))
        ));
    }

    #[test]
    fn missing_newline_rejected() {
        let err = Frame::from_record(Bytes::from_static(b"1 abc 1")).unwrap_err();
        assert!(err.to_string().contains("newline"));
    }

    #[test]
    fn missing_id_rejected() {
        let err = Frame::from_record(Bytes::from_static(b"1\nGET / HTTP/1.1")).unwrap_err();
        assert!(err.to_string().contains("request id"));
    }

    #[test]
    fn unknown_tag_rejected() {
        assert!(matches!(
            Frame::from_record(Bytes::from_static(b"4 abc 1\n")),
            Err(ReplayError::UnknownStage(b'4'))
        ));
    }

    #[test]
    fn bad_hex_rejected() {
        assert!(matches!(
            Frame::decode_hex(b"31zz"),
            Err(ReplayError::InvalidHex(_))
        ));
    }
}
