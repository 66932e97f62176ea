//! Line codec for the hex-framed replay stream.
//!
//! Decoding yields raw hex lines (newline and trailing `\r` stripped).
//! Turning a line into a [`Frame`](crate::Frame) is left to the workers so
//! hex decoding runs in parallel rather than on the reader task.
//!
//! A line longer than `max_length` is discarded up to the next newline
//! and counted; it never terminates the stream.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::ReplayError;
use crate::frame::Frame;

/// Default maximum line length: 40 MiB of hex (20 MiB of payload).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 2 * 20 * 1024 * 1024;

#[derive(Debug)]
pub struct HexLineCodec {
    max_length: usize,
    /// Where to resume the newline search on the next call.
    next_index: usize,
    /// Set while skipping the rest of an over-long line.
    discarding: bool,
    discarded: u64,
}

impl HexLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
            next_index: 0,
            discarding: false,
            discarded: 0,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Number of over-long lines dropped so far.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    fn trim(mut line: BytesMut) -> BytesMut {
        while line.last().is_some_and(|b| b.is_ascii_whitespace()) {
            line.truncate(line.len() - 1);
        }
        line
    }
}

impl Default for HexLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for HexLineCodec {
    type Item = BytesMut;
    type Error = ReplayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let read_to = std::cmp::min(self.max_length.saturating_add(1), src.len());
            let newline = memchr::memchr(b'\n', &src[self.next_index..read_to])
                .map(|offset| self.next_index + offset);

            match (self.discarding, newline) {
                (true, Some(idx)) => {
                    src.advance(idx + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    src.advance(read_to);
                    self.next_index = 0;
                    if src.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(idx)) => {
                    self.next_index = 0;
                    let mut line = src.split_to(idx + 1);
                    line.truncate(idx);
                    let line = Self::trim(line);
                    if line.is_empty() {
                        continue;
                    }
                    return Ok(Some(line));
                }
                (false, None) if src.len() > self.max_length => {
                    let err = ReplayError::LineTooLong {
                        size: src.len(),
                        max: self.max_length,
                    };
                    warn!("discarding input line: {err}");
                    self.discarded += 1;
                    self.discarding = true;
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if self.discarding {
            self.discarding = false;
            buf.clear();
            return Ok(None);
        }
        let line = Self::trim(buf.split_to(buf.len()));
        if line.is_empty() {
            Ok(None)
        } else {
            Ok(Some(line))
        }
    }
}

impl Encoder<Frame> for HexLineCodec {
    type Error = ReplayError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let raw = item.raw();
        let start = dst.len();
        dst.resize(start + raw.len() * 2, 0);
        hex::encode_to_slice(raw, &mut dst[start..])?;
        dst.put_u8(b'\n');
        Ok(())
    }
}
