//! Byte-level accessors over raw HTTP/1.x messages.
//!
//! These never allocate for the head of the message and never fail: a
//! missing piece is an empty slice or `None`, which the diff stage then
//! compares like any other value.

use std::borrow::Cow;

use memchr::memmem;

/// Offset of the first body byte, or `None` if the head is unterminated.
fn body_offset(payload: &[u8]) -> Option<usize> {
    if let Some(idx) = memmem::find(payload, b"\r\n\r\n") {
        return Some(idx + 4);
    }
    memmem::find(payload, b"\n\n").map(|idx| idx + 2)
}

/// The message head: start line plus headers, without the blank line.
fn head(payload: &[u8]) -> &[u8] {
    match body_offset(payload) {
        Some(offset) => &payload[..offset],
        None => payload,
    }
}

fn trim(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

/// The status code token of a response (`b"200"` for `HTTP/1.1 200 OK`).
///
/// Returns an empty slice when the start line has no second token.
pub fn status(payload: &[u8]) -> &[u8] {
    let line_end = memchr::memchr(b'\n', payload).unwrap_or(payload.len());
    let line = &payload[..line_end];
    line.split(|&b| b == b' ')
        .nth(1)
        .map(trim)
        .unwrap_or_default()
}

/// Value of the first header named `name`, matched case-insensitively.
pub fn header<'a>(payload: &'a [u8], name: &[u8]) -> Option<&'a [u8]> {
    head(payload)
        .split(|&b| b == b'\n')
        .skip(1)
        .filter_map(|line| {
            let colon = memchr::memchr(b':', line)?;
            Some((trim(&line[..colon]), &line[colon + 1..]))
        })
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| trim(value))
}

/// The message body, with chunked transfer-encoding removed.
///
/// A chunked body that fails to parse is returned raw.
pub fn body(payload: &[u8]) -> Cow<'_, [u8]> {
    let Some(offset) = body_offset(payload) else {
        return Cow::Borrowed(&[]);
    };
    let raw = &payload[offset..];

    let chunked = header(payload, b"Transfer-Encoding")
        .is_some_and(|te| te.eq_ignore_ascii_case(b"chunked"));
    if chunked {
        if let Some(decoded) = dechunk(raw) {
            return Cow::Owned(decoded);
        }
    }
    Cow::Borrowed(raw)
}

fn dechunk(mut raw: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(raw.len());
    loop {
        let line_end = memchr::memchr(b'\n', raw)?;
        let size_line = trim(&raw[..line_end]);
        // Chunk extensions follow a ';'.
        let size_hex = size_line.split(|&b| b == b';').next()?;
        let size = usize::from_str_radix(std::str::from_utf8(trim(size_hex)).ok()?, 16).ok()?;
        raw = &raw[line_end + 1..];
        if size == 0 {
            return Some(out);
        }
        if raw.len() < size {
            return None;
        }
        out.extend_from_slice(&raw[..size]);
        raw = &raw[size..];
        raw = raw
            .strip_prefix(b"\r\n")
            .or_else(|| raw.strip_prefix(b"\n"))
            .unwrap_or(raw);
    }
}
