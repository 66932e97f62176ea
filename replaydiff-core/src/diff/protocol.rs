//! Protocol-level comparison: status code, allow-listed headers, body digest.

use crate::diff::{BODY_HASH, COMPARE_HEADERS, DiffEntry, DiffResult, STATUS};
use crate::http;

/// Length of the body digest in bytes.
pub const DIGEST_LEN: usize = 16;

/// 128-bit digest of a body: the first 16 bytes of its BLAKE3 hash.
pub fn body_digest(body: &[u8]) -> [u8; DIGEST_LEN] {
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&blake3::hash(body).as_bytes()[..DIGEST_LEN]);
    digest
}

/// Compare two raw HTTP responses and record every protocol-level mismatch.
pub fn compare_http(original: &[u8], replayed: &[u8], result: &mut DiffResult) {
    let original_status = http::status(original);
    let replayed_status = http::status(replayed);
    if original_status != replayed_status {
        result.insert(STATUS, DiffEntry::bytes(original_status, replayed_status));
    }

    for &name in COMPARE_HEADERS {
        let original_value = http::header(original, name.as_bytes()).unwrap_or_default();
        let replayed_value = http::header(replayed, name.as_bytes()).unwrap_or_default();
        if original_value != replayed_value {
            result.insert(name, DiffEntry::bytes(original_value, replayed_value));
        }
    }

    let original_sum = body_digest(&http::body(original));
    let replayed_sum = body_digest(&http::body(replayed));
    if original_sum != replayed_sum {
        result.insert(BODY_HASH, DiffEntry::bytes(&original_sum, &replayed_sum));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: &str, headers: &[(&str, &str)], body: &str) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {status}\r\n");
        for (k, v) in headers {
            out.push_str(&format!("{k}: {v}\r\n"));
        }
        out.push_str("\r\n");
        out.push_str(body);
        out.into_bytes()
    }

    #[test]
    fn status_mismatch_carries_raw_codes() {
        let mut result = DiffResult::new();
        compare_http(
            &response("200 OK", &[], ""),
            &response("404 Not Found", &[], ""),
            &mut result,
        );
        assert_eq!(result.get(STATUS), Some(&DiffEntry::bytes(b"200", b"404")));
    }

    #[test]
    fn same_status_not_reported() {
        let mut result = DiffResult::new();
        compare_http(
            &response("200 OK", &[], "a"),
            &response("200 OK", &[], "b"),
            &mut result,
        );
        assert!(!result.contains(STATUS));
        assert!(result.contains(BODY_HASH));
    }

    #[test]
    fn allow_listed_header_reported() {
        let mut result = DiffResult::new();
        compare_http(
            &response("200 OK", &[("Content-Length", "3")], "abc"),
            &response("200 OK", &[("Content-Length", "4")], "abc"),
            &mut result,
        );
        assert_eq!(
            result.get("Content-Length"),
            Some(&DiffEntry::bytes(b"3", b"4"))
        );
    }

    #[test]
    fn other_headers_ignored() {
        let mut result = DiffResult::new();
        compare_http(
            &response("200 OK", &[("X-Request-Id", "a1"), ("Date", "Mon")], "abc"),
            &response("200 OK", &[("X-Request-Id", "b2"), ("Date", "Tue")], "abc"),
            &mut result,
        );
        assert!(result.is_empty(), "{result}");
    }

    #[test]
    fn missing_header_compares_as_empty() {
        let mut result = DiffResult::new();
        compare_http(
            &response("200 OK", &[("Content-Type", "image/png")], ""),
            &response("200 OK", &[], ""),
            &mut result,
        );
        assert_eq!(
            result.get("Content-Type"),
            Some(&DiffEntry::bytes(b"image/png", b""))
        );
    }

    #[test]
    fn body_digests_are_independent() {
        let mut result = DiffResult::new();
        compare_http(
            &response("200 OK", &[], "original"),
            &response("200 OK", &[], "replayed"),
            &mut result,
        );
        let Some(DiffEntry::Bytes { original, replayed }) = result.get(BODY_HASH) else {
            panic!("expected body_hash entry: {result}");
        };
        assert_eq!(original.len(), DIGEST_LEN);
        assert_eq!(original.as_slice(), body_digest(b"original"));
        assert_eq!(replayed.as_slice(), body_digest(b"replayed"));
    }
}
