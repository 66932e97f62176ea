//! Correlation store: pairs the frames of one request by id.
//!
//! Two independent maps, each behind its own lock:
//!
//! - **requests**: `id → request payload`, read when a pair completes.
//! - **responses**: `id → first-arrived response variant`, removed when
//!   the second variant arrives.
//!
//! No method holds both locks at once. Pairing is a single critical
//! section on the responses map, so exactly one caller observes the
//! "counterpart found" transition for a given id.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use crate::frame::Stage;

// ── Entries ──────────────────────────────────────────────────────

#[derive(Debug)]
struct PendingRequest {
    payload: Bytes,
    recorded_at: Instant,
}

/// A response variant waiting for its counterpart.
#[derive(Debug, Clone)]
pub struct PendingResponse {
    /// Raw HTTP response bytes.
    pub payload: Bytes,
    /// Which variant this is (`Response` or `ReplayedResponse`).
    pub stage: Stage,
    /// When the entry was stored.
    pub recorded_at: Instant,
}

impl PendingResponse {
    /// How long this entry has been waiting.
    pub fn elapsed(&self) -> Duration {
        self.recorded_at.elapsed()
    }
}

/// Counts of entries removed by [`CorrelationStore::evict_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub requests: usize,
    pub responses: usize,
}

impl EvictionReport {
    pub fn total(&self) -> usize {
        self.requests + self.responses
    }
}

// ── CorrelationStore ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CorrelationStore {
    requests: Mutex<HashMap<String, PendingRequest>>,
    responses: Mutex<HashMap<String, PendingResponse>>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Requests ─────────────────────────────────────────────────

    /// Store a request payload. A duplicate id overwrites the old entry.
    pub fn record_request(&self, id: &str, payload: Bytes) {
        let previous = self.requests.lock().insert(
            id.to_string(),
            PendingRequest {
                payload,
                recorded_at: Instant::now(),
            },
        );
        if previous.is_some() {
            debug!("duplicate request id {id}; keeping the latest payload");
        }
    }

    /// Read-only lookup of a recorded request.
    pub fn fetch_request(&self, id: &str) -> Option<Bytes> {
        self.requests.lock().get(id).map(|r| r.payload.clone())
    }

    /// Drop a request once its pair has been compared.
    pub fn release_request(&self, id: &str) -> Option<Bytes> {
        self.requests.lock().remove(id).map(|r| r.payload)
    }

    // ── Responses ────────────────────────────────────────────────

    /// Store `payload` if it is the first variant seen for `id`, otherwise
    /// remove and return the waiting counterpart.
    ///
    /// The stored variant is returned even if it is the same stage as
    /// `stage`; each id is expected to see at most one of each.
    pub fn pair_response(&self, id: &str, payload: Bytes, stage: Stage) -> Option<PendingResponse> {
        let mut responses = self.responses.lock();
        if let Some(counterpart) = responses.remove(id) {
            if counterpart.stage == stage {
                debug!("id {id}: {stage} paired with another {stage}");
            }
            return Some(counterpart);
        }
        responses.insert(
            id.to_string(),
            PendingResponse {
                payload,
                stage,
                recorded_at: Instant::now(),
            },
        );
        None
    }

    // ── Housekeeping ─────────────────────────────────────────────

    /// Number of recorded requests not yet released.
    pub fn pending_requests(&self) -> usize {
        self.requests.lock().len()
    }

    /// Number of response variants still waiting for a counterpart.
    pub fn pending_responses(&self) -> usize {
        self.responses.lock().len()
    }

    /// Remove every entry older than `ttl` from both maps.
    pub fn evict_expired(&self, ttl: Duration) -> EvictionReport {
        let requests = {
            let mut map = self.requests.lock();
            let before = map.len();
            map.retain(|_, r| r.recorded_at.elapsed() <= ttl);
            before - map.len()
        };
        let responses = {
            let mut map = self.responses.lock();
            let before = map.len();
            map.retain(|_, r| r.recorded_at.elapsed() <= ttl);
            before - map.len()
        };
        EvictionReport {
            requests,
            responses,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn body(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn record_and_fetch() {
        let store = CorrelationStore::new();
        store.record_request("a", body("GET /"));
        assert_eq!(store.fetch_request("a"), Some(body("GET /")));
        // fetch does not remove
        assert_eq!(store.pending_requests(), 1);
    }

    #[test]
    fn fetch_missing_returns_none() {
        let store = CorrelationStore::new();
        assert!(store.fetch_request("missing").is_none());
    }

    #[test]
    fn duplicate_request_last_write_wins() {
        let store = CorrelationStore::new();
        store.record_request("a", body("first"));
        store.record_request("a", body("second"));
        assert_eq!(store.fetch_request("a"), Some(body("second")));
        assert_eq!(store.pending_requests(), 1);
    }

    #[test]
    fn release_removes_request() {
        let store = CorrelationStore::new();
        store.record_request("a", body("GET /"));
        assert!(store.release_request("a").is_some());
        assert!(store.fetch_request("a").is_none());
        assert!(store.release_request("a").is_none());
    }

    #[test]
    fn first_variant_waits() {
        let store = CorrelationStore::new();
        assert!(store.pair_response("a", body("orig"), Stage::Response).is_none());
        assert_eq!(store.pending_responses(), 1);
    }

    #[test]
    fn second_variant_pairs_in_either_order() {
        let store = CorrelationStore::new();

        store.pair_response("a", body("orig"), Stage::Response);
        let pair = store
            .pair_response("a", body("replay"), Stage::ReplayedResponse)
            .unwrap();
        assert_eq!(pair.stage, Stage::Response);
        assert_eq!(pair.payload, body("orig"));

        store.pair_response("b", body("replay"), Stage::ReplayedResponse);
        let pair = store.pair_response("b", body("orig"), Stage::Response).unwrap();
        assert_eq!(pair.stage, Stage::ReplayedResponse);

        assert_eq!(store.pending_responses(), 0);
    }

    #[test]
    fn same_variant_twice_still_pairs() {
        let store = CorrelationStore::new();
        store.pair_response("a", body("one"), Stage::Response);
        let pair = store.pair_response("a", body("two"), Stage::Response).unwrap();
        assert_eq!(pair.payload, body("one"));
    }

    #[test]
    fn concurrent_pairing_completes_exactly_once() {
        for _ in 0..64 {
            let store = Arc::new(CorrelationStore::new());
            let completed = Arc::new(AtomicUsize::new(0));
            let handles: Vec<_> = [Stage::Response, Stage::ReplayedResponse]
                .into_iter()
                .map(|stage| {
                    let store = Arc::clone(&store);
                    let completed = Arc::clone(&completed);
                    std::thread::spawn(move || {
                        if store.pair_response("race", body("x"), stage).is_some() {
                            completed.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            assert_eq!(completed.load(Ordering::SeqCst), 1);
            assert_eq!(store.pending_responses(), 0);
        }
    }

    #[test]
    fn evict_expired_clears_both_maps() {
        let store = CorrelationStore::new();
        store.record_request("a", body("GET /"));
        store.pair_response("b", body("orig"), Stage::Response);
        std::thread::sleep(Duration::from_millis(5));

        let report = store.evict_expired(Duration::ZERO);
        assert_eq!(
            report,
            EvictionReport {
                requests: 1,
                responses: 1
            }
        );
        assert_eq!(report.total(), 2);
        assert_eq!(store.pending_requests(), 0);
        assert_eq!(store.pending_responses(), 0);
    }

    #[test]
    fn evict_keeps_fresh_entries() {
        let store = CorrelationStore::new();
        store.record_request("a", body("GET /"));
        let report = store.evict_expired(Duration::from_secs(3600));
        assert_eq!(report.total(), 0);
        assert_eq!(store.pending_requests(), 1);
    }
}
