//! Two-stage comparison of an (original, replayed) response pair.
//!
//! ```text
//! compare_http ──(any diff?)──► ContentComparer ──► DiffResult
//!        │                                              ▲
//!        └──────────────(no diff)───────────────────────┘
//! ```
//!
//! The content stage is skipped when the protocol stage found nothing.
//! Responses with identical status, allow-listed headers and body digest
//! are therefore assumed to carry identical content, while a response
//! with any protocol-level difference gets a full content analysis even
//! if its image is visually the same.

use crate::diff::DiffResult;
use crate::diff::image::ImageComparer;
use crate::diff::protocol::compare_http;

/// Content-level comparison run after a protocol-level difference.
///
/// Implementations receive the full HTTP responses and must not panic or
/// fail: problems are recorded as entries in `result`.
pub trait ContentComparer: Send + Sync {
    fn compare_content(&self, original: &[u8], replayed: &[u8], result: &mut DiffResult);
}

/// Stateless comparison engine, shared across workers.
#[derive(Debug, Clone, Default)]
pub struct DiffEngine<C = ImageComparer> {
    content: C,
}

impl DiffEngine<ImageComparer> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: ContentComparer> DiffEngine<C> {
    pub fn with_content_comparer(content: C) -> Self {
        Self { content }
    }

    pub fn content_comparer(&self) -> &C {
        &self.content
    }

    /// Compare `original` against `replayed`. An empty result means no
    /// observed difference.
    pub fn compare(&self, original: &[u8], replayed: &[u8]) -> DiffResult {
        let mut result = DiffResult::new();
        compare_http(original, replayed, &mut result);
        if !result.is_empty() {
            self.content.compare_content(original, replayed, &mut result);
        }
        result
    }
}
