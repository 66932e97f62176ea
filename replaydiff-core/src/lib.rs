//! # replaydiff-core
//!
//! Correlation and diffing pipeline for A/B replay testing.
//!
//! Production requests, their original responses and the responses a
//! candidate server returned on replay arrive interleaved on one stream.
//! This crate pairs them by request id and reports how the two responses
//! differ.
//!
//! This crate contains:
//! - **Frames**: `Frame`, `Stage`, decoded from hex lines by `HexLineCodec`
//! - **HTTP**: byte-level status / header / body accessors
//! - **Store**: `CorrelationStore`, the two-lock pairing table
//! - **Diff**: `DiffEngine` with protocol and image content stages
//! - **Pipeline**: `Dispatcher` worker pool, `Passthrough` sink, `DiffReporter`s
//! - **Error**: `ReplayError`, a typed, `thiserror`-based error hierarchy

pub mod codec;
pub mod diff;
pub mod error;
pub mod frame;
pub mod http;
pub mod pipeline;
pub mod store;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{DEFAULT_MAX_LINE_LENGTH, HexLineCodec};
pub use diff::{ContentComparer, DiffEngine, DiffEntry, DiffResult, DiffValue, ImageComparer};
pub use error::ReplayError;
pub use frame::{Frame, Stage};
pub use pipeline::{
    DiffReport, DiffReporter, Dispatcher, FanoutReporter, JsonLinesReporter, MemoryReporter,
    Passthrough, PipelineConfig, PipelineStats, TracingReporter,
};
pub use store::{CorrelationStore, EvictionReport, PendingResponse};
