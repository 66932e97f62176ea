//! Domain-specific error types for the replay diff pipeline.
//!
//! Fallible operations return `Result<T, ReplayError>`. Nothing on the
//! per-frame path panics on bad input: a malformed frame is a value the
//! dispatcher logs and skips.

use thiserror::Error;

/// The canonical error type for replaydiff.
#[derive(Debug, Error)]
pub enum ReplayError {
    // ── Framing Errors ───────────────────────────────────────────
    /// A decoded record did not have the `<tag> <id> <ts>\n<payload>` shape.
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// The input line was not valid hex.
    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The leading tag byte did not map to any known stage.
    #[error("unknown stage tag: {0:#04x}")]
    UnknownStage(u8),

    /// An input line exceeded the configured read buffer.
    #[error("line too long: {size} bytes (max {max})")]
    LineTooLong { size: usize, max: usize },

    // ── Pipeline Errors ──────────────────────────────────────────
    /// The stdin/stdout layer reported an error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// A worker or diff task panicked or was aborted.
    #[error("task failed: {0}")]
    Task(String),

    // ── Configuration Errors ─────────────────────────────────────
    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for ReplayError {
    fn from(s: String) -> Self {
        ReplayError::Other(s)
    }
}

impl From<&str> for ReplayError {
    fn from(s: &str) -> Self {
        ReplayError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ReplayError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ReplayError::ChannelClosed
    }
}

impl From<tokio::task::JoinError> for ReplayError {
    fn from(e: tokio::task::JoinError) -> Self {
        ReplayError::Task(e.to_string())
    }
}
