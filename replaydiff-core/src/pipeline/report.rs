//! Where finished comparisons go.
//!
//! The dispatcher hands every completed pair to a [`DiffReporter`],
//! whether or not a difference was found.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::diff::DiffResult;
use crate::error::ReplayError;

// ── DiffReport ───────────────────────────────────────────────────

/// The outcome of comparing one request's two responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    pub id: String,
    /// Start line of the recorded request, if it was seen in time.
    pub request: Option<String>,
    pub same: bool,
    pub diff: DiffResult,
}

impl DiffReport {
    pub fn new(id: impl Into<String>, request: Option<&Bytes>, diff: DiffResult) -> Self {
        Self {
            id: id.into(),
            request: request.map(|r| request_line(r)),
            same: diff.is_empty(),
            diff,
        }
    }
}

fn request_line(request: &[u8]) -> String {
    let end = memchr::memchr(b'\n', request).unwrap_or(request.len());
    String::from_utf8_lossy(&request[..end]).trim_end().to_string()
}

// ── DiffReporter ─────────────────────────────────────────────────

/// Sink for comparison results. Called concurrently from every worker.
pub trait DiffReporter: Send + Sync {
    fn report(&self, report: &DiffReport);
}

/// Logs each result: same at `debug`, different at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl DiffReporter for TracingReporter {
    fn report(&self, report: &DiffReport) {
        if report.same {
            debug!("{} request is same", report.id);
        } else {
            info!(
                request = report.request.as_deref().unwrap_or("-"),
                "{} request is diff {}", report.id, report.diff
            );
        }
    }
}

/// Appends one JSON object per result to a file or writer.
pub struct JsonLinesReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesReporter {
    /// Open `path` for appending, creating it if needed.
    pub fn create(path: &Path) -> Result<Self, ReplayError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
        }
    }

    fn write_line(&self, report: &DiffReport) -> Result<(), ReplayError> {
        let line = serde_json::to_vec(report).map_err(|e| ReplayError::Other(e.to_string()))?;
        let mut out = self.out.lock();
        out.write_all(&line)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

impl DiffReporter for JsonLinesReporter {
    fn report(&self, report: &DiffReport) {
        if let Err(e) = self.write_line(report) {
            warn!("failed to write diff report for {}: {e}", report.id);
        }
    }
}

/// Forwards every report to each inner reporter in order.
#[derive(Default)]
pub struct FanoutReporter {
    reporters: Vec<Arc<dyn DiffReporter>>,
}

impl FanoutReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn DiffReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl DiffReporter for FanoutReporter {
    fn report(&self, report: &DiffReport) {
        for reporter in &self.reporters {
            reporter.report(report);
        }
    }
}

/// Keeps every report in memory. Useful when embedding the pipeline.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    reports: Mutex<Vec<DiffReport>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }

    /// Drain everything collected so far.
    pub fn take(&self) -> Vec<DiffReport> {
        std::mem::take(&mut *self.reports.lock())
    }
}

impl DiffReporter for MemoryReporter {
    fn report(&self, report: &DiffReport) {
        self.reports.lock().push(report.clone());
    }
}
