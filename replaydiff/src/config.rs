//! Configuration for the replay diff middleware.

use std::path::{Path, PathBuf};
use std::time::Duration;

use replaydiff_core::{DEFAULT_MAX_LINE_LENGTH, PipelineConfig, ReplayError};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Reader, queue and worker settings.
    pub pipeline: PipelineSection,
    /// Pending-entry retention.
    pub correlation: CorrelationSection,
    /// Where diff results are written besides the log.
    pub report: ReportSection,
    /// Logging settings.
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Longest accepted input line, in bytes.
    pub read_buffer_size: usize,
    /// Capacity of the queue between the reader and the workers.
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationSection {
    /// Evict unmatched entries older than this many seconds. 0 keeps them forever.
    pub pending_ttl_secs: u64,
    /// Seconds between eviction sweeps.
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    /// Append one JSON object per comparison to this file.
    pub json_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            workers: 1,
            read_buffer_size: DEFAULT_MAX_LINE_LENGTH,
            queue_capacity: 32,
        }
    }
}

impl Default for CorrelationSection {
    fn default() -> Self {
        Self {
            pending_ttl_secs: 300,
            sweep_interval_secs: 30,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl DiffConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist. A file that exists but does not parse is
    /// an error.
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents)
                .map_err(|e| ReplayError::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn parse(text: &str) -> Result<Self, ReplayError> {
        toml::from_str(text).map_err(|e| ReplayError::Config(e.to_string()))
    }

    /// Render the default configuration (for bootstrapping).
    pub fn default_toml() -> Result<String, ReplayError> {
        toml::to_string_pretty(&Self::default()).map_err(|e| ReplayError::Config(e.to_string()))
    }

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> Result<(), ReplayError> {
        std::fs::write(path, Self::default_toml()?)?;
        Ok(())
    }

    /// Convert into the core pipeline settings.
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        let ttl = self.correlation.pending_ttl_secs;
        PipelineConfig {
            workers: self.pipeline.workers.max(1),
            queue_capacity: self.pipeline.queue_capacity.max(1),
            read_buffer_size: self.pipeline.read_buffer_size.max(1),
            pending_ttl: (ttl > 0).then(|| Duration::from_secs(ttl)),
            sweep_interval: Duration::from_secs(self.correlation.sweep_interval_secs.max(1)),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
