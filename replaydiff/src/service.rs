//! Service wiring: stdin → pipeline → stdout, plus report sinks.
//!
//! The service owns the configuration and a stop handle. Stopping closes
//! the input side only, so everything already read still drains through
//! the workers before `run` returns.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Notify;
use tracing::{info, warn};

use replaydiff_core::{
    DiffReporter, Dispatcher, FanoutReporter, JsonLinesReporter, PipelineStats, ReplayError,
    TracingReporter,
};

use crate::config::DiffConfig;

/// Buffer between the input copier and the pipeline reader.
const FEED_BUFFER: usize = 64 * 1024;

// ── DiffService ──────────────────────────────────────────────────

pub struct DiffService {
    config: DiffConfig,
    stop: Arc<Notify>,
}

impl DiffService {
    pub fn new(config: DiffConfig) -> Self {
        Self {
            config,
            stop: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    /// Handle that ends input from another task, e.g. a signal handler.
    pub fn stop_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.stop)
    }

    /// Stop reading input. Frames already read are still processed.
    pub fn stop(&self) {
        // `notify_one` stores a permit if the feeder is not waiting yet.
        self.stop.notify_one();
    }

    /// Run against the process's stdin and stdout until end of input or
    /// until stopped.
    pub async fn run(&self) -> Result<PipelineStats, ReplayError> {
        self.run_with(tokio::io::stdin(), tokio::io::stdout()).await
    }

    pub async fn run_with<R, W>(&self, reader: R, writer: W) -> Result<PipelineStats, ReplayError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let reporter = self.build_reporter()?;
        let dispatcher = Dispatcher::new(self.config.to_pipeline_config(), reporter);

        let (feed_rx, feeder) = self.spawn_feeder(reader);
        let stats = dispatcher.run(feed_rx, writer).await;
        // The pipeline only returns after the feeder closed its end or the
        // reader side was dropped; either way the feeder is done or failing.
        feeder.abort();
        let stats = stats?;

        info!(
            requests = stats.requests,
            responses = stats.responses,
            evicted = stats.evicted,
            discarded = stats.discarded,
            passed_through = stats.passed_through,
            "replaydiff finished"
        );
        Ok(stats)
    }

    /// Reporter chain: always the log, plus a JSON-lines file if configured.
    pub fn build_reporter(&self) -> Result<Arc<dyn DiffReporter>, ReplayError> {
        let mut fanout = FanoutReporter::new().with(Arc::new(TracingReporter));
        if let Some(path) = &self.config.report.json_path {
            info!("writing diff reports to {}", path.display());
            fanout = fanout.with(Arc::new(JsonLinesReporter::create(path)?));
        }
        Ok(Arc::new(fanout))
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Copy `reader` into an in-memory pipe until it ends or a stop is
    /// requested. Dropping the write half is what the pipeline sees as end
    /// of input.
    fn spawn_feeder<R>(
        &self,
        mut reader: R,
    ) -> (tokio::io::DuplexStream, tokio::task::JoinHandle<()>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (mut feed_tx, feed_rx) = tokio::io::duplex(FEED_BUFFER);
        let stop = Arc::clone(&self.stop);

        let handle = tokio::spawn(async move {
            tokio::select! {
                copied = tokio::io::copy(&mut reader, &mut feed_tx) => match copied {
                    Ok(bytes) => info!("input closed after {bytes} bytes"),
                    Err(e) => warn!("input error: {e}; treating as end of stream"),
                },
                _ = stop.notified() => info!("stop requested; draining pending work"),
            }
        });

        (feed_rx, handle)
    }
}

// ── Tests ────────────────────────────────────────────────────────
