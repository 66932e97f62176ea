//! # Pipeline: reader → bounded queue → worker pool
//!
//! ```text
//!                ┌──────────┐  hex lines   ┌──────────┐
//! reader ──────► │ FramedRead├────────────►│ mpsc (N) │  backpressure when full
//!                └──────────┘              └────┬─────┘
//!                                  ┌────────────┼────────────┐
//!                                  ▼            ▼            ▼
//!                              worker 0     worker 1  …  worker n-1
//!                                  │ decode → CorrelationStore → DiffEngine → DiffReporter
//!                                  └──► Passthrough (request frames) ──► writer
//! ```
//!
//! | Module        | Purpose                                   |
//! |---------------|-------------------------------------------|
//! | `passthrough` | Writer task re-emitting request frames    |
//! | `report`      | `DiffReporter` sinks                      |
//!
//! Frames of different ids are processed with no ordering guarantee.
//! Frames of the same id may race across workers; the store's pairing
//! atomicity guarantees a single comparison per completed pair.

pub mod passthrough;
pub mod report;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

use bytes::BytesMut;

use crate::codec::{DEFAULT_MAX_LINE_LENGTH, HexLineCodec};
use crate::diff::{ContentComparer, DiffEngine, ImageComparer};
use crate::error::ReplayError;
use crate::frame::{Frame, Stage};
use crate::store::CorrelationStore;

pub use passthrough::Passthrough;
pub use report::{
    DiffReport, DiffReporter, FanoutReporter, JsonLinesReporter, MemoryReporter, TracingReporter,
};

// ── PipelineConfig ───────────────────────────────────────────────

/// Tuning knobs for [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of concurrent workers (at least 1).
    pub workers: usize,
    /// Capacity of the line queue between reader and workers.
    pub queue_capacity: usize,
    /// Longest accepted input line in bytes.
    pub read_buffer_size: usize,
    /// Evict pending entries older than this; `None` keeps them forever.
    pub pending_ttl: Option<Duration>,
    /// How often the eviction sweep runs.
    pub sweep_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 32,
            read_buffer_size: DEFAULT_MAX_LINE_LENGTH,
            pending_ttl: Some(Duration::from_secs(300)),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

// ── PipelineStats ────────────────────────────────────────────────

/// Counters for one [`Dispatcher::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Lines handed to the workers.
    pub lines: u64,
    /// Lines that did not decode into a frame.
    pub malformed: u64,
    /// Over-long lines dropped by the codec.
    pub discarded: u64,
    pub requests: u64,
    pub responses: u64,
    /// Completed pairs run through the diff engine.
    pub compared: u64,
    /// Compared pairs with at least one difference.
    pub differing: u64,
    /// Pending entries removed by the TTL sweep.
    pub evicted: u64,
    /// Request frames written by the passthrough sink.
    pub passed_through: u64,
}

#[derive(Debug, Default)]
struct Counters {
    lines: AtomicU64,
    malformed: AtomicU64,
    requests: AtomicU64,
    responses: AtomicU64,
    compared: AtomicU64,
    differing: AtomicU64,
    evicted: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            lines: self.lines.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            responses: self.responses.load(Ordering::Relaxed),
            compared: self.compared.load(Ordering::Relaxed),
            differing: self.differing.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}

// ── Dispatcher ───────────────────────────────────────────────────

/// Drives frames from an input stream through pairing and diffing.
pub struct Dispatcher<C = ImageComparer> {
    config: PipelineConfig,
    store: Arc<CorrelationStore>,
    engine: Arc<DiffEngine<C>>,
    reporter: Arc<dyn DiffReporter>,
}

impl Dispatcher<ImageComparer> {
    pub fn new(config: PipelineConfig, reporter: Arc<dyn DiffReporter>) -> Self {
        Self::with_engine(config, DiffEngine::new(), reporter)
    }
}

impl<C: ContentComparer + 'static> Dispatcher<C> {
    pub fn with_engine(
        config: PipelineConfig,
        engine: DiffEngine<C>,
        reporter: Arc<dyn DiffReporter>,
    ) -> Self {
        Self {
            config,
            store: Arc::new(CorrelationStore::new()),
            engine: Arc::new(engine),
            reporter,
        }
    }

    /// Use an externally owned store instead of a fresh one.
    pub fn with_store(mut self, store: Arc<CorrelationStore>) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.store
    }

    pub fn engine(&self) -> &DiffEngine<C> {
        &self.engine
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process `reader` to end of stream, writing request frames to
    /// `writer`.
    ///
    /// Returns once the queue has drained, every worker has exited and the
    /// passthrough output has been flushed.
    pub async fn run<R, W>(&self, reader: R, writer: W) -> Result<PipelineStats, ReplayError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let workers = self.config.workers.max(1);
        let capacity = self.config.queue_capacity.max(1);
        let counters = Arc::new(Counters::default());

        let (queue_tx, queue_rx) = mpsc::channel::<BytesMut>(capacity);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (passthrough, writer_handle) = Passthrough::spawn(writer, capacity);
        let sweeper = self.spawn_sweeper(Arc::clone(&counters));

        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    store: Arc::clone(&self.store),
                    engine: Arc::clone(&self.engine),
                    reporter: Arc::clone(&self.reporter),
                    passthrough: passthrough.clone(),
                    counters: Arc::clone(&counters),
                };
                let queue = Arc::clone(&queue_rx);
                tokio::spawn(async move { worker.run(queue).await })
            })
            .collect();
        drop(passthrough);
        debug!("started {workers} worker(s), queue capacity {capacity}");

        // Producer: blocks on `send` while the queue is full.
        let mut lines = FramedRead::new(
            reader,
            HexLineCodec::with_max_length(self.config.read_buffer_size),
        );
        while let Some(item) = lines.next().await {
            match item {
                Ok(line) => {
                    Counters::bump(&counters.lines);
                    if queue_tx.send(line).await.is_err() {
                        warn!("all workers exited; stopping input");
                        break;
                    }
                }
                Err(e) => {
                    warn!("input error: {e}; treating as end of stream");
                    break;
                }
            }
        }
        let discarded = lines.decoder().discarded();
        drop(queue_tx);
        debug!("input closed; draining queue");

        for handle in handles {
            if let Err(e) = handle.await {
                error!("worker failed: {e}");
            }
        }
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        let passed_through = match writer_handle.await {
            Ok(Ok(written)) => written,
            Ok(Err(e)) => {
                warn!("passthrough stopped early: {e}");
                0
            }
            Err(e) => return Err(e.into()),
        };

        let stats = PipelineStats {
            discarded,
            passed_through,
            ..counters.snapshot()
        };
        let (pending_requests, pending_responses) =
            (self.store.pending_requests(), self.store.pending_responses());
        info!(
            lines = stats.lines,
            compared = stats.compared,
            differing = stats.differing,
            malformed = stats.malformed,
            pending_requests,
            pending_responses,
            "pipeline drained"
        );
        Ok(stats)
    }

    fn spawn_sweeper(&self, counters: Arc<Counters>) -> Option<JoinHandle<()>> {
        let ttl = self.config.pending_ttl?;
        let period = self.config.sweep_interval.max(Duration::from_millis(10));
        let store = Arc::clone(&self.store);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = store.evict_expired(ttl);
                if evicted.total() > 0 {
                    counters
                        .evicted
                        .fetch_add(evicted.total() as u64, Ordering::Relaxed);
                    warn!(
                        requests = evicted.requests,
                        responses = evicted.responses,
                        "evicted unmatched entries older than {ttl:?}"
                    );
                }
            }
        }))
    }
}

// ── Worker ───────────────────────────────────────────────────────

struct Worker<C> {
    id: usize,
    store: Arc<CorrelationStore>,
    engine: Arc<DiffEngine<C>>,
    reporter: Arc<dyn DiffReporter>,
    passthrough: Passthrough,
    counters: Arc<Counters>,
}

impl<C: ContentComparer + 'static> Worker<C> {
    async fn run(self, queue: Arc<Mutex<mpsc::Receiver<BytesMut>>>) {
        loop {
            // Only the lock holder waits on the channel; the rest wait on the lock.
            let line = queue.lock().await.recv().await;
            let Some(line) = line else {
                break;
            };
            self.process(&line).await;
        }
        debug!("worker {} exiting", self.id);
    }

    async fn process(&self, line: &[u8]) {
        let frame = match Frame::decode_hex(line) {
            Ok(frame) => frame,
            Err(e) => {
                Counters::bump(&self.counters.malformed);
                warn!("skipping malformed frame: {e}");
                return;
            }
        };
        debug!("process: {} {} {}", frame.stage(), frame.id(), frame.timestamp());

        match frame.stage() {
            Stage::Request => {
                Counters::bump(&self.counters.requests);
                self.store.record_request(frame.id(), frame.payload().clone());
                if let Err(e) = self.passthrough.emit(frame).await {
                    debug!("passthrough unavailable: {e}");
                }
            }
            stage => {
                Counters::bump(&self.counters.responses);
                self.handle_response(frame, stage).await;
            }
        }
    }

    async fn handle_response(&self, frame: Frame, stage: Stage) {
        let id = frame.id();
        let Some(counterpart) = self
            .store
            .pair_response(id, frame.payload().clone(), stage)
        else {
            return;
        };

        let (original, replayed) = match stage {
            Stage::ReplayedResponse => (counterpart.payload, frame.payload().clone()),
            _ => (frame.payload().clone(), counterpart.payload),
        };

        let request = self.store.fetch_request(id);
        if request.is_none() {
            debug!("{id}: request not seen yet; comparing without it");
        }

        // Both the diff and the report sinks may block, so neither runs on
        // the async worker.
        let engine = Arc::clone(&self.engine);
        let reporter = Arc::clone(&self.reporter);
        let report_id = id.to_string();
        let outcome = tokio::task::spawn_blocking(move || {
            let diff = engine.compare(&original, &replayed);
            let same = diff.is_empty();
            reporter.report(&DiffReport::new(report_id, request.as_ref(), diff));
            same
        })
        .await;

        // Released whatever the outcome, or a failed pair pins its request.
        self.store.release_request(id);
        match outcome {
            Ok(same) => {
                Counters::bump(&self.counters.compared);
                if !same {
                    Counters::bump(&self.counters.differing);
                }
            }
            Err(e) => error!("{id}: comparison failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DiffEntry, DiffResult, STATUS};
    use std::sync::atomic::AtomicBool;

    fn line(stage: Stage, id: &str, payload: &[u8]) -> String {
        let frame = Frame::new(stage, id, 0, payload);
        format!("{}\n", hex::encode(frame.raw()))
    }

    const OK: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
    const ERR: &[u8] = b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 2\r\n\r\nok";

    async fn run(input: String, config: PipelineConfig) -> (PipelineStats, Vec<DiffReport>) {
        let reporter = Arc::new(MemoryReporter::new());
        let dispatcher = Dispatcher::new(config, reporter.clone());
        let stats = dispatcher
            .run(input.as_bytes(), tokio::io::sink())
            .await
            .unwrap();
        (stats, reporter.take())
    }

    #[tokio::test]
    async fn pairs_and_reports_once() {
        let input = [
            line(Stage::Request, "r1", b"GET / HTTP/1.1\r\n\r\n"),
            line(Stage::ReplayedResponse, "r1", ERR),
            line(Stage::Response, "r1", OK),
        ]
        .concat();
        let (stats, reports) = run(input, PipelineConfig::default()).await;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].id, "r1");
        assert_eq!(reports[0].request.as_deref(), Some("GET / HTTP/1.1"));
        assert_eq!(
            reports[0].diff.get(STATUS),
            Some(&DiffEntry::bytes(b"200", b"500"))
        );
        assert_eq!(stats.compared, 1);
        assert_eq!(stats.differing, 1);
        assert_eq!(stats.passed_through, 1);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let input = [
            "zzzz\n".to_string(),
            format!("{}\n", hex::encode(b"1 no-newline")),
            line(Stage::Response, "r2", OK),
            line(Stage::ReplayedResponse, "r2", OK),
        ]
        .concat();
        let (stats, reports) = run(input, PipelineConfig::default()).await;
        assert_eq!(stats.malformed, 2);
        assert_eq!(reports.len(), 1);
        assert!(reports[0].same);
        assert!(reports[0].request.is_none());
    }

    #[tokio::test]
    async fn unmatched_response_stays_pending() {
        let reporter = Arc::new(MemoryReporter::new());
        let dispatcher = Dispatcher::new(PipelineConfig::default(), reporter.clone());
        let input = line(Stage::Response, "lonely", OK);
        dispatcher
            .run(input.as_bytes(), tokio::io::sink())
            .await
            .unwrap();
        assert!(reporter.is_empty());
        assert_eq!(dispatcher.store().pending_responses(), 1);
    }

    #[tokio::test]
    async fn request_released_after_compare() {
        let reporter = Arc::new(MemoryReporter::new());
        let dispatcher = Dispatcher::new(PipelineConfig::default(), reporter.clone());
        let input = [
            line(Stage::Request, "r3", b"GET / HTTP/1.1\r\n\r\n"),
            line(Stage::Response, "r3", OK),
            line(Stage::ReplayedResponse, "r3", OK),
        ]
        .concat();
        dispatcher
            .run(input.as_bytes(), tokio::io::sink())
            .await
            .unwrap();
        assert_eq!(dispatcher.store().pending_requests(), 0);
        assert_eq!(dispatcher.store().pending_responses(), 0);
    }

    #[tokio::test]
    async fn sweeper_evicts_stale_entries() {
        let reporter = Arc::new(MemoryReporter::new());
        let config = PipelineConfig {
            pending_ttl: Some(Duration::ZERO),
            sweep_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(config, reporter);
        let store = Arc::clone(dispatcher.store());
        store.record_request("stale", bytes::Bytes::from_static(b"GET /"));

        let counters = Arc::new(Counters::default());
        let sweeper = dispatcher.spawn_sweeper(Arc::clone(&counters)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        sweeper.abort();

        assert_eq!(store.pending_requests(), 0);
        assert_eq!(counters.evicted.load(Ordering::Relaxed), 1);
    }

    /// Panics on the first pair it sees, then behaves.
    #[derive(Default)]
    struct PanicOnceComparer(AtomicBool);

    impl ContentComparer for PanicOnceComparer {
        fn compare_content(&self, _: &[u8], _: &[u8], _: &mut DiffResult) {
            if !self.0.swap(true, Ordering::SeqCst) {
                panic!("decoder blew up");
            }
        }
    }

    #[tokio::test]
    async fn failed_comparison_releases_request() {
        let reporter = Arc::new(MemoryReporter::new());
        let dispatcher = Dispatcher::with_engine(
            PipelineConfig::default(),
            DiffEngine::with_content_comparer(PanicOnceComparer::default()),
            reporter.clone(),
        );
        let input = [
            line(Stage::Request, "boom", b"GET /boom HTTP/1.1\r\n\r\n"),
            line(Stage::Response, "boom", OK),
            line(Stage::ReplayedResponse, "boom", ERR),
            line(Stage::Request, "next", b"GET /next HTTP/1.1\r\n\r\n"),
            line(Stage::Response, "next", OK),
            line(Stage::ReplayedResponse, "next", ERR),
        ]
        .concat();
        let stats = dispatcher
            .run(input.as_bytes(), tokio::io::sink())
            .await
            .unwrap();

        assert_eq!(dispatcher.store().pending_requests(), 0);
        assert_eq!(stats.compared, 1);
        let reports = reporter.take();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].id, "next");
    }

    /// Blocks the calling thread, noting how far a ticker task got before
    /// and after.
    struct SlowReporter {
        ticks: Arc<AtomicU64>,
        seen: parking_lot::Mutex<Option<(u64, u64)>>,
    }

    impl DiffReporter for SlowReporter {
        fn report(&self, _: &DiffReport) {
            let before = self.ticks.load(Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(300));
            let after = self.ticks.load(Ordering::SeqCst);
            *self.seen.lock() = Some((before, after));
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn slow_reporter_does_not_block_runtime() {
        let ticks = Arc::new(AtomicU64::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        let reporter = Arc::new(SlowReporter {
            ticks,
            seen: parking_lot::Mutex::new(None),
        });
        let dispatcher = Dispatcher::new(PipelineConfig::default(), reporter.clone());
        let input = [
            line(Stage::Response, "slow", OK),
            line(Stage::ReplayedResponse, "slow", OK),
        ]
        .concat();
        dispatcher
            .run(input.as_bytes(), tokio::io::sink())
            .await
            .unwrap();
        ticker.abort();

        let seen = *reporter.seen.lock();
        let (before, after) = seen.unwrap();
        assert!(after - before >= 5, "ticker stalled: {before} -> {after}");
    }
}
