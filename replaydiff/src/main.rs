//! replaydiff: entry point.
//!
//! ```text
//! replaydiff                     Read frames from stdin until EOF
//! replaydiff -n 4 --ch 64        Four workers, queue of 64 lines
//! replaydiff --config <path>     Load a custom config TOML
//! replaydiff --report <path>     Also append JSON diff reports to a file
//! replaydiff --gen-config        Write default config to stdout
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use replaydiff::config::DiffConfig;
use replaydiff::service::DiffService;

/// Environment flag that turns on debug diagnostics.
const DEBUG_ENV: &str = "GOR_TEST";

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "replaydiff",
    version,
    about = "Pairs original and replayed HTTP responses and reports differences"
)]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "replaydiff.toml")]
    config: PathBuf,

    /// Number of diff workers.
    #[arg(short = 'n', long)]
    workers: Option<usize>,

    /// Longest accepted input line, in bytes.
    #[arg(long)]
    size: Option<usize>,

    /// Capacity of the queue between reader and workers.
    #[arg(long)]
    ch: Option<usize>,

    /// Append one JSON object per comparison to this file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

impl Cli {
    /// Values given on the command line win over the config file.
    fn apply(&self, config: &mut DiffConfig) {
        if let Some(workers) = self.workers {
            config.pipeline.workers = workers;
        }
        if let Some(size) = self.size {
            config.pipeline.read_buffer_size = size;
        }
        if let Some(ch) = self.ch {
            config.pipeline.queue_capacity = ch;
        }
        if let Some(report) = &self.report {
            config.report.json_path = Some(report.clone());
        }
    }
}

fn default_log_level(config: &DiffConfig, debug_env: bool) -> &str {
    if debug_env {
        "debug"
    } else {
        &config.logging.level
    }
}

// ── Main ─────────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        print!("{}", DiffConfig::default_toml()?);
        return Ok(());
    }

    let mut config = DiffConfig::load(&cli.config)?;
    cli.apply(&mut config);

    // stdout carries passthrough frames, so diagnostics go to stderr.
    let level = default_log_level(&config, std::env::var_os(DEBUG_ENV).is_some());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("replaydiff v{}", env!("CARGO_PKG_VERSION"));
    info!("workers: {}", config.pipeline.workers);
    info!("read buffer: {} bytes", config.pipeline.read_buffer_size);
    info!("queue capacity: {}", config.pipeline.queue_capacity);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async {
        let service = DiffService::new(config);
        let stop = service.stop_handle();

        // Ctrl-C handler.
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, shutting down");
                stop.notify_one();
            }
        });

        service.run().await
    });

    // The stdin reader may still be parked in a blocking read.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result?;
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
