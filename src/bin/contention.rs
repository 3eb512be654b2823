//! Runs every selected strategy against the configured backend and prints a
//! summary.
//!
//! Run with:
//! ```bash
//! cargo run --features cli -- --backend map --workers 10 --iterations 10000 --format table
//! cargo run --features cli -- --backend document --write-concern 1,majority
//! ```
//!
//! Every flag falls back to its `CONTENTION_*` environment variable, then to
//! the built-in default.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use contention::backend::{BackendKind, WriteConcern};
use contention::config::Config;
use contention::harness;
use contention::logging;
use contention::reporters::json::JsonReporter;
use contention::reporters::table::TableReporter;
use contention::strategy::StrategyKind;
use tracing::{error, info};

/// End-of-process summary format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// Per-run log lines only
    #[default]
    Log,
    /// Comparison table
    Table,
    /// JSON document
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend to contend on: relational, map, graph or document
    #[arg(short, long, env = "CONTENTION_BACKEND")]
    backend: Option<BackendKind>,

    /// Comma-separated write concerns for a document store; runs every
    /// strategy once per concern
    #[arg(long, env = "CONTENTION_WRITE_CONCERN", value_delimiter = ',')]
    write_concern: Option<Vec<WriteConcern>>,

    /// Concurrent workers per run
    #[arg(short, long, env = "CONTENTION_WORKERS")]
    workers: Option<usize>,

    /// Increments per worker
    #[arg(short, long, env = "CONTENTION_ITERATIONS")]
    iterations: Option<u64>,

    /// Counter value each run starts from
    #[arg(long, env = "CONTENTION_INITIAL_VALUE", allow_hyphen_values = true)]
    initial_value: Option<i64>,

    /// Delay in milliseconds between a read and the dependent write
    #[arg(short, long, env = "CONTENTION_INTERLEAVE_DELAY_MS")]
    delay_ms: Option<u64>,

    /// Comma-separated strategies to run (default: all the backend supports)
    #[arg(short, long, env = "CONTENTION_STRATEGIES", value_delimiter = ',')]
    strategies: Option<Vec<StrategyKind>>,

    /// Run-scoped log file, truncated at start
    #[arg(long, env = "CONTENTION_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Summary printed after all runs
    #[arg(short, long, value_enum, default_value = "log")]
    format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(kind) = self.backend {
            if kind != config.backend.kind {
                let previous = std::mem::replace(
                    &mut config.backend,
                    contention::config::BackendConfig::for_kind(kind),
                );
                config.backend.host = previous.host;
                config.backend.user = previous.user;
                config.backend.password = previous.password;
                config.backend.lock_timeout = previous.lock_timeout;
                config.backend.replicas = previous.replicas;
                config.backend.write_concerns = previous.write_concerns;
            }
        }
        if let Some(write_concerns) = self.write_concern.filter(|list| !list.is_empty()) {
            config.backend.write_concerns = write_concerns;
        }
        if let Some(workers) = self.workers {
            config.harness.workers = workers;
        }
        if let Some(iterations) = self.iterations {
            config.harness.iterations = iterations;
        }
        if let Some(initial_value) = self.initial_value {
            config.harness.initial_value = initial_value;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.harness.interleave_delay = Duration::from_millis(delay_ms);
        }
        if let Some(strategies) = self.strategies {
            config.strategies = strategies;
        }
        if let Some(log_file) = self.log_file {
            config.log_file = log_file;
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let format = args.format;
    let pretty = args.pretty;

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    args.apply(&mut config);

    if let Err(e) = logging::init(&config.log_file) {
        eprintln!("cannot set up logging to {}: {e}", config.log_file.display());
        return ExitCode::FAILURE;
    }

    info!(
        backend = %config.backend.kind,
        workers = config.harness.workers,
        iterations = config.harness.iterations,
        "Starting"
    );

    let reports = match harness::run_sweep(&config) {
        Ok(reports) => reports,
        Err(e) => {
            error!(backend = %config.backend.kind, error = %e, "Setup failed");
            return ExitCode::FAILURE;
        }
    };

    match format {
        OutputFormat::Log => {}
        OutputFormat::Table => {
            let title = config.backend.kind.to_string();
            println!("{}", TableReporter::new().with_title(title).render(&reports));
        }
        OutputFormat::Json => {
            if let Err(e) = JsonReporter::new()
                .pretty(pretty)
                .write_to(&reports, std::io::stdout().lock())
            {
                error!(error = %e, "Could not write the JSON summary");
            }
        }
    }

    ExitCode::SUCCESS
}
