//! The run driver.
//!
//! A [`Harness`] owns one backend handle and runs strategies against it, one at
//! a time. Each run walks the same phases:
//!
//! ```text
//! Idle -> Resetting -> Running -> Joining -> Reporting -> Idle
//! ```
//!
//! The counter is reset before any worker starts, every worker is joined
//! before the final value is read, and nothing but the backend is shared
//! between runs.
//!
//! # Examples
//!
//! ```rust
//! use contention::backend::RelationalRowStore;
//! use contention::config::HarnessConfig;
//! use contention::harness::Harness;
//! use contention::strategy::StrategyKind;
//!
//! let backend = RelationalRowStore::new("user_counter", 1);
//! let config = HarnessConfig::default().with_workers(4).with_iterations(100);
//! let mut harness = Harness::new(Box::new(backend), config);
//!
//! let report = harness.run(StrategyKind::AtomicExpr).unwrap();
//! assert_eq!(report.final_value(), Some(400));
//! harness.close().unwrap();
//! ```

use std::fmt::{self, Display};
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::backend::{self, StorageBackend};
use crate::config::{Config, HarnessConfig};
use crate::error::{Error, Result};
use crate::report::{RunOutcome, RunReport};
use crate::reporters::log::LogReporter;
use crate::stats::RunStats;
use crate::strategy::{CancelToken, StrategyKind, WorkerContext};

/// Where a harness is in its current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunPhase {
    #[default]
    Idle,
    Resetting,
    Running,
    Joining,
    Reporting,
}

impl Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Resetting => "resetting",
            RunPhase::Running => "running",
            RunPhase::Joining => "joining",
            RunPhase::Reporting => "reporting",
        };
        f.write_str(name)
    }
}

fn enter(phase: &mut RunPhase, next: RunPhase) {
    debug!(from = %phase, to = %next, "Run phase");
    *phase = next;
}

/// Runs strategies against a single backend.
pub struct Harness {
    backend: Box<dyn StorageBackend>,
    config: HarnessConfig,
    phase: RunPhase,
}

impl Harness {
    pub fn new(backend: Box<dyn StorageBackend>, config: HarnessConfig) -> Self {
        Self {
            backend,
            config,
            phase: RunPhase::Idle,
        }
    }

    /// Opens the configured backend and wraps it in a harness.
    pub fn connect(config: &Config) -> Result<Self> {
        config.harness.validate()?;
        let backend = backend::connect(&config.backend)?;
        Ok(Self::new(backend, config.harness))
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        &*self.backend
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Strategies the backend can run, in default order.
    pub fn supported_strategies(&self) -> Vec<StrategyKind> {
        StrategyKind::supported_by(self.backend())
    }

    /// Runs `kind` with W workers of M increments each.
    ///
    /// Returns `Err` only when the run could not start: the backend lacks an
    /// operation the strategy needs, or the reset failed. A worker failing
    /// mid-run cancels the others and yields a report with an
    /// [`RunOutcome::Aborted`] outcome instead.
    pub fn run(&mut self, kind: StrategyKind) -> Result<RunReport> {
        let backend_kind = self.backend.kind();
        if let Some(operation) = kind.missing_operation(&*self.backend) {
            return Err(Error::Unsupported {
                backend: backend_kind,
                operation,
            });
        }

        let HarnessConfig {
            workers,
            iterations,
            initial_value,
            interleave_delay,
            retry,
        } = self.config;

        enter(&mut self.phase, RunPhase::Resetting);
        if let Err(e) = self.backend.reset(initial_value) {
            enter(&mut self.phase, RunPhase::Idle);
            return Err(e);
        }

        let write_concern = self.backend.write_concern();
        match write_concern {
            Some(wc) => info!(
                strategy = %kind,
                workers,
                iterations,
                write_concern = %wc,
                "Starting concurrent run for {kind} with write concern {wc}"
            ),
            None => info!(strategy = %kind, workers, iterations, "Starting concurrent run for {kind}"),
        }

        let stats = RunStats::new();
        let cancel = CancelToken::new();
        let first_error: Mutex<Option<Error>> = Mutex::new(None);
        let handler = kind.handler();
        let backend: &dyn StorageBackend = &*self.backend;
        let phase = &mut self.phase;

        enter(phase, RunPhase::Running);
        let start = Instant::now();
        thread::scope(|s| {
            let mut handles = Vec::with_capacity(workers);
            for worker_id in 0..workers {
                let ctx = WorkerContext {
                    worker_id,
                    iterations,
                    interleave_delay,
                    retry,
                    cancel: &cancel,
                    stats: &stats,
                };
                let first_error = &first_error;
                let spawned = thread::Builder::new()
                    .name(format!("worker-{worker_id}"))
                    .spawn_scoped(s, move || {
                        if let Err(e) = handler(backend, &ctx) {
                            ctx.cancel.cancel();
                            debug!(worker_id, error = %e, "Worker failed");
                            first_error.lock().get_or_insert(e);
                        }
                    });
                match spawned {
                    Ok(handle) => handles.push((worker_id, handle)),
                    Err(e) => {
                        cancel.cancel();
                        first_error.lock().get_or_insert(Error::BackendUnavailable(format!(
                            "failed to spawn worker-{worker_id}: {e}"
                        )));
                        break;
                    }
                }
            }

            enter(phase, RunPhase::Joining);
            for (worker_id, handle) in handles {
                if handle.join().is_err() {
                    cancel.cancel();
                    first_error.lock().get_or_insert(Error::WorkerPanicked(worker_id));
                }
            }
        });
        let elapsed = start.elapsed();

        enter(&mut self.phase, RunPhase::Reporting);
        let outcome = match first_error.into_inner() {
            None => RunOutcome::Completed,
            Some(e) => {
                error!(strategy = %kind, error = %e, "Run aborted");
                RunOutcome::aborted(&e)
            }
        };
        let final_state = match kind.observe(&*self.backend) {
            Ok(state) => Some(state),
            Err(e) => {
                error!(strategy = %kind, error = %e, "Could not read the final counter");
                None
            }
        };

        let report = RunReport {
            strategy: kind,
            backend: backend_kind,
            write_concern,
            workers,
            iterations,
            initial_value,
            elapsed,
            final_state,
            stats: stats.snapshot(),
            outcome,
        };
        LogReporter::new().report(&report);
        enter(&mut self.phase, RunPhase::Idle);
        Ok(report)
    }

    /// Runs each strategy in order.
    ///
    /// A strategy that cannot start is logged and skipped; an aborted run is
    /// reported and the sequence goes on.
    pub fn run_all(&mut self, kinds: &[StrategyKind]) -> Vec<RunReport> {
        let mut reports = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            match self.run(kind) {
                Ok(report) => reports.push(report),
                Err(e) => error!(strategy = %kind, error = %e, "Run could not start"),
            }
        }
        reports
    }

    /// Closes the backend handle.
    pub fn close(self) -> Result<()> {
        self.backend.close()
    }
}

/// Runs the configured strategies once per swept backend configuration.
///
/// A document store configured with several write concerns is connected once
/// per concern and every strategy runs under each in turn. Other stores run
/// once. A connection failure is fatal; a close failure is logged.
pub fn run_sweep(config: &Config) -> Result<Vec<RunReport>> {
    config.harness.validate()?;
    let mut reports = Vec::new();
    for backend_config in config.backend.sweep() {
        let mut harness = Harness::new(backend::connect(&backend_config)?, config.harness);
        let strategies = if config.strategies.is_empty() {
            harness.supported_strategies()
        } else {
            config.strategies.clone()
        };
        reports.extend(harness.run_all(&strategies));
        if let Err(e) = harness.close() {
            error!(backend = %backend_config.kind, error = %e, "Failed to close backend");
        }
    }
    Ok(reports)
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("backend", &self.backend.kind())
            .field("config", &self.config)
            .field("phase", &self.phase)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        BackendKind, DistributedMapStore, DocumentStore, Fault, FaultInjector, GraphNodeStore,
        Operation, RelationalRowStore, SharedCounter, WriteConcern,
    };
    use crate::error::ErrorKind;
    use std::time::Duration;

    fn small() -> HarnessConfig {
        HarnessConfig::default().with_workers(4).with_iterations(200)
    }

    #[test]
    fn test_run_atomic_expr_exact() {
        let mut harness = Harness::new(Box::new(RelationalRowStore::new("user_counter", 1)), small());
        let report = harness.run(StrategyKind::AtomicExpr).unwrap();
        assert!(report.outcome.is_completed());
        assert_eq!(report.final_value(), Some(800));
        assert_eq!(report.stats.committed, 800);
        assert_eq!(harness.phase(), RunPhase::Idle);
    }

    #[test]
    fn test_run_resets_between_runs() {
        let mut harness = Harness::new(
            Box::new(RelationalRowStore::new("user_counter", 1)),
            small().with_initial_value(5),
        );
        let first = harness.run(StrategyKind::Pessimistic).unwrap();
        let second = harness.run(StrategyKind::Optimistic).unwrap();
        assert_eq!(first.final_value(), Some(805));
        assert_eq!(second.final_value(), Some(805));
        assert_eq!(second.stats.committed, 800);
    }

    #[test]
    fn test_unsupported_does_not_start() {
        let mut harness = Harness::new(Box::new(GraphNodeStore::new("Item", "LG43")), small());
        let err = harness.run(StrategyKind::Pessimistic).unwrap_err();
        assert!(matches!(
            err,
            Error::Unsupported {
                backend: BackendKind::Graph,
                operation: Operation::Lock
            }
        ));
        assert_eq!(harness.phase(), RunPhase::Idle);
    }

    #[test]
    fn test_reset_failure_does_not_start() {
        let store = FaultInjector::new(RelationalRowStore::new("user_counter", 1), Fault::Unavailable, 0);
        let mut harness = Harness::new(Box::new(store), small());
        let err = harness.run(StrategyKind::AtomicExpr).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert_eq!(harness.phase(), RunPhase::Idle);
    }

    #[test]
    fn test_fault_aborts_and_cancels() {
        let store = FaultInjector::new(
            RelationalRowStore::new("user_counter", 1),
            Fault::Timeout(Duration::from_secs(1)),
            50,
        );
        let config = small().with_interleave_delay(Duration::from_micros(50));
        let mut harness = Harness::new(Box::new(store), config);
        let report = harness.run(StrategyKind::Naive).unwrap();
        assert_eq!(
            report.outcome,
            RunOutcome::Aborted {
                kind: ErrorKind::Timeout,
                message: "operation timed out after 1s".to_string()
            }
        );
        assert!(report.final_value().unwrap() < report.expected_value());
    }

    #[test]
    fn test_run_all_skips_unsupported() {
        let mut harness = Harness::new(Box::new(DistributedMapStore::new("counters", "key")), small());
        let reports = harness.run_all(&StrategyKind::ALL);
        let ran: Vec<_> = reports.iter().map(|r| r.strategy).collect();
        assert_eq!(
            ran,
            vec![
                StrategyKind::Naive,
                StrategyKind::Pessimistic,
                StrategyKind::Optimistic,
                StrategyKind::NativeAtomic
            ]
        );
        for report in reports.iter().filter(|r| r.strategy.is_atomic()) {
            assert!(report.is_exact(), "{report}");
        }
    }

    #[test]
    fn test_close() {
        let harness = Harness::new(Box::new(GraphNodeStore::new("Item", "LG43")), small());
        assert!(harness.close().is_ok());
    }

    #[test]
    fn test_connect_rejects_zero_workers() {
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.harness.workers = 0;
        assert!(matches!(Harness::connect(&config), Err(Error::Config(_))));
    }

    fn at_counter_limit() -> HarnessConfig {
        HarnessConfig::default()
            .with_workers(2)
            .with_iterations(1)
            .with_initial_value(i64::MAX)
    }

    #[test]
    fn test_increment_past_counter_limit_aborts() {
        for kind in [
            StrategyKind::Naive,
            StrategyKind::AtomicExpr,
            StrategyKind::Pessimistic,
            StrategyKind::Optimistic,
        ] {
            let store = RelationalRowStore::new("user_counter", 1)
                .with_lock_timeout(Some(Duration::from_secs(5)));
            let mut harness = Harness::new(Box::new(store), at_counter_limit());
            let report = harness.run(kind).unwrap();
            assert!(
                matches!(
                    report.outcome,
                    RunOutcome::Aborted { kind: ErrorKind::BackendUnavailable, ref message }
                        if message.contains("integer out of range")
                ),
                "{report}"
            );
            assert_eq!(report.final_value(), Some(i64::MAX));
            assert_eq!(report.expected_value(), i64::MAX);
            assert_eq!(report.lost_updates(), Some(2));
            assert!(!report.is_exact());
            assert_eq!(harness.phase(), RunPhase::Idle);
            // Nothing is left holding the row.
            harness.backend().lock().unwrap();
            harness.backend().unlock().unwrap();
        }
    }

    #[test]
    fn test_connect_rejects_counter_overflow() {
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.harness = at_counter_limit();
        assert!(matches!(Harness::connect(&config), Err(Error::Config(_))));
        assert!(matches!(run_sweep(&config), Err(Error::Config(_))));
    }

    struct PanicOnIncrement(RelationalRowStore);

    impl StorageBackend for PanicOnIncrement {
        fn kind(&self) -> BackendKind {
            self.0.kind()
        }

        fn supports(&self, op: Operation) -> bool {
            self.0.supports(op)
        }

        fn reset(&self, initial: i64) -> Result<()> {
            self.0.reset(initial)
        }

        fn read(&self) -> Result<SharedCounter> {
            self.0.read()
        }

        fn atomic_increment(&self) -> Result<()> {
            panic!("increment failed");
        }
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let store = PanicOnIncrement(RelationalRowStore::new("user_counter", 1));
        let mut harness = Harness::new(Box::new(store), small());
        let report = harness.run(StrategyKind::AtomicExpr).unwrap();
        assert!(matches!(
            report.outcome,
            RunOutcome::Aborted { kind: ErrorKind::WorkerPanicked, .. }
        ));
        assert_eq!(report.final_value(), Some(0));
    }

    #[test]
    fn test_report_carries_write_concern() {
        let docs = DocumentStore::new("grades", "lidiya", 3).with_write_concern(WriteConcern::Majority);
        let mut harness = Harness::new(Box::new(docs), small());
        let report = harness.run(StrategyKind::AtomicExpr).unwrap();
        assert_eq!(report.write_concern, Some(WriteConcern::Majority));

        let mut harness = Harness::new(Box::new(RelationalRowStore::new("user_counter", 1)), small());
        assert_eq!(harness.run(StrategyKind::AtomicExpr).unwrap().write_concern, None);
    }

    #[test]
    fn test_sweep_runs_each_write_concern() {
        let config = Config::from_lookup(|key| match key {
            "CONTENTION_BACKEND" => Some("document".to_string()),
            "CONTENTION_WRITE_CONCERN" => Some("1,majority".to_string()),
            "CONTENTION_STRATEGIES" => Some("atomic".to_string()),
            "CONTENTION_WORKERS" => Some("4".to_string()),
            "CONTENTION_ITERATIONS" => Some("250".to_string()),
            _ => None,
        })
        .unwrap();
        let reports = run_sweep(&config).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].write_concern, Some(WriteConcern::W1));
        assert_eq!(reports[1].write_concern, Some(WriteConcern::Majority));
        for report in &reports {
            assert_eq!(report.strategy, StrategyKind::AtomicExpr);
            assert!(report.is_exact(), "{report}");
            assert_eq!(report.final_value(), Some(1000));
        }
    }
}
