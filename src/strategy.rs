//! Concurrency-control strategies for incrementing the shared counter.
//!
//! Each strategy is a plain function run by every worker of a run. Workers
//! share nothing but the backend and the run's [`CancelToken`] and
//! [`RunStats`]; the counter itself is re-read from the backend on every
//! iteration.
//!
//! | Kind | Algorithm | Isolation | Expected final value |
//! |------|-----------|-----------|----------------------|
//! | [`StrategyKind::Naive`] | `v = read(); write(v + 1)` | none | `<= W*M`, lost updates |
//! | [`StrategyKind::AtomicExpr`] | `atomic_increment()` | backend statement | `W*M` |
//! | [`StrategyKind::Pessimistic`] | `lock; v = read(); write(v + 1); unlock` | mutual exclusion | `W*M` |
//! | [`StrategyKind::Optimistic`] | `s = read(); cas(s, s + 1)` until accepted | version check | `W*M` |
//! | [`StrategyKind::NativeAtomic`] | `native_increment()` | store primitive | `W*M` |
//!
//! Dispatch goes through [`StrategyKind::handler`], a table lookup; names are
//! only parsed at the configuration boundary.

pub mod atomic_expr;
pub mod native_atomic;
pub mod naive;
pub mod optimistic;
pub mod pessimistic;

use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::backend::{Operation, SharedCounter, StorageBackend};
use crate::config::ConfigError;
use crate::error::Result;
use crate::stats::RunStats;

/// The concurrency-control algorithms the harness can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StrategyKind {
    /// Read, then blindly write the incremented value ("lost update").
    Naive = 0,
    /// One backend-side `value = value + 1` per iteration.
    AtomicExpr = 1,
    /// Explicit lock around read-modify-write.
    Pessimistic = 2,
    /// Version-stamped compare-and-swap with retry.
    Optimistic = 3,
    /// The store's dedicated atomic counter.
    NativeAtomic = 4,
}

/// A strategy implementation, run once per worker.
pub type StrategyFn = fn(&dyn StorageBackend, &WorkerContext<'_>) -> Result<()>;

const HANDLERS: [StrategyFn; 5] = [
    naive::run,
    atomic_expr::run,
    pessimistic::run,
    optimistic::run,
    native_atomic::run,
];

impl StrategyKind {
    /// Every strategy, in the order the harness runs them by default.
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::Naive,
        StrategyKind::AtomicExpr,
        StrategyKind::Pessimistic,
        StrategyKind::Optimistic,
        StrategyKind::NativeAtomic,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            StrategyKind::Naive => "naive_read_modify_write",
            StrategyKind::AtomicExpr => "atomic_expression_update",
            StrategyKind::Pessimistic => "pessimistic_locking",
            StrategyKind::Optimistic => "optimistic_concurrency_control",
            StrategyKind::NativeAtomic => "native_atomic_counter",
        }
    }

    /// The function implementing this strategy.
    pub fn handler(self) -> StrategyFn {
        HANDLERS[self as usize]
    }

    /// Backend operations the strategy calls.
    pub const fn required_operations(&self) -> &'static [Operation] {
        match self {
            StrategyKind::Naive => &[Operation::Read, Operation::BlindWrite],
            StrategyKind::AtomicExpr => &[Operation::AtomicIncrement],
            StrategyKind::Pessimistic => &[Operation::Lock, Operation::Read, Operation::BlindWrite],
            StrategyKind::Optimistic => &[Operation::Read, Operation::CompareAndSwap],
            StrategyKind::NativeAtomic => &[Operation::NativeCounter],
        }
    }

    /// Whether the strategy is expected to end at exactly `initial + W*M`.
    pub const fn is_atomic(&self) -> bool {
        !matches!(self, StrategyKind::Naive)
    }

    /// The first operation `backend` lacks, if any.
    pub fn missing_operation(&self, backend: &dyn StorageBackend) -> Option<Operation> {
        self.required_operations()
            .iter()
            .copied()
            .find(|op| !backend.supports(*op))
    }

    /// Strategies `backend` can run, in default order.
    pub fn supported_by(backend: &dyn StorageBackend) -> Vec<StrategyKind> {
        Self::ALL
            .into_iter()
            .filter(|kind| kind.missing_operation(backend).is_none())
            .collect()
    }

    /// Reads the resource this strategy increments.
    ///
    /// The native counter is a separate object from the keyed counter and
    /// carries no version.
    pub fn observe(&self, backend: &dyn StorageBackend) -> Result<SharedCounter> {
        match self {
            StrategyKind::NativeAtomic => Ok(SharedCounter::new(backend.native_read()?, 0)),
            _ => backend.read(),
        }
    }
}

impl Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let alias = match wanted.as_str() {
            "naive" | "lost_update" => Some(StrategyKind::Naive),
            "atomic" | "atomic_expr" | "in_place_update" => Some(StrategyKind::AtomicExpr),
            "pessimistic" | "row_level_locking" => Some(StrategyKind::Pessimistic),
            "optimistic" | "occ" => Some(StrategyKind::Optimistic),
            "native" | "native_atomic" | "atomic_long" => Some(StrategyKind::NativeAtomic),
            _ => None,
        };
        alias
            .or_else(|| Self::ALL.into_iter().find(|kind| kind.name() == wanted))
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "strategy".to_string(),
                value: s.to_string(),
                reason: "unknown strategy".to_string(),
            })
    }
}

/// Retry policy of the optimistic strategy.
///
/// The default retries forever without pausing, which is what makes the
/// strategy a stress test of the backend's CAS path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryPolicy {
    /// Conflicts tolerated for a single increment before giving up with
    /// [`Error::RetryExhausted`](crate::error::Error::RetryExhausted).
    pub max_conflicts: Option<u64>,
    /// Snooze with exponential backoff between attempts.
    pub backoff: bool,
}

impl RetryPolicy {
    pub const fn unbounded() -> Self {
        Self {
            max_conflicts: None,
            backoff: false,
        }
    }

    pub const fn with_max_conflicts(self, max: u64) -> Self {
        Self {
            max_conflicts: Some(max),
            ..self
        }
    }

    pub const fn with_backoff(self, backoff: bool) -> Self {
        Self { backoff, ..self }
    }
}

/// Cooperative stop signal shared by the workers of one run.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Everything a worker needs besides the backend.
#[derive(Debug, Clone, Copy)]
pub struct WorkerContext<'a> {
    pub worker_id: usize,
    /// Increments this worker must commit.
    pub iterations: u64,
    /// Pause between reading the counter and writing it back.
    pub interleave_delay: Duration,
    pub retry: RetryPolicy,
    pub cancel: &'a CancelToken,
    pub stats: &'a RunStats,
}

impl WorkerContext<'_> {
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Widens the race window between a read and the dependent write.
    #[inline]
    pub fn interleave(&self) {
        if !self.interleave_delay.is_zero() {
            thread::sleep(self.interleave_delay);
        }
    }
}
