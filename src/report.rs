//! The outcome of one strategy run.
//!
//! A [`RunReport`] is what the harness hands to reporters: which strategy ran
//! against which backend, how long the concurrent phase took, what the counter
//! ended at and what the per-run tallies saw. With the `serde` feature it can
//! be serialized with any serde format.
//!
//! # Examples
//!
//! ```rust,ignore
//! let report = harness.run(StrategyKind::Naive)?;
//! println!("{report}");
//! // naive_read_modify_write: elapsed 1.37 s, final counter 23114
//! if let Some(lost) = report.lost_updates() {
//!     println!("lost {lost} updates");
//! }
//! ```

use std::fmt::{self, Display};
use std::time::Duration;

use crate::backend::{BackendKind, SharedCounter, WriteConcern};
use crate::error::{Error, ErrorKind};
use crate::stats::StatsSnapshot;
use crate::strategy::StrategyKind;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", rename_all = "snake_case"))]
pub enum RunOutcome {
    /// Every worker finished all of its iterations.
    Completed,
    /// A worker hit a fatal error and the run was cancelled.
    Aborted { kind: ErrorKind, message: String },
}

impl RunOutcome {
    pub fn aborted(error: &Error) -> Self {
        RunOutcome::Aborted {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

impl Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => f.write_str("completed"),
            RunOutcome::Aborted { message, .. } => write!(f, "aborted: {message}"),
        }
    }
}

/// Result of running one strategy with W workers and M iterations each.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunReport {
    pub strategy: StrategyKind,
    pub backend: BackendKind,
    /// Set for stores with an acknowledgement level.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub write_concern: Option<WriteConcern>,
    pub workers: usize,
    pub iterations: u64,
    pub initial_value: i64,
    /// Wall-clock time from the first spawn to the last join.
    pub elapsed: Duration,
    /// `None` only when reading the counter after an aborted run failed too.
    pub final_state: Option<SharedCounter>,
    pub stats: StatsSnapshot,
    pub outcome: RunOutcome,
}

impl RunReport {
    /// `initial + W*M`: what a correct strategy ends at, saturated to the
    /// 64-bit range.
    pub fn expected_value(&self) -> i64 {
        let expected = self.expected_wide();
        i64::try_from(expected).unwrap_or(if expected < 0 { i64::MIN } else { i64::MAX })
    }

    fn expected_wide(&self) -> i128 {
        (self.workers as i128)
            .saturating_mul(self.iterations as i128)
            .saturating_add(self.initial_value as i128)
    }

    pub fn final_value(&self) -> Option<i64> {
        self.final_state.map(|state| state.value)
    }

    /// Increments that did not survive: `expected - final`, when positive.
    pub fn lost_updates(&self) -> Option<u64> {
        let lost = self.expected_wide().saturating_sub(self.final_value()? as i128);
        (lost > 0).then(|| u64::try_from(lost).unwrap_or(u64::MAX))
    }

    /// Whether the counter ended exactly at `initial + W*M`.
    pub fn is_exact(&self) -> bool {
        self.final_value().map(i128::from) == Some(self.expected_wide())
    }

    /// Elapsed seconds rounded to two decimals.
    pub fn elapsed_secs(&self) -> f64 {
        (self.elapsed.as_secs_f64() * 100.0).round() / 100.0
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.strategy)?;
        if let Some(write_concern) = self.write_concern {
            write!(f, " (write concern {write_concern})")?;
        }
        write!(f, ": elapsed {:.2} s, final counter ", self.elapsed_secs())?;
        match self.final_value() {
            Some(value) => write!(f, "{value}")?,
            None => f.write_str("unknown")?,
        }
        if let RunOutcome::Aborted { message, .. } = &self.outcome {
            write!(f, " (aborted: {message})")?;
        }
        Ok(())
    }
}
