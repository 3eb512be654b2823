//! Structured log line per run.
//!
//! [`LogReporter`] emits one `info` event per finished run, carrying the
//! fields a reader needs to compare strategies without any other output:
//!
//! ```text
//! INFO contention::reporters::log: naive_read_modify_write: elapsed 1.37 s, final counter 23114
//!     strategy=naive_read_modify_write elapsed_s=1.37 final_counter=23114 expected=100000 lost_updates=76886 ...
//! ```
//!
//! Document store runs also carry `write_concern`. Aborted runs are logged at
//! `warn` with the failure kind.

use tracing::{field, info, warn};

use crate::report::{RunOutcome, RunReport};

/// Emits run reports as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl LogReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn report(&self, report: &RunReport) {
        let final_counter = report.final_value();
        let lost_updates = report.lost_updates().unwrap_or(0);
        let stats = &report.stats;
        let write_concern = report.write_concern.map(field::display);
        match &report.outcome {
            RunOutcome::Completed => info!(
                strategy = %report.strategy,
                backend = %report.backend,
                write_concern,
                elapsed_s = report.elapsed_secs(),
                final_counter,
                expected = report.expected_value(),
                lost_updates,
                committed = stats.committed,
                cas_attempts = stats.cas_attempts,
                cas_conflicts = stats.cas_conflicts,
                lock_acquisitions = stats.lock_acquisitions,
                "{report}"
            ),
            RunOutcome::Aborted { kind, .. } => warn!(
                strategy = %report.strategy,
                backend = %report.backend,
                write_concern,
                elapsed_s = report.elapsed_secs(),
                final_counter,
                expected = report.expected_value(),
                committed = stats.committed,
                error_kind = %kind,
                "{report}"
            ),
        }
    }

    /// Logs every report in order.
    pub fn report_all<'a>(&self, reports: impl IntoIterator<Item = &'a RunReport>) {
        for report in reports {
            self.report(report);
        }
    }
}
