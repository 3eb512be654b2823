//! Comparison table of runs.
//!
//! [`TableReporter`] renders a slice of [`RunReport`]s as one row per
//! strategy using the `tabled` crate, which is the quickest way to read the
//! trade-off between correctness and elapsed time side by side.
//!
//! # Feature Flag
//!
//! This module requires the `table` feature.
//!
//! # Examples
//!
//! ```rust,ignore
//! use contention::reporters::table::{TableReporter, TableStyle};
//!
//! let reports = harness.run_all(&StrategyKind::ALL);
//! println!("{}", TableReporter::new().with_title("relational").render(&reports));
//! // relational
//! // ╭──────────────────────────┬───────────┬────────┬──────────┬──────┬───────────┬─────────╮
//! // │ Strategy                 │ Elapsed s │ Final  │ Expected │ Lost │ Conflicts │ Outcome │
//! // ├──────────────────────────┼───────────┼────────┼──────────┼──────┼───────────┼─────────┤
//! // │ naive_read_modify_write  │ 1.37      │ 23114  │ 100000   │ 76886│ 0         │ completed│
//! // ...
//! ```

use tabled::{settings::Style, Table, Tabled};

use crate::report::RunReport;

/// Available table styles for rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableStyle {
    /// ASCII table with simple characters: +, -, |
    Ascii,
    /// Modern rounded corners (default)
    #[default]
    Rounded,
    /// Sharp corners with box-drawing characters
    Sharp,
    /// GitHub-flavored Markdown table
    Markdown,
    /// No borders, just spacing
    Blank,
}

#[derive(Tabled)]
struct RunRow {
    #[tabled(rename = "Strategy")]
    strategy: String,
    #[tabled(rename = "Backend")]
    backend: String,
    #[tabled(rename = "Write concern")]
    write_concern: String,
    #[tabled(rename = "Elapsed s")]
    elapsed: String,
    #[tabled(rename = "Final")]
    final_value: String,
    #[tabled(rename = "Expected")]
    expected: i64,
    #[tabled(rename = "Lost")]
    lost: u64,
    #[tabled(rename = "CAS conflicts")]
    conflicts: u64,
    #[tabled(rename = "Outcome")]
    outcome: String,
}

impl From<&RunReport> for RunRow {
    fn from(report: &RunReport) -> Self {
        RunRow {
            strategy: report.strategy.to_string(),
            backend: report.backend.to_string(),
            write_concern: report
                .write_concern
                .map_or_else(|| "-".to_string(), |wc| wc.to_string()),
            elapsed: format!("{:.2}", report.elapsed_secs()),
            final_value: report
                .final_value()
                .map_or_else(|| "-".to_string(), |v| v.to_string()),
            expected: report.expected_value(),
            lost: report.lost_updates().unwrap_or(0),
            conflicts: report.stats.cas_conflicts,
            outcome: report.outcome.to_string(),
        }
    }
}

/// Renders run reports as a table, one row per run.
#[derive(Debug, Clone, Default)]
pub struct TableReporter {
    style: TableStyle,
    show_header: bool,
    title: Option<String>,
}

impl TableReporter {
    /// Rounded style, with a header row and no title.
    pub fn new() -> Self {
        Self {
            show_header: true,
            ..Self::default()
        }
    }

    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_header(mut self, show: bool) -> Self {
        self.show_header = show;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    fn apply_style(&self, table: &mut Table) {
        match self.style {
            TableStyle::Ascii => table.with(Style::ascii()),
            TableStyle::Rounded => table.with(Style::rounded()),
            TableStyle::Sharp => table.with(Style::sharp()),
            TableStyle::Markdown => table.with(Style::markdown()),
            TableStyle::Blank => table.with(Style::blank()),
        };
    }

    pub fn render(&self, reports: &[RunReport]) -> String {
        let rows: Vec<RunRow> = reports.iter().map(RunRow::from).collect();
        let mut table = Table::new(&rows);
        self.apply_style(&mut table);

        if !self.show_header {
            table.with(tabled::settings::Remove::row(
                tabled::settings::object::Rows::first(),
            ));
        }

        match &self.title {
            Some(title) => format!("{title}\n{table}"),
            None => table.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::WriteConcern;
    use crate::error::Error;
    use crate::report::tests::report;
    use crate::report::RunOutcome;
    use crate::strategy::StrategyKind;

    #[test]
    fn test_render_empty() {
        let output = TableReporter::new().render(&[]);
        assert!(output.contains("Strategy"));
    }

    #[test]
    fn test_render_rows() {
        let reports = vec![
            report(StrategyKind::Naive, 23_114),
            report(StrategyKind::AtomicExpr, 100_000),
        ];
        let output = TableReporter::new().render(&reports);
        assert!(output.contains("naive_read_modify_write"));
        assert!(output.contains("atomic_expression_update"));
        assert!(output.contains("76886"));
        assert!(output.contains("1.23"));
    }

    #[test]
    fn test_render_aborted_without_value() {
        let mut r = report(StrategyKind::Optimistic, 0);
        r.final_state = None;
        r.outcome = RunOutcome::aborted(&Error::RetryExhausted { attempts: 8 });
        let output = TableReporter::new().with_style(TableStyle::Ascii).render(&[r]);
        assert!(output.contains("aborted"));
        assert!(output.contains(" - "));
    }

    #[test]
    fn test_render_write_concerns() {
        let mut w1 = report(StrategyKind::AtomicExpr, 100_000);
        w1.write_concern = Some(WriteConcern::W1);
        let mut majority = w1.clone();
        majority.write_concern = Some(WriteConcern::Majority);
        let output = TableReporter::new().render(&[w1, majority]);
        assert!(output.contains("Write concern"));
        assert!(output.contains("majority"));
        assert_eq!(output.matches("atomic_expression_update").count(), 2);
    }

    #[test]
    fn test_render_without_header() {
        let output = TableReporter::new()
            .with_header(false)
            .render(&[report(StrategyKind::Naive, 1)]);
        assert!(!output.contains("Strategy"));
        assert!(output.contains("naive_read_modify_write"));
    }

    #[test]
    fn test_render_with_title() {
        let output = TableReporter::new()
            .with_title("relational")
            .with_style(TableStyle::Markdown)
            .render(&[report(StrategyKind::Naive, 1)]);
        assert!(output.starts_with("relational\n"));
        assert!(output.contains('|'));
    }
}
