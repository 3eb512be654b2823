//! JSON export of runs.
//!
//! [`JsonReporter`] serializes [`RunReport`]s with serde, either as a bare
//! array or wrapped in a [`RunSummary`] that also records when the runs were
//! taken.
//!
//! # Feature Flag
//!
//! This module requires the `json` feature.
//!
//! # Examples
//!
//! ```rust,ignore
//! use contention::reporters::json::JsonReporter;
//!
//! let reports = harness.run_all(&StrategyKind::ALL);
//! let json = JsonReporter::new().pretty(true).to_json(&reports)?;
//! ```

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::Result;
use crate::report::RunReport;

/// A set of runs, as written by [`JsonReporter`] in wrapped mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// Milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    pub runs: Vec<RunReport>,
}

impl RunSummary {
    pub fn new(runs: Vec<RunReport>) -> Self {
        Self {
            timestamp_ms: None,
            runs,
        }
    }

    pub fn with_timestamp(runs: Vec<RunReport>, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms: Some(timestamp_ms),
            runs,
        }
    }
}

/// Serializes run reports to JSON.
#[derive(Debug, Clone, Default)]
pub struct JsonReporter {
    pretty: bool,
    wrap_in_summary: bool,
    include_timestamp: bool,
}

impl JsonReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty(mut self, enabled: bool) -> Self {
        self.pretty = enabled;
        self
    }

    /// Wraps the runs in a [`RunSummary`] object instead of a bare array.
    pub fn wrap_in_summary(mut self, enabled: bool) -> Self {
        self.wrap_in_summary = enabled;
        self
    }

    /// Stamps the summary with the current time. Implies wrapping.
    pub fn include_timestamp(mut self, enabled: bool) -> Self {
        self.include_timestamp = enabled;
        if enabled {
            self.wrap_in_summary = true;
        }
        self
    }

    fn timestamp_ms() -> Option<u64> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_millis() as u64)
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }

    pub fn to_json(&self, reports: &[RunReport]) -> Result<String> {
        if self.wrap_in_summary {
            let summary = RunSummary {
                timestamp_ms: self.include_timestamp.then(Self::timestamp_ms).flatten(),
                runs: reports.to_vec(),
            };
            self.encode(&summary)
        } else {
            self.encode(&reports)
        }
    }

    /// Writes the JSON document followed by a newline.
    pub fn write_to(&self, reports: &[RunReport], mut writer: impl Write) -> Result<()> {
        let json = self.to_json(reports)?;
        writeln!(writer, "{json}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::WriteConcern;
    use crate::report::tests::report;
    use crate::strategy::StrategyKind;

    #[test]
    fn test_bare_array() {
        let reports = vec![report(StrategyKind::Naive, 23_114)];
        let json = JsonReporter::new().to_json(&reports).unwrap();
        assert!(json.starts_with('['));
        assert!(json.contains(r#""strategy":"naive""#));
        assert!(json.contains(r#""value":23114"#));

        let parsed: Vec<RunReport> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, reports);
    }

    #[test]
    fn test_write_concern_only_when_set() {
        let plain = report(StrategyKind::AtomicExpr, 100_000);
        let mut majority = plain.clone();
        majority.write_concern = Some(WriteConcern::Majority);
        let json = JsonReporter::new().to_json(&[plain, majority.clone()]).unwrap();
        assert_eq!(json.matches(r#""write_concern":"majority""#).count(), 1);
        assert_eq!(json.matches("write_concern").count(), 1);

        let parsed: Vec<RunReport> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0].write_concern, None);
        assert_eq!(parsed[1], majority);
    }

    #[test]
    fn test_wrapped_with_timestamp() {
        let reports = vec![report(StrategyKind::Optimistic, 100_000)];
        let json = JsonReporter::new()
            .include_timestamp(true)
            .pretty(true)
            .to_json(&reports)
            .unwrap();
        let summary: RunSummary = serde_json::from_str(&json).unwrap();
        assert!(summary.timestamp_ms.is_some());
        assert_eq!(summary.runs[0].final_value(), Some(100_000));
        assert!(summary.runs[0].outcome.is_completed());
    }

    #[test]
    fn test_wrapped_without_timestamp() {
        let json = JsonReporter::new().wrap_in_summary(true).to_json(&[]).unwrap();
        assert_eq!(json, r#"{"runs":[]}"#);
    }

    #[test]
    fn test_write_to() {
        let mut buf = Vec::new();
        JsonReporter::new()
            .write_to(&[report(StrategyKind::AtomicExpr, 100_000)], &mut buf)
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with("}]\n"));
        assert!(text.contains(r#""outcome":{"status":"completed"}"#));
    }
}
