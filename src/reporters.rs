//! Reporters that render [`RunReport`](crate::report::RunReport)s.
//!
//! - [`log`] - One structured `tracing` event per run (always available)
//! - [`table`] - Side-by-side comparison table using the `tabled` crate
//! - [`json`] - Serialize reports to JSON format
//!
//! # Feature Flags
//!
//! - `table` - Enables the [`table`] module
//! - `json` - Enables the [`json`] module
//! - `full` - Enables both
//!
//! # Example
//!
//! ```rust,ignore
//! use contention::reporters::Result;
//!
//! fn summarize(reports: &[RunReport]) -> Result<()> {
//!     #[cfg(feature = "table")]
//!     println!("{}", TableReporter::new().render(reports));
//!
//!     #[cfg(feature = "json")]
//!     println!("{}", JsonReporter::new().pretty(true).to_json(reports)?);
//!
//!     Ok(())
//! }
//! ```

mod error;

pub mod log;

pub use error::{ReportError, Result};

#[cfg(feature = "table")]
pub mod table;

#[cfg(feature = "json")]
pub mod json;
