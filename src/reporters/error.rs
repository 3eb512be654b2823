//! Error type shared by the reporters.

use thiserror::Error;

/// Errors raised while rendering or writing a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing the rendered report failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for reporter operations.
pub type Result<T> = std::result::Result<T, ReportError>;
