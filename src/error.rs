//! Error taxonomy shared by backends, strategies and the harness.
//!
//! A compare-and-swap that loses the race is *not* an error: it is reported as
//! `Ok(false)` by [`StorageBackend::compare_and_swap`] and absorbed by the
//! optimistic strategy's retry loop. Everything here is fatal at some level:
//!
//! | Variant | Fatal for |
//! |---------|-----------|
//! | [`Error::Connection`] | the whole process |
//! | [`Error::Config`] | the whole process |
//! | [`Error::Unsupported`] | the run (it never starts) |
//! | [`Error::BackendUnavailable`], [`Error::Timeout`] | the run (aborted) |
//! | [`Error::RetryExhausted`], [`Error::WorkerPanicked`] | the run (aborted) |
//! | [`Error::LockNotHeld`] | the run (aborted) |
//!
//! [`StorageBackend::compare_and_swap`]: crate::backend::StorageBackend::compare_and_swap

use std::fmt::{self, Display};
use std::time::Duration;

use thiserror::Error;

use crate::backend::{BackendKind, Operation};
use crate::config::ConfigError;

/// Errors raised while driving a backend.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend handle could not be acquired.
    #[error("connection error: {0}")]
    Connection(String),

    /// The backend failed an operation (connection loss, lock-wait ceiling,
    /// use after close).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend did not answer within its configured deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The backend does not provide the operation a strategy needs.
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        backend: BackendKind,
        operation: Operation,
    },

    /// `unlock` was called by a worker that does not hold the lock.
    #[error("lock on `{key}` is held by another worker")]
    LockNotHeld { key: String },

    /// The optimistic strategy hit its conflict ceiling.
    #[error("compare-and-swap gave up after {attempts} conflicting attempts")]
    RetryExhausted { attempts: u64 },

    /// A worker thread panicked.
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for backend, strategy and harness operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Discriminant of [`Error`], cheap to copy into reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ErrorKind {
    Connection,
    BackendUnavailable,
    Timeout,
    Unsupported,
    LockNotHeld,
    RetryExhausted,
    WorkerPanicked,
    Config,
}

impl Error {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) => ErrorKind::Connection,
            Error::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Unsupported { .. } => ErrorKind::Unsupported,
            Error::LockNotHeld { .. } => ErrorKind::LockNotHeld,
            Error::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            Error::WorkerPanicked(_) => ErrorKind::WorkerPanicked,
            Error::Config(_) => ErrorKind::Config,
        }
    }
}

impl ErrorKind {
    /// Returns the snake_case name of this kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::LockNotHeld => "lock_not_held",
            ErrorKind::RetryExhausted => "retry_exhausted",
            ErrorKind::WorkerPanicked => "worker_panicked",
            ErrorKind::Config => "config",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
