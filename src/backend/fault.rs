//! Fault-injecting wrapper for any backend.
//!
//! [`FaultInjector`] forwards every call to the wrapped backend and counts
//! them. When the count reaches the configured trip point the call fails with
//! the chosen [`Fault`] instead of reaching the backend. The fault fires once;
//! later calls go through again, which lets a test abort one run and check
//! that the next one is unaffected.
//!
//! # Example
//!
//! ```rust
//! use contention::backend::{Fault, FaultInjector, GraphNodeStore, StorageBackend};
//!
//! let graph = FaultInjector::new(GraphNodeStore::new("Item", "LG43"), Fault::Unavailable, 2);
//! graph.reset(0).unwrap();
//! graph.atomic_increment().unwrap();
//! assert!(graph.atomic_increment().is_err());
//! graph.atomic_increment().unwrap();
//! assert_eq!(graph.read().unwrap().value, 2);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::backend::{BackendKind, Operation, SharedCounter, StorageBackend, WriteConcern};
use crate::error::{Error, Result};

/// The failure a [`FaultInjector`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Connection lost mid-operation.
    Unavailable,
    /// The backend did not answer in time.
    Timeout(Duration),
}

impl Fault {
    fn to_error(self, op: Operation) -> Error {
        match self {
            Fault::Unavailable => {
                Error::BackendUnavailable(format!("injected fault during {op}"))
            }
            Fault::Timeout(after) => Error::Timeout(after),
        }
    }
}

/// Wraps a backend and fails exactly one call: the `trip_at`-th one after
/// construction, counting from 0.
#[derive(Debug)]
pub struct FaultInjector<B> {
    inner: B,
    fault: Fault,
    trip_at: u64,
    calls: AtomicU64,
}

impl<B: StorageBackend> FaultInjector<B> {
    pub fn new(inner: B, fault: Fault, trip_at: u64) -> Self {
        Self {
            inner,
            fault,
            trip_at,
            calls: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn into_inner(self) -> B {
        self.inner
    }

    /// Calls forwarded or failed so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn check(&self, op: Operation) -> Result<()> {
        if self.calls.fetch_add(1, Ordering::Relaxed) == self.trip_at {
            Err(self.fault.to_error(op))
        } else {
            Ok(())
        }
    }
}

impl<B: StorageBackend> StorageBackend for FaultInjector<B> {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn supports(&self, op: Operation) -> bool {
        self.inner.supports(op)
    }

    fn reset(&self, initial: i64) -> Result<()> {
        self.check(Operation::Reset)?;
        self.inner.reset(initial)
    }

    fn read(&self) -> Result<SharedCounter> {
        self.check(Operation::Read)?;
        self.inner.read()
    }

    fn blind_write(&self, value: i64) -> Result<()> {
        self.check(Operation::BlindWrite)?;
        self.inner.blind_write(value)
    }

    fn atomic_increment(&self) -> Result<()> {
        self.check(Operation::AtomicIncrement)?;
        self.inner.atomic_increment()
    }

    fn lock(&self) -> Result<()> {
        self.check(Operation::Lock)?;
        self.inner.lock()
    }

    // Never faulted, so a failing worker always releases its lock.
    fn unlock(&self) -> Result<()> {
        self.inner.unlock()
    }

    fn compare_and_swap(&self, expected: SharedCounter, new: SharedCounter) -> Result<bool> {
        self.check(Operation::CompareAndSwap)?;
        self.inner.compare_and_swap(expected, new)
    }

    fn native_increment(&self) -> Result<i64> {
        self.check(Operation::NativeCounter)?;
        self.inner.native_increment()
    }

    fn native_read(&self) -> Result<i64> {
        self.check(Operation::NativeCounter)?;
        self.inner.native_read()
    }

    fn write_concern(&self) -> Option<WriteConcern> {
        self.inner.write_concern()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
