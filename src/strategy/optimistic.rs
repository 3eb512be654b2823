//! Optimistic concurrency control: version-stamped compare-and-swap.
//!
//! Each increment reads `(value, version)`, then asks the backend to replace
//! exactly that pair with `(value + 1, version + 1)`. A rejected swap means
//! another worker committed in between; the worker re-reads and tries again.
//! Only accepted swaps count toward the worker's iterations.
//!
//! With the default [`RetryPolicy`](crate::strategy::RetryPolicy) the loop is
//! unbounded and does not pause. A conflict ceiling turns persistent
//! contention into [`Error::RetryExhausted`]; backoff snoozes between attempts.

use crossbeam_utils::Backoff;

use crate::backend::StorageBackend;
use crate::error::{Error, Result};
use crate::strategy::WorkerContext;

pub fn run(backend: &dyn StorageBackend, ctx: &WorkerContext<'_>) -> Result<()> {
    for _ in 0..ctx.iterations {
        if !increment(backend, ctx)? {
            break;
        }
    }
    Ok(())
}

/// Commits one increment. Returns `false` if the run was cancelled first.
fn increment(backend: &dyn StorageBackend, ctx: &WorkerContext<'_>) -> Result<bool> {
    let backoff = Backoff::new();
    let mut conflicts = 0u64;
    loop {
        if ctx.is_cancelled() {
            return Ok(false);
        }
        let seen = backend.read()?;
        ctx.interleave();
        ctx.stats.cas_attempts.incr();
        if backend.compare_and_swap(seen, seen.incremented()?)? {
            ctx.stats.committed.incr();
            return Ok(true);
        }
        ctx.stats.cas_conflicts.incr();
        conflicts += 1;
        if ctx.retry.max_conflicts.is_some_and(|max| conflicts > max) {
            return Err(Error::RetryExhausted { attempts: conflicts });
        }
        if ctx.retry.backoff {
            backoff.snooze();
        }
    }
}
