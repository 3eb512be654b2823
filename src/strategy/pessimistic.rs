//! Pessimistic locking: read-modify-write inside an explicit exclusive lock.
//!
//! The unlock is issued whether or not the body succeeded, and the body's
//! error wins over an unlock error. A worker that panics inside the lock
//! still releases it while unwinding.

use crate::backend::{checked_increment, StorageBackend};
use crate::error::Result;
use crate::strategy::WorkerContext;

/// An acquired backend lock, released on drop unless [`HeldLock::release`]
/// already did.
struct HeldLock<'a> {
    backend: &'a dyn StorageBackend,
    held: bool,
}

impl<'a> HeldLock<'a> {
    fn acquire(backend: &'a dyn StorageBackend) -> Result<Self> {
        backend.lock()?;
        Ok(Self {
            backend,
            held: true,
        })
    }

    fn release(mut self) -> Result<()> {
        self.held = false;
        self.backend.unlock()
    }
}

impl Drop for HeldLock<'_> {
    fn drop(&mut self) {
        if self.held {
            let _ = self.backend.unlock();
        }
    }
}

pub fn run(backend: &dyn StorageBackend, ctx: &WorkerContext<'_>) -> Result<()> {
    for _ in 0..ctx.iterations {
        if ctx.is_cancelled() {
            break;
        }
        let lock = HeldLock::acquire(backend)?;
        ctx.stats.lock_acquisitions.incr();
        let body = increment_locked(backend, ctx);
        let released = lock.release();
        body?;
        released?;
        ctx.stats.committed.incr();
    }
    Ok(())
}

fn increment_locked(backend: &dyn StorageBackend, ctx: &WorkerContext<'_>) -> Result<()> {
    let current = backend.read()?;
    ctx.interleave();
    backend.blind_write(checked_increment(current.value)?)
}

#[cfg(test)]
mod tests {
    use crate::backend::{
        BackendKind, DistributedMapStore, Fault, FaultInjector, Operation, RelationalRowStore,
        SharedCounter, StorageBackend,
    };
    use crate::error::{Error, Result};
    use crate::stats::RunStats;
    use crate::strategy::testing::run_workers;
    use crate::strategy::{CancelToken, RetryPolicy, StrategyKind, WorkerContext};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_exact_with_interleave_delay() {
        let map = DistributedMapStore::new("counters", "key");
        map.reset(0).unwrap();
        let (results, stats) = run_workers(
            StrategyKind::Pessimistic,
            &map,
            4,
            25,
            Duration::from_millis(1),
            RetryPolicy::default(),
        );
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(map.read().unwrap().value, 100);
        assert_eq!(stats.lock_acquisitions, 100);
        assert_eq!(stats.committed, 100);
    }

    #[test]
    fn test_exact_relational() {
        let store = RelationalRowStore::new("user_counter", 1);
        store.reset(0).unwrap();
        let (results, _) = run_workers(
            StrategyKind::Pessimistic,
            &store,
            8,
            1000,
            Duration::ZERO,
            RetryPolicy::default(),
        );
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(store.read().unwrap().value, 8000);
    }

    #[test]
    fn test_lock_released_when_body_fails() {
        // Calls: reset(0), lock(1), read(2) fails.
        let store = FaultInjector::new(
            RelationalRowStore::new("user_counter", 1),
            Fault::Unavailable,
            2,
        );
        store.reset(0).unwrap();
        let (results, stats) = run_workers(
            StrategyKind::Pessimistic,
            &store,
            1,
            5,
            Duration::ZERO,
            RetryPolicy::default(),
        );
        assert!(matches!(results[0], Err(Error::BackendUnavailable(_))));
        assert_eq!(stats.committed, 0);
        // The row lock is free again: another thread can write without waiting.
        std::thread::scope(|s| {
            s.spawn(|| store.inner().blind_write(7).unwrap());
        });
        assert_eq!(store.inner().read().unwrap().value, 7);
    }

    #[test]
    fn test_out_of_range_fails_without_hanging() {
        let store = RelationalRowStore::new("user_counter", 1);
        store.reset(i64::MAX).unwrap();
        let (results, stats) = run_workers(
            StrategyKind::Pessimistic,
            &store,
            2,
            1,
            Duration::ZERO,
            RetryPolicy::default(),
        );
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(Error::BackendUnavailable(_)))));
        assert_eq!(stats.lock_acquisitions, 2);
        assert_eq!(stats.committed, 0);
        assert_eq!(store.read().unwrap().value, i64::MAX);
    }

    /// Row store whose writes panic, to exercise the unwind path.
    struct PanicOnWrite(RelationalRowStore);

    impl StorageBackend for PanicOnWrite {
        fn kind(&self) -> BackendKind {
            self.0.kind()
        }

        fn supports(&self, op: Operation) -> bool {
            self.0.supports(op)
        }

        fn reset(&self, initial: i64) -> Result<()> {
            self.0.reset(initial)
        }

        fn read(&self) -> Result<SharedCounter> {
            self.0.read()
        }

        fn blind_write(&self, _value: i64) -> Result<()> {
            panic!("write failed");
        }

        fn lock(&self) -> Result<()> {
            self.0.lock()
        }

        fn unlock(&self) -> Result<()> {
            self.0.unlock()
        }
    }

    #[test]
    fn test_lock_released_when_worker_panics() {
        let store = PanicOnWrite(
            RelationalRowStore::new("user_counter", 1)
                .with_lock_timeout(Some(Duration::from_millis(500))),
        );
        store.reset(0).unwrap();
        let cancel = CancelToken::new();
        let stats = RunStats::new();
        let ctx = WorkerContext {
            worker_id: 0,
            iterations: 1,
            interleave_delay: Duration::ZERO,
            retry: RetryPolicy::default(),
            cancel: &cancel,
            stats: &stats,
        };
        let joined = thread::scope(|s| s.spawn(|| super::run(&store, &ctx)).join());
        assert!(joined.is_err());
        assert_eq!(stats.lock_acquisitions.get(), 1);

        // Another thread gets the lock without hitting the wait ceiling.
        thread::scope(|s| {
            s.spawn(|| {
                store.lock().unwrap();
                store.unlock().unwrap();
            });
        });
    }
}
