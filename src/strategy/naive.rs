//! Naive read-modify-write: the lost-update baseline.
//!
//! Two workers that read the same value both write back `v + 1`, and one of
//! the increments disappears. Nothing here prevents that; the strategy exists
//! to show how often it happens on a given backend.

use crate::backend::{checked_increment, StorageBackend};
use crate::error::Result;
use crate::strategy::WorkerContext;

pub fn run(backend: &dyn StorageBackend, ctx: &WorkerContext<'_>) -> Result<()> {
    for _ in 0..ctx.iterations {
        if ctx.is_cancelled() {
            break;
        }
        let current = backend.read()?;
        ctx.interleave();
        backend.blind_write(checked_increment(current.value)?)?;
        ctx.stats.committed.incr();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::backend::{RelationalRowStore, StorageBackend};
    use crate::error::Error;
    use crate::strategy::testing::run_workers;
    use crate::strategy::{RetryPolicy, StrategyKind};
    use std::time::Duration;

    #[test]
    fn test_single_worker_is_exact() {
        let store = RelationalRowStore::new("user_counter", 1);
        store.reset(0).unwrap();
        let (results, stats) = run_workers(
            StrategyKind::Naive,
            &store,
            1,
            1000,
            Duration::ZERO,
            RetryPolicy::default(),
        );
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(store.read().unwrap().value, 1000);
        assert_eq!(stats.committed, 1000);
    }

    #[test]
    fn test_interleaving_loses_updates() {
        let store = RelationalRowStore::new("user_counter", 1);
        store.reset(0).unwrap();
        let (results, stats) = run_workers(
            StrategyKind::Naive,
            &store,
            8,
            20,
            Duration::from_millis(2),
            RetryPolicy::default(),
        );
        assert!(results.iter().all(|r| r.is_ok()));
        // Every worker believes it committed all of its writes...
        assert_eq!(stats.committed, 160);
        // ...but overlapping read/write pairs overwrote each other.
        let final_value = store.read().unwrap().value;
        assert!(final_value < 160, "final value {final_value}");
        assert!(final_value > 0);
    }

    #[test]
    fn test_out_of_range_is_an_error() {
        let store = RelationalRowStore::new("user_counter", 1);
        store.reset(i64::MAX).unwrap();
        let (results, stats) = run_workers(
            StrategyKind::Naive,
            &store,
            2,
            1,
            Duration::ZERO,
            RetryPolicy::default(),
        );
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(Error::BackendUnavailable(_)))));
        assert_eq!(stats.committed, 0);
        assert_eq!(store.read().unwrap().value, i64::MAX);
    }
}
