//! Per-run tallies updated by workers without adding contention of their own.
//!
//! The harness measures how a backend behaves when many workers hammer one
//! counter. Its own bookkeeping (how many increments were committed, how many
//! compare-and-swap attempts lost the race, how many locks were granted) must
//! not turn into a second contended resource, so every [`Tally`] is sharded:
//!
//! 1. A global atomic counter (`NEXT_SLOT_ID`) assigns sequential IDs to threads
//! 2. Each thread stores its assigned slot index in thread-local storage
//! 3. The slot index is used modulo `NUM_SLOTS` (64) to select a shard
//! 4. Each shard is cache-line padded to prevent false sharing
//!
//! ```text
//!                          ┌─────────────────────────────────────┐
//!                          │               Tally                 │
//!                          ├─────────────────────────────────────┤
//!   worker-0 ──add──►      │ [Slot 0] ████████ (CachePadded)     │
//!   worker-1 ──add──►      │ [Slot 1] ████████ (CachePadded)     │
//!        ...               │    ...                              │
//!   worker-63 ─add──►      │ [Slot 63] ███████ (CachePadded)     │
//!                          └─────────────────────────────────────┘
//!                                          │
//!                                          ▼
//!                                   get() sums all
//!                                   slots after join
//! ```
//!
//! Tallies are read once, after every worker has been joined, so relaxed
//! ordering is enough: the join itself provides the happens-before edge.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

/// Number of shards per tally.
pub(crate) const NUM_SLOTS: usize = 64;

static NEXT_SLOT_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Slot index of the current thread, assigned lazily and stable for the
    /// thread's lifetime.
    static THREAD_SLOT_INDEX: usize = next_slot_id();
}

fn next_slot_id() -> usize {
    NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed) % NUM_SLOTS
}

/// A sharded, monotonically increasing event count.
///
/// # Examples
///
/// ```rust
/// use contention::stats::Tally;
/// use std::thread;
///
/// let tally = Tally::new();
/// thread::scope(|s| {
///     for _ in 0..4 {
///         s.spawn(|| {
///             for _ in 0..100 {
///                 tally.incr();
///             }
///         });
///     }
/// });
/// assert_eq!(tally.get(), 400);
/// ```
pub struct Tally {
    slots: [CachePadded<AtomicU64>; NUM_SLOTS],
}

impl Tally {
    /// Creates a tally at zero.
    pub const fn new() -> Self {
        const ZERO: CachePadded<AtomicU64> = CachePadded::new(AtomicU64::new(0));
        Tally {
            slots: [ZERO; NUM_SLOTS],
        }
    }

    #[inline]
    fn local(&self) -> &AtomicU64 {
        THREAD_SLOT_INDEX.with(|idx| &self.slots[*idx])
    }

    /// Adds `n` to the current thread's shard.
    #[inline]
    pub fn add(&self, n: u64) {
        self.local().fetch_add(n, Ordering::Relaxed);
    }

    /// Adds one to the current thread's shard.
    #[inline]
    pub fn incr(&self) {
        self.add(1);
    }

    /// Sums all shards.
    pub fn get(&self) -> u64 {
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .sum()
    }
}

impl Default for Tally {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Tally {
    /// Shows the non-zero shards: `{ [slot]:value ... }`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, slot) in self.slots.iter().enumerate() {
            let val = slot.load(Ordering::Relaxed);
            if val != 0 {
                write!(f, " [{i}]:{val}")?;
            }
        }
        write!(f, " }}")
    }
}

/// Tallies collected during one strategy run.
///
/// A fresh `RunStats` is created for every run; nothing carries over.
#[derive(Debug, Default)]
pub struct RunStats {
    /// Increments the backend confirmed.
    pub committed: Tally,
    /// Compare-and-swap calls issued (optimistic strategy only).
    pub cas_attempts: Tally,
    /// Compare-and-swap calls that lost the race.
    pub cas_conflicts: Tally,
    /// Locks granted (pessimistic strategy only).
    pub lock_acquisitions: Tally,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregates every tally.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            committed: self.committed.get(),
            cas_attempts: self.cas_attempts.get(),
            cas_conflicts: self.cas_conflicts.get(),
            lock_acquisitions: self.lock_acquisitions.get(),
        }
    }
}

/// Plain copy of [`RunStats`] taken after the workers joined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatsSnapshot {
    pub committed: u64,
    pub cas_attempts: u64,
    pub cas_conflicts: u64,
    pub lock_acquisitions: u64,
}

impl StatsSnapshot {
    /// Conflicts per successful compare-and-swap, or `0.0` when nothing was
    /// committed.
    pub fn conflict_ratio(&self) -> f64 {
        if self.committed == 0 {
            0.0
        } else {
            self.cas_conflicts as f64 / self.committed as f64
        }
    }
}
