//! Distributed in-memory map store.
//!
//! Models an IMDG map entry plus a CP-subsystem atomic long:
//!
//! - `read` / `blind_write` are `map.get(key)` / `map.put(key, value)`
//! - `lock` / `unlock` are `map.lock(key)` / `map.unlock(key)`; the lock is
//!   owned by the calling thread and `put` from any other thread waits for it
//! - `compare_and_swap` is `map.replace_if_same(key, old, new)`, comparing the
//!   whole stored entry (value and version)
//! - `native_increment` is `atomic_long.increment_and_get()`
//!
//! Reset clears the map and re-inserts the key, then sets the atomic long.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

use crate::backend::lock::KeyLock;
use crate::backend::{
    out_of_range, BackendKind, Lifecycle, Operation, SharedCounter, StorageBackend,
};
use crate::error::Result;

/// An in-process distributed map holding the contended key.
///
/// # Examples
///
/// ```rust
/// use contention::backend::{DistributedMapStore, StorageBackend};
///
/// let store = DistributedMapStore::new("counters", "key");
/// store.reset(0).unwrap();
///
/// store.lock().unwrap();
/// let current = store.read().unwrap();
/// store.blind_write(current.value + 1).unwrap();
/// store.unlock().unwrap();
///
/// assert_eq!(store.native_increment().unwrap(), 1);
/// assert_eq!(store.read().unwrap().value, 1);
/// ```
pub struct DistributedMapStore {
    map_name: String,
    key: String,
    entries: Mutex<HashMap<String, SharedCounter>>,
    key_lock: KeyLock,
    atomic_long: CachePadded<AtomicI64>,
    lifecycle: Lifecycle,
}

impl DistributedMapStore {
    pub fn new(map_name: impl Into<String>, key: impl Into<String>) -> Self {
        let map_name = map_name.into();
        let key = key.into();
        Self {
            key_lock: KeyLock::new(format!("{map_name}[{key}]"), None),
            map_name,
            key,
            entries: Mutex::new(HashMap::new()),
            atomic_long: CachePadded::new(AtomicI64::new(0)),
            lifecycle: Lifecycle::default(),
        }
    }

    /// Sets how long `lock` and locked `put`s wait. `None` waits forever.
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.key_lock.set_wait_ceiling(timeout);
        self
    }

    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn open(&self) -> Result<()> {
        self.lifecycle.ensure_open(BackendKind::Map)
    }
}

impl StorageBackend for DistributedMapStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Map
    }

    fn supports(&self, op: Operation) -> bool {
        !matches!(op, Operation::AtomicIncrement)
    }

    fn reset(&self, initial: i64) -> Result<()> {
        self.open()?;
        self.key_lock.clear();
        let mut entries = self.entries.lock();
        entries.clear();
        entries
            .entry(self.key.clone())
            .or_insert(SharedCounter::new(initial, 0));
        self.atomic_long.store(initial, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self) -> Result<SharedCounter> {
        self.open()?;
        Ok(self
            .entries
            .lock()
            .get(&self.key)
            .copied()
            .unwrap_or_default())
    }

    fn blind_write(&self, value: i64) -> Result<()> {
        self.open()?;
        let _stmt = self.key_lock.statement()?;
        self.entries
            .lock()
            .entry(self.key.clone())
            .or_default()
            .value = value;
        Ok(())
    }

    fn lock(&self) -> Result<()> {
        self.open()?;
        self.key_lock.acquire().map(|_| ())
    }

    fn unlock(&self) -> Result<()> {
        self.open()?;
        self.key_lock.release()
    }

    fn compare_and_swap(&self, expected: SharedCounter, new: SharedCounter) -> Result<bool> {
        self.open()?;
        let _stmt = self.key_lock.statement()?;
        let mut entries = self.entries.lock();
        match entries.get_mut(&self.key) {
            Some(current) if *current == expected => {
                *current = new;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn native_increment(&self) -> Result<i64> {
        self.open()?;
        self.atomic_long
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map(|previous| previous + 1)
            .map_err(out_of_range)
    }

    fn native_read(&self) -> Result<i64> {
        self.open()?;
        Ok(self.atomic_long.load(Ordering::SeqCst))
    }

    fn close(&self) -> Result<()> {
        self.lifecycle.close();
        Ok(())
    }
}

impl Debug for DistributedMapStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedMapStore")
            .field("map", &self.map_name)
            .field("key", &self.key)
            .field("entry", &self.entries.lock().get(&self.key))
            .field("atomic_long", &self.atomic_long.load(Ordering::Relaxed))
            .finish()
    }
}
