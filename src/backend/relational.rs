//! Relational row store.
//!
//! Models one row of a `user_counter(user_id, counter, version)` table under
//! row-level locking:
//!
//! | Operation | Statement |
//! |-----------|-----------|
//! | `read` | `SELECT counter, version FROM user_counter WHERE user_id = $1` |
//! | `blind_write` | `UPDATE user_counter SET counter = $2 WHERE user_id = $1` |
//! | `atomic_increment` | `UPDATE user_counter SET counter = counter + 1 WHERE user_id = $1` |
//! | `lock` | `SELECT … FOR UPDATE` (held until `unlock`, i.e. commit) |
//! | `compare_and_swap` | `UPDATE … SET counter = $2, version = $3 WHERE user_id = $1 AND counter = $4 AND version = $5` |
//!
//! Every write takes the row lock for the duration of the statement, so a
//! write from another session waits behind an explicit `FOR UPDATE` holder.
//! Reads never wait.

use std::fmt::{self, Debug};
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::lock::KeyLock;
use crate::backend::{
    checked_increment, BackendKind, Lifecycle, Operation, SharedCounter, StorageBackend,
};
use crate::error::Result;

/// An in-process relational table holding the contended row.
///
/// # Examples
///
/// ```rust
/// use contention::backend::{RelationalRowStore, SharedCounter, StorageBackend};
///
/// let store = RelationalRowStore::new("user_counter", 1);
/// store.reset(0).unwrap();
/// store.atomic_increment().unwrap();
///
/// let seen = store.read().unwrap();
/// assert!(store.compare_and_swap(seen, seen.incremented().unwrap()).unwrap());
/// assert_eq!(store.read().unwrap(), SharedCounter::new(2, 1));
/// ```
pub struct RelationalRowStore {
    table: String,
    row_id: i64,
    row: Mutex<SharedCounter>,
    row_lock: KeyLock,
    lifecycle: Lifecycle,
}

impl RelationalRowStore {
    pub fn new(table: impl Into<String>, row_id: i64) -> Self {
        let table = table.into();
        let row_lock = KeyLock::new(format!("{table}.user_id={row_id}"), None);
        Self {
            table,
            row_id,
            row: Mutex::new(SharedCounter::default()),
            row_lock,
            lifecycle: Lifecycle::default(),
        }
    }

    /// Sets the lock-wait ceiling (`lock_timeout`). `None` waits forever.
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.row_lock.set_wait_ceiling(timeout);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn row_id(&self) -> i64 {
        self.row_id
    }

    fn open(&self) -> Result<()> {
        self.lifecycle.ensure_open(BackendKind::Relational)
    }
}

impl StorageBackend for RelationalRowStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn supports(&self, op: Operation) -> bool {
        !matches!(op, Operation::NativeCounter)
    }

    fn reset(&self, initial: i64) -> Result<()> {
        self.open()?;
        self.row_lock.clear();
        *self.row.lock() = SharedCounter::new(initial, 0);
        Ok(())
    }

    fn read(&self) -> Result<SharedCounter> {
        self.open()?;
        Ok(*self.row.lock())
    }

    fn blind_write(&self, value: i64) -> Result<()> {
        self.open()?;
        let _stmt = self.row_lock.statement()?;
        self.row.lock().value = value;
        Ok(())
    }

    fn atomic_increment(&self) -> Result<()> {
        self.open()?;
        let _stmt = self.row_lock.statement()?;
        let mut row = self.row.lock();
        row.value = checked_increment(row.value)?;
        Ok(())
    }

    fn lock(&self) -> Result<()> {
        self.open()?;
        self.row_lock.acquire().map(|_| ())
    }

    fn unlock(&self) -> Result<()> {
        self.open()?;
        self.row_lock.release()
    }

    fn compare_and_swap(&self, expected: SharedCounter, new: SharedCounter) -> Result<bool> {
        self.open()?;
        let _stmt = self.row_lock.statement()?;
        let mut row = self.row.lock();
        if *row == expected {
            *row = new;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn close(&self) -> Result<()> {
        self.lifecycle.close();
        Ok(())
    }
}

impl Debug for RelationalRowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalRowStore")
            .field("table", &self.table)
            .field("row_id", &self.row_id)
            .field("row", &*self.row.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::thread;

    fn store() -> RelationalRowStore {
        let store = RelationalRowStore::new("user_counter", 1);
        store.reset(0).unwrap();
        store
    }

    #[test]
    fn test_reset() {
        let store = store();
        store.atomic_increment().unwrap();
        store.compare_and_swap(SharedCounter::new(1, 0), SharedCounter::new(2, 1)).unwrap();
        store.reset(5).unwrap();
        assert_eq!(store.read().unwrap(), SharedCounter::new(5, 0));
    }

    #[test]
    fn test_blind_write_keeps_version() {
        let store = store();
        store.compare_and_swap(SharedCounter::new(0, 0), SharedCounter::new(1, 1)).unwrap();
        store.blind_write(10).unwrap();
        assert_eq!(store.read().unwrap(), SharedCounter::new(10, 1));
    }

    #[test]
    fn test_failed_cas_changes_nothing() {
        let store = store();
        store.blind_write(3).unwrap();
        let stale = SharedCounter::new(2, 0);
        assert!(!store.compare_and_swap(stale, stale.incremented().unwrap()).unwrap());
        assert_eq!(store.read().unwrap(), SharedCounter::new(3, 0));
    }

    #[test]
    fn test_increment_out_of_range() {
        let store = store();
        store.reset(i64::MAX).unwrap();
        assert!(matches!(
            store.atomic_increment(),
            Err(Error::BackendUnavailable(msg)) if msg.contains("out of range")
        ));
        assert_eq!(store.read().unwrap(), SharedCounter::new(i64::MAX, 0));
        // The statement lock was released with the failed update.
        thread::scope(|s| {
            s.spawn(|| store.blind_write(1).unwrap());
        });
    }

    #[test]
    fn test_atomic_increment_concurrent() {
        let store = store();
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..500 {
                        store.atomic_increment().unwrap();
                    }
                });
            }
        });
        assert_eq!(store.read().unwrap().value, 4000);
    }

    #[test]
    fn test_write_waits_for_row_lock() {
        let store = RelationalRowStore::new("user_counter", 1)
            .with_lock_timeout(Some(Duration::from_millis(20)));
        store.reset(0).unwrap();
        store.lock().unwrap();
        thread::scope(|s| {
            let res = s.spawn(|| store.blind_write(99)).join().unwrap();
            assert!(matches!(res, Err(Error::BackendUnavailable(_))));
        });
        // The holder itself can write.
        store.blind_write(1).unwrap();
        store.unlock().unwrap();
        assert_eq!(store.read().unwrap().value, 1);
    }

    #[test]
    fn test_unlock_by_non_holder() {
        let store = store();
        store.lock().unwrap();
        thread::scope(|s| {
            let res = s.spawn(|| store.unlock()).join().unwrap();
            assert!(matches!(res, Err(Error::LockNotHeld { .. })));
        });
        store.unlock().unwrap();
    }

    #[test]
    fn test_no_native_counter() {
        let store = store();
        assert!(!store.supports(Operation::NativeCounter));
        assert!(matches!(store.native_increment(), Err(Error::Unsupported { .. })));
    }

    #[test]
    fn test_debug() {
        let debug_str = format!("{:?}", store());
        assert!(debug_str.contains("user_counter"));
        assert!(debug_str.contains("row_id: 1"));
    }
}
