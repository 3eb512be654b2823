//! Exclusive, owner-tracked lock used for row locks and map key locks.
//!
//! The owner is the calling thread, which is what both a SQL session holding
//! `SELECT … FOR UPDATE` and an IMDG key lock bind to. Holding the lock also
//! makes every other thread's *write* wait, so a blind write issued by a
//! worker that skipped the lock still serializes behind the holder.

use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

#[derive(Debug)]
pub(crate) struct KeyLock {
    key: String,
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
    wait_ceiling: Option<Duration>,
}

impl KeyLock {
    pub(crate) fn new(key: impl Into<String>, wait_ceiling: Option<Duration>) -> Self {
        Self {
            key: key.into(),
            owner: Mutex::new(None),
            released: Condvar::new(),
            wait_ceiling,
        }
    }

    pub(crate) fn set_wait_ceiling(&mut self, ceiling: Option<Duration>) {
        self.wait_ceiling = ceiling;
    }

    /// Blocks until the calling thread owns the lock.
    ///
    /// Returns `true` when the lock was newly acquired and `false` when the
    /// caller already held it.
    pub(crate) fn acquire(&self) -> Result<bool> {
        let me = thread::current().id();
        let deadline = self.wait_ceiling.map(|ceiling| Instant::now() + ceiling);
        let mut owner = self.owner.lock();
        loop {
            match *owner {
                None => {
                    *owner = Some(me);
                    return Ok(true);
                }
                Some(holder) if holder == me => return Ok(false),
                Some(_) => match deadline {
                    None => self.released.wait(&mut owner),
                    Some(deadline) => {
                        let timed_out = self.released.wait_until(&mut owner, deadline).timed_out();
                        if timed_out && (*owner).is_some_and(|holder| holder != me) {
                            return Err(Error::BackendUnavailable(format!(
                                "lock wait on `{}` exceeded {:?}",
                                self.key,
                                self.wait_ceiling.unwrap_or_default()
                            )));
                        }
                    }
                },
            }
        }
    }

    /// Releases the lock if the calling thread holds it.
    ///
    /// Releasing a free lock is a no-op; releasing someone else's lock fails.
    pub(crate) fn release(&self) -> Result<()> {
        let me = thread::current().id();
        let mut owner = self.owner.lock();
        match *owner {
            None => Ok(()),
            Some(holder) if holder == me => {
                *owner = None;
                drop(owner);
                self.released.notify_one();
                Ok(())
            }
            Some(_) => Err(Error::LockNotHeld {
                key: self.key.clone(),
            }),
        }
    }

    /// Takes the lock for the duration of a single statement unless the caller
    /// already holds it explicitly.
    pub(crate) fn statement(&self) -> Result<StatementLock<'_>> {
        let acquired = self.acquire()?;
        Ok(StatementLock {
            lock: self,
            acquired,
        })
    }

    /// Forcibly drops any owner; used by reset, which runs single-threaded.
    pub(crate) fn clear(&self) {
        *self.owner.lock() = None;
        self.released.notify_all();
    }
}

/// Lock held for one write statement; released on drop if it was taken here.
pub(crate) struct StatementLock<'a> {
    lock: &'a KeyLock,
    acquired: bool,
}

impl Drop for StatementLock<'_> {
    fn drop(&mut self) {
        if self.acquired {
            // The current thread owns it, so release cannot fail.
            let _ = self.lock.release();
        }
    }
}
