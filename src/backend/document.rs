//! Document store replica set.
//!
//! Models one document `{name: …, likes: n}` in a collection replicated across
//! a primary and its secondaries. Writes go to the primary:
//!
//! - `blind_write` is `update_one({name}, {$set: {likes: v}})`
//! - `atomic_increment` is `find_one_and_update({name}, {$inc: {likes: 1}})`
//!
//! The [`WriteConcern`] decides when a write is acknowledged: `W1` returns once
//! the primary applied it, `Majority` once a majority of members did. With
//! `W1` the secondaries are left behind until a majority write or an explicit
//! [`DocumentStore::catch_up`].

use std::fmt::{self, Debug, Display};
use std::str::FromStr;

use parking_lot::Mutex;
use tracing::debug;

use crate::backend::{
    checked_increment, BackendKind, Lifecycle, Operation, SharedCounter, StorageBackend,
};
use crate::config::ConfigError;
use crate::error::{Error, Result};

/// Acknowledgement level for writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WriteConcern {
    /// Acknowledged by the primary alone.
    #[default]
    W1,
    /// Acknowledged by a majority of replica-set members.
    Majority,
}

impl WriteConcern {
    /// Members that must apply a write before it is acknowledged.
    pub const fn required_acks(&self, members: usize) -> usize {
        match self {
            WriteConcern::W1 => 1,
            WriteConcern::Majority => members / 2 + 1,
        }
    }
}

impl Display for WriteConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteConcern::W1 => f.write_str("1"),
            WriteConcern::Majority => f.write_str("majority"),
        }
    }
}

impl FromStr for WriteConcern {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "w1" => Ok(WriteConcern::W1),
            "majority" => Ok(WriteConcern::Majority),
            other => Err(ConfigError::InvalidValue {
                key: "write_concern".to_string(),
                value: other.to_string(),
                reason: "expected `1` or `majority`".to_string(),
            }),
        }
    }
}

/// One member's copy of the document, tagged with the op-log position that
/// produced it.
#[derive(Debug, Clone, Copy, Default)]
struct Replica {
    likes: Option<i64>,
    optime: u64,
}

impl Replica {
    fn apply(&mut self, likes: i64, optime: u64) {
        if optime > self.optime {
            self.likes = Some(likes);
            self.optime = optime;
        }
    }
}

/// An in-process replica set holding the contended document.
///
/// # Examples
///
/// ```rust
/// use contention::backend::{DocumentStore, StorageBackend, WriteConcern};
///
/// let docs = DocumentStore::new("grades", "lidiya", 3).with_write_concern(WriteConcern::Majority);
/// docs.reset(0).unwrap();
/// docs.atomic_increment().unwrap();
///
/// assert_eq!(docs.read().unwrap().value, 1);
/// assert_eq!(docs.replica_values().iter().filter(|v| **v == Some(1)).count(), 2);
/// ```
pub struct DocumentStore {
    collection: String,
    name: String,
    write_concern: WriteConcern,
    primary: Mutex<Replica>,
    secondaries: Vec<Mutex<Replica>>,
    lifecycle: Lifecycle,
}

impl DocumentStore {
    /// Creates a replica set of `members` nodes (at least one, the primary).
    pub fn new(collection: impl Into<String>, name: impl Into<String>, members: usize) -> Self {
        let secondaries = (1..members.max(1))
            .map(|_| Mutex::new(Replica::default()))
            .collect();
        Self {
            collection: collection.into(),
            name: name.into(),
            write_concern: WriteConcern::default(),
            primary: Mutex::new(Replica::default()),
            secondaries,
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn with_write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.write_concern = write_concern;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn members(&self) -> usize {
        self.secondaries.len() + 1
    }

    /// The document's `likes` on every member, primary first.
    pub fn replica_values(&self) -> Vec<Option<i64>> {
        std::iter::once(&self.primary)
            .chain(self.secondaries.iter())
            .map(|member| member.lock().likes)
            .collect()
    }

    /// Brings every secondary up to the primary's op-log position.
    pub fn catch_up(&self) {
        let primary = *self.primary.lock();
        if let Some(likes) = primary.likes {
            for secondary in &self.secondaries {
                secondary.lock().apply(likes, primary.optime);
            }
        }
    }

    fn open(&self) -> Result<()> {
        self.lifecycle.ensure_open(BackendKind::Document)
    }

    /// Applies `update` on the primary, then replicates it as far as the
    /// write concern requires before acknowledging.
    fn write(&self, update: impl FnOnce(Option<i64>) -> Result<i64>) -> Result<()> {
        self.open()?;
        let (likes, optime) = {
            let mut primary = self.primary.lock();
            let likes = update(primary.likes)?;
            let optime = primary.optime + 1;
            primary.likes = Some(likes);
            primary.optime = optime;
            (likes, optime)
        };
        let acks = self.write_concern.required_acks(self.members());
        for secondary in self.secondaries.iter().take(acks.saturating_sub(1)) {
            secondary.lock().apply(likes, optime);
        }
        Ok(())
    }
}

impl StorageBackend for DocumentStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    fn supports(&self, op: Operation) -> bool {
        matches!(
            op,
            Operation::Reset | Operation::Read | Operation::BlindWrite | Operation::AtomicIncrement
        )
    }

    /// Upserts the document with `likes = initial` on every member.
    fn reset(&self, initial: i64) -> Result<()> {
        self.open()?;
        let optime = {
            let mut primary = self.primary.lock();
            if primary.likes.is_none() {
                debug!(collection = %self.collection, name = %self.name, "New record inserted");
            }
            primary.likes = Some(initial);
            primary.optime += 1;
            primary.optime
        };
        for secondary in &self.secondaries {
            secondary.lock().apply(initial, optime);
        }
        Ok(())
    }

    fn read(&self) -> Result<SharedCounter> {
        self.open()?;
        let likes = self.primary.lock().likes.unwrap_or_default();
        Ok(SharedCounter::new(likes, 0))
    }

    fn blind_write(&self, value: i64) -> Result<()> {
        self.write(|_| Ok(value))
    }

    fn atomic_increment(&self) -> Result<()> {
        let name = &self.name;
        self.write(|likes| match likes {
            Some(n) => checked_increment(n),
            None => Err(Error::BackendUnavailable(format!(
                "no document matches {{name: {name:?}}}"
            ))),
        })
    }

    fn write_concern(&self) -> Option<WriteConcern> {
        Some(self.write_concern)
    }

    fn close(&self) -> Result<()> {
        self.lifecycle.close();
        Ok(())
    }
}

impl Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStore")
            .field("collection", &self.collection)
            .field("name", &self.name)
            .field("write_concern", &self.write_concern)
            .field("replicas", &self.replica_values())
            .finish()
    }
}
