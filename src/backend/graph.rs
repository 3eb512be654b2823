//! Graph node store.
//!
//! Models a single `(:Item {name: …})` node whose `likes` property is the
//! counter. Writes run as write transactions that take the node's write lock
//! for their whole duration, so `SET i.likes = i.likes + 1` is indivisible.
//! The store has no explicit locking API and no version stamp: reads always
//! report version 0.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::backend::{
    checked_increment, BackendKind, Lifecycle, Operation, SharedCounter, StorageBackend,
};
use crate::error::{Error, Result};

const COUNTER_PROPERTY: &str = "likes";

#[derive(Debug, Clone, Default)]
struct Node {
    properties: BTreeMap<String, i64>,
}

/// An in-process graph holding the contended node.
///
/// # Examples
///
/// ```rust
/// use contention::backend::{GraphNodeStore, StorageBackend};
///
/// let graph = GraphNodeStore::new("Item", "LG43");
/// graph.reset(0).unwrap();
/// graph.atomic_increment().unwrap();
/// assert_eq!(graph.read().unwrap().value, 1);
/// ```
pub struct GraphNodeStore {
    label: String,
    name: String,
    node: RwLock<Node>,
    committed_transactions: AtomicU64,
    lifecycle: Lifecycle,
}

impl GraphNodeStore {
    pub fn new(label: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            name: name.into(),
            node: RwLock::new(Node::default()),
            committed_transactions: AtomicU64::new(0),
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write transactions committed since construction.
    pub fn committed_transactions(&self) -> u64 {
        self.committed_transactions.load(Ordering::Relaxed)
    }

    fn open(&self) -> Result<()> {
        self.lifecycle.ensure_open(BackendKind::Graph)
    }

    /// Runs `f` as one write transaction against the node.
    fn execute_write<T>(&self, f: impl FnOnce(&mut Node) -> Result<T>) -> Result<T> {
        self.open()?;
        let mut node = self.node.write();
        let out = f(&mut node)?;
        self.committed_transactions.fetch_add(1, Ordering::Relaxed);
        Ok(out)
    }
}

impl StorageBackend for GraphNodeStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Graph
    }

    fn supports(&self, op: Operation) -> bool {
        matches!(
            op,
            Operation::Reset | Operation::Read | Operation::BlindWrite | Operation::AtomicIncrement
        )
    }

    fn reset(&self, initial: i64) -> Result<()> {
        self.execute_write(|node| {
            node.properties.insert(COUNTER_PROPERTY.to_string(), initial);
            Ok(())
        })
    }

    fn read(&self) -> Result<SharedCounter> {
        self.open()?;
        let node = self.node.read();
        Ok(SharedCounter::new(
            node.properties.get(COUNTER_PROPERTY).copied().unwrap_or_default(),
            0,
        ))
    }

    fn blind_write(&self, value: i64) -> Result<()> {
        self.execute_write(|node| {
            node.properties.insert(COUNTER_PROPERTY.to_string(), value);
            Ok(())
        })
    }

    fn atomic_increment(&self) -> Result<()> {
        let name = &self.name;
        self.execute_write(|node| match node.properties.get_mut(COUNTER_PROPERTY) {
            Some(likes) => {
                *likes = checked_increment(*likes)?;
                Ok(())
            }
            None => Err(Error::BackendUnavailable(format!(
                "node `{name}` has no `{COUNTER_PROPERTY}` property"
            ))),
        })
    }

    fn close(&self) -> Result<()> {
        self.lifecycle.close();
        Ok(())
    }
}

impl Debug for GraphNodeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(:{} {{name: {:?}", self.label, self.name)?;
        for (key, value) in self.node.read().properties.iter() {
            write!(f, ", {key}: {value}")?;
        }
        write!(f, "}})")
    }
}
