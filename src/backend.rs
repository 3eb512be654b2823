//! Storage backends: the capability interface and its implementations.
//!
//! A backend exposes exactly one contended counter (a row, a map key, a graph
//! node property, a document field) plus, where the store has one, a dedicated
//! atomic counter object. Strategies only ever touch the counter through
//! [`StorageBackend`]; nothing is cached in-process between calls.
//!
//! # Available Backends
//!
//! | Backend | Module | Models | Supports |
//! |---------|--------|--------|----------|
//! | [`RelationalRowStore`] | [`relational`] | SQL row, `SELECT … FOR UPDATE`, versioned `UPDATE` | read, blind write, atomic increment, lock, CAS |
//! | [`DistributedMapStore`] | [`map`] | IMDG map key lock, `replace_if_same`, CP atomic long | read, blind write, lock, CAS, native counter |
//! | [`GraphNodeStore`] | [`graph`] | node property in a write transaction | read, blind write, atomic increment |
//! | [`DocumentStore`] | [`document`] | replica set, `$set` / `$inc` with write concern | read, blind write, atomic increment |
//!
//! [`FaultInjector`] wraps any backend and trips a fault at a chosen operation,
//! which is how the abort and cancellation paths are exercised.
//!
//! # Lifecycle
//!
//! Backends are constructed explicitly (see [`connect`]), handed to the
//! harness, and closed with [`StorageBackend::close`]. Every call after close
//! fails with [`Error::BackendUnavailable`].

pub mod document;
pub mod fault;
pub mod graph;
pub mod map;
pub mod relational;

mod lock;

use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::config::{BackendConfig, ConfigError};
use crate::error::{Error, Result};

pub use document::{DocumentStore, WriteConcern};
pub use fault::{Fault, FaultInjector};
pub use graph::GraphNodeStore;
pub use map::DistributedMapStore;
pub use relational::RelationalRowStore;

/// The contended resource: a value and its optimistic version stamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SharedCounter {
    pub value: i64,
    pub version: u64,
}

impl SharedCounter {
    pub const fn new(value: i64, version: u64) -> Self {
        Self { value, version }
    }

    /// The state a successful optimistic increment moves to.
    ///
    /// Fails like the store would when the value is already `i64::MAX`.
    pub fn incremented(self) -> Result<Self> {
        Ok(Self {
            value: checked_increment(self.value)?,
            version: self.version.wrapping_add(1),
        })
    }
}

/// `value + 1`, or the out-of-range error a store raises for a 64-bit
/// counter that is already at its maximum.
pub fn checked_increment(value: i64) -> Result<i64> {
    value.checked_add(1).ok_or_else(|| out_of_range(value))
}

pub(crate) fn out_of_range(value: i64) -> Error {
    Error::BackendUnavailable(format!("integer out of range: {value} + 1"))
}

impl Display for SharedCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (v{})", self.value, self.version)
    }
}

/// Operations a backend may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Operation {
    Reset,
    Read,
    BlindWrite,
    AtomicIncrement,
    Lock,
    CompareAndSwap,
    NativeCounter,
}

impl Operation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Operation::Reset => "reset",
            Operation::Read => "read",
            Operation::BlindWrite => "blind_write",
            Operation::AtomicIncrement => "atomic_increment",
            Operation::Lock => "lock",
            Operation::CompareAndSwap => "compare_and_swap",
            Operation::NativeCounter => "native_counter",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The family of store a backend models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BackendKind {
    #[default]
    Relational,
    Map,
    Graph,
    Document,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Relational,
        BackendKind::Map,
        BackendKind::Graph,
        BackendKind::Document,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Relational => "relational",
            BackendKind::Map => "map",
            BackendKind::Graph => "graph",
            BackendKind::Document => "document",
        }
    }

    /// Port the store listens on when none is configured.
    pub const fn default_port(&self) -> u16 {
        match self {
            BackendKind::Relational => 5432,
            BackendKind::Map => 5701,
            BackendKind::Graph => 7687,
            BackendKind::Document => 27017,
        }
    }

    /// Database, map or collection name used when none is configured.
    pub const fn default_database(&self) -> &'static str {
        match self {
            BackendKind::Relational => "postgres",
            BackendKind::Map => "counters",
            BackendKind::Graph => "neo4j",
            BackendKind::Document => "test",
        }
    }

    /// Identity of the contended row, key, node or document.
    pub const fn default_counter_key(&self) -> &'static str {
        match self {
            BackendKind::Relational => "1",
            BackendKind::Map => "key",
            BackendKind::Graph => "LG43",
            BackendKind::Document => "lidiya",
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relational" | "sql" | "postgres" => Ok(BackendKind::Relational),
            "map" | "hazelcast" => Ok(BackendKind::Map),
            "graph" | "neo4j" => Ok(BackendKind::Graph),
            "document" | "mongo" | "mongodb" => Ok(BackendKind::Document),
            other => Err(ConfigError::InvalidValue {
                key: "backend".to_string(),
                value: other.to_string(),
                reason: "expected one of relational, map, graph, document".to_string(),
            }),
        }
    }
}

/// The capability interface every store implements.
///
/// Only [`reset`](StorageBackend::reset) and [`read`](StorageBackend::read)
/// are mandatory. The other operations default to [`Error::Unsupported`];
/// a backend overrides the ones it provides and advertises them through
/// [`supports`](StorageBackend::supports).
///
/// All operations may fail with [`Error::BackendUnavailable`] or
/// [`Error::Timeout`].
pub trait StorageBackend: Send + Sync {
    /// Which store family this is.
    fn kind(&self) -> BackendKind;

    /// Returns whether `op` is implemented.
    fn supports(&self, op: Operation) -> bool;

    /// Sets the counter to `{initial, 0}` and the native counter to `initial`.
    ///
    /// Must be visible to every later caller once it returns.
    fn reset(&self, initial: i64) -> Result<()>;

    /// Point-in-time read of the counter.
    fn read(&self) -> Result<SharedCounter>;

    /// Unconditionally overwrites the value. The version is left as is.
    fn blind_write(&self, _value: i64) -> Result<()> {
        Err(unsupported(self.kind(), Operation::BlindWrite))
    }

    /// Increments the value in one indivisible step.
    fn atomic_increment(&self) -> Result<()> {
        Err(unsupported(self.kind(), Operation::AtomicIncrement))
    }

    /// Takes the exclusive lock on the counter, blocking until granted.
    fn lock(&self) -> Result<()> {
        Err(unsupported(self.kind(), Operation::Lock))
    }

    /// Releases the lock taken by [`lock`](StorageBackend::lock).
    fn unlock(&self) -> Result<()> {
        Err(unsupported(self.kind(), Operation::Lock))
    }

    /// Replaces the stored pair with `new` only if it still equals `expected`.
    ///
    /// `Ok(false)` means another writer got there first.
    fn compare_and_swap(&self, _expected: SharedCounter, _new: SharedCounter) -> Result<bool> {
        Err(unsupported(self.kind(), Operation::CompareAndSwap))
    }

    /// Increments the store's dedicated atomic counter, returning the new value.
    fn native_increment(&self) -> Result<i64> {
        Err(unsupported(self.kind(), Operation::NativeCounter))
    }

    /// Reads the store's dedicated atomic counter.
    fn native_read(&self) -> Result<i64> {
        Err(unsupported(self.kind(), Operation::NativeCounter))
    }

    /// Acknowledgement level applied to writes, for stores that have one.
    fn write_concern(&self) -> Option<WriteConcern> {
        None
    }

    /// Ends the handle's lifecycle.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn unsupported(backend: BackendKind, operation: Operation) -> Error {
    Error::Unsupported { backend, operation }
}

/// Open/closed flag shared by the in-process stores.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    closed: AtomicBool,
}

impl Lifecycle {
    pub(crate) fn ensure_open(&self, kind: BackendKind) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::BackendUnavailable(format!(
                "{kind} backend handle is closed"
            )))
        } else {
            Ok(())
        }
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Opens the backend described by `config`.
///
/// Fails with [`Error::Connection`] when the configuration cannot reach a
/// store; the caller is expected to treat that as fatal.
pub fn connect(config: &BackendConfig) -> Result<Box<dyn StorageBackend>> {
    if config.host.trim().is_empty() {
        return Err(Error::Connection(format!("no host configured for {}", config.kind)));
    }
    if config.port == 0 {
        return Err(Error::Connection(format!(
            "invalid port 0 for {} at {}",
            config.kind, config.host
        )));
    }
    if config.database.trim().is_empty() {
        return Err(Error::Connection(format!(
            "no database name configured for {}",
            config.kind
        )));
    }

    let backend: Box<dyn StorageBackend> = match config.kind {
        BackendKind::Relational => {
            let row_id: i64 = config.counter_key.parse().map_err(|_| {
                Error::Connection(format!(
                    "row id `{}` is not an integer",
                    config.counter_key
                ))
            })?;
            Box::new(
                RelationalRowStore::new("user_counter", row_id).with_lock_timeout(config.lock_timeout),
            )
        }
        BackendKind::Map => {
            if config.cluster_members.is_empty() {
                return Err(Error::Connection("no cluster members configured".to_string()));
            }
            if let Some(bad) = config
                .cluster_members
                .iter()
                .find(|member| !is_host_port(member))
            {
                return Err(Error::Connection(format!(
                    "cluster member `{bad}` is not host:port"
                )));
            }
            Box::new(
                DistributedMapStore::new(&config.database, &config.counter_key)
                    .with_lock_timeout(config.lock_timeout),
            )
        }
        BackendKind::Graph => Box::new(GraphNodeStore::new("Item", &config.counter_key)),
        BackendKind::Document => {
            if config.replicas == 0 {
                return Err(Error::Connection("replica set has no members".to_string()));
            }
            Box::new(
                DocumentStore::new(&config.database, &config.counter_key, config.replicas)
                    .with_write_concern(config.write_concern()),
            )
        }
    };

    info!(
        backend = %config.kind,
        host = %config.host,
        port = config.port,
        database = %config.database,
        "Connected to backend"
    );
    Ok(backend)
}

fn is_host_port(member: &str) -> bool {
    match member.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: BackendKind) -> BackendConfig {
        BackendConfig::for_kind(kind)
    }

    #[test]
    fn test_incremented() {
        let s = SharedCounter::new(41, 7).incremented().unwrap();
        assert_eq!(s, SharedCounter::new(42, 8));
    }

    #[test]
    fn test_incremented_out_of_range() {
        let err = SharedCounter::new(i64::MAX, 3).incremented().unwrap_err();
        assert_eq!(err.to_string(), format!("backend unavailable: integer out of range: {} + 1", i64::MAX));
        assert_eq!(checked_increment(-1).unwrap(), 0);
    }

    #[test]
    fn test_shared_counter_display() {
        assert_eq!(SharedCounter::new(3, 2).to_string(), "3 (v2)");
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("MAP".parse::<BackendKind>().unwrap(), BackendKind::Map);
        assert_eq!("neo4j".parse::<BackendKind>().unwrap(), BackendKind::Graph);
        assert_eq!("mongodb".parse::<BackendKind>().unwrap(), BackendKind::Document);
        assert!("redis".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_connect_every_kind() {
        for kind in BackendKind::ALL {
            let backend = connect(&config(kind)).unwrap();
            assert_eq!(backend.kind(), kind);
            assert!(backend.supports(Operation::Reset));
            assert!(backend.supports(Operation::Read));
            backend.reset(0).unwrap();
            assert_eq!(backend.read().unwrap(), SharedCounter::new(0, 0));
        }
    }

    #[test]
    fn test_connect_rejects_bad_config() {
        let mut cfg = config(BackendKind::Relational);
        cfg.port = 0;
        assert!(matches!(connect(&cfg), Err(Error::Connection(_))));

        let mut cfg = config(BackendKind::Relational);
        cfg.counter_key = "abc".to_string();
        assert!(matches!(connect(&cfg), Err(Error::Connection(_))));

        let mut cfg = config(BackendKind::Map);
        cfg.cluster_members.clear();
        assert!(matches!(connect(&cfg), Err(Error::Connection(_))));

        let mut cfg = config(BackendKind::Map);
        cfg.cluster_members = vec!["192.168.1.147".to_string()];
        assert!(matches!(connect(&cfg), Err(Error::Connection(_))));

        let mut cfg = config(BackendKind::Document);
        cfg.replicas = 0;
        assert!(matches!(connect(&cfg), Err(Error::Connection(_))));
    }

    #[test]
    fn test_default_unsupported() {
        let backend = connect(&config(BackendKind::Graph)).unwrap();
        assert!(!backend.supports(Operation::Lock));
        assert!(matches!(
            backend.lock(),
            Err(Error::Unsupported {
                backend: BackendKind::Graph,
                operation: Operation::Lock
            })
        ));
    }

    #[test]
    fn test_closed_backend_is_unavailable() {
        for kind in BackendKind::ALL {
            let backend = connect(&config(kind)).unwrap();
            backend.close().unwrap();
            assert!(matches!(backend.read(), Err(Error::BackendUnavailable(_))));
        }
    }
}
