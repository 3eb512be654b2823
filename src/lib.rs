//! # Contention - Concurrency Control Strategies Under Load
//!
//! A harness that makes W concurrent workers each increment one shared counter
//! M times, once per strategy, and reports how long it took and whether the
//! counter ended at `initial + W*M`. The counter lives in a storage backend;
//! the harness itself keeps no copy of it, so every strategy is only as
//! correct as the backend operations it uses.
//!
//! ## The Problem
//!
//! `v = read(); write(v + 1)` from several workers is a race: two workers read
//! the same `v` and one increment is lost. The five strategies below show the
//! ways out, each trading throughput for a different kind of isolation.
//!
//! | Strategy | Backend operations | Ends at `W*M`? |
//! |----------|--------------------|----------------|
//! | naive read-modify-write | read, blind write | no, updates are lost |
//! | atomic expression update | `value = value + 1` in one statement | yes |
//! | pessimistic locking | lock, read, blind write, unlock | yes |
//! | optimistic concurrency control | read, compare-and-swap with retry | yes |
//! | native atomic counter | the store's own counter object | yes |
//!
//! ## Backends
//!
//! In-process stores with the consistency semantics of a relational row, a
//! distributed map, a graph node and a replicated document. Each declares the
//! operations it supports; a strategy needing a missing one is refused before
//! the run starts. See [`backend`].
//!
//! ## Quick Start
//!
//! ```rust
//! use contention::backend::RelationalRowStore;
//! use contention::config::HarnessConfig;
//! use contention::harness::Harness;
//! use contention::strategy::StrategyKind;
//!
//! let config = HarnessConfig::default().with_workers(4).with_iterations(250);
//! let mut harness = Harness::new(Box::new(RelationalRowStore::new("user_counter", 1)), config);
//!
//! for report in harness.run_all(&StrategyKind::ALL) {
//!     println!("{report}");
//!     if report.strategy.is_atomic() {
//!         assert!(report.is_exact());
//!     }
//! }
//! ```
//!
//! ## Measurement
//!
//! Per-run statistics (commits, CAS attempts and conflicts, lock acquisitions)
//! are kept in sharded, cache-padded tallies so that counting does not add a
//! contended cache line of its own. See [`stats`].
//!
//! ## Reporters
//!
//! Every run is logged as one structured `tracing` event. Optional reporters
//! render a set of runs at the end:
//!
//! | Feature | Module | Description |
//! |---------|--------|-------------|
//! | `table` | [`reporters::table`] | Side-by-side comparison table |
//! | `json` | [`reporters::json`] | Serialize reports to JSON |
//! | `full` | All reporters | Enables both |
//! | `cli` | `contention` binary | Command-line tool with logging to stdout and a file |

pub mod backend;
pub mod config;
pub mod error;
pub mod harness;
pub mod report;
pub mod reporters;
pub mod stats;
pub mod strategy;

#[cfg(feature = "cli")]
pub mod logging;

pub use error::{Error, ErrorKind, Result};
