//! # redts
//!
//! Remote-storage adapter that persists monitoring samples in a Redis
//! time-series store and answers range queries from it.
//!
//! redts plugs into a monitoring system's storage interface: writers append
//! labelled samples through an appender, a background sender pipelines them
//! to the store, and readers run label-filtered range queries.
//!
//! ## Key Properties
//!
//! - Deterministic series keys derived from label sets
//! - Samples batched per transaction and pipelined in one round trip
//! - Commit never blocks a writer: a full queue sheds the batch
//! - Direct or sentinel-discovered addressing, with failover on reconnect
//! - Separate write and read connection pools
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use redts::{Labels, Matcher, Storage};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let Some(storage) = Storage::open(Some("redis://localhost:6379"))? else {
//!     return Ok(());
//! };
//!
//! // Write
//! let mut app = storage.appender()?;
//! let labels = Labels::from_pairs([("__name__", "cpu"), ("host", "web1")]);
//! let cpu = app.add(&labels, 1_700_000_000_000, 0.5)?;
//! app.add_fast(cpu, 1_700_000_001_000, 0.7)?;
//! app.commit()?;
//!
//! // Read
//! let mut set = storage
//!     .querier()
//!     .select(0, i64::MAX, &[Matcher::equal("host", "web1")])?;
//! while set.next() {
//!     let series = set.at();
//!     let mut it = series.iter();
//!     while it.next() {
//!         let sample = it.at();
//!         println!("{} {} {}", series.labels(), sample.timestamp, sample.value);
//!     }
//! }
//!
//! storage.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Storage`]: Top-level handle; owns the pools, queue and sender
//! - [`StoreAppender`]: Per-transaction write batch
//! - [`StoreQuerier`]: Range queries over the read pool
//! - [`SeriesSet`]: Query results with seekable sample cursors
//!
//! ## Modules
//!
//! - [`labels`]: Labels, label sets and matchers
//! - [`key`]: Series key and reference derivation
//! - [`resp`]: Command encoding and reply primitives
//! - [`decode`]: Range-query reply decoding
//! - [`series`]: Query result types and cursors
//! - [`cache`]: Series reference cache
//! - [`appender`]: Write batching
//! - [`sender`]: Background batch sender
//! - [`pool`]: Connection pools and primary discovery
//! - [`querier`]: Range queries
//! - [`plugin`]: Storage-plugin traits of the host
//! - [`storage`]: Storage lifecycle
//! - [`config`]: Connection URL and tuning
//! - [`error`]: Error types

pub mod appender;
pub mod cache;
pub mod config;
pub mod decode;
pub mod error;
pub mod key;
pub mod labels;
pub mod plugin;
pub mod pool;
pub mod querier;
pub mod resp;
pub mod sender;
pub mod series;
pub mod storage;

// Re-export primary API types at crate root for convenience.
pub use appender::StoreAppender;
pub use cache::RefCache;
pub use config::{Addressing, StorageConfig};
pub use error::{RedtsError, Result};
pub use labels::{Label, Labels, MatchType, Matcher};
pub use pool::{Pool, StoreClient};
pub use querier::StoreQuerier;
pub use sender::SendStatsSnapshot;
pub use series::{Sample, SeriesIterator, SeriesResult, SeriesSet};
pub use storage::Storage;
