//! # Tracedex
//!
//! Indexing and caching engine for memory-bus trace logs. A trace is a long
//! sequence of read and write transfers; Tracedex builds a persisted summary
//! so that "what did memory traffic look like near time T" is answered
//! without replaying the whole log.
//!
//! ## Modules
//!
//! - [`trace`]: transfer records, the [`LogReader`] interface, strata and instants
//! - [`index`]: the SQLite-backed [`LogIndex`], its background indexer and [`Timeline`]
//! - [`cache`]: LRU, lazy (worker-filled) and nearest-time instant caches
//! - [`config`]: TOML configuration with environment overrides
//! - [`logging`]: tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::{Duration, SystemTime};
//! use tracedex::{Config, LogIndex, MemoryLogReader, Transfer};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!
//!     let reader = MemoryLogReader::new("/traces/boot.log", 1 << 20)
//!         .modified_at(SystemTime::now())
//!         .with_transfers([Transfer::write(0x100, vec![0u8; 32], 4), Transfer::read(0x100, 32, 2)]);
//!
//!     let index = LogIndex::open(Arc::new(reader), &config.index)?;
//!     index.wait(Duration::from_secs(5));
//!
//!     let instant = index.get_instant(4, 0)?;
//!     println!("{} bytes written by t=4", instant.writes.total());
//!
//!     index.close();
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod trace;

pub use cache::{CacheMiss, CacheStats, InstantCache, LazyCache, LruCache};
pub use config::{Config, ConfigError, IndexConfig, LoggingConfig, TimelineConfig};
pub use error::{IndexError, IndexResult};
pub use index::{BlockSnapshot, IndexEvent, IndexState, LogIndex, StoreStats, Timeline};
pub use trace::{LogInstant, LogReader, LogStrata, MemoryLogReader, Transfer, TransferType};
