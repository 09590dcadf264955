//! Trace Log Index
//!
//! Builds and queries the persisted summary of one trace log:
//!
//! - **LogIndex**: opens or builds the index and answers point-in-time queries
//! - **Indexer**: the background pass that writes the store
//! - **IndexStore**: SQLite tables (`logInfo`, `strata`, `wblocks`)
//! - **Timeline**: fixed-interval sampling through a lazy cache
//!
//! # Architecture
//!
//! ```text
//! LogReader ─▶ Indexer thread ─▶ strata / wblocks (one transaction per batch)
//!                                      │
//! get_instant(t, d):                   ▼
//!   InstantCache ─▶ nearest stored instant ─▶ replay transfers ─▶ memoize
//! ```

mod indexer;
mod log_index;
mod store;
mod timeline;

pub use log_index::LogIndex;
pub use store::{
    store_path, BlockSnapshot, Fingerprint, IndexStore, LogInfo, StoreStats, TimestepBatch,
};
pub use timeline::Timeline;

/// Lifecycle of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexState {
    /// Created, indexer not started yet
    Idle,
    /// Background pass is reading the log
    Indexing,
    /// Log fully read; building secondary indexes
    Finishing,
    /// Store is complete and immutable
    Complete,
    /// Indexing failed or was cancelled; the store must be rebuilt
    Error,
}

impl IndexState {
    /// True once the state can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(self, IndexState::Complete | IndexState::Error)
    }
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexState::Idle => write!(f, "idle"),
            IndexState::Indexing => write!(f, "indexing"),
            IndexState::Finishing => write!(f, "finishing"),
            IndexState::Complete => write!(f, "complete"),
            IndexState::Error => write!(f, "error"),
        }
    }
}

/// Notification published by a [`LogIndex`] on its event channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndexEvent {
    /// The index moved to a new state
    State(IndexState),
    /// A batch was committed; fraction of the log indexed so far
    Progress(f32),
}
