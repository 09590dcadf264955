//! Error types for the index engine
//!
//! Everything that can fail while opening, building or querying an index.

use thiserror::Error;

/// Errors that can occur while indexing or querying a trace log
#[derive(Error, Debug)]
pub enum IndexError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite store failed
    #[error("Store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The upstream log reader failed to produce a record
    #[error("Reader error: {0}")]
    Reader(String),

    /// Persisted data could not be decoded (bad varint, short blob, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),

    /// The index has been closed and no longer owns a store
    #[error("Index is closed")]
    Closed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;
