//! Upstream log reader interface
//!
//! The index never decodes capture files itself. It walks the log through a
//! [`LogReader`], addressing records by their byte offset so that the indexer
//! thread and query-time replay can share one reader without a cursor.

use crate::error::{IndexError, IndexResult};
use crate::trace::transfer::Transfer;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Source of transfer records for one trace log
pub trait LogReader: Send + Sync {
    /// Decode the record starting at `offset`, or `None` at end of log
    fn read(&self, offset: u64) -> IndexResult<Option<Transfer>>;

    /// Offset of the record after the one at `offset`, or `None` if it is the last
    fn next(&self, offset: u64) -> IndexResult<Option<u64>>;

    /// Offset of the record before the one at `offset`, or `None` at the start
    fn prev(&self, offset: u64) -> IndexResult<Option<u64>>;

    /// Start offset of the record containing byte `offset`
    fn seek(&self, offset: u64) -> IndexResult<u64>;

    /// Path of the underlying log file
    fn file_name(&self) -> &Path;

    /// Size of the traced address space in bytes
    fn mem_size(&self) -> u64;

    /// Total length of the log in bytes
    fn log_size(&self) -> u64;

    /// Last modification time of the log file
    fn modified(&self) -> IndexResult<SystemTime> {
        Ok(std::fs::metadata(self.file_name())?.modified()?)
    }
}

/// Fixed per-record framing overhead used by [`MemoryLogReader`]
pub const MEMORY_RECORD_HEADER: u32 = 16;

/// A [`LogReader`] over transfers held in memory
///
/// Records are laid out back to back; each occupies
/// [`MEMORY_RECORD_HEADER`] bytes plus its payload.
#[derive(Debug, Clone)]
pub struct MemoryLogReader {
    path: PathBuf,
    mem_size: u64,
    modified: Option<SystemTime>,
    transfers: Vec<Transfer>,
    log_size: u64,
}

impl MemoryLogReader {
    pub fn new(path: impl Into<PathBuf>, mem_size: u64) -> Self {
        Self {
            path: path.into(),
            mem_size,
            modified: None,
            transfers: Vec::new(),
            log_size: 0,
        }
    }

    /// Builder method: report a fixed modification time instead of the file's
    pub fn modified_at(mut self, time: SystemTime) -> Self {
        self.modified = Some(time);
        self
    }

    /// Append a transfer, assigning its log offset and record length
    pub fn push(&mut self, transfer: Transfer) {
        let record_len = MEMORY_RECORD_HEADER + transfer.data.len() as u32;
        let transfer = transfer.at(self.log_size, record_len);
        self.log_size = transfer.end_offset();
        self.transfers.push(transfer);
    }

    /// Builder method: append many transfers
    pub fn with_transfers(mut self, transfers: impl IntoIterator<Item = Transfer>) -> Self {
        for transfer in transfers {
            self.push(transfer);
        }
        self
    }

    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    /// Index of the record containing byte `offset`
    fn position(&self, offset: u64) -> Option<usize> {
        if offset >= self.log_size {
            return None;
        }
        match self.transfers.binary_search_by_key(&offset, |t| t.offset) {
            Ok(idx) => Some(idx),
            Err(idx) => Some(idx - 1),
        }
    }

    /// Index of the record starting exactly at `offset`
    fn exact(&self, offset: u64) -> IndexResult<Option<usize>> {
        if offset >= self.log_size {
            return Ok(None);
        }
        self.transfers
            .binary_search_by_key(&offset, |t| t.offset)
            .map(Some)
            .map_err(|_| IndexError::Reader(format!("no record starts at offset {}", offset)))
    }
}

impl LogReader for MemoryLogReader {
    fn read(&self, offset: u64) -> IndexResult<Option<Transfer>> {
        Ok(self.exact(offset)?.map(|idx| self.transfers[idx].clone()))
    }

    fn next(&self, offset: u64) -> IndexResult<Option<u64>> {
        Ok(self
            .exact(offset)?
            .and_then(|idx| self.transfers.get(idx + 1))
            .map(|t| t.offset))
    }

    fn prev(&self, offset: u64) -> IndexResult<Option<u64>> {
        // The end of the log is a valid position to step back from
        let idx = if offset == self.log_size {
            self.transfers.len()
        } else {
            match self.exact(offset)? {
                Some(idx) => idx,
                None => return Ok(None),
            }
        };
        Ok(idx
            .checked_sub(1)
            .and_then(|i| self.transfers.get(i))
            .map(|t| t.offset))
    }

    fn seek(&self, offset: u64) -> IndexResult<u64> {
        Ok(self
            .position(offset)
            .map(|idx| self.transfers[idx].offset)
            .unwrap_or(self.log_size))
    }

    fn file_name(&self) -> &Path {
        &self.path
    }

    fn mem_size(&self) -> u64 {
        self.mem_size
    }

    fn log_size(&self) -> u64 {
        self.log_size
    }

    fn modified(&self) -> IndexResult<SystemTime> {
        match self.modified {
            Some(time) => Ok(time),
            None => Ok(std::fs::metadata(&self.path)?.modified()?),
        }
    }
}
