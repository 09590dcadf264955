//! Background indexing pass
//!
//! One thread per pass streams the log forward from offset 0, keeps a running
//! [`LogInstant`] plus a shadow copy of every written block, and at each
//! timestep boundary stages the dirty blocks and the instant as rows. Staged
//! rows are committed in one transaction whenever the refresh budget has
//! elapsed, so the shared lock is only held while a batch is written.

use crate::error::{IndexError, IndexResult};
use crate::index::store::{BlockSnapshot, Fingerprint, IndexStore, LogInfo, TimestepBatch};
use crate::index::{IndexEvent, IndexState};
use crate::trace::{LogInstant, LogReader, Transfer, TransferType, BLOCK_SIZE, TIMESTEP_SIZE};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// State shared between a [`LogIndex`](crate::index::LogIndex) and its indexer
pub(crate) struct Shared {
    /// `None` once the index is closed
    pub store: Option<IndexStore>,
    pub state: IndexState,
    /// Fraction of the log committed, 0.0 to 1.0
    pub progress: f32,
    /// Time of the latest committed instant
    pub duration: u64,
}

pub(crate) fn lock_shared(shared: &Mutex<Shared>) -> IndexResult<MutexGuard<'_, Shared>> {
    shared
        .lock()
        .map_err(|e| IndexError::Lock(format!("Failed to acquire index lock: {}", e)))
}

/// Owns the indexer thread; stops and joins it when dropped
#[derive(Debug)]
pub(crate) struct IndexerHandle {
    cancel: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl IndexerHandle {
    /// Request cancellation and wait for the thread to exit
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::Release);
        if let Some(handle) = self.join.take() {
            if handle.join().is_err() {
                tracing::error!("Indexer thread panicked");
            }
        }
    }
}

impl Drop for IndexerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Per-block indexer state
struct BlockState {
    dirty: bool,
    first_offset: u64,
    last_offset: u64,
    /// Shadow copy of the block's bytes
    data: Vec<u8>,
}

impl BlockState {
    fn new() -> Self {
        Self {
            dirty: false,
            first_offset: 0,
            last_offset: 0,
            data: vec![0; BLOCK_SIZE as usize],
        }
    }
}

/// One indexing pass over a log
pub(crate) struct Indexer {
    reader: Arc<dyn LogReader>,
    shared: Arc<Mutex<Shared>>,
    events: broadcast::Sender<IndexEvent>,
    cancel: Arc<AtomicBool>,
    fingerprint: Fingerprint,
    commit_interval: Duration,

    instant: LogInstant,
    blocks: HashMap<u64, BlockState>,
    /// Blocks written since the last flush
    dirty: Vec<u64>,
    batch: TimestepBatch,
    last_stored_time: Option<u64>,
    error_records: u64,
}

impl Indexer {
    pub fn new(
        reader: Arc<dyn LogReader>,
        shared: Arc<Mutex<Shared>>,
        events: broadcast::Sender<IndexEvent>,
        fingerprint: Fingerprint,
        commit_interval: Duration,
        strata: usize,
    ) -> Self {
        Self {
            reader,
            shared,
            events,
            cancel: Arc::new(AtomicBool::new(false)),
            fingerprint,
            commit_interval,
            instant: LogInstant::new(strata),
            blocks: HashMap::new(),
            dirty: Vec::new(),
            batch: TimestepBatch::default(),
            last_stored_time: None,
            error_records: 0,
        }
    }

    /// Start the pass on its own thread
    pub fn spawn(self) -> IndexResult<IndexerHandle> {
        let cancel = Arc::clone(&self.cancel);
        let join = std::thread::Builder::new()
            .name("log-indexer".to_string())
            .spawn(move || self.run())?;

        Ok(IndexerHandle {
            cancel,
            join: Some(join),
        })
    }

    fn run(mut self) {
        let started = Instant::now();
        self.set_state(IndexState::Indexing);
        tracing::info!(log = %self.fingerprint.name, "Indexing started");

        match self.index_log() {
            Ok(true) => {
                self.set_state(IndexState::Complete);
                tracing::info!(
                    log = %self.fingerprint.name,
                    duration = self.instant.time,
                    error_records = self.error_records,
                    elapsed = ?started.elapsed(),
                    "Indexing complete"
                );
            }
            Ok(false) => {
                self.set_state(IndexState::Error);
                tracing::info!(log = %self.fingerprint.name, "Indexing cancelled");
            }
            Err(e) => {
                self.set_state(IndexState::Error);
                tracing::error!(log = %self.fingerprint.name, "Indexing failed: {}", e);
            }
        }
    }

    /// Run the pass; returns false if it was cancelled
    fn index_log(&mut self) -> IndexResult<bool> {
        let log_size = self.reader.log_size();
        let mut offset = 0u64;
        let mut next_timestep = TIMESTEP_SIZE;
        let mut last_commit = Instant::now();

        while let Some(transfer) = self.reader.read(offset)? {
            if transfer.record_len == 0 {
                return Err(IndexError::Reader(format!(
                    "zero-length record at offset {}",
                    offset
                )));
            }

            self.apply(&transfer);
            offset = transfer.end_offset();

            if offset >= next_timestep {
                self.flush_timestep();
                next_timestep = (offset / TIMESTEP_SIZE + 1) * TIMESTEP_SIZE;

                if last_commit.elapsed() >= self.commit_interval {
                    self.commit(offset, log_size)?;
                    last_commit = Instant::now();
                    if self.cancel.load(Ordering::Acquire) {
                        return Ok(false);
                    }
                }
            }
        }

        self.flush_timestep();
        self.commit(offset, log_size)?;
        if self.cancel.load(Ordering::Acquire) {
            return Ok(false);
        }

        self.finish()?;
        Ok(true)
    }

    fn apply(&mut self, transfer: &Transfer) {
        self.instant.advance(transfer, false);

        match transfer.kind {
            TransferType::Write => self.shadow_write(transfer),
            TransferType::Read => {}
            kind => {
                self.error_records += 1;
                tracing::trace!(offset = transfer.offset, %kind, "Error record");
            }
        }
    }

    /// Copy a write's payload into the shadow blocks it covers
    fn shadow_write(&mut self, transfer: &Transfer) {
        let end = transfer.address.saturating_add(transfer.data.len() as u64);
        let mut address = transfer.address;

        while address < end {
            let block = address / BLOCK_SIZE;
            let block_end = (block + 1).saturating_mul(BLOCK_SIZE).min(end);
            let within = (address % BLOCK_SIZE) as usize;
            let src = &transfer.data
                [(address - transfer.address) as usize..(block_end - transfer.address) as usize];

            let state = self.blocks.entry(block).or_insert_with(BlockState::new);
            state.data[within..within + src.len()].copy_from_slice(src);
            if !state.dirty {
                state.dirty = true;
                state.first_offset = transfer.offset;
                self.dirty.push(block);
            }
            state.last_offset = transfer.offset;

            address = block_end;
        }
    }

    /// Stage dirty blocks and, if time moved, the running instant
    fn flush_timestep(&mut self) {
        let time = self.instant.time;

        self.dirty.sort_unstable();
        for block in self.dirty.drain(..) {
            if let Some(state) = self.blocks.get_mut(&block) {
                state.dirty = false;
                self.batch.blocks.push(BlockSnapshot {
                    time,
                    block,
                    first_offset: state.first_offset,
                    last_offset: state.last_offset,
                    data: state.data.clone(),
                });
            }
        }

        if self.last_stored_time.map_or(true, |last| time > last) {
            self.batch.instants.push(self.instant.clone());
            self.last_stored_time = Some(time);
        }
    }

    /// Write staged rows and publish progress
    fn commit(&mut self, offset: u64, log_size: u64) -> IndexResult<()> {
        let progress = if log_size == 0 {
            1.0
        } else {
            (offset as f64 / log_size as f64).min(1.0) as f32
        };

        {
            let mut shared = lock_shared(&self.shared)?;
            let store = shared.store.as_mut().ok_or(IndexError::Closed)?;
            store.write_batch(&self.batch)?;
            shared.duration = self.instant.time;
            shared.progress = progress;
        }

        tracing::debug!(
            instants = self.batch.instants.len(),
            blocks = self.batch.blocks.len(),
            offset,
            progress,
            "Committed batch"
        );
        self.batch.clear();
        let _ = self.events.send(IndexEvent::Progress(progress));
        Ok(())
    }

    fn finish(&mut self) -> IndexResult<()> {
        self.set_state(IndexState::Finishing);

        let info = LogInfo {
            fingerprint: self.fingerprint.clone(),
            duration: self.instant.time,
        };

        let mut shared = lock_shared(&self.shared)?;
        let store = shared.store.as_mut().ok_or(IndexError::Closed)?;
        store.finish(&info)?;
        tracing::debug!(path = ?store.path(), duration = info.duration, "Store finished");
        shared.duration = info.duration;
        shared.progress = 1.0;
        Ok(())
    }

    /// Publish under the lock so a reader that observes the state has been sent its event
    fn set_state(&self, state: IndexState) {
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        shared.state = state;
        let _ = self.events.send(IndexEvent::State(state));
    }
}
