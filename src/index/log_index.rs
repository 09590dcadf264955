//! LogIndex - open, build and query the index of one trace log

use crate::cache::{distance, InstantCache};
use crate::config::IndexConfig;
use crate::error::{IndexError, IndexResult};
use crate::index::indexer::{lock_shared, Indexer, IndexerHandle, Shared};
use crate::index::store::{store_path, BlockSnapshot, Fingerprint, IndexStore, StoreStats};
use crate::index::{IndexEvent, IndexState};
use crate::trace::{strata_count, LogInstant, LogReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

const WAIT_POLL: Duration = Duration::from_millis(5);

/// Persisted, queryable summary of a trace log
///
/// Opening a log either reuses a complete store whose fingerprint matches or
/// starts a background indexer that fills a new one. Queries are answered
/// while indexing runs, over whatever has been committed so far.
pub struct LogIndex {
    // Declared first so the indexer is stopped before the store is released
    indexer: Mutex<Option<IndexerHandle>>,
    shared: Arc<Mutex<Shared>>,
    reader: Arc<dyn LogReader>,
    instants: Mutex<InstantCache>,
    events: broadcast::Sender<IndexEvent>,
    path: PathBuf,
    strata: usize,
}

impl LogIndex {
    /// Open the index for `reader`'s log, building it if needed
    pub fn open(reader: Arc<dyn LogReader>, config: &IndexConfig) -> IndexResult<Self> {
        let fingerprint = Fingerprint::of(reader.as_ref())?;
        let path = store_path(&config.data_path(), reader.file_name());
        let strata = strata_count(reader.mem_size());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let mut index = Self {
            indexer: Mutex::new(None),
            shared: Arc::new(Mutex::new(Shared {
                store: None,
                state: IndexState::Idle,
                progress: 0.0,
                duration: 0,
            })),
            reader,
            instants: Mutex::new(InstantCache::with_limit(strata, config.instant_cache_limit)),
            events,
            path,
            strata,
        };

        if let Some((store, duration)) = index.reuse(&fingerprint) {
            tracing::info!(path = ?store.path(), duration, "Reusing complete index");
            let mut shared = lock_shared(&index.shared)?;
            shared.store = Some(store);
            shared.state = IndexState::Complete;
            shared.progress = 1.0;
            shared.duration = duration;
            drop(shared);
            return Ok(index);
        }

        IndexStore::remove(&index.path)?;
        let store = IndexStore::create(&index.path)?;
        {
            let mut shared = lock_shared(&index.shared)?;
            shared.store = Some(store);
            shared.state = IndexState::Indexing;
        }

        let handle = Indexer::new(
            Arc::clone(&index.reader),
            Arc::clone(&index.shared),
            index.events.clone(),
            fingerprint,
            config.commit_interval(),
            strata,
        )
        .spawn()?;
        *index.indexer.get_mut().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        Ok(index)
    }

    /// A complete store at our path whose fingerprint matches, with its duration
    fn reuse(&self, fingerprint: &Fingerprint) -> Option<(IndexStore, u64)> {
        if !self.path.exists() {
            return None;
        }

        let store = match IndexStore::open_read_only(&self.path) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(path = ?self.path, "Discarding unreadable index: {}", e);
                return None;
            }
        };

        match store.load_info() {
            Ok(Some(info)) if info.fingerprint == *fingerprint => Some((store, info.duration)),
            Ok(Some(info)) => {
                tracing::info!(
                    path = ?self.path,
                    stored_mtime = info.fingerprint.mtime,
                    mtime = fingerprint.mtime,
                    "Index is stale, rebuilding"
                );
                None
            }
            Ok(None) => {
                tracing::info!(path = ?self.path, "Index is incomplete, rebuilding");
                None
            }
            Err(e) => {
                tracing::warn!(path = ?self.path, "Discarding unreadable index: {}", e);
                None
            }
        }
    }

    /// Stop the indexer and release the store
    ///
    /// Safe to call more than once; queries afterwards fail with
    /// [`IndexError::Closed`].
    pub fn close(&self) {
        let handle = self
            .indexer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut handle) = handle {
            handle.stop();
        }

        let store = self
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .store
            .take();
        if store.is_some() {
            tracing::debug!(path = ?self.path, "Index closed");
        }
    }

    /// The instant best approximating `time`
    ///
    /// `time` is clamped to the committed duration. A cached or stored
    /// instant within `distance` is returned as is; otherwise transfers are
    /// replayed from the nearest known instant until the result is within
    /// `distance` or no closer instant is reachable. A `distance` of 0 asks
    /// for the exact state.
    pub fn get_instant(&self, time: u64, distance_limit: u64) -> IndexResult<Arc<LogInstant>> {
        let time = time.min(self.duration());

        let cached = self.lock_instants()?.find_closest(time);
        if distance(cached.time, time) <= distance_limit {
            return Ok(cached);
        }

        let mut start = cached;
        let stored = {
            let shared = lock_shared(&self.shared)?;
            let store = shared.store.as_ref().ok_or(IndexError::Closed)?;
            store.nearest_instant(time)?
        };
        if let Some(stored) = stored {
            if distance(stored.time, time) < distance(start.time, time) {
                let stored = Arc::new(stored);
                self.lock_instants()?.store(Arc::clone(&stored));
                start = stored;
            }
        }
        if distance(start.time, time) <= distance_limit {
            return Ok(start);
        }

        let found = Arc::new(self.replay(&start, time, distance_limit)?);
        self.lock_instants()?.store(Arc::clone(&found));
        Ok(found)
    }

    /// Walk the log from `start` toward `time`, one transfer at a time
    fn replay(&self, start: &LogInstant, time: u64, distance_limit: u64) -> IndexResult<LogInstant> {
        let reverse = start.time > time;
        let mut current = start.clone();
        let mut steps = 0u64;

        while distance(current.time, time) > distance_limit {
            let transfer = if reverse {
                match self.reader.prev(current.offset)? {
                    Some(offset) => self.reader.read(offset)?,
                    None => None,
                }
            } else {
                self.reader.read(current.offset)?
            };
            let Some(transfer) = transfer else {
                break;
            };

            let next = current.advanced(&transfer, reverse);
            if distance(next.time, time) > distance(current.time, time) {
                break;
            }
            current = next;
            steps += 1;
        }

        tracing::trace!(from = start.time, to = current.time, steps, reverse, "Replayed");
        Ok(current)
    }

    pub fn state(&self) -> IndexState {
        self.shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    /// Fraction of the log committed so far
    pub fn progress(&self) -> f32 {
        self.shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .progress
    }

    /// Time covered by the committed part of the log
    pub fn duration(&self) -> u64 {
        self.shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .duration
    }

    /// Receive state and progress notifications
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.events.subscribe()
    }

    /// Block until indexing reaches a terminal state or `timeout` passes
    pub fn wait(&self, timeout: Duration) -> IndexState {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.state();
            if state.is_terminal() || Instant::now() >= deadline {
                return state;
            }
            std::thread::sleep(WAIT_POLL);
        }
    }

    /// Latest committed snapshot of `block` at or before `time`
    pub fn block_at(&self, block: u64, time: u64) -> IndexResult<Option<BlockSnapshot>> {
        let shared = lock_shared(&self.shared)?;
        let store = shared.store.as_ref().ok_or(IndexError::Closed)?;
        store.block_at(block, time)
    }

    /// Committed row counts
    pub fn stats(&self) -> IndexResult<StoreStats> {
        let shared = lock_shared(&self.shared)?;
        let store = shared.store.as_ref().ok_or(IndexError::Closed)?;
        store.stats(None)
    }

    /// Times of every committed timestep instant, ascending
    pub fn timestep_times(&self) -> IndexResult<Vec<u64>> {
        let shared = lock_shared(&self.shared)?;
        let store = shared.store.as_ref().ok_or(IndexError::Closed)?;
        store.instant_times()
    }

    /// The start-of-log instant
    pub fn zero_instant(&self) -> Arc<LogInstant> {
        self.instants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .zero()
    }

    pub fn strata_count(&self) -> usize {
        self.strata
    }

    pub fn reader(&self) -> &Arc<dyn LogReader> {
        &self.reader
    }

    /// Location of the store file
    pub fn store_path(&self) -> &Path {
        &self.path
    }

    fn lock_instants(&self) -> IndexResult<MutexGuard<'_, InstantCache>> {
        self.instants
            .lock()
            .map_err(|e| IndexError::Lock(format!("Failed to acquire instant cache: {}", e)))
    }
}

impl Drop for LogIndex {
    fn drop(&mut self) {
        self.close();
    }
}
