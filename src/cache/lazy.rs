//! LRU cache whose misses are computed on a background worker
//!
//! A lookup never blocks on the generator. A miss queues the key and returns
//! [`CacheMiss`]; the caller retries later (typically on its next repaint).
//! Requests are served most-recent-first so the keys a user is looking at
//! right now win over stale ones.
//!
//! ```text
//! get(k) ── hit ──────────────────────────────▶ Ok(value)
//!        └─ miss ─▶ pending.push(k) ─▶ notify ─▶ Err(CacheMiss)
//!
//! worker: pop newest k ─▶ reserve LRU slot (Pending) ─▶ unlock
//!         ─▶ generator(k) ─▶ lock ─▶ slot = Ready(value)
//! ```

use crate::cache::lru::{CacheStats, LruCore, Slot};
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

/// How long the idle worker sleeps before re-checking for shutdown
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// The value is not cached yet; it has been queued for computation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cache miss")]
pub struct CacheMiss;

struct LazyState<K, V> {
    core: LruCore<K, V>,
    /// Keys awaiting computation, newest last
    pending: Vec<K>,
    shutdown: bool,
}

struct LazyShared<K, V> {
    state: Mutex<LazyState<K, V>>,
    wake: Condvar,
}

impl<K, V> LazyShared<K, V> {
    fn lock(&self) -> MutexGuard<'_, LazyState<K, V>> {
        // Worker panics never leave the state half-updated
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Asynchronous LRU cache with one worker thread
pub struct LazyCache<K, V> {
    shared: Arc<LazyShared<K, V>>,
    worker: Option<JoinHandle<()>>,
}

impl<K, V> LazyCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create a cache of `capacity` values filled by `generator` on a worker thread
    ///
    /// The pending queue holds at most `capacity` keys; older requests are
    /// dropped first.
    pub fn new<G>(capacity: usize, generator: G) -> Self
    where
        G: FnMut(&K) -> V + Send + 'static,
    {
        let core = LruCore::new(capacity);
        let pending = Vec::with_capacity(core.capacity() + 1);
        let shared = Arc::new(LazyShared {
            state: Mutex::new(LazyState {
                core,
                pending,
                shutdown: false,
            }),
            wake: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("lazy-cache".to_string())
            .spawn(move || run_worker(worker_shared, generator))
            .map_err(|e| tracing::error!("Failed to spawn cache worker: {}", e))
            .ok();

        Self { shared, worker }
    }

    /// Return the cached value for `key`, or queue it and report a miss
    pub fn get(&self, key: &K) -> Result<V, CacheMiss> {
        let mut state = self.shared.lock();

        if let Some(idx) = state.core.lookup(key) {
            if let Slot::Ready(value) = state.core.slot(idx) {
                let value = value.clone();
                state.core.stats.hits += 1;
                return Ok(value);
            }
            // Already being generated
            state.core.stats.misses += 1;
            return Err(CacheMiss);
        }

        state.core.stats.misses += 1;
        if let Some(pos) = state.pending.iter().position(|k| k == key) {
            state.pending.remove(pos);
        }
        state.pending.push(key.clone());
        if state.pending.len() > state.core.capacity() {
            state.pending.remove(0);
        }
        drop(state);

        self.shared.wake.notify_one();
        Err(CacheMiss)
    }

    /// True if a value for `key` is ready
    pub fn contains(&self, key: &K) -> bool {
        matches!(self.shared.lock().core.peek(key), Some(Slot::Ready(_)))
    }

    /// Number of keys waiting for the worker
    pub fn pending(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.lock().core.capacity()
    }

    pub fn stats(&self) -> CacheStats {
        self.shared.lock().core.stats
    }
}

impl<K, V> Drop for LazyCache<K, V> {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker<K, V, G>(shared: Arc<LazyShared<K, V>>, mut generator: G)
where
    K: Eq + Hash + Clone,
    G: FnMut(&K) -> V,
{
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            break;
        }

        let Some(key) = state.pending.pop() else {
            state = match shared.wake.wait_timeout(state, IDLE_WAIT) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
            continue;
        };

        // Resolved (or reserved) since it was queued
        if state.core.contains(&key) {
            continue;
        }

        let idx = state.core.reserve(key.clone());
        drop(state);

        let value = generator(&key);

        state = shared.lock();
        if !state.core.fill(idx, &key, value) {
            tracing::debug!("Cache slot {} reassigned during generation", idx);
        }
    }
}
