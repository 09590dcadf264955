//! Fixed-capacity LRU cache with a pluggable value generator
//!
//! Slots live in one preallocated array and are ordered by recency through an
//! intrusive doubly linked list of slot indices (head = least recent, tail =
//! most recent). A key→slot map gives O(1) lookup. On a miss the head slot is
//! evicted unconditionally and refilled by the generator, so values must be
//! pure functions of their key: there is no write-back.

use std::collections::HashMap;
use std::hash::Hash;

const NIL: usize = usize::MAX;

/// Contents of one cache slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot<V> {
    /// Never filled, or evicted
    Empty,
    /// Reserved for a key whose value is being generated
    Pending,
    Ready(V),
}

#[derive(Debug)]
struct Entry<K, V> {
    key: Option<K>,
    slot: Slot<V>,
    prev: usize,
    next: usize,
}

/// Hit/miss counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Slot array, key map and recency list shared by [`LruCache`] and
/// [`LazyCache`](crate::cache::LazyCache)
#[derive(Debug)]
pub(crate) struct LruCore<K, V> {
    entries: Vec<Entry<K, V>>,
    map: HashMap<K, usize>,
    head: usize,
    tail: usize,
    pub(crate) stats: CacheStats,
}

impl<K, V> LruCore<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let entries = (0..capacity)
            .map(|i| Entry {
                key: None,
                slot: Slot::Empty,
                prev: if i == 0 { NIL } else { i - 1 },
                next: if i + 1 == capacity { NIL } else { i + 1 },
            })
            .collect();

        Self {
            entries,
            map: HashMap::with_capacity(capacity),
            head: 0,
            tail: capacity - 1,
            stats: CacheStats::default(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Find `key` and mark it most recently used
    pub(crate) fn lookup(&mut self, key: &K) -> Option<usize> {
        let idx = *self.map.get(key)?;
        self.touch(idx);
        Some(idx)
    }

    /// Slot for `key` without touching recency
    pub(crate) fn peek(&self, key: &K) -> Option<&Slot<V>> {
        self.map.get(key).map(|&idx| &self.entries[idx].slot)
    }

    pub(crate) fn slot(&self, idx: usize) -> &Slot<V> {
        &self.entries[idx].slot
    }

    /// Evict the least recently used slot and hand it to `key`
    ///
    /// The slot is left `Pending` and becomes most recently used.
    pub(crate) fn reserve(&mut self, key: K) -> usize {
        let idx = self.head;
        let entry = &mut self.entries[idx];
        if let Some(old) = entry.key.take() {
            self.map.remove(&old);
            self.stats.evictions += 1;
        }
        entry.slot = Slot::Pending;
        entry.key = Some(key.clone());
        self.map.insert(key, idx);
        self.touch(idx);
        idx
    }

    /// Store `value` in a slot reserved for `key`
    ///
    /// Returns false if the slot has since been handed to another key.
    pub(crate) fn fill(&mut self, idx: usize, key: &K, value: V) -> bool {
        let entry = &mut self.entries[idx];
        if entry.key.as_ref() != Some(key) {
            return false;
        }
        entry.slot = Slot::Ready(value);
        true
    }

    /// Keys from least to most recently used
    #[cfg(test)]
    pub(crate) fn keys_by_recency(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.map.len());
        let mut idx = self.head;
        while idx != NIL {
            if let Some(key) = &self.entries[idx].key {
                keys.push(key.clone());
            }
            idx = self.entries[idx].next;
        }
        keys
    }

    fn touch(&mut self, idx: usize) {
        if idx == self.tail {
            return;
        }
        self.unlink(idx);
        self.link_tail(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.entries[idx].prev, self.entries[idx].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.entries[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.entries[next].prev = prev;
        }
    }

    fn link_tail(&mut self, idx: usize) {
        self.entries[idx].prev = self.tail;
        self.entries[idx].next = NIL;
        if self.tail == NIL {
            self.head = idx;
        } else {
            self.entries[self.tail].next = idx;
        }
        self.tail = idx;
    }
}

/// Synchronous LRU cache that fills misses by calling a generator
pub struct LruCache<K, V, G> {
    core: LruCore<K, V>,
    generator: G,
}

impl<K, V, G> LruCache<K, V, G>
where
    K: Eq + Hash + Clone,
    G: FnMut(&K) -> V,
{
    /// Create a cache holding at most `capacity` values (minimum 1)
    pub fn new(capacity: usize, generator: G) -> Self {
        Self {
            core: LruCore::new(capacity),
            generator,
        }
    }

    /// Return the value for `key`, generating it on a miss
    pub fn get(&mut self, key: &K) -> &V {
        let idx = match self.core.lookup(key) {
            Some(idx) if matches!(self.core.slot(idx), Slot::Ready(_)) => {
                self.core.stats.hits += 1;
                idx
            }
            _ => {
                self.core.stats.misses += 1;
                let idx = self.core.reserve(key.clone());
                let value = (self.generator)(key);
                self.core.fill(idx, key, value);
                idx
            }
        };

        match self.core.slot(idx) {
            Slot::Ready(value) => value,
            _ => unreachable!("slot {} was filled above", idx),
        }
    }

    /// True if `key` is cached; does not affect recency
    pub fn contains(&self, key: &K) -> bool {
        self.core.contains(key)
    }

    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.core.capacity()
    }

    pub fn stats(&self) -> CacheStats {
        self.core.stats
    }

    /// Cached keys from least to most recently used
    #[cfg(test)]
    pub(crate) fn keys(&self) -> Vec<K> {
        self.core.keys_by_recency()
    }
}
