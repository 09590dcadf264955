//! Nearest-time memoization of [`LogInstant`]s
//!
//! Holds instants that were expensive to produce (store lookups and replays)
//! so that nearby queries can start from them. Never authoritative: anything
//! evicted can be recomputed from the store and the log.

use crate::trace::LogInstant;
use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::Arc;

/// Unsigned distance between two times
pub fn distance(a: u64, b: u64) -> u64 {
    a.abs_diff(b)
}

/// Time-keyed instant cache with nearest-key lookup
#[derive(Debug)]
pub struct InstantCache {
    instants: BTreeMap<u64, Arc<LogInstant>>,
    /// Insertion order, for eviction
    order: VecDeque<u64>,
    /// Maximum entries kept; 0 means unbounded
    limit: usize,
    zero: Arc<LogInstant>,
}

impl InstantCache {
    /// Create an unbounded cache for instants with `strata` strata
    pub fn new(strata: usize) -> Self {
        Self::with_limit(strata, 0)
    }

    /// Create a cache that keeps at most `limit` instants (0 = unbounded)
    pub fn with_limit(strata: usize, limit: usize) -> Self {
        Self {
            instants: BTreeMap::new(),
            order: VecDeque::new(),
            limit,
            zero: Arc::new(LogInstant::new(strata)),
        }
    }

    /// The stored instant closest to `time`, or the zero instant if empty
    ///
    /// Ties go to the earlier instant.
    pub fn find_closest(&self, time: u64) -> Arc<LogInstant> {
        let below = self
            .instants
            .range((Bound::Unbounded, Bound::Included(time)))
            .next_back();
        let above = self
            .instants
            .range((Bound::Excluded(time), Bound::Unbounded))
            .next();

        match (below, above) {
            (Some((&lo, a)), Some((&hi, b))) => {
                if distance(lo, time) <= distance(hi, time) {
                    Arc::clone(a)
                } else {
                    Arc::clone(b)
                }
            }
            (Some((_, a)), None) => Arc::clone(a),
            (None, Some((_, b))) => Arc::clone(b),
            (None, None) => Arc::clone(&self.zero),
        }
    }

    /// Memoize `instant` under its time
    pub fn store(&mut self, instant: Arc<LogInstant>) {
        let time = instant.time;
        if self.instants.insert(time, instant).is_none() {
            self.order.push_back(time);
        }

        if self.limit > 0 {
            while self.instants.len() > self.limit {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.instants.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
    }

    /// The zero/start instant
    pub fn zero(&self) -> Arc<LogInstant> {
        Arc::clone(&self.zero)
    }

    pub fn len(&self) -> usize {
        self.instants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instants.is_empty()
    }

    pub fn clear(&mut self) {
        self.instants.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_at(time: u64) -> Arc<LogInstant> {
        let mut instant = LogInstant::new(2);
        instant.time = time;
        instant.offset = time * 10;
        Arc::new(instant)
    }

    #[test]
    fn test_empty_returns_zero() {
        let cache = InstantCache::new(4);
        let found = cache.find_closest(1234);
        assert_eq!(*found, LogInstant::new(4));
    }

    #[test]
    fn test_find_closest() {
        let mut cache = InstantCache::new(2);
        for t in [100, 200, 400] {
            cache.store(instant_at(t));
        }

        assert_eq!(cache.find_closest(0).time, 100);
        assert_eq!(cache.find_closest(140).time, 100);
        assert_eq!(cache.find_closest(160).time, 200);
        assert_eq!(cache.find_closest(300).time, 200); // tie goes earlier
        assert_eq!(cache.find_closest(301).time, 400);
        assert_eq!(cache.find_closest(u64::MAX).time, 400);
    }

    #[test]
    fn test_store_replaces_same_time() {
        let mut cache = InstantCache::new(2);
        cache.store(instant_at(5));
        let mut newer = LogInstant::new(2);
        newer.time = 5;
        newer.offset = 99;
        cache.store(Arc::new(newer));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.find_closest(5).offset, 99);
    }

    #[test]
    fn test_limit_evicts_oldest_insert() {
        let mut cache = InstantCache::with_limit(2, 2);
        cache.store(instant_at(10));
        cache.store(instant_at(30));
        cache.store(instant_at(20));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.find_closest(10).time, 20);
    }

    #[test]
    fn test_distance_is_symmetric() {
        assert_eq!(distance(3, 10), 7);
        assert_eq!(distance(10, 3), 7);
        assert_eq!(distance(0, u64::MAX), u64::MAX);
    }
}
