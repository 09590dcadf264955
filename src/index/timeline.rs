//! Timeline - fixed-interval sampling of a log index
//!
//! A consumer that draws one column per `interval` clock ticks asks for
//! columns by number; instants are computed on the cache worker so the caller
//! never blocks on a replay. A miss means "not ready yet, ask again".

use crate::cache::{CacheMiss, CacheStats, LazyCache};
use crate::index::LogIndex;
use crate::trace::LogInstant;
use std::sync::Arc;

/// Column-addressed view over a [`LogIndex`]
pub struct Timeline {
    index: Arc<LogIndex>,
    interval: u64,
    cache: LazyCache<u64, Arc<LogInstant>>,
}

impl Timeline {
    /// Sample `index` every `interval` ticks, keeping `capacity` columns
    pub fn new(index: Arc<LogIndex>, interval: u64, capacity: usize) -> Self {
        let interval = interval.max(1);
        let source = Arc::clone(&index);
        let cache = LazyCache::new(capacity, move |column: &u64| {
            let time = column.saturating_mul(interval);
            match source.get_instant(time, interval / 2) {
                Ok(instant) => instant,
                Err(e) => {
                    tracing::warn!(column, time, "Failed to sample timeline: {}", e);
                    source.zero_instant()
                }
            }
        });

        Self {
            index,
            interval,
            cache,
        }
    }

    /// The instant for column `column`, or [`CacheMiss`] while it is computed
    ///
    /// Columns past the committed duration miss without being queued.
    pub fn sample(&self, column: u64) -> Result<Arc<LogInstant>, CacheMiss> {
        if column.saturating_mul(self.interval) > self.index.duration() {
            return Err(CacheMiss);
        }
        self.cache.get(&column)
    }

    /// Number of columns covering the committed duration
    pub fn columns(&self) -> u64 {
        self.index.duration() / self.interval + 1
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn index(&self) -> &Arc<LogIndex> {
        &self.index
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::distance;
    use crate::index::log_index::tests::{read_log, test_config};
    use crate::index::IndexState;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn sample_blocking(timeline: &Timeline, column: u64) -> Arc<LogInstant> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            match timeline.sample(column) {
                Ok(instant) => return instant,
                Err(CacheMiss) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(2))
                }
                Err(e) => panic!("column {} never arrived: {}", column, e),
            }
        }
    }

    #[test]
    fn test_samples_each_column() {
        let dir = tempdir().unwrap();
        let index = LogIndex::open(Arc::new(read_log(2_000, 3)), &test_config(&dir)).unwrap();
        assert_eq!(index.wait(Duration::from_secs(10)), IndexState::Complete);

        let timeline = Timeline::new(Arc::new(index), 100, 16);
        assert_eq!(timeline.columns(), 61);

        // First request is always a miss
        assert!(timeline.sample(7).is_err());
        for column in 0..timeline.columns() {
            let instant = sample_blocking(&timeline, column);
            assert!(distance(instant.time, column * 100) <= 50);
        }
        assert!(timeline.stats().hits > 0);
    }

    #[test]
    fn test_past_duration_is_not_queued() {
        let dir = tempdir().unwrap();
        let index = LogIndex::open(Arc::new(read_log(10, 1)), &test_config(&dir)).unwrap();
        assert_eq!(index.wait(Duration::from_secs(10)), IndexState::Complete);

        let timeline = Timeline::new(Arc::new(index), 4, 8);
        assert_eq!(timeline.sample(3), Err(CacheMiss));
        assert_eq!(timeline.stats().misses, 0);
        assert!(distance(sample_blocking(&timeline, 2).time, 8) <= 2);
    }
}
