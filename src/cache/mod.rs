//! Caches used on the query path
//!
//! - **LruCache**: synchronous fixed-capacity LRU with a value generator
//! - **LazyCache**: the same LRU, filled asynchronously by a worker thread
//! - **InstantCache**: nearest-time memoization of log instants
//!
//! Generators must be pure: eviction never writes anything back, and a value
//! may be generated more than once over the cache's lifetime.

mod instant;
mod lazy;
mod lru;

pub use instant::{distance, InstantCache};
pub use lazy::{CacheMiss, LazyCache};
pub use lru::{CacheStats, LruCache, Slot};
