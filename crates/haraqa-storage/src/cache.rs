//! Segment-name cache.
//!
//! Consume requests resolve their segment by listing the topic directory and
//! picking the highest base offset at or below the requested id. Listing on
//! every read is wasteful, so the most recent sorted listing is kept per
//! topic in an LRU. Rollover, truncation, and topic deletion invalidate the
//! entry; a reader that resolves a stale listing falls back to a fresh scan.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;

/// LRU of per-topic segment base offsets, sorted descending.
pub(crate) struct SegmentNameCache {
    inner: Mutex<LruCache<String, Arc<Vec<u64>>>>,
}

impl SegmentNameCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn get(&self, topic: &str) -> Option<Arc<Vec<u64>>> {
        self.inner.lock().await.get(topic).cloned()
    }

    pub async fn store(&self, topic: &str, bases: Arc<Vec<u64>>) {
        self.inner.lock().await.put(topic.to_string(), bases);
    }

    pub async fn invalidate(&self, topic: &str) {
        self.inner.lock().await.pop(topic);
    }
}
