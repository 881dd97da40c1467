//! Cache decorators.

use crate::cache::{Cache, CacheKey, CacheValue};
use crate::config::DEFAULT_FIFO_SIZE;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Bounded cache evicting the oldest inserted key first.
#[derive(Debug)]
pub struct FifoCache {
    delegate: Box<dyn Cache>,
    keys: Mutex<VecDeque<CacheKey>>,
    size: usize,
}

impl FifoCache {
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self::with_size(delegate, DEFAULT_FIFO_SIZE)
    }

    pub fn with_size(delegate: Box<dyn Cache>, size: usize) -> Self {
        Self {
            delegate,
            keys: Mutex::new(VecDeque::with_capacity(size.min(DEFAULT_FIFO_SIZE))),
            size: size.max(1),
        }
    }
}

impl Cache for FifoCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: CacheValue) {
        // The key queue lock is held across the delegate write so eviction
        // order matches insertion order.
        let mut keys = self.keys.lock();
        if !keys.contains(&key) {
            keys.push_back(key.clone());
            if keys.len() > self.size {
                if let Some(oldest) = keys.pop_front() {
                    self.delegate.remove(&oldest);
                }
            }
        }
        self.delegate.put(key, value);
    }

    fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        self.delegate.get(key)
    }

    fn remove(&self, key: &CacheKey) -> Option<CacheValue> {
        let mut keys = self.keys.lock();
        keys.retain(|k| k != key);
        self.delegate.remove(key)
    }

    fn clear(&self) {
        let mut keys = self.keys.lock();
        keys.clear();
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }
}

/// Counts lookups and logs the running hit ratio.
#[derive(Debug)]
pub struct LoggingCache {
    delegate: Box<dyn Cache>,
    requests: AtomicU64,
    hits: AtomicU64,
}

impl LoggingCache {
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self {
            delegate,
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    pub fn hit_ratio(&self) -> f64 {
        let requests = self.requests.load(Ordering::Relaxed);
        if requests == 0 {
            0.0
        } else {
            self.hits.load(Ordering::Relaxed) as f64 / requests as f64
        }
    }
}

impl Cache for LoggingCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: CacheValue) {
        self.delegate.put(key, value);
    }

    fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let value = self.delegate.get(key);
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        debug!(cache = %self.id(), hit_ratio = self.hit_ratio(), "Cache Hit Ratio");
        value
    }

    fn remove(&self, key: &CacheKey) -> Option<CacheValue> {
        self.delegate.remove(key)
    }

    fn clear(&self) {
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PerpetualCache;

    fn key(n: i64) -> CacheKey {
        let mut key = CacheKey::new();
        key.update(n);
        key
    }

    #[test]
    fn test_fifo_evicts_oldest() {
        let cache = FifoCache::with_size(Box::new(PerpetualCache::new("ns")), 2);
        cache.put(key(1), CacheValue::Absent);
        cache.put(key(2), CacheValue::Absent);
        cache.put(key(1), CacheValue::Absent);
        cache.put(key(3), CacheValue::Absent);
        assert_eq!(cache.size(), 2);
        assert!(cache.get(&key(1)).is_none());
        assert!(cache.get(&key(2)).is_some());
        assert!(cache.get(&key(3)).is_some());
    }

    #[test]
    fn test_fifo_remove_forgets_key() {
        let cache = FifoCache::with_size(Box::new(PerpetualCache::new("ns")), 2);
        cache.put(key(1), CacheValue::Absent);
        cache.remove(&key(1));
        cache.put(key(2), CacheValue::Absent);
        cache.put(key(3), CacheValue::Absent);
        assert!(cache.get(&key(2)).is_some());
        assert!(cache.get(&key(3)).is_some());
    }

    #[test]
    fn test_logging_hit_ratio() {
        let cache = LoggingCache::new(Box::new(PerpetualCache::new("ns")));
        cache.put(key(1), CacheValue::Absent);
        assert!(cache.get(&key(1)).is_some());
        assert!(cache.get(&key(2)).is_none());
        assert!((cache.hit_ratio() - 0.5).abs() < f64::EPSILON);
        assert_eq!(cache.id(), "ns");
    }
}
