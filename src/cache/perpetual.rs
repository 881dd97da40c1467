//! Unbounded cache.

use crate::cache::{Cache, CacheKey, CacheValue};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Mutex-guarded map with no eviction.
#[derive(Debug)]
pub struct PerpetualCache {
    id: String,
    entries: Mutex<HashMap<CacheKey, CacheValue>>,
}

impl PerpetualCache {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Cache for PerpetualCache {
    fn id(&self) -> &str {
        &self.id
    }

    fn put(&self, key: CacheKey, value: CacheValue) {
        self.entries.lock().insert(key, value);
    }

    fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        self.entries.lock().get(key).cloned()
    }

    fn remove(&self, key: &CacheKey) -> Option<CacheValue> {
        self.entries.lock().remove(key)
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    fn size(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(n: i64) -> CacheKey {
        let mut key = CacheKey::new();
        key.update(n);
        key
    }

    #[test]
    fn test_put_get_remove() {
        let cache = PerpetualCache::new("ns");
        cache.put(key(1), CacheValue::Rows(Arc::new(Vec::new())));
        assert!(cache.get(&key(1)).is_some());
        assert!(cache.get(&key(2)).is_none());
        assert_eq!(cache.size(), 1);
        assert!(cache.remove(&key(1)).is_some());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_concurrent_writers() {
        let cache = Arc::new(PerpetualCache::new("ns"));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        cache.put(key(t * 100 + i), CacheValue::Absent);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.size(), 200);
        cache.clear();
        assert_eq!(cache.size(), 0);
    }
}
