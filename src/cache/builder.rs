//! Namespace cache assembly.

use crate::cache::{Cache, FifoCache, LoggingCache, PerpetualCache};
use crate::config::DEFAULT_FIFO_SIZE;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Eviction {
    /// Unbounded.
    None,
    #[default]
    Fifo,
}

/// Builds the shared cache for one namespace: a perpetual base, optional
/// eviction, then hit-ratio logging.
#[derive(Debug, Clone)]
pub struct CacheBuilder {
    id: String,
    eviction: Eviction,
    size: usize,
    logging: bool,
}

impl CacheBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            eviction: Eviction::default(),
            size: DEFAULT_FIFO_SIZE,
            logging: true,
        }
    }

    pub fn eviction(mut self, eviction: Eviction) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    pub fn build(self) -> Arc<dyn Cache> {
        let mut cache: Box<dyn Cache> = Box::new(PerpetualCache::new(self.id));
        if self.eviction == Eviction::Fifo {
            cache = Box::new(FifoCache::with_size(cache, self.size));
        }
        if self.logging {
            cache = Box::new(LoggingCache::new(cache));
        }
        Arc::from(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, CacheValue};

    #[test]
    fn test_built_cache_keeps_id_and_bound() {
        let cache = CacheBuilder::new("app.UserMapper").size(1).build();
        assert_eq!(cache.id(), "app.UserMapper");
        for n in 0..3i64 {
            let mut key = CacheKey::new();
            key.update(n);
            cache.put(key, CacheValue::Absent);
        }
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_unbounded() {
        let cache = CacheBuilder::new("ns")
            .eviction(Eviction::None)
            .logging(false)
            .size(1)
            .build();
        for n in 0..3i64 {
            let mut key = CacheKey::new();
            key.update(n);
            cache.put(key, CacheValue::Absent);
        }
        assert_eq!(cache.size(), 3);
    }
}
