//! Per-session staging of shared-cache writes.
//!
//! Writes made while a session's transaction is open land in a
//! [`TransactionalCache`] buffer. The session sees them through the buffer;
//! other sessions only see them once the transaction commits. Rollback drops
//! the buffer without touching the shared cache.

use crate::cache::{Cache, CacheKey, CacheValue};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Buffer in front of one shared cache.
#[derive(Debug)]
pub struct TransactionalCache {
    delegate: Arc<dyn Cache>,
    clear_on_commit: bool,
    entries_to_add_on_commit: HashMap<CacheKey, CacheValue>,
    entries_to_remove_on_commit: HashSet<CacheKey>,
    entries_missed_in_cache: HashSet<CacheKey>,
}

impl TransactionalCache {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self {
            delegate,
            clear_on_commit: false,
            entries_to_add_on_commit: HashMap::new(),
            entries_to_remove_on_commit: HashSet::new(),
            entries_missed_in_cache: HashSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.delegate.id()
    }

    /// Pending writes first; the shared cache unless a clear is pending.
    pub fn get(&mut self, key: &CacheKey) -> Option<CacheValue> {
        if let Some(pending) = self.entries_to_add_on_commit.get(key) {
            return Some(pending.clone());
        }
        // Hidden by a pending clear or removal, not missing from the cache.
        if self.clear_on_commit || self.entries_to_remove_on_commit.contains(key) {
            return None;
        }
        let value = self.delegate.get(key);
        if value.is_none() {
            self.entries_missed_in_cache.insert(key.clone());
        }
        value
    }

    pub fn put(&mut self, key: CacheKey, value: CacheValue) {
        self.entries_to_remove_on_commit.remove(&key);
        self.entries_to_add_on_commit.insert(key, value);
    }

    pub fn remove(&mut self, key: &CacheKey) {
        self.entries_to_add_on_commit.remove(key);
        self.entries_to_remove_on_commit.insert(key.clone());
    }

    /// Schedule a full clear of the shared cache and drop pending writes.
    pub fn clear(&mut self) {
        self.clear_on_commit = true;
        self.entries_to_add_on_commit.clear();
        self.entries_to_remove_on_commit.clear();
    }

    pub fn commit(&mut self) {
        if self.clear_on_commit {
            self.delegate.clear();
        } else {
            for key in &self.entries_to_remove_on_commit {
                self.delegate.remove(key);
            }
        }
        self.flush_pending_entries();
        self.reset();
    }

    pub fn rollback(&mut self) {
        self.reset();
    }

    fn flush_pending_entries(&mut self) {
        let pending = self.entries_to_add_on_commit.len();
        for (key, value) in self.entries_to_add_on_commit.drain() {
            self.delegate.put(key, value);
        }
        for key in self.entries_missed_in_cache.drain() {
            if !self.entries_to_remove_on_commit.contains(&key)
                && self.delegate.get(&key).is_none()
            {
                self.delegate.put(key, CacheValue::Absent);
            }
        }
        debug!(cache = %self.delegate.id(), entries = pending, "Flushed pending cache entries");
    }

    fn reset(&mut self) {
        self.clear_on_commit = false;
        self.entries_to_add_on_commit.clear();
        self.entries_to_remove_on_commit.clear();
        self.entries_missed_in_cache.clear();
    }
}

/// One [`TransactionalCache`] per shared cache touched by a session.
#[derive(Debug, Default)]
pub struct TransactionalCacheManager {
    caches: HashMap<String, TransactionalCache>,
}

impl TransactionalCacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn transactional(&mut self, cache: &Arc<dyn Cache>) -> &mut TransactionalCache {
        self.caches
            .entry(cache.id().to_string())
            .or_insert_with(|| TransactionalCache::new(cache.clone()))
    }

    pub fn clear(&mut self, cache: &Arc<dyn Cache>) {
        self.transactional(cache).clear();
    }

    pub fn get_object(&mut self, cache: &Arc<dyn Cache>, key: &CacheKey) -> Option<CacheValue> {
        self.transactional(cache).get(key)
    }

    pub fn put_object(&mut self, cache: &Arc<dyn Cache>, key: CacheKey, value: CacheValue) {
        self.transactional(cache).put(key, value);
    }

    pub fn remove_object(&mut self, cache: &Arc<dyn Cache>, key: &CacheKey) {
        self.transactional(cache).remove(key);
    }

    pub fn commit(&mut self) {
        for cache in self.caches.values_mut() {
            cache.commit();
        }
    }

    pub fn rollback(&mut self) {
        for cache in self.caches.values_mut() {
            cache.rollback();
        }
    }
}
