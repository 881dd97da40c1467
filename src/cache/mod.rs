//! Query result caches.
//!
//! Shared (second-level) caches implement [`Cache`] and are safe to use
//! from many sessions at once. A session never writes to a shared cache
//! directly: its [`TransactionalCacheManager`] stages writes until commit.
//!
//! # Architecture
//!
//! - `key`: [`CacheKey`], the composite query identity
//! - `perpetual`: [`PerpetualCache`], an unbounded map
//! - `decorators`: [`FifoCache`] eviction and [`LoggingCache`] hit ratios
//! - `builder`: [`CacheBuilder`] assembling a decorated namespace cache
//! - `transactional`: per-session staging buffers

pub mod builder;
pub mod decorators;
pub mod key;
pub mod perpetual;
pub mod transactional;

pub use builder::{CacheBuilder, Eviction};
pub use decorators::{FifoCache, LoggingCache};
pub use key::CacheKey;
pub use perpetual::PerpetualCache;
pub use transactional::{TransactionalCache, TransactionalCacheManager};

use crate::mapping::ResultObject;
use std::fmt;
use std::sync::Arc;

/// A cached entry.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Rows(Arc<Vec<ResultObject>>),
    /// The key was queried but nothing was stored for it.
    Absent,
}

impl CacheValue {
    pub fn rows(&self) -> Option<&Arc<Vec<ResultObject>>> {
        match self {
            Self::Rows(rows) => Some(rows),
            Self::Absent => None,
        }
    }
}

/// A thread-safe map from [`CacheKey`] to [`CacheValue`].
pub trait Cache: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn put(&self, key: CacheKey, value: CacheValue);

    fn get(&self, key: &CacheKey) -> Option<CacheValue>;

    fn remove(&self, key: &CacheKey) -> Option<CacheValue>;

    fn clear(&self);

    fn size(&self) -> usize;
}
