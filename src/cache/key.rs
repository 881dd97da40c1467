//! Composite cache keys.

use crate::value::Value;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

const DEFAULT_MULTIPLIER: u64 = 37;
const DEFAULT_HASHCODE: u64 = 17;

/// Ordered composite of every component that identifies a query result.
///
/// Equality compares the running hash, checksum and count first, then every
/// component in order. Null components hash to a fixed value.
#[derive(Debug, Clone)]
pub struct CacheKey {
    multiplier: u64,
    hashcode: u64,
    checksum: u64,
    count: usize,
    update_list: Vec<Value>,
}

fn component_hash(value: &Value) -> u64 {
    if value.is_null() {
        return 1;
    }
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

impl CacheKey {
    pub fn new() -> Self {
        Self {
            multiplier: DEFAULT_MULTIPLIER,
            hashcode: DEFAULT_HASHCODE,
            checksum: 0,
            count: 0,
            update_list: Vec::new(),
        }
    }

    pub fn update(&mut self, component: impl Into<Value>) {
        let component = component.into();
        let base = component_hash(&component);
        self.count += 1;
        self.checksum = self.checksum.wrapping_add(base);
        let base = base.wrapping_mul(self.count as u64);
        self.hashcode = self
            .multiplier
            .wrapping_mul(self.hashcode)
            .wrapping_add(base);
        self.update_list.push(component);
    }

    pub fn update_all<I, V>(&mut self, components: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        for component in components {
            self.update(component);
        }
    }

    pub fn update_count(&self) -> usize {
        self.count
    }
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hashcode == other.hashcode
            && self.checksum == other.checksum
            && self.count == other.count
            && self.update_list == other.update_list
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hashcode);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hashcode, self.checksum)?;
        for component in &self.update_list {
            write!(f, ":{component}")?;
        }
        Ok(())
    }
}
