//! In-process cache backend.

use std::sync::Arc;

use dashmap::DashMap;

use crate::cache::key::matches_pattern;
use crate::cache::{CacheBackend, CacheEntry};
use crate::clock::Clock;
use crate::error::CacheError;

/// Concurrent map of physical keys; each key is locked independently.
pub struct MemoryCacheBackend {
    entries: DashMap<String, CacheEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryCacheBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Stores a raw record verbatim.
    pub fn insert_raw(&self, key: &str, entry: CacheEntry) {
        self.entries.insert(key.to_string(), entry);
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let now = self.clock.now();
        let found = self.entries.get(key).map(|entry| entry.value().clone());

        match found {
            Some(entry) if entry.is_expired(now) => {
                // Only drop it if nobody replaced it in the meantime
                self.entries.remove_if(key, |_, current| current.is_expired(now));
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }

    fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let now = self.clock.now();
        Ok(self
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    fn clear(&self, pattern: &str) -> Result<usize, CacheError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !matches_pattern(key, pattern));
        Ok(before.saturating_sub(self.entries.len()))
    }

    fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before.saturating_sub(self.entries.len()))
    }

    fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries.len())
    }
}
