//! Cache Store Module
//!
//! Typed, namespaced façade over a `CacheBackend`. Storage failures never
//! escape: reads degrade to misses and writes are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheBackend, CacheEntry, CacheKey, CacheStats, StatsCounters, MAX_KEY_LENGTH};
use crate::clock::Clock;
use crate::error::CacheError;

// == Cache Store ==
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    stats: StatsCounters,
}

impl CacheStore {
    // == Constructor ==
    pub fn new(backend: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            stats: StatsCounters::default(),
        }
    }

    // == Get ==
    /// Returns the stored value, or `None` when absent, expired, unreadable
    /// or of the wrong shape.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let physical = key.physical();

        let entry = match self.backend.get(&physical) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.stats.record_miss();
                return None;
            }
            Err(CacheError::Corrupt { reason, .. }) => {
                self.heal(&physical, &reason);
                return None;
            }
            Err(err) => {
                warn!(key = %physical, error = %err, "Cache read failed, treating as miss");
                self.stats.record_miss();
                return None;
            }
        };

        match serde_json::from_str(&entry.data) {
            Ok(value) => {
                self.stats.record_hit();
                Some(value)
            }
            Err(err) => {
                self.heal(&physical, &err.to_string());
                None
            }
        }
    }

    // == Set ==
    /// Stores `value` until `now + ttl`. Returns whether it was stored.
    pub fn set<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) -> bool {
        let physical = key.physical();
        if physical.len() > MAX_KEY_LENGTH {
            warn!(key = %physical, "Cache key exceeds maximum length, not stored");
            return false;
        }

        let result = serde_json::to_string(value)
            .map_err(CacheError::from)
            .and_then(|data| {
                let entry = CacheEntry::new(data, self.clock.now(), ttl);
                self.backend.set(&physical, entry)
            });

        match result {
            Ok(()) => {
                self.stats.record_write();
                debug!(key = %physical, ttl_secs = ttl.as_secs(), "Cached value");
                true
            }
            Err(err) => {
                warn!(key = %physical, error = %err, "Cache write failed");
                false
            }
        }
    }

    // == Delete ==
    pub fn delete(&self, key: &CacheKey) -> bool {
        let physical = key.physical();
        self.backend.delete(&physical).unwrap_or_else(|err| {
            warn!(key = %physical, error = %err, "Cache delete failed");
            false
        })
    }

    // == Exists ==
    pub fn exists(&self, key: &CacheKey) -> bool {
        let physical = key.physical();
        self.backend.exists(&physical).unwrap_or_else(|err| {
            warn!(key = %physical, error = %err, "Cache exists check failed");
            false
        })
    }

    // == Clear ==
    /// Removes every physical key matching `pattern` (a prefix, optional
    /// trailing `*`).
    pub fn clear(&self, pattern: &str) -> usize {
        self.backend.clear(pattern).unwrap_or_else(|err| {
            warn!(pattern, error = %err, "Cache clear failed");
            0
        })
    }

    /// Removes `key` and every sub-keyed entry under it.
    pub fn clear_family(&self, key: &str) -> usize {
        let own = usize::from(self.delete(&CacheKey::new(key)));
        own + self.clear(&CacheKey::family_prefix(key))
    }

    pub fn clear_all(&self) -> usize {
        self.clear("")
    }

    // == Remember ==
    /// Cache-aside read: returns the cached value, or runs `producer`,
    /// caches a `Some` result and returns it.
    ///
    /// Concurrent misses on one key may each run `producer`; the last write wins.
    pub fn remember<T, E, F>(&self, key: &CacheKey, ttl: Duration, producer: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<Option<T>, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(Some(value));
        }

        let produced = producer()?;
        if let Some(value) = &produced {
            self.set(key, value, ttl);
        }
        Ok(produced)
    }

    // == Cleanup Expired ==
    pub fn purge_expired(&self) -> usize {
        self.backend.purge_expired().unwrap_or_else(|err| {
            warn!(error = %err, "Cache purge failed");
            0
        })
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let total = self.backend.len().unwrap_or_else(|err| {
            warn!(error = %err, "Cache size unavailable");
            0
        });
        self.stats.snapshot(total)
    }

    fn heal(&self, physical: &str, reason: &str) {
        warn!(key = %physical, reason, "Discarding corrupt cache entry");
        self.stats.record_corrupt_recovery();
        self.stats.record_miss();
        if let Err(err) = self.backend.delete(physical) {
            warn!(key = %physical, error = %err, "Could not remove corrupt cache entry");
        }
    }
}
