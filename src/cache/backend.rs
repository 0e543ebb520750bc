//! Cache storage seam.

use crate::cache::CacheEntry;
use crate::error::CacheError;

/// Raw storage medium behind `CacheStore`, addressed by physical key.
///
/// Implementations own expiry: an entry whose `expires_at` has passed is
/// reported as absent by `get` and `exists`, and `get` removes it.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;

    /// Returns whether something was removed.
    fn delete(&self, key: &str) -> Result<bool, CacheError>;

    fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Removes every key matching the pattern, returning how many were removed.
    fn clear(&self, pattern: &str) -> Result<usize, CacheError>;

    /// Physically removes expired entries.
    fn purge_expired(&self) -> Result<usize, CacheError>;

    /// Entries physically present.
    fn len(&self) -> Result<usize, CacheError>;
}
