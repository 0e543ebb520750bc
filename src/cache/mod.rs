//! Cache Module
//!
//! Namespaced key/value caching with absolute per-entry expiry, over a
//! pluggable storage backend.

mod backend;
mod entry;
mod file;
mod key;
mod memory;
mod stats;
mod store;


// Re-export public types
pub use backend::CacheBackend;
pub use entry::CacheEntry;
pub use file::FileCacheBackend;
pub use key::{matches_pattern, CacheKey, SUBKEY_SEPARATOR};
pub use memory::MemoryCacheBackend;
pub use stats::{CacheStats, StatsCounters};
pub use store::CacheStore;

// == Public Constants ==
/// Maximum physical key length in bytes; hex file names must fit in 255 bytes
pub const MAX_KEY_LENGTH: usize = 120;
