//! File-backed cache backend.
//!
//! One JSON record per physical key. File names are the hex encoding of the
//! key, so prefix clears can recover the key from the name.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::cache::key::matches_pattern;
use crate::cache::{CacheBackend, CacheEntry};
use crate::clock::Clock;
use crate::error::CacheError;

const RECORD_EXTENSION: &str = "json";

pub struct FileCacheBackend {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileCacheBackend {
    /// Opens (creating if needed) a cache directory.
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, clock })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for a physical key.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", hex::encode(key.as_bytes()), RECORD_EXTENSION))
    }

    fn read_record(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let raw = match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| CacheError::Corrupt {
                key: key.to_string(),
                reason: err.to_string(),
            })
    }

    /// Physical keys of every record file in the directory.
    fn stored_keys(&self) -> Result<Vec<String>, CacheError> {
        let mut keys = Vec::new();
        for dirent in fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let decoded = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| hex::decode(stem).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok());
            if let Some(key) = decoded {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn remove_file(&self, key: &str) -> Result<bool, CacheError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

impl CacheBackend for FileCacheBackend {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        match self.read_record(key)? {
            Some(entry) if entry.is_expired(self.clock.now()) => {
                self.remove_file(key)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let body = serde_json::to_string(&entry)?;
        // Write then rename so readers never observe a half-written record
        let tmp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, body)?;
        if let Err(err) = fs::rename(&tmp, self.path_for(key)) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.remove_file(key)
    }

    fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self
            .read_record(key)?
            .is_some_and(|entry| !entry.is_expired(self.clock.now())))
    }

    fn clear(&self, pattern: &str) -> Result<usize, CacheError> {
        let mut removed = 0;
        for key in self.stored_keys()? {
            if matches_pattern(&key, pattern) && self.remove_file(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = self.clock.now();
        let mut removed = 0;
        for key in self.stored_keys()? {
            let stale = match self.read_record(&key) {
                Ok(Some(entry)) => entry.is_expired(now),
                Ok(None) => false,
                Err(CacheError::Corrupt { .. }) => {
                    debug!(key = %key, "Purging unreadable cache record");
                    true
                }
                Err(err) => return Err(err),
            };
            if stale && self.remove_file(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn len(&self) -> Result<usize, CacheError> {
        Ok(self.stored_keys()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn setup() -> (tempfile::TempDir, Arc<ManualClock>, FileCacheBackend) {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let backend = FileCacheBackend::new(dir.path().join("cache"), clock.clone()).unwrap();
        (dir, clock, backend)
    }

    fn entry(clock: &ManualClock, data: &str, ttl: u64) -> CacheEntry {
        CacheEntry::new(data.to_string(), clock.now(), Duration::from_secs(ttl))
    }

    #[test]
    fn test_round_trip_through_disk() {
        let (_dir, clock, backend) = setup();
        let stored = entry(&clock, "[1,2,3]", 60);

        backend.set("leaderboard", stored.clone()).unwrap();

        assert_eq!(backend.get("leaderboard").unwrap(), Some(stored));
        assert!(backend.path_for("leaderboard").exists());
        assert_eq!(backend.len().unwrap(), 1);
    }

    #[test]
    fn test_expired_record_removed_on_read() {
        let (_dir, clock, backend) = setup();
        backend.set("k", entry(&clock, "x", 10)).unwrap();

        clock.advance(Duration::from_secs(11));

        assert!(backend.get("k").unwrap().is_none());
        assert!(!backend.path_for("k").exists());
    }

    #[test]
    fn test_corrupt_record_reported() {
        let (_dir, _clock, backend) = setup();
        fs::write(backend.path_for("k"), "{not json").unwrap();

        assert!(matches!(backend.get("k"), Err(CacheError::Corrupt { .. })));
        assert_eq!(backend.purge_expired().unwrap(), 1);
        assert_eq!(backend.len().unwrap(), 0);
    }

    #[test]
    fn test_clear_by_prefix_uses_decoded_names() {
        let (_dir, clock, backend) = setup();
        for key in ["user_rank::1", "user_rank::2", "user_ranking", "leaderboard"] {
            backend.set(key, entry(&clock, "x", 60)).unwrap();
        }

        assert_eq!(backend.clear("user_rank::").unwrap(), 2);
        assert!(backend.exists("user_ranking").unwrap());
        assert!(backend.exists("leaderboard").unwrap());
    }

    #[test]
    fn test_delete_missing_is_false() {
        let (_dir, _clock, backend) = setup();
        assert!(!backend.delete("nope").unwrap());
    }
}
