//! Cache Entry Module
//!
//! Defines the persisted record: serialized payload plus absolute expiry.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::add_duration;

// == Cache Entry ==
/// One record per physical key, in any storage medium.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Serialized payload
    pub data: String,
    pub created_at: DateTime<Utc>,
    /// Absolute wall-clock expiry
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry that expires `ttl` after `now`.
    pub fn new(data: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            data,
            created_at: now,
            expires_at: add_duration(now, ttl),
        }
    }

    // == Is Expired ==
    /// An entry is valid only while `now < expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    // == Time To Live ==
    /// Remaining lifetime, zero once expired.
    pub fn ttl_remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}
