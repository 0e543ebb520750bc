//! Configuration Module
//!
//! Handles loading and managing service configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::ledger::ActiveEventPolicy;

/// Which storage medium backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    Memory,
    File,
}

impl FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            other => Err(format!("unknown cache backend '{}'", other)),
        }
    }
}

/// Cache lifetimes and notification thresholds for the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardSettings {
    /// Full leaderboard TTL while any event is running
    pub ttl_active: Duration,
    /// Full leaderboard TTL otherwise
    pub ttl_idle: Duration,
    pub user_rank_ttl: Duration,
    pub stats_ttl: Duration,
    /// Entering or leaving this many top ranks is always notified
    pub notify_top_n: usize,
    /// Smallest rank movement notified outside the top-N boundary
    pub notify_rank_delta: usize,
}

impl Default for LeaderboardSettings {
    fn default() -> Self {
        Self {
            ttl_active: Duration::from_secs(30),
            ttl_idle: Duration::from_secs(300),
            user_rank_ttl: Duration::from_secs(60),
            stats_ttl: Duration::from_secs(120),
            notify_top_n: 10,
            notify_rank_delta: 5,
        }
    }
}

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    pub cache_backend: CacheBackendKind,
    /// Directory for the file cache backend
    pub cache_dir: PathBuf,
    /// Background purge interval in seconds
    pub cleanup_interval: u64,
    pub active_event_policy: ActiveEventPolicy,
    /// Optional JSON file with users, tournaments and events
    pub seed_file: Option<PathBuf>,
    pub leaderboard: LeaderboardSettings,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    Duration::from_secs(env_or(name, default.as_secs()))
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CACHE_BACKEND` - `memory` or `file` (default: memory)
    /// - `CACHE_DIR` - File cache directory (default: ./cache)
    /// - `CLEANUP_INTERVAL` - Expired entry purge frequency in seconds (default: 60)
    /// - `REQUIRE_ACTIVE_EVENT` - Only accept points during an event (default: false)
    /// - `SEED_FILE` - Reference data to load at startup (default: none)
    /// - `LEADERBOARD_TTL_ACTIVE_SECS` (30), `LEADERBOARD_TTL_IDLE_SECS` (300),
    ///   `USER_RANK_TTL_SECS` (60), `STATS_TTL_SECS` (120)
    /// - `NOTIFY_TOP_N` (10), `NOTIFY_RANK_DELTA` (5)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let lb = defaults.leaderboard;

        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cache_backend: env_or("CACHE_BACKEND", defaults.cache_backend),
            cache_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            active_event_policy: if env_or("REQUIRE_ACTIVE_EVENT", false) {
                ActiveEventPolicy::Required
            } else {
                ActiveEventPolicy::Disabled
            },
            seed_file: env::var("SEED_FILE").ok().map(PathBuf::from),
            leaderboard: LeaderboardSettings {
                ttl_active: env_secs("LEADERBOARD_TTL_ACTIVE_SECS", lb.ttl_active),
                ttl_idle: env_secs("LEADERBOARD_TTL_IDLE_SECS", lb.ttl_idle),
                user_rank_ttl: env_secs("USER_RANK_TTL_SECS", lb.user_rank_ttl),
                stats_ttl: env_secs("STATS_TTL_SECS", lb.stats_ttl),
                notify_top_n: env_or("NOTIFY_TOP_N", lb.notify_top_n),
                notify_rank_delta: env_or("NOTIFY_RANK_DELTA", lb.notify_rank_delta),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cache_backend: CacheBackendKind::Memory,
            cache_dir: PathBuf::from("cache"),
            cleanup_interval: 60,
            active_event_policy: ActiveEventPolicy::Disabled,
            seed_file: None,
            leaderboard: LeaderboardSettings::default(),
        }
    }
}
