//! Leaderboard Module
//!
//! Cached ranking reads, invalidation and rank-change notification.

mod notify;
mod service;

pub use notify::{significant_changes, LogNotifier, Notifier, RankChange};
pub use service::{LeaderboardService, LEADERBOARD_KEY, STATS_KEY, USER_RANK_KEY};
