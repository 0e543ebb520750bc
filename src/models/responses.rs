//! Response DTOs for the points API
//!
//! Defines the structure of outgoing HTTP response bodies that are not
//! domain types serialized as-is.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CacheStats;
use crate::leaderboard::RankChange;
use crate::ledger::{BalanceCorrection, TransactionId, UserId};

/// Response body for POST /points
#[derive(Debug, Clone, Serialize)]
pub struct AssignResponse {
    pub success: bool,
    pub transaction_id: TransactionId,
    /// Significant moves caused by this assignment
    pub rank_changes: Vec<RankChange>,
}

impl AssignResponse {
    pub fn new(transaction_id: TransactionId, rank_changes: Vec<RankChange>) -> Self {
        Self {
            success: true,
            transaction_id,
            rank_changes,
        }
    }
}

/// Response body for GET /users/:id/rank
#[derive(Debug, Clone, Serialize)]
pub struct UserRankResponse {
    pub user_id: UserId,
    pub rank: usize,
}

/// Response body for POST /users/:id/resync
#[derive(Debug, Clone, Serialize)]
pub struct ResyncResponse {
    pub user_id: UserId,
    pub previous_total: i64,
    pub total_points: i64,
    pub corrected: bool,
}

impl From<BalanceCorrection> for ResyncResponse {
    fn from(correction: BalanceCorrection) -> Self {
        Self {
            user_id: correction.user_id,
            previous_total: correction.previous,
            total_points: correction.current,
            corrected: correction.drifted(),
        }
    }
}

/// Response body for DELETE /cache
#[derive(Debug, Clone, Serialize)]
pub struct ClearCacheResponse {
    pub message: String,
    pub removed: usize,
}

impl ClearCacheResponse {
    pub fn new(removed: usize) -> Self {
        Self {
            message: format!("Leaderboard cache cleared ({} entries)", removed),
            removed,
        }
    }
}

/// Response body for GET /cache/stats
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for CacheStatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            stats,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Whether points are being awarded right now
    pub active_event: bool,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn healthy(active_event: bool, timestamp: DateTime<Utc>) -> Self {
        Self {
            status: "healthy".to_string(),
            active_event,
            timestamp,
        }
    }
}
