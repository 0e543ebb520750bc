//! Rank change detection and notification.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::NotifyError;
use crate::ledger::UserId;
use crate::ranking::LeaderboardEntry;

/// Receives significant rank changes. Delivery is best-effort.
pub trait Notifier: Send + Sync {
    fn notify_rank_change(
        &self,
        user_id: UserId,
        new_rank: usize,
        previous_rank: usize,
    ) -> Result<(), NotifyError>;
}

/// Writes rank changes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_rank_change(
        &self,
        user_id: UserId,
        new_rank: usize,
        previous_rank: usize,
    ) -> Result<(), NotifyError> {
        info!(user_id = %user_id, new_rank, previous_rank, "Rank changed");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankChange {
    pub user_id: UserId,
    pub previous_rank: usize,
    pub new_rank: usize,
    /// Positive when the user moved up
    pub rank_change: i64,
}

impl RankChange {
    pub fn new(user_id: UserId, previous_rank: usize, new_rank: usize) -> Self {
        Self {
            user_id,
            previous_rank,
            new_rank,
            rank_change: previous_rank as i64 - new_rank as i64,
        }
    }

    /// Crossing the top-N boundary in either direction, or moving at least
    /// `min_delta` places.
    pub fn is_significant(&self, top_n: usize, min_delta: usize) -> bool {
        let was_top = self.previous_rank <= top_n;
        let is_top = self.new_rank <= top_n;
        was_top != is_top || self.rank_change.unsigned_abs() >= min_delta as u64
    }
}

/// Significant changes between two rankings, in current rank order.
///
/// Users missing from either snapshot are not compared.
pub fn significant_changes(
    previous: &[LeaderboardEntry],
    current: &[LeaderboardEntry],
    top_n: usize,
    min_delta: usize,
) -> Vec<RankChange> {
    let previous_ranks: HashMap<UserId, usize> =
        previous.iter().map(|e| (e.user_id, e.rank)).collect();

    current
        .iter()
        .filter_map(|entry| {
            previous_ranks
                .get(&entry.user_id)
                .map(|&previous_rank| RankChange::new(entry.user_id, previous_rank, entry.rank))
        })
        .filter(|change| change.is_significant(top_n, min_delta))
        .collect()
}
