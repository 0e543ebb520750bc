//! Rank Calculator
//!
//! Pure ranking over a standings snapshot. Order: points descending, then
//! earliest first point, then user id.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::{Standing, UserId};

// == Entries ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based
    pub rank: usize,
    pub user_id: UserId,
    pub nickname: String,
    pub total_points: i64,
    pub first_point_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodEntry {
    pub rank: usize,
    pub user_id: UserId,
    pub nickname: String,
    pub period_points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    #[serde(flatten)]
    pub entry: LeaderboardEntry,
    pub is_current_user: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_rank: usize,
    pub context: Vec<ContextEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardStats {
    pub total_users: usize,
    pub highest_points: i64,
    pub average_points: f64,
    pub lowest_points: i64,
    pub top3: Vec<LeaderboardEntry>,
}

impl LeaderboardStats {
    /// Aggregates over an already ordered ranking.
    pub fn from_ranking(ranking: &[LeaderboardEntry]) -> Self {
        if ranking.is_empty() {
            return Self::default();
        }

        let sum: i64 = ranking.iter().map(|e| e.total_points).sum();
        let average = sum as f64 / ranking.len() as f64;

        Self {
            total_users: ranking.len(),
            highest_points: ranking.first().map_or(0, |e| e.total_points),
            average_points: (average * 100.0).round() / 100.0,
            lowest_points: ranking.last().map_or(0, |e| e.total_points),
            top3: ranking.iter().take(3).cloned().collect(),
        }
    }
}

// == Comparator ==
/// Total order over standings; `Less` means `a` ranks above `b`.
pub fn compare_standings(a: &Standing, b: &Standing) -> Ordering {
    b.total_points
        .cmp(&a.total_points)
        .then_with(|| match (a.first_point_date, b.first_point_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.user_id.cmp(&b.user_id))
}

// == Rank Calculator ==
#[derive(Debug, Clone)]
pub struct RankCalculator {
    /// Ranked users only, unsorted
    standings: Vec<Standing>,
}

impl RankCalculator {
    /// Drops users without positive points.
    pub fn new(standings: Vec<Standing>) -> Self {
        Self {
            standings: standings
                .into_iter()
                .filter(|s| s.total_points > 0)
                .collect(),
        }
    }

    /// Top `limit` entries, or all of them when `limit` is `None`.
    pub fn full_ranking(&self, limit: Option<usize>) -> Vec<LeaderboardEntry> {
        let mut sorted: Vec<&Standing> = self.standings.iter().collect();
        sorted.sort_by(|a, b| compare_standings(a, b));

        sorted
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .enumerate()
            .map(|(idx, s)| LeaderboardEntry {
                rank: idx + 1,
                user_id: s.user_id,
                nickname: s.nickname.clone(),
                total_points: s.total_points,
                first_point_date: s.first_point_date,
            })
            .collect()
    }

    /// One plus the number of users ranked strictly above `user_id`.
    pub fn user_rank(&self, user_id: UserId) -> Option<usize> {
        let target = self.standings.iter().find(|s| s.user_id == user_id)?;
        let better = self
            .standings
            .iter()
            .filter(|s| compare_standings(s, target) == Ordering::Less)
            .count();
        Some(better + 1)
    }

    /// Ranks `[rank - window, rank + window]` around `user_id`.
    pub fn context(&self, user_id: UserId, window: usize) -> Option<UserContext> {
        context_window(&self.full_ranking(None), user_id, window)
    }

    /// Ranks standings scored over a time window.
    pub fn ranking_for_window(period: Vec<Standing>, limit: Option<usize>) -> Vec<PeriodEntry> {
        RankCalculator::new(period)
            .full_ranking(limit)
            .into_iter()
            .map(|e| PeriodEntry {
                rank: e.rank,
                user_id: e.user_id,
                nickname: e.nickname,
                period_points: e.total_points,
            })
            .collect()
    }

    pub fn stats(&self) -> LeaderboardStats {
        LeaderboardStats::from_ranking(&self.full_ranking(None))
    }
}

/// Slices an ordered ranking around `user_id`.
pub fn context_window(
    ranking: &[LeaderboardEntry],
    user_id: UserId,
    window: usize,
) -> Option<UserContext> {
    let position = ranking.iter().position(|e| e.user_id == user_id)?;
    let from = position.saturating_sub(window);
    let to = position.saturating_add(window).saturating_add(1).min(ranking.len());

    Some(UserContext {
        user_rank: ranking[position].rank,
        context: ranking[from..to]
            .iter()
            .map(|e| ContextEntry {
                entry: e.clone(),
                is_current_user: e.user_id == user_id,
            })
            .collect(),
    })
}
