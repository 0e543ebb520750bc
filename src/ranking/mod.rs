//! Ranking Module
//!
//! Deterministic leaderboard ordering computed from a standings snapshot.

mod calculator;


pub use calculator::{
    compare_standings, context_window, ContextEntry, LeaderboardEntry, LeaderboardStats,
    PeriodEntry, RankCalculator, UserContext,
};
