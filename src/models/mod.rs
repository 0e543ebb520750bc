//! Request and Response models for the points API
//!
//! DTOs for query strings and response bodies that do not map one-to-one
//! onto domain types.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{AssignPointsRequest, ContextQuery, HistoryQuery, LeaderboardQuery, PeriodQuery};
pub use responses::{
    AssignResponse, CacheStatsResponse, ClearCacheResponse, HealthResponse, ResyncResponse,
    UserRankResponse,
};
