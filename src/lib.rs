//! Points Leaderboard - points ledger and cached ranking service
//!
//! Records point transactions, ranks users deterministically, and serves
//! the ranking through a namespaced cache with activity-adaptive expiry.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod leaderboard;
pub mod ledger;
mod lock;
pub mod models;
pub mod points;
pub mod ranking;
pub mod tasks;

pub use api::{create_router, AppState};
pub use config::Config;
pub use points::{AssignOutcome, PointsService};
pub use tasks::spawn_cleanup_task;
