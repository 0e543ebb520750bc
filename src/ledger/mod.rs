//! Ledger Module
//!
//! Append-only point transaction log and the per-user balance it feeds.

mod memory;
mod model;
mod service;
mod store;

pub use memory::{LedgerSeed, MemoryLedgerStore};
pub use model::{
    BalanceCorrection, Event, MalformedFields, NewTransaction, PointAssignment, PointSource, PointTransaction,
    PointsStats, Role, Standing, Tournament, TournamentId, TransactionId, TransactionType, User,
    UserId,
};
pub use service::{ActiveEventPolicy, Ledger, MAX_POINTS_PER_TRANSACTION};
pub use store::LedgerStore;
