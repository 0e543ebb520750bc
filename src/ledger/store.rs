//! Ledger Store
//!
//! Persistence seam for the `users` and `point_transactions` tables.

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::ledger::{
    BalanceCorrection, NewTransaction, PointTransaction, Standing, TournamentId, User, UserId,
};

/// Relational collaborator behind the ledger.
///
/// `append` and `reconcile_balance` are each a single all-or-nothing unit:
/// an implementation must either apply every change they describe or none.
pub trait LedgerStore: Send + Sync {
    fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    fn user_ids(&self) -> Result<Vec<UserId>, StoreError>;

    fn tournament_exists(&self, id: TournamentId) -> Result<bool, StoreError>;

    /// Whether any time-bounded event covers `now`.
    fn has_active_event(&self, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Inserts the transaction and, for earned points, increments the owner's
    /// balance by `points` in the same unit.
    fn append(&self, tx: NewTransaction) -> Result<PointTransaction, StoreError>;

    /// All transactions of a user in insertion order.
    fn transactions_for_user(&self, id: UserId) -> Result<Vec<PointTransaction>, StoreError>;

    /// Overwrites the stored balance with the sum of the user's earned points.
    fn reconcile_balance(&self, id: UserId) -> Result<BalanceCorrection, StoreError>;

    /// Users with a positive balance and their earliest earned timestamp.
    fn standings(&self) -> Result<Vec<Standing>, StoreError>;

    /// Users with earned points inside `[start, end]`, scored on those points only.
    fn period_standings(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Standing>, StoreError>;
}
