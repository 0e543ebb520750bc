//! Ledger Service
//!
//! Validates and records point transactions and derives balance aggregates
//! from the append-only log.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::context::RequestContext;
use crate::error::{LedgerError, StoreError, ValidationErrors};
use crate::ledger::{
    BalanceCorrection, LedgerStore, MalformedFields, NewTransaction, PointAssignment, PointSource,
    PointTransaction, PointsStats, Standing, TransactionType, UserId,
};

/// Largest amount a single transaction may carry.
pub const MAX_POINTS_PER_TRANSACTION: i64 = 10_000;

// == Active Event Policy ==
/// Whether point writes are restricted to the window of a running event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveEventPolicy {
    #[default]
    Disabled,
    Required,
}

// == Ledger ==
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    policy: ActiveEventPolicy,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, policy: ActiveEventPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    // == Create ==
    /// Validates `assignment` and appends it to the ledger.
    ///
    /// Every failed check is reported; nothing is written unless all pass.
    pub fn create(
        &self,
        ctx: &RequestContext,
        assignment: PointAssignment,
    ) -> Result<PointTransaction, LedgerError> {
        self.create_with(ctx, assignment, MalformedFields::default())
    }

    /// Like [`Ledger::create`], for an assignment decoded from a loosely typed
    /// body. Each malformed field is reported in place of its check.
    pub fn create_with(
        &self,
        ctx: &RequestContext,
        assignment: PointAssignment,
        malformed: MalformedFields,
    ) -> Result<PointTransaction, LedgerError> {
        let mut errors = ValidationErrors::new();

        if let Some(msg) = malformed.user_id {
            errors.push(msg);
        } else if self.store.find_user(assignment.user_id)?.is_none() {
            errors.push(format!("User {} does not exist", assignment.user_id));
        }

        if let Some(msg) = malformed.points {
            errors.push(msg);
        } else if assignment.points <= 0 {
            errors.push("Points must be a positive integer");
        } else if assignment.points > MAX_POINTS_PER_TRANSACTION {
            errors.push(format!(
                "Points cannot exceed {}",
                MAX_POINTS_PER_TRANSACTION
            ));
        }

        let kind = match malformed.kind {
            Some(msg) => {
                errors.push(msg);
                None
            }
            None => assignment
                .kind
                .parse::<TransactionType>()
                .map_err(|msg| errors.push(msg))
                .ok(),
        };
        let source = match malformed.source {
            Some(msg) => {
                errors.push(msg);
                None
            }
            None => assignment
                .source
                .parse::<PointSource>()
                .map_err(|msg| errors.push(msg))
                .ok(),
        };

        if let Some(msg) = malformed.assigned_by {
            errors.push(msg);
        } else {
            match self.store.find_user(assignment.assigned_by)? {
                None => errors.push(format!("Assigner {} does not exist", assignment.assigned_by)),
                Some(assigner) if !assigner.role.can_assign_points() => errors.push(format!(
                    "User {} is not allowed to assign points",
                    assignment.assigned_by
                )),
                Some(_) => {}
            }
        }

        if let Some(msg) = malformed.tournament_id {
            errors.push(msg);
        } else if let Some(tournament_id) = assignment.tournament_id {
            if !self.store.tournament_exists(tournament_id)? {
                errors.push(format!("Tournament {} does not exist", tournament_id));
            }
        }

        if let Some(msg) = malformed.metadata {
            errors.push(msg);
        }

        let now = self.clock.now();
        if self.policy == ActiveEventPolicy::Required && !self.store.has_active_event(now)? {
            errors.push("No active event: points can only be assigned during an event");
        }

        let (kind, source) = match (kind, source) {
            (Some(kind), Some(source)) if errors.is_empty() => (kind, source),
            _ => {
                warn!(
                    request_id = %ctx.request_id,
                    user_id = %assignment.user_id,
                    assigned_by = %assignment.assigned_by,
                    errors = %errors,
                    "Rejected point assignment"
                );
                return Err(LedgerError::Validation(errors));
            }
        };

        let transaction = self.store.append(NewTransaction {
            user_id: assignment.user_id,
            points: assignment.points,
            kind,
            source,
            tournament_id: assignment.tournament_id,
            assigned_by: assignment.assigned_by,
            timestamp: now,
            metadata: assignment.metadata.unwrap_or_default(),
        })?;

        info!(
            request_id = %ctx.request_id,
            transaction_id = %transaction.id,
            user_id = %transaction.user_id,
            points = transaction.points,
            kind = ?transaction.kind,
            "Recorded point transaction"
        );
        Ok(transaction)
    }

    // == Aggregates ==
    /// Sum of the user's earned points, derived from the ledger rather than
    /// the stored balance.
    pub fn get_user_total_points(&self, user_id: UserId) -> Result<i64, LedgerError> {
        Ok(self.get_user_points_stats(user_id)?.earned_points)
    }

    pub fn get_user_points_stats(&self, user_id: UserId) -> Result<PointsStats, LedgerError> {
        let user = self
            .store
            .find_user(user_id)?
            .ok_or(StoreError::UserNotFound(user_id))?;
        let transactions = self.store.transactions_for_user(user_id)?;
        Ok(PointsStats::from_transactions(&user, &transactions))
    }

    /// Most recent transactions first.
    pub fn user_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<PointTransaction>, LedgerError> {
        if self.store.find_user(user_id)?.is_none() {
            return Err(StoreError::UserNotFound(user_id).into());
        }
        let mut transactions = self.store.transactions_for_user(user_id)?;
        transactions.reverse();
        transactions.truncate(limit);
        Ok(transactions)
    }

    // == Reconciliation ==
    /// Overwrites the stored balance with the ledger-derived sum.
    pub fn resync(&self, user_id: UserId) -> Result<BalanceCorrection, LedgerError> {
        let correction = self.store.reconcile_balance(user_id)?;
        if correction.drifted() {
            warn!(
                user_id = %user_id,
                previous = correction.previous,
                current = correction.current,
                "Corrected drifted balance"
            );
        }
        Ok(correction)
    }

    /// Resyncs every user, returning only the balances that had drifted.
    pub fn resync_all(&self) -> Result<Vec<BalanceCorrection>, LedgerError> {
        let mut drifted = Vec::new();
        for user_id in self.store.user_ids()? {
            let correction = self.resync(user_id)?;
            if correction.drifted() {
                drifted.push(correction);
            }
        }
        info!(corrected = drifted.len(), "Balance reconciliation finished");
        Ok(drifted)
    }

    // == Read Model ==
    pub fn standings(&self) -> Result<Vec<Standing>, LedgerError> {
        Ok(self.store.standings()?)
    }

    pub fn period_standings(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Standing>, LedgerError> {
        Ok(self.store.period_standings(start, end)?)
    }

    pub fn has_active_event(&self) -> Result<bool, LedgerError> {
        Ok(self.store.has_active_event(self.clock.now())?)
    }
}
