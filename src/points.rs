//! Point Assignment Workflow
//!
//! Records a transaction, then refreshes the leaderboard and notifies rank
//! changes. Nothing after the ledger commit can fail the assignment.

use std::sync::Arc;

use serde::Serialize;
use tracing::error;

use crate::context::RequestContext;
use crate::error::LedgerError;
use crate::leaderboard::{LeaderboardService, Notifier, RankChange};
use crate::ledger::{
    BalanceCorrection, Ledger, MalformedFields, PointAssignment, PointTransaction, UserId,
};

#[derive(Debug, Clone, Serialize)]
pub struct AssignOutcome {
    pub transaction: PointTransaction,
    pub rank_changes: Vec<RankChange>,
}

pub struct PointsService {
    ledger: Arc<Ledger>,
    leaderboard: Arc<LeaderboardService>,
    notifier: Arc<dyn Notifier>,
}

impl PointsService {
    pub fn new(
        ledger: Arc<Ledger>,
        leaderboard: Arc<LeaderboardService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            ledger,
            leaderboard,
            notifier,
        }
    }

    pub fn assign(
        &self,
        ctx: &RequestContext,
        assignment: PointAssignment,
    ) -> Result<AssignOutcome, LedgerError> {
        self.assign_with(ctx, assignment, MalformedFields::default())
    }

    /// Assigns points from a loosely decoded body, reporting `malformed`
    /// fields alongside the ledger's own checks.
    pub fn assign_with(
        &self,
        ctx: &RequestContext,
        assignment: PointAssignment,
        malformed: MalformedFields,
    ) -> Result<AssignOutcome, LedgerError> {
        let transaction = self.ledger.create_with(ctx, assignment, malformed)?;

        // Claims leave balances, and therefore rankings, untouched
        if !transaction.is_earned() {
            return Ok(AssignOutcome {
                transaction,
                rank_changes: Vec::new(),
            });
        }

        let rank_changes = self
            .leaderboard
            .update_cache_after_point_change(self.notifier.as_ref(), ctx)
            .unwrap_or_else(|err| {
                error!(
                    request_id = %ctx.request_id,
                    transaction_id = %transaction.id,
                    error = %err,
                    "Leaderboard refresh failed after committed point assignment"
                );
                // Do not leave a stale ranking behind
                self.leaderboard.invalidate_leaderboard_caches();
                Vec::new()
            });

        Ok(AssignOutcome {
            transaction,
            rank_changes,
        })
    }

    /// Reconciles one balance and refreshes cached rankings if it had drifted.
    pub fn resync(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
    ) -> Result<BalanceCorrection, LedgerError> {
        let correction = self.ledger.resync(user_id)?;
        if correction.drifted() {
            self.refresh_after_correction(ctx);
        }
        Ok(correction)
    }

    /// Reconciles every balance. Returns only the corrections that changed
    /// something.
    pub fn resync_all(&self, ctx: &RequestContext) -> Result<Vec<BalanceCorrection>, LedgerError> {
        let drifted = self.ledger.resync_all()?;
        if !drifted.is_empty() {
            self.refresh_after_correction(ctx);
        }
        Ok(drifted)
    }

    fn refresh_after_correction(&self, ctx: &RequestContext) {
        if let Err(err) = self
            .leaderboard
            .update_cache_after_point_change(self.notifier.as_ref(), ctx)
        {
            error!(request_id = %ctx.request_id, error = %err, "Leaderboard refresh failed after resync");
            self.leaderboard.invalidate_leaderboard_caches();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, CacheStore, MemoryCacheBackend};
    use crate::clock::ManualClock;
    use crate::config::LeaderboardSettings;
    use crate::leaderboard::{LogNotifier, LEADERBOARD_KEY};
    use crate::ledger::{ActiveEventPolicy, MemoryLedgerStore, Role, User};
    use chrono::{TimeZone, Utc};

    struct Harness {
        store: Arc<MemoryLedgerStore>,
        cache: Arc<CacheStore>,
        leaderboard: Arc<LeaderboardService>,
        points: PointsService,
    }

    fn setup() -> Harness {
        let store = Arc::new(MemoryLedgerStore::new());
        for (id, role) in [(1, Role::Player), (2, Role::Player), (9, Role::StandManager)] {
            store.insert_user(User {
                id: UserId(id),
                nickname: format!("user{}", id),
                role,
                total_points: 0,
            });
        }
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
        let ledger = Arc::new(Ledger::new(store.clone(), clock.clone(), ActiveEventPolicy::Disabled));
        let cache = Arc::new(CacheStore::new(Arc::new(MemoryCacheBackend::new(clock.clone())), clock));
        let leaderboard = Arc::new(LeaderboardService::new(
            ledger.clone(),
            cache.clone(),
            LeaderboardSettings::default(),
        ));
        let points = PointsService::new(ledger, leaderboard.clone(), Arc::new(LogNotifier));
        Harness {
            store,
            cache,
            leaderboard,
            points,
        }
    }

    fn assignment(user: u64, points: i64, kind: &str) -> PointAssignment {
        PointAssignment {
            user_id: UserId(user),
            points,
            kind: kind.into(),
            source: "bonus".into(),
            assigned_by: UserId(9),
            tournament_id: None,
            metadata: None,
        }
    }

    #[test]
    fn test_earned_assignment_refreshes_leaderboard() {
        let h = setup();
        let ctx = RequestContext::new();
        h.points.assign(&ctx, assignment(1, 10, "earned")).unwrap();
        assert_eq!(h.leaderboard.get_leaderboard(10, false).unwrap().len(), 1);

        h.points.assign(&ctx, assignment(2, 20, "earned")).unwrap();

        // Served from cache, yet already reflects the second write
        let top = h.leaderboard.get_leaderboard(10, false).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].user_id, UserId(2));
        assert_eq!(h.leaderboard.get_user_rank(UserId(1)).unwrap(), Some(2));
    }

    #[test]
    fn test_claimed_assignment_keeps_cache() {
        let h = setup();
        let ctx = RequestContext::new();
        h.points.assign(&ctx, assignment(1, 10, "earned")).unwrap();
        h.cache.set(&CacheKey::new(LEADERBOARD_KEY), &"marker", std::time::Duration::from_secs(60));

        let outcome = h.points.assign(&ctx, assignment(1, 5, "claimed")).unwrap();

        assert!(outcome.rank_changes.is_empty());
        assert_eq!(h.cache.get::<String>(&CacheKey::new(LEADERBOARD_KEY)).as_deref(), Some("marker"));
    }

    #[test]
    fn test_validation_failure_writes_nothing() {
        let h = setup();
        let err = h
            .points
            .assign(&RequestContext::new(), assignment(1, -3, "earned"))
            .unwrap_err();

        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(h.store.transaction_count(), 0);
    }

    #[test]
    fn test_resync_refreshes_rankings_on_drift() {
        let h = setup();
        let ctx = RequestContext::new();
        h.points.assign(&ctx, assignment(1, 10, "earned")).unwrap();
        h.store.force_total_points(UserId(1), 500);
        h.leaderboard.get_leaderboard(10, true).unwrap();

        let correction = h.points.resync(&ctx, UserId(1)).unwrap();

        assert!(correction.drifted());
        assert_eq!(h.leaderboard.get_leaderboard(10, false).unwrap()[0].total_points, 10);
    }

    #[test]
    fn test_resync_all_reports_only_drift() {
        let h = setup();
        let ctx = RequestContext::new();
        h.points.assign(&ctx, assignment(1, 10, "earned")).unwrap();
        h.points.assign(&ctx, assignment(2, 4, "earned")).unwrap();
        h.store.force_total_points(UserId(2), 40);
        h.leaderboard.get_leaderboard(10, true).unwrap();

        let drifted = h.points.resync_all(&ctx).unwrap();

        assert_eq!(drifted.len(), 1);
        assert_eq!(drifted[0].user_id, UserId(2));
        let top = h.leaderboard.get_leaderboard(10, false).unwrap();
        assert_eq!(top[0].user_id, UserId(1));
        assert!(h.points.resync_all(&ctx).unwrap().is_empty());
    }
}
