//! Leaderboard Service
//!
//! Cache-aside access to the ranking with activity-adaptive expiry,
//! write-through invalidation, and rank-change notification.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheStore};
use crate::config::LeaderboardSettings;
use crate::context::RequestContext;
use crate::error::LedgerError;
use crate::leaderboard::{significant_changes, Notifier, RankChange};
use crate::ledger::{Ledger, UserId};
use crate::ranking::{
    context_window, LeaderboardEntry, LeaderboardStats, PeriodEntry, RankCalculator, UserContext,
};

/// Full ranking, all users
pub const LEADERBOARD_KEY: &str = "leaderboard";
/// Per-user rank, sub-keyed by user id
pub const USER_RANK_KEY: &str = "user_rank";
/// Dashboard aggregate
pub const STATS_KEY: &str = "leaderboard_stats";

pub struct LeaderboardService {
    ledger: Arc<Ledger>,
    cache: Arc<CacheStore>,
    settings: LeaderboardSettings,
}

impl LeaderboardService {
    pub fn new(ledger: Arc<Ledger>, cache: Arc<CacheStore>, settings: LeaderboardSettings) -> Self {
        Self {
            ledger,
            cache,
            settings,
        }
    }

    // == TTL Policy ==
    /// Short while an event is live, long otherwise.
    pub fn leaderboard_ttl(&self) -> Duration {
        match self.ledger.has_active_event() {
            Ok(true) => self.settings.ttl_active,
            Ok(false) => self.settings.ttl_idle,
            Err(err) => {
                warn!(error = %err, "Could not check for active events, using idle TTL");
                self.settings.ttl_idle
            }
        }
    }

    // == Reads ==
    /// Top `limit` users, served from cache unless `force_refresh`.
    pub fn get_leaderboard(
        &self,
        limit: usize,
        force_refresh: bool,
    ) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        let mut ranking = if force_refresh {
            self.refresh_full_ranking()?
        } else {
            self.full_ranking()?
        };
        ranking.truncate(limit);
        Ok(ranking)
    }

    pub fn get_user_rank(&self, user_id: UserId) -> Result<Option<usize>, LedgerError> {
        let key = CacheKey::with_subkey(USER_RANK_KEY, user_id);
        self.cache.remember(&key, self.settings.user_rank_ttl, || {
            Ok::<_, LedgerError>(RankCalculator::new(self.ledger.standings()?).user_rank(user_id))
        })
    }

    pub fn get_user_context(
        &self,
        user_id: UserId,
        context_size: usize,
    ) -> Result<Option<UserContext>, LedgerError> {
        Ok(context_window(&self.full_ranking()?, user_id, context_size))
    }

    pub fn get_leaderboard_stats(&self) -> Result<LeaderboardStats, LedgerError> {
        let key = CacheKey::new(STATS_KEY);
        let stats = self.cache.remember(&key, self.settings.stats_ttl, || {
            Ok::<_, LedgerError>(Some(LeaderboardStats::from_ranking(&self.full_ranking()?)))
        })?;
        Ok(stats.unwrap_or_default())
    }

    /// Ranking scored only on points earned inside `[start, end]`.
    pub fn get_leaderboard_for_period(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PeriodEntry>, LedgerError> {
        if start > end {
            return Ok(Vec::new());
        }
        let period = self.ledger.period_standings(start, end)?;
        Ok(RankCalculator::ranking_for_window(period, Some(limit)))
    }

    // == Invalidation ==
    /// Drops the full ranking, every per-user rank and the dashboard aggregate.
    pub fn invalidate_leaderboard_caches(&self) -> usize {
        let removed = usize::from(self.cache.delete(&CacheKey::new(LEADERBOARD_KEY)))
            + self.cache.clear_family(USER_RANK_KEY)
            + usize::from(self.cache.delete(&CacheKey::new(STATS_KEY)));
        debug!(removed, "Invalidated leaderboard caches");
        removed
    }

    /// Administrative reset: every leaderboard key and all of its sub-keys.
    pub fn clear_cache(&self) -> usize {
        let removed: usize = [LEADERBOARD_KEY, USER_RANK_KEY, STATS_KEY]
            .into_iter()
            .map(|key| self.cache.clear_family(key))
            .sum();
        info!(removed, "Leaderboard cache cleared");
        removed
    }

    // == Point Change ==
    /// Recomputes the ranking after a balance change and notifies users
    /// whose rank moved significantly. Returns the changes notified.
    ///
    /// The full ranking is overwritten in place and never deleted first, so
    /// a concurrent caller always has a snapshot to diff against. If the
    /// recompute fails it is left as it was. Notification failures are
    /// logged and skipped.
    pub fn update_cache_after_point_change(
        &self,
        notifier: &dyn Notifier,
        ctx: &RequestContext,
    ) -> Result<Vec<RankChange>, LedgerError> {
        let previous: Option<Vec<LeaderboardEntry>> =
            self.cache.get(&CacheKey::new(LEADERBOARD_KEY));

        let removed = self.cache.clear_family(USER_RANK_KEY)
            + usize::from(self.cache.delete(&CacheKey::new(STATS_KEY)));
        debug!(request_id = %ctx.request_id, removed, "Dropped derived leaderboard entries");
        let current = self.refresh_full_ranking()?;

        let Some(previous) = previous else {
            debug!(request_id = %ctx.request_id, "No previous leaderboard snapshot to diff");
            return Ok(Vec::new());
        };

        let changes = significant_changes(
            &previous,
            &current,
            self.settings.notify_top_n,
            self.settings.notify_rank_delta,
        );

        for change in &changes {
            if let Err(err) =
                notifier.notify_rank_change(change.user_id, change.new_rank, change.previous_rank)
            {
                warn!(
                    request_id = %ctx.request_id,
                    user_id = %change.user_id,
                    error = %err,
                    "Rank change notification failed"
                );
            }
        }

        info!(
            request_id = %ctx.request_id,
            ranked_users = current.len(),
            notified = changes.len(),
            "Leaderboard refreshed after point change"
        );
        Ok(changes)
    }

    // == Internals ==
    // TTL lookup hits the store, so only pay for it on a miss
    fn full_ranking(&self) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        match self.cache.get(&CacheKey::new(LEADERBOARD_KEY)) {
            Some(ranking) => Ok(ranking),
            None => self.refresh_full_ranking(),
        }
    }

    fn refresh_full_ranking(&self) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        let ranking = self.compute_full_ranking()?;
        self.cache
            .set(&CacheKey::new(LEADERBOARD_KEY), &ranking, self.leaderboard_ttl());
        Ok(ranking)
    }

    fn compute_full_ranking(&self) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        Ok(RankCalculator::new(self.ledger.standings()?).full_ranking(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheBackend;
    use crate::clock::{Clock, ManualClock};
    use crate::error::NotifyError;
    use crate::error::StoreError;
    use crate::ledger::{
        ActiveEventPolicy, BalanceCorrection, Event, LedgerStore, MemoryLedgerStore, NewTransaction,
        PointAssignment, PointTransaction, Role, Standing, TournamentId, User,
    };
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Harness {
        store: Arc<MemoryLedgerStore>,
        clock: Arc<ManualClock>,
        ledger: Arc<Ledger>,
        cache: Arc<CacheStore>,
        service: LeaderboardService,
    }

    const ADMIN: UserId = UserId(1000);

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn setup(players: u64) -> Harness {
        let store = Arc::new(MemoryLedgerStore::new());
        store.insert_user(User {
            id: ADMIN,
            nickname: "admin".into(),
            role: Role::Admin,
            total_points: 0,
        });
        for id in 1..=players {
            store.insert_user(User {
                id: UserId(id),
                nickname: format!("player{}", id),
                role: Role::Player,
                total_points: 0,
            });
        }
        let clock = Arc::new(ManualClock::new(now()));
        let ledger = Arc::new(Ledger::new(store.clone(), clock.clone(), ActiveEventPolicy::Disabled));
        let cache = Arc::new(CacheStore::new(
            Arc::new(MemoryCacheBackend::new(clock.clone())),
            clock.clone(),
        ));
        let service = LeaderboardService::new(ledger.clone(), cache.clone(), LeaderboardSettings::default());
        Harness {
            store,
            clock,
            ledger,
            cache,
            service,
        }
    }

    fn earn(h: &Harness, user: u64, points: i64) {
        h.ledger
            .create(
                &RequestContext::new(),
                PointAssignment {
                    user_id: UserId(user),
                    points,
                    kind: "earned".into(),
                    source: "challenge".into(),
                    assigned_by: ADMIN,
                    tournament_id: None,
                    metadata: None,
                },
            )
            .unwrap();
        h.clock.advance(Duration::from_secs(1));
    }

    #[derive(Default)]
    struct RecordingNotifier {
        calls: Mutex<Vec<(UserId, usize, usize)>>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        fn notify_rank_change(&self, user_id: UserId, new_rank: usize, previous_rank: usize) -> Result<(), NotifyError> {
            self.calls.lock().unwrap().push((user_id, new_rank, previous_rank));
            if self.fail {
                Err(NotifyError::Delivery("push gateway down".into()))
            } else {
                Ok(())
            }
        }
    }

    /// Memory store that counts active-event lookups.
    struct CountingStore {
        inner: Arc<MemoryLedgerStore>,
        event_checks: AtomicUsize,
    }

    impl LedgerStore for CountingStore {
        fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
            self.inner.find_user(id)
        }

        fn user_ids(&self) -> Result<Vec<UserId>, StoreError> {
            self.inner.user_ids()
        }

        fn tournament_exists(&self, id: TournamentId) -> Result<bool, StoreError> {
            self.inner.tournament_exists(id)
        }

        fn has_active_event(&self, now: DateTime<Utc>) -> Result<bool, StoreError> {
            self.event_checks.fetch_add(1, Ordering::SeqCst);
            self.inner.has_active_event(now)
        }

        fn append(&self, tx: NewTransaction) -> Result<PointTransaction, StoreError> {
            self.inner.append(tx)
        }

        fn transactions_for_user(&self, id: UserId) -> Result<Vec<PointTransaction>, StoreError> {
            self.inner.transactions_for_user(id)
        }

        fn reconcile_balance(&self, id: UserId) -> Result<BalanceCorrection, StoreError> {
            self.inner.reconcile_balance(id)
        }

        fn standings(&self) -> Result<Vec<Standing>, StoreError> {
            self.inner.standings()
        }

        fn period_standings(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Standing>, StoreError> {
            self.inner.period_standings(start, end)
        }
    }

    #[test]
    fn test_get_leaderboard_is_cached() {
        let h = setup(3);
        earn(&h, 1, 10);
        earn(&h, 2, 20);

        let first = h.service.get_leaderboard(10, false).unwrap();
        // Bypass the service: the cached ranking is still served
        earn(&h, 3, 30);
        let second = h.service.get_leaderboard(10, false).unwrap();
        let fresh = h.service.get_leaderboard(10, true).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.len(), 2);
        assert_eq!(fresh.len(), 3);
        assert_eq!(fresh[0].user_id, UserId(3));
    }

    #[test]
    fn test_limit_truncates() {
        let h = setup(5);
        for id in 1..=5 {
            earn(&h, id, id as i64);
        }

        let top = h.service.get_leaderboard(2, false).unwrap();

        assert_eq!(top.iter().map(|e| e.user_id).collect::<Vec<_>>(), [UserId(5), UserId(4)]);
    }

    #[test]
    fn test_ttl_adapts_to_active_events() {
        let h = setup(1);
        assert_eq!(h.service.leaderboard_ttl(), Duration::from_secs(300));

        h.store.insert_event(Event {
            id: 1,
            name: "Expo".into(),
            starts_at: now(),
            ends_at: now() + chrono::TimeDelta::hours(1),
        });
        assert_eq!(h.service.leaderboard_ttl(), Duration::from_secs(30));

        earn(&h, 1, 5);
        h.service.get_leaderboard(10, false).unwrap();
        h.clock.advance(Duration::from_secs(31));
        assert!(!h.cache.exists(&CacheKey::new(LEADERBOARD_KEY)));
    }

    #[test]
    fn test_invalidation_forces_miss() {
        let h = setup(2);
        earn(&h, 1, 10);
        h.service.get_leaderboard(10, false).unwrap();
        h.service.get_user_rank(UserId(1)).unwrap();
        h.service.get_leaderboard_stats().unwrap();

        h.service.invalidate_leaderboard_caches();

        assert!(!h.cache.exists(&CacheKey::new(LEADERBOARD_KEY)));
        assert!(!h.cache.exists(&CacheKey::with_subkey(USER_RANK_KEY, 1)));
        assert!(!h.cache.exists(&CacheKey::new(STATS_KEY)));
    }

    #[test]
    fn test_user_rank_and_zero_points() {
        let h = setup(3);
        earn(&h, 1, 100);
        earn(&h, 2, 100);
        earn(&h, 3, 1);

        assert_eq!(h.service.get_user_rank(UserId(1)).unwrap(), Some(1));
        assert_eq!(h.service.get_user_rank(UserId(2)).unwrap(), Some(2));
        assert_eq!(h.service.get_user_rank(UserId(3)).unwrap(), Some(3));
        assert_eq!(h.service.get_user_rank(ADMIN).unwrap(), None);
        assert!(h.service.get_user_context(ADMIN, 2).unwrap().is_none());
    }

    #[test]
    fn test_update_after_point_change_notifies_significant_moves() {
        let h = setup(15);
        // player k gets 1000 - 10k, so rank == id
        for id in 1..=15 {
            earn(&h, id, 1000 - 10 * id as i64);
        }
        let before = h.service.get_leaderboard(100, false).unwrap();
        assert_eq!(before[14].user_id, UserId(15));

        // 850 + 125 = 975: between players 2 (980) and 3 (970)
        earn(&h, 15, 125);
        let notifier = RecordingNotifier::default();
        let changes = h
            .service
            .update_cache_after_point_change(&notifier, &RequestContext::new())
            .unwrap();

        let calls = notifier.calls.lock().unwrap().clone();
        assert!(calls.contains(&(UserId(15), 3, 15)));
        assert!(calls.contains(&(UserId(10), 11, 10)));
        assert!(!calls.iter().any(|(id, _, _)| *id == UserId(4)));
        assert_eq!(changes.len(), calls.len());
        assert_eq!(h.service.get_user_rank(UserId(15)).unwrap(), Some(3));
    }

    #[test]
    fn test_notification_failure_is_swallowed() {
        let h = setup(12);
        for id in 1..=12 {
            earn(&h, id, 100 - id as i64);
        }
        h.service.get_leaderboard(100, false).unwrap();
        earn(&h, 12, 500);

        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let changes = h
            .service
            .update_cache_after_point_change(&notifier, &RequestContext::new())
            .unwrap();

        assert!(!changes.is_empty());
        assert_eq!(h.service.get_leaderboard(1, false).unwrap()[0].user_id, UserId(12));
    }

    #[test]
    fn test_update_without_previous_snapshot() {
        let h = setup(2);
        earn(&h, 1, 10);
        let notifier = RecordingNotifier::default();

        let changes = h
            .service
            .update_cache_after_point_change(&notifier, &RequestContext::new())
            .unwrap();

        assert!(changes.is_empty());
        assert!(h.cache.exists(&CacheKey::new(LEADERBOARD_KEY)));
    }

    #[test]
    fn test_failed_refresh_keeps_previous_snapshot() {
        let h = setup(2);
        earn(&h, 1, 10);
        h.service.get_leaderboard(10, false).unwrap();
        h.service.get_user_rank(UserId(1)).unwrap();
        h.service.get_leaderboard_stats().unwrap();
        h.store.set_unavailable(true);

        let result = h
            .service
            .update_cache_after_point_change(&RecordingNotifier::default(), &RequestContext::new());

        assert!(result.is_err());
        assert!(h.cache.exists(&CacheKey::new(LEADERBOARD_KEY)));
        assert!(!h.cache.exists(&CacheKey::with_subkey(USER_RANK_KEY, 1)));
        assert!(!h.cache.exists(&CacheKey::new(STATS_KEY)));
    }

    #[test]
    fn test_consecutive_updates_diff_against_latest_snapshot() {
        let h = setup(12);
        for id in 1..=12 {
            earn(&h, id, 100 - id as i64);
        }
        h.service.get_leaderboard(100, false).unwrap();
        earn(&h, 12, 500);
        let notifier = RecordingNotifier::default();
        let ctx = RequestContext::new();

        let first = h.service.update_cache_after_point_change(&notifier, &ctx).unwrap();
        let second = h.service.update_cache_after_point_change(&notifier, &ctx).unwrap();

        assert!(!first.is_empty());
        assert!(second.is_empty());
        assert_eq!(notifier.calls.lock().unwrap().len(), first.len());
    }

    #[test]
    fn test_cached_reads_skip_event_lookup() {
        let h = setup(2);
        let counting = Arc::new(CountingStore {
            inner: h.store.clone(),
            event_checks: AtomicUsize::new(0),
        });
        let ledger = Arc::new(Ledger::new(counting.clone(), h.clock.clone(), ActiveEventPolicy::Disabled));
        let service = LeaderboardService::new(ledger, h.cache.clone(), LeaderboardSettings::default());
        earn(&h, 1, 10);

        service.get_leaderboard(10, false).unwrap();
        assert_eq!(counting.event_checks.load(Ordering::SeqCst), 1);

        for _ in 0..5 {
            service.get_leaderboard(10, false).unwrap();
            service.get_user_context(UserId(1), 2).unwrap();
        }
        h.store.set_unavailable(true);
        assert_eq!(service.get_leaderboard(10, false).unwrap().len(), 1);
        assert_eq!(counting.event_checks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stats_are_cached_aggregates() {
        let h = setup(3);
        earn(&h, 1, 10);
        earn(&h, 2, 30);

        let stats = h.service.get_leaderboard_stats().unwrap();

        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.highest_points, 30);
        assert_eq!(stats.average_points, 20.0);
        assert!(h.cache.exists(&CacheKey::new(STATS_KEY)));
    }

    #[test]
    fn test_period_excludes_points_before_start() {
        let h = setup(2);
        earn(&h, 1, 50);
        let start = h.clock.now();
        earn(&h, 2, 5);
        let end = h.clock.now();

        let period = h.service.get_leaderboard_for_period(start, end, 10).unwrap();

        assert_eq!(period.len(), 1);
        assert_eq!(period[0].user_id, UserId(2));
        assert_eq!(period[0].period_points, 5);
        assert!(h.service.get_leaderboard_for_period(end, start, 10).unwrap().is_empty());
    }

    #[test]
    fn test_storage_outage_surfaces_as_error() {
        let h = setup(1);
        h.store.set_unavailable(true);

        assert!(matches!(
            h.service.get_leaderboard(10, false),
            Err(LedgerError::Store(_))
        ));
        assert!(h.store.standings().is_err());
    }

    #[test]
    fn test_clear_cache() {
        let h = setup(2);
        earn(&h, 1, 10);
        h.service.get_leaderboard(10, false).unwrap();
        h.service.get_user_rank(UserId(1)).unwrap();

        assert!(h.service.clear_cache() >= 2);
        assert_eq!(h.cache.stats().total_entries, 0);
    }
}
