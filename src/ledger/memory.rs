//! In-Memory Ledger Store
//!
//! All tables sit behind a single lock, so every write is one critical
//! section and therefore all-or-nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::ledger::{
    BalanceCorrection, Event, LedgerStore, NewTransaction, PointTransaction, Standing,
    Tournament, TournamentId, TransactionId, TransactionType, User, UserId,
};
use crate::lock::{rw_read, rw_write};

// == Seed ==
/// Reference data loaded at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSeed {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub tournaments: Vec<Tournament>,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    tournaments: BTreeMap<TournamentId, Tournament>,
    events: Vec<Event>,
    transactions: Vec<PointTransaction>,
    next_transaction_id: u64,
}

// == Memory Ledger Store ==
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    tables: RwLock<Tables>,
    /// Simulated outage switch
    unavailable: AtomicBool,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: LedgerSeed) -> Self {
        let store = Self::new();
        for user in seed.users {
            store.insert_user(user);
        }
        for tournament in seed.tournaments {
            store.insert_tournament(tournament);
        }
        for event in seed.events {
            store.insert_event(event);
        }
        store
    }

    pub fn insert_user(&self, user: User) {
        rw_write(&self.tables, "insert_user").users.insert(user.id, user);
    }

    pub fn insert_tournament(&self, tournament: Tournament) {
        rw_write(&self.tables, "insert_tournament")
            .tournaments
            .insert(tournament.id, tournament);
    }

    pub fn insert_event(&self, event: Event) {
        rw_write(&self.tables, "insert_event").events.push(event);
    }

    /// Writes a balance directly, bypassing the ledger, as an external
    /// writer could.
    pub fn force_total_points(&self, id: UserId, total_points: i64) {
        if let Some(user) = rw_write(&self.tables, "force_total_points").users.get_mut(&id) {
            user.total_points = total_points;
        }
    }

    /// Makes every subsequent call fail with `StoreError::Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn transaction_count(&self) -> usize {
        rw_read(&self.tables, "transaction_count").transactions.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("ledger store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

fn earned_sum(transactions: &[PointTransaction], id: UserId) -> i64 {
    transactions
        .iter()
        .filter(|tx| tx.user_id == id && tx.is_earned())
        .map(|tx| tx.points)
        .sum()
}

impl LedgerStore for MemoryLedgerStore {
    fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.check_available()?;
        Ok(rw_read(&self.tables, "find_user").users.get(&id).cloned())
    }

    fn user_ids(&self) -> Result<Vec<UserId>, StoreError> {
        self.check_available()?;
        Ok(rw_read(&self.tables, "user_ids").users.keys().copied().collect())
    }

    fn tournament_exists(&self, id: TournamentId) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(rw_read(&self.tables, "tournament_exists")
            .tournaments
            .contains_key(&id))
    }

    fn has_active_event(&self, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(rw_read(&self.tables, "has_active_event")
            .events
            .iter()
            .any(|event| event.is_active(now)))
    }

    fn append(&self, tx: NewTransaction) -> Result<PointTransaction, StoreError> {
        self.check_available()?;
        let mut tables = rw_write(&self.tables, "append");

        // Resolve the balance change before touching either table.
        let new_balance = {
            let user = tables
                .users
                .get(&tx.user_id)
                .ok_or(StoreError::UserNotFound(tx.user_id))?;
            match tx.kind {
                TransactionType::Earned => Some(
                    user.total_points
                        .checked_add(tx.points)
                        .ok_or(StoreError::BalanceOverflow(tx.user_id))?,
                ),
                TransactionType::Claimed => None,
            }
        };

        tables.next_transaction_id += 1;
        let id = TransactionId(tables.next_transaction_id);
        let user_id = tx.user_id;
        let record = PointTransaction::from_new(id, tx);
        tables.transactions.push(record.clone());

        if let Some(balance) = new_balance {
            if let Some(user) = tables.users.get_mut(&user_id) {
                user.total_points = balance;
            }
        }

        debug!(transaction_id = %id, user_id = %user_id, "Appended point transaction");
        Ok(record)
    }

    fn transactions_for_user(&self, id: UserId) -> Result<Vec<PointTransaction>, StoreError> {
        self.check_available()?;
        Ok(rw_read(&self.tables, "transactions_for_user")
            .transactions
            .iter()
            .filter(|tx| tx.user_id == id)
            .cloned()
            .collect())
    }

    fn reconcile_balance(&self, id: UserId) -> Result<BalanceCorrection, StoreError> {
        self.check_available()?;
        let mut tables = rw_write(&self.tables, "reconcile_balance");
        let current = earned_sum(&tables.transactions, id);
        let user = tables
            .users
            .get_mut(&id)
            .ok_or(StoreError::UserNotFound(id))?;
        let previous = user.total_points;
        user.total_points = current;

        Ok(BalanceCorrection {
            user_id: id,
            previous,
            current,
        })
    }

    fn standings(&self) -> Result<Vec<Standing>, StoreError> {
        self.check_available()?;
        let tables = rw_read(&self.tables, "standings");

        let mut first_earned: HashMap<UserId, DateTime<Utc>> = HashMap::new();
        for tx in tables.transactions.iter().filter(|tx| tx.is_earned()) {
            first_earned
                .entry(tx.user_id)
                .and_modify(|first| *first = (*first).min(tx.timestamp))
                .or_insert(tx.timestamp);
        }

        Ok(tables
            .users
            .values()
            .filter(|user| user.total_points > 0)
            .map(|user| Standing {
                user_id: user.id,
                nickname: user.nickname.clone(),
                total_points: user.total_points,
                first_point_date: first_earned.get(&user.id).copied(),
            })
            .collect())
    }

    fn period_standings(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Standing>, StoreError> {
        self.check_available()?;
        let tables = rw_read(&self.tables, "period_standings");

        let mut totals: BTreeMap<UserId, (i64, DateTime<Utc>)> = BTreeMap::new();
        for tx in tables
            .transactions
            .iter()
            .filter(|tx| tx.is_earned() && start <= tx.timestamp && tx.timestamp <= end)
        {
            totals
                .entry(tx.user_id)
                .and_modify(|(points, first)| {
                    *points += tx.points;
                    *first = (*first).min(tx.timestamp);
                })
                .or_insert((tx.points, tx.timestamp));
        }

        Ok(totals
            .into_iter()
            .filter(|(_, (points, _))| *points > 0)
            .filter_map(|(user_id, (points, first))| {
                tables.users.get(&user_id).map(|user| Standing {
                    user_id,
                    nickname: user.nickname.clone(),
                    total_points: points,
                    first_point_date: Some(first),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{PointSource, Role};
    use chrono::TimeZone;
    use serde_json::Map;

    fn user(id: u64, total_points: i64) -> User {
        User {
            id: UserId(id),
            nickname: format!("user{}", id),
            role: Role::Player,
            total_points,
        }
    }

    fn earned(user_id: u64, points: i64, hour: u32) -> NewTransaction {
        NewTransaction {
            user_id: UserId(user_id),
            points,
            kind: TransactionType::Earned,
            source: PointSource::Challenge,
            tournament_id: None,
            assigned_by: UserId(100),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap(),
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_append_increments_earned_balance() {
        let store = MemoryLedgerStore::new();
        store.insert_user(user(1, 0));

        let tx = store.append(earned(1, 40, 10)).unwrap();
        store.append(earned(1, 2, 11)).unwrap();

        assert_eq!(tx.id, TransactionId(1));
        assert_eq!(store.find_user(UserId(1)).unwrap().unwrap().total_points, 42);
    }

    #[test]
    fn test_claimed_does_not_touch_balance() {
        let store = MemoryLedgerStore::new();
        store.insert_user(user(1, 10));

        let mut claim = earned(1, 5, 10);
        claim.kind = TransactionType::Claimed;
        store.append(claim).unwrap();

        assert_eq!(store.find_user(UserId(1)).unwrap().unwrap().total_points, 10);
        assert_eq!(store.transaction_count(), 1);
    }

    #[test]
    fn test_failed_append_leaves_no_trace() {
        let store = MemoryLedgerStore::new();
        store.insert_user(user(1, i64::MAX - 1));

        let result = store.append(earned(1, 10, 10));
        assert!(matches!(result, Err(StoreError::BalanceOverflow(_))));

        let result = store.append(earned(2, 10, 10));
        assert!(matches!(result, Err(StoreError::UserNotFound(_))));

        assert_eq!(store.transaction_count(), 0);
        assert_eq!(
            store.find_user(UserId(1)).unwrap().unwrap().total_points,
            i64::MAX - 1
        );
    }

    #[test]
    fn test_concurrent_appends_to_one_user() {
        use std::collections::HashSet;
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryLedgerStore::new());
        store.insert_user(user(1, 0));

        let handles: Vec<_> = (0..8)
            .map(|writer| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..50)
                        .map(|_| store.append(earned(1, writer + 1, 10)).unwrap().id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let ids: Vec<TransactionId> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();

        // 50 * (1 + 2 + ... + 8)
        assert_eq!(store.find_user(UserId(1)).unwrap().unwrap().total_points, 1800);
        assert_eq!(store.transaction_count(), 400);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 400);
        assert!(!store.reconcile_balance(UserId(1)).unwrap().drifted());
    }

    #[test]
    fn test_unavailable_store_rejects_calls() {
        let store = MemoryLedgerStore::new();
        store.insert_user(user(1, 0));
        store.set_unavailable(true);

        assert!(matches!(store.find_user(UserId(1)), Err(StoreError::Unavailable(_))));
        assert!(store.append(earned(1, 1, 10)).is_err());

        store.set_unavailable(false);
        assert_eq!(store.transaction_count(), 0);
    }

    #[test]
    fn test_reconcile_overwrites_drifted_balance() {
        let store = MemoryLedgerStore::new();
        store.insert_user(user(1, 0));
        store.append(earned(1, 30, 10)).unwrap();
        store.force_total_points(UserId(1), 999);

        let correction = store.reconcile_balance(UserId(1)).unwrap();

        assert_eq!(correction.previous, 999);
        assert_eq!(correction.current, 30);
        assert!(correction.drifted());
        assert_eq!(store.find_user(UserId(1)).unwrap().unwrap().total_points, 30);
    }

    #[test]
    fn test_standings_exclude_zero_balances() {
        let store = MemoryLedgerStore::new();
        store.insert_user(user(1, 0));
        store.insert_user(user(2, 0));
        store.append(earned(1, 5, 12)).unwrap();
        store.append(earned(1, 5, 9)).unwrap();

        let standings = store.standings().unwrap();

        assert_eq!(standings.len(), 1);
        assert_eq!(standings[0].user_id, UserId(1));
        assert_eq!(standings[0].total_points, 10);
        assert_eq!(
            standings[0].first_point_date,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_period_standings_only_count_window() {
        let store = MemoryLedgerStore::new();
        store.insert_user(user(1, 0));
        store.insert_user(user(2, 0));
        store.append(earned(1, 50, 8)).unwrap();
        store.append(earned(2, 10, 12)).unwrap();
        store.append(earned(2, 15, 14)).unwrap();

        let start = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 14, 0, 0).unwrap();
        let standings = store.period_standings(start, end).unwrap();

        assert_eq!(standings.len(), 1);
        assert_eq!(standings[0].user_id, UserId(2));
        assert_eq!(standings[0].total_points, 25);
        assert_eq!(
            standings[0].first_point_date,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_seed_loads_reference_data() {
        let seed: LedgerSeed = serde_json::from_str(
            r#"{
                "users": [{"id": 1, "nickname": "ana", "role": "admin"}],
                "tournaments": [{"id": 3, "name": "Open"}],
                "events": [{"id": 1, "name": "Expo", "starts_at": "2024-06-01T09:00:00Z", "ends_at": "2024-06-01T18:00:00Z"}]
            }"#,
        )
        .unwrap();
        let store = MemoryLedgerStore::from_seed(seed);

        assert!(store.find_user(UserId(1)).unwrap().is_some());
        assert!(store.tournament_exists(TournamentId(3)).unwrap());
        assert!(store
            .has_active_event(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
            .unwrap());
    }
}
