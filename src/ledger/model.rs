//! Ledger Data Model
//!
//! Users, reference data, and the immutable point transaction record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// == Identifiers ==
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TournamentId(pub u64);

impl fmt::Display for TournamentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// == Role ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Player,
    Assistant,
    StandManager,
    Admin,
}

impl Role {
    /// Whether a user with this role may write point transactions.
    pub fn can_assign_points(self) -> bool {
        matches!(self, Role::Assistant | Role::StandManager | Role::Admin)
    }
}

// == User ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub nickname: String,
    pub role: Role,
    /// Denormalized running balance of earned points
    #[serde(default)]
    pub total_points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
}

// == Event ==
/// A time-bounded event; rankings churn faster while one is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl Event {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now <= self.ends_at
    }
}

// == Transaction Type ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Credits the user's balance
    Earned,
    /// Recorded for audit only; never touches the balance
    Claimed,
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earned" => Ok(Self::Earned),
            "claimed" => Ok(Self::Claimed),
            other => Err(format!(
                "Invalid transaction type '{}': expected earned or claimed",
                other
            )),
        }
    }
}

// == Point Source ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointSource {
    Tournament,
    Challenge,
    Bonus,
}

impl FromStr for PointSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tournament" => Ok(Self::Tournament),
            "challenge" => Ok(Self::Challenge),
            "bonus" => Ok(Self::Bonus),
            other => Err(format!(
                "Invalid source '{}': expected tournament, challenge or bonus",
                other
            )),
        }
    }
}

// == Point Assignment ==
/// Unvalidated request to record a point transaction.
///
/// `kind` and `source` stay as text so every problem with the request can be
/// reported in a single pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointAssignment {
    pub user_id: UserId,
    pub points: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub assigned_by: UserId,
    #[serde(default)]
    pub tournament_id: Option<TournamentId>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// Per-field problems found while decoding a loosely typed assignment body.
///
/// A populated slot replaces the matching check in [`Ledger::create_with`]
/// so the message lands in the same position of the error list.
///
/// [`Ledger::create_with`]: crate::ledger::Ledger::create_with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MalformedFields {
    pub user_id: Option<String>,
    pub points: Option<String>,
    pub kind: Option<String>,
    pub source: Option<String>,
    pub assigned_by: Option<String>,
    pub tournament_id: Option<String>,
    pub metadata: Option<String>,
}

impl MalformedFields {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A validated transaction ready to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub user_id: UserId,
    pub points: i64,
    pub kind: TransactionType,
    pub source: PointSource,
    pub tournament_id: Option<TournamentId>,
    pub assigned_by: UserId,
    pub timestamp: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

// == Point Transaction ==
/// One immutable ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointTransaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub points: i64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub source: PointSource,
    pub tournament_id: Option<TournamentId>,
    pub assigned_by: UserId,
    pub timestamp: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

impl PointTransaction {
    pub fn from_new(id: TransactionId, tx: NewTransaction) -> Self {
        Self {
            id,
            user_id: tx.user_id,
            points: tx.points,
            kind: tx.kind,
            source: tx.source,
            tournament_id: tx.tournament_id,
            assigned_by: tx.assigned_by,
            timestamp: tx.timestamp,
            metadata: tx.metadata,
        }
    }

    pub fn is_earned(&self) -> bool {
        self.kind == TransactionType::Earned
    }
}

// == Standing ==
/// Read-model row the ranking is computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub user_id: UserId,
    pub nickname: String,
    /// Balance, or points earned inside a window for period rankings
    pub total_points: i64,
    /// Earliest earned transaction in scope
    pub first_point_date: Option<DateTime<Utc>>,
}

// == Points Stats ==
/// Per-user aggregates derived from the ledger, for audit and reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsStats {
    pub user_id: UserId,
    /// Stored running balance
    pub balance: i64,
    /// Sum over earned transactions; equals `balance` when reconciled
    pub earned_points: i64,
    pub claimed_points: i64,
    pub tournament_points: i64,
    pub challenge_points: i64,
    pub bonus_points: i64,
    pub transaction_count: usize,
    pub first_earned_at: Option<DateTime<Utc>>,
    pub last_earned_at: Option<DateTime<Utc>>,
}

impl PointsStats {
    /// Folds a user's transactions into per-source totals.
    pub fn from_transactions(user: &User, transactions: &[PointTransaction]) -> Self {
        let mut stats = Self {
            user_id: user.id,
            balance: user.total_points,
            transaction_count: transactions.len(),
            ..Self::default()
        };

        for tx in transactions {
            match tx.kind {
                TransactionType::Claimed => stats.claimed_points += tx.points,
                TransactionType::Earned => {
                    stats.earned_points += tx.points;
                    match tx.source {
                        PointSource::Tournament => stats.tournament_points += tx.points,
                        PointSource::Challenge => stats.challenge_points += tx.points,
                        PointSource::Bonus => stats.bonus_points += tx.points,
                    }
                    stats.first_earned_at = Some(match stats.first_earned_at {
                        Some(first) => first.min(tx.timestamp),
                        None => tx.timestamp,
                    });
                    stats.last_earned_at = Some(match stats.last_earned_at {
                        Some(last) => last.max(tx.timestamp),
                        None => tx.timestamp,
                    });
                }
            }
        }

        stats
    }

    pub fn is_reconciled(&self) -> bool {
        self.balance == self.earned_points
    }
}

/// Balance before and after a resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceCorrection {
    pub user_id: UserId,
    pub previous: i64,
    pub current: i64,
}

impl BalanceCorrection {
    pub fn drifted(&self) -> bool {
        self.previous != self.current
    }
}
