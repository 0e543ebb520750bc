//! Request DTOs for the points API
//!
//! Query strings accepted by the read endpoints and the loosely typed body
//! of POST /points.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::ledger::{MalformedFields, PointAssignment, TournamentId, UserId};

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
pub const MAX_LEADERBOARD_LIMIT: usize = 100;
pub const DEFAULT_CONTEXT_SIZE: usize = 2;
pub const MAX_CONTEXT_SIZE: usize = 25;
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Checks a page size against `1..=max`.
fn check_limit(name: &str, value: usize, max: usize) -> Option<String> {
    if value == 0 || value > max {
        Some(format!("{} must be between 1 and {}", name, max))
    } else {
        None
    }
}

// == Assign Points Request ==
/// Body for POST /points.
///
/// Every field is taken as raw JSON so that a wrong type is reported next to
/// the other validation messages instead of rejecting the whole body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignPointsRequest {
    #[serde(default)]
    pub user_id: Value,
    #[serde(default)]
    pub points: Value,
    #[serde(default, rename = "type")]
    pub kind: Value,
    #[serde(default)]
    pub source: Value,
    #[serde(default)]
    pub assigned_by: Value,
    #[serde(default)]
    pub tournament_id: Value,
    #[serde(default)]
    pub metadata: Value,
}

impl AssignPointsRequest {
    /// Splits the body into a typed assignment and the fields that could not
    /// be decoded. Undecodable fields hold placeholders in the assignment.
    pub fn into_assignment(self) -> (PointAssignment, MalformedFields) {
        let mut malformed = MalformedFields::default();

        let user_id = id_field("user_id", &self.user_id)
            .map_err(|msg| malformed.user_id = Some(msg))
            .unwrap_or_default();
        let points = points_field(&self.points)
            .map_err(|msg| malformed.points = Some(msg))
            .unwrap_or_default();
        let kind = text_field("type", self.kind)
            .map_err(|msg| malformed.kind = Some(msg))
            .unwrap_or_default();
        let source = text_field("source", self.source)
            .map_err(|msg| malformed.source = Some(msg))
            .unwrap_or_default();
        let assigned_by = id_field("assigned_by", &self.assigned_by)
            .map_err(|msg| malformed.assigned_by = Some(msg))
            .unwrap_or_default();

        let tournament_id = match &self.tournament_id {
            Value::Null => None,
            value => id_field("tournament_id", value)
                .map(TournamentId)
                .map_err(|msg| malformed.tournament_id = Some(msg))
                .ok(),
        };
        let metadata = match self.metadata {
            Value::Null => None,
            Value::Object(map) => Some(map),
            other => {
                malformed.metadata = Some(format!("Invalid metadata {}: expected an object", other));
                None
            }
        };

        let assignment = PointAssignment {
            user_id: UserId(user_id),
            points,
            kind,
            source,
            assigned_by: UserId(assigned_by),
            tournament_id,
            metadata,
        };
        (assignment, malformed)
    }
}

fn id_field(name: &str, value: &Value) -> Result<u64, String> {
    match value {
        Value::Null => Err(format!("{} is required", name)),
        other => other
            .as_u64()
            .ok_or_else(|| format!("Invalid {} {}: expected a non-negative integer id", name, other)),
    }
}

/// Integers beyond `i64` saturate so the upper-bound check reports them.
fn points_field(value: &Value) -> Result<i64, String> {
    match value {
        Value::Null => Err("points is required".to_string()),
        other => other
            .as_i64()
            .or_else(|| other.as_u64().map(|_| i64::MAX))
            .ok_or_else(|| "Points must be a positive integer".to_string()),
    }
}

/// Non-string values are kept as their JSON text so the enum parser names them.
fn text_field(name: &str, value: Value) -> Result<String, String> {
    match value {
        Value::Null => Err(format!("{} is required", name)),
        Value::String(text) => Ok(text),
        other => Ok(other.to_string()),
    }
}

/// Query for GET /leaderboard
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    /// Bypass the cached ranking
    #[serde(default)]
    pub refresh: bool,
}

impl LeaderboardQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
    }

    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        check_limit("limit", self.limit(), MAX_LEADERBOARD_LIMIT)
    }
}

/// Query for GET /leaderboard/period
#[derive(Debug, Clone, Deserialize)]
pub struct PeriodQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl PeriodQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
    }

    pub fn validate(&self) -> Option<String> {
        check_limit("limit", self.limit(), MAX_LEADERBOARD_LIMIT)
    }
}

/// Query for GET /users/:id/context
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextQuery {
    /// Neighbours shown on each side of the user
    #[serde(default)]
    pub size: Option<usize>,
}

impl ContextQuery {
    pub fn size(&self) -> usize {
        self.size.unwrap_or(DEFAULT_CONTEXT_SIZE)
    }

    pub fn validate(&self) -> Option<String> {
        if self.size() > MAX_CONTEXT_SIZE {
            Some(format!("size must be at most {}", MAX_CONTEXT_SIZE))
        } else {
            None
        }
    }
}

/// Query for GET /users/:id/history
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)
    }

    pub fn validate(&self) -> Option<String> {
        check_limit("limit", self.limit(), MAX_LEADERBOARD_LIMIT)
    }
}
