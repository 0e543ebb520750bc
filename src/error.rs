//! Error types for the points ledger and leaderboard
//!
//! Provides one thiserror enum per boundary plus the HTTP-facing `AppError`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ledger::UserId;

// == Cache Error Enum ==
/// Failures raised by a cache backend.
///
/// None of these ever reach a caller of the leaderboard: the `Cache` façade
/// degrades them to misses.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Stored record could not be parsed
    #[error("Corrupt cache entry '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// Payload could not be serialized
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying storage medium failed
    #[error("Cache storage error: {0}")]
    Io(#[from] std::io::Error),
}

// == Store Error Enum ==
/// Failures raised by the relational collaborator behind the ledger.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("User {0} does not exist")]
    UserNotFound(UserId),

    #[error("Balance overflow for user {0}")]
    BalanceOverflow(UserId),
}

// == Validation Errors ==
/// Ordered list of discrete validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }

    pub fn into_messages(self) -> Vec<String> {
        self.0
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("; "))
    }
}

// == Ledger Error Enum ==
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Expected failure: bad input, unauthorized assigner, dangling reference
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Unexpected failure: the store could not complete the operation
    #[error(transparent)]
    Store(#[from] StoreError),
}

// == Notify Error Enum ==
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

// == App Error Enum ==
/// Error type returned by HTTP handlers.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(Vec<String>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation(errors) => AppError::Validation(errors.into_messages()),
            LedgerError::Store(StoreError::UserNotFound(id)) => {
                AppError::NotFound(format!("User {} does not exist", id))
            }
            LedgerError::Store(other) => AppError::Internal(other.to_string()),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "success": false, "errors": errors })),
            )
                .into_response(),
            AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": msg }))).into_response()
            }
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for HTTP handlers.
pub type Result<T> = std::result::Result<T, AppError>;
