//! Request Context
//!
//! Per-request identity carried explicitly through the write path.

use uuid::Uuid;

use crate::ledger::UserId;

/// Identifies one request as it flows through the ledger and leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: Uuid,
    /// The authenticated caller, when the surrounding layer knows it
    pub actor: Option<UserId>,
}

impl RequestContext {
    /// Creates a context with a fresh request id.
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            actor: None,
        }
    }

    pub fn with_actor(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
