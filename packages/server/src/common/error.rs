use thiserror::Error;

use crate::common::JoinRequestId;
use crate::domains::join_requests::models::JoinRequestStatus;

/// Errors a lifecycle operation surfaces to its caller.
///
/// Every message names who may do what, so the HTTP layer can forward it
/// verbatim.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Invalid transition for request {id}: cannot go from {from} to {to}")]
    InvalidTransition {
        id: JoinRequestId,
        from: JoinRequestStatus,
        to: JoinRequestStatus,
    },

    #[error("Not eligible: {0}")]
    NotEligible(String),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Join request {0} not found")]
    NotFound(JoinRequestId),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl LifecycleError {
    pub fn not_eligible(reason: impl Into<String>) -> Self {
        Self::NotEligible(reason.into())
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }
}

/// A best-effort notification that did not go out.
///
/// Never propagates past the orchestrator; it only exists so failures are
/// logged with a consistent shape.
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("{channel} notification to {target} failed: {source}")]
    Failed {
        channel: &'static str,
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{channel} notification to {target} timed out after {timeout_ms}ms")]
    TimedOut {
        channel: &'static str,
        target: String,
        timeout_ms: u128,
    },
}

/// A stream write that failed. Terminal for the session that hit it.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Peer disconnected")]
    Disconnected,

    #[error("Write timed out after {0}ms")]
    TimedOut(u128),

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}
