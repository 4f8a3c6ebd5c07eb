//! # Submission Outcomes
//!
//! What a caller gets back from `submit_write`.
//!
//! | Outcome | Meaning | Caller action |
//! |---------|---------|---------------|
//! | `Confirmed` | Write is final on the platform | Done |
//! | `Ambiguous` | Write may or may not have landed | Retry later with the same `WriteSpec` |
//! | `Rejected` | Write can never succeed as signed | Fix input and rebuild |

use super::value_objects::{DocumentId, OperationId, SubmissionState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a confirmation was established.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationSource {
    /// This call's broadcast was confirmed.
    Broadcast,
    /// The service reported the payload as already processed.
    AlreadyProcessed,
    /// The pre-build existence query found the write.
    ExistenceCheck,
}

/// Final state of a confirmed write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedWrite {
    /// Operation that was confirmed.
    pub operation_id: OperationId,
    /// Document the write landed on.
    pub document_id: DocumentId,
    /// Sequence the accepted payload carried, when known.
    pub sequence: Option<u64>,
    /// Platform height the write was included at, when known.
    pub block_height: Option<u64>,
    /// How the confirmation was established.
    pub source: ConfirmationSource,
}

/// Why an outcome is ambiguous.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmbiguityReason {
    /// Confirmation did not arrive in time.
    Timeout,
    /// Network or gateway failure.
    Transport(String),
    /// External cancellation interrupted a network wait.
    Cancelled,
    /// The pre-build existence query failed, so nothing was signed.
    ExistenceCheckFailed(String),
    /// Signed bytes could not be persisted, so nothing was broadcast.
    LocalStoreUnavailable(String),
}

impl fmt::Display for AmbiguityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "confirmation timed out"),
            Self::Transport(msg) => write!(f, "transport failure: {}", msg),
            Self::Cancelled => write!(f, "cancelled"),
            Self::ExistenceCheckFailed(msg) => write!(f, "existence check failed: {}", msg),
            Self::LocalStoreUnavailable(msg) => write!(f, "local store unavailable: {}", msg),
        }
    }
}

/// Why the platform refused a write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// Signature did not verify against the identity's key.
    InvalidSignature,
    /// Sequence was stale, consumed, or out of order.
    InvalidSequence {
        /// Sequence the platform expected next
        expected: u64,
        /// Sequence the payload carried
        actual: u64,
    },
    /// Document failed contract schema validation.
    SchemaViolation(String),
    /// Identity is unknown or lacks permission.
    Unauthorized(String),
    /// Target document already exists or conflicts.
    DocumentConflict(String),
    /// Any other deterministic refusal.
    Other(String),
}

impl RejectionReason {
    /// Actionable message for end users.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidSignature => {
                "The write could not be verified. Check that the right key is selected.".to_string()
            }
            Self::InvalidSequence { .. } => {
                "Another write from this identity was processed first. Please submit again."
                    .to_string()
            }
            Self::SchemaViolation(detail) => format!("The content is not valid: {}", detail),
            Self::Unauthorized(_) => "This identity is not allowed to make this change.".to_string(),
            Self::DocumentConflict(_) => "This item already exists or was changed elsewhere.".to_string(),
            Self::Other(detail) => format!("The write was refused: {}", detail),
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSignature => write!(f, "invalid signature"),
            Self::InvalidSequence { expected, actual } => {
                write!(f, "invalid sequence: expected {}, got {}", expected, actual)
            }
            Self::SchemaViolation(msg) => write!(f, "schema violation: {}", msg),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {}", msg),
            Self::DocumentConflict(msg) => write!(f, "document conflict: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Outcome of one `submit_write` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteResult {
    /// Terminal success.
    Confirmed(ConfirmedWrite),
    /// Unknown; retrying the same `WriteSpec` replays the same bytes.
    Ambiguous(AmbiguityReason),
    /// Terminal failure; the cached payload has been discarded.
    Rejected(RejectionReason),
}

impl WriteResult {
    /// True for `Confirmed`.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    /// True for `Rejected`.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// True when the caller should try again later ("submission in progress").
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Ambiguous(_))
    }

    /// State the operation is left in after this outcome.
    pub fn state(&self) -> SubmissionState {
        match self {
            Self::Confirmed(_) => SubmissionState::Confirmed,
            Self::Ambiguous(_) => SubmissionState::Ambiguous,
            Self::Rejected(_) => SubmissionState::Rejected,
        }
    }

    /// The confirmation, if any.
    pub fn confirmed(&self) -> Option<&ConfirmedWrite> {
        match self {
            Self::Confirmed(confirmed) => Some(confirmed),
            _ => None,
        }
    }
}
