//! # Domain Errors
//!
//! Internal error types. None of these cross the submitter boundary: channel
//! errors are classified into `Rejected` or `Ambiguous` outcomes, store errors
//! degrade to a cache miss.

use super::outcome::{AmbiguityReason, RejectionReason, WriteResult};
use thiserror::Error;

/// Local pending-write store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// I/O error during read/write.
    #[error("Store I/O error: {0}")]
    Io(String),

    /// Stored bytes could not be decoded.
    #[error("Corrupt pending entry: {0}")]
    Corrupt(String),

    /// Entry could not be encoded for storage.
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Another process holds the store.
    #[error("Store already in use: {0}")]
    Locked(String),
}

/// Errors reported by a `SequencedWriteChannel`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// No answer within the allowed time.
    #[error("Request timed out")]
    Timeout,

    /// Connection or gateway failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service deterministically refused the write.
    #[error("Write rejected: {0}")]
    Rejected(RejectionReason),

    /// The service answered with something we could not interpret.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The payload could not be signed or encoded locally.
    #[error("Signing failed: {0}")]
    Signing(String),
}

impl ChannelError {
    /// Map a channel failure onto the caller-facing outcome.
    ///
    /// Only explicit refusals and local signing failures are terminal. Anything
    /// that leaves the remote state unknown is ambiguous and safe to replay.
    pub fn classify(self) -> WriteResult {
        match self {
            Self::Rejected(reason) => WriteResult::Rejected(reason),
            Self::Signing(message) => WriteResult::Rejected(RejectionReason::Other(message)),
            Self::Timeout => WriteResult::Ambiguous(AmbiguityReason::Timeout),
            Self::Transport(message) => WriteResult::Ambiguous(AmbiguityReason::Transport(message)),
            Self::Protocol(message) => WriteResult::Ambiguous(AmbiguityReason::Transport(message)),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A configuration value is out of range.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_ambiguous() {
        let result = ChannelError::Timeout.classify();
        assert_eq!(result, WriteResult::Ambiguous(AmbiguityReason::Timeout));
    }

    #[test]
    fn test_transport_and_protocol_are_ambiguous() {
        assert!(ChannelError::Transport("reset".into()).classify().is_retryable());
        assert!(ChannelError::Protocol("bad json".into()).classify().is_retryable());
    }

    #[test]
    fn test_rejection_is_terminal() {
        let result = ChannelError::Rejected(RejectionReason::InvalidSignature).classify();
        assert_eq!(result, WriteResult::Rejected(RejectionReason::InvalidSignature));
        assert!(!result.is_retryable());
    }

    #[test]
    fn test_signing_failure_is_rejected() {
        let result = ChannelError::Signing("encode".into()).classify();
        assert!(matches!(result, WriteResult::Rejected(RejectionReason::Other(_))));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Corrupt("bad magic".into());
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "retention_secs",
            reason: "must be positive".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value for retention_secs: must be positive"
        );
    }
}
