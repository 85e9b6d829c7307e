//! Error taxonomy for lock/unlock flows.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::ServiceError;
use crate::types::{MAX_PIN_LENGTH, MIN_PIN_LENGTH};

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, LockError>;

/// Errors surfaced by the lock controller.
///
/// The first four form the credential-entry taxonomy shown to the user via
/// the prompt's error annotation; the rest are usage errors returned to
/// host code.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LockError {
    /// Entered text is outside the accepted length bounds. Rejected
    /// locally; no service call is made and no counter is touched.
    #[error("entry must be {MIN_PIN_LENGTH}-{MAX_PIN_LENGTH} characters (got {len})")]
    InvalidInputLength { len: usize },

    /// Re-entered credential did not match the first entry. Rejected
    /// locally; the flow returns to the first-entry step.
    #[error("entries do not match")]
    MismatchedReentry,

    /// The card rejected the credential and decremented its counter.
    #[error("credential rejected ({} attempts remaining)", display_attempts(.attempts_remaining))]
    CredentialRejected { attempts_remaining: Option<u32> },

    /// The verification service could not be reached. The credential was
    /// never presented to the card, so no counter was touched.
    #[error("verification service unavailable")]
    ServiceUnavailable,

    /// PUK attempts are exhausted; the card is permanently dead.
    #[error("card is permanently blocked")]
    CardBlocked,

    /// No card in the slot.
    #[error("no card present")]
    CardAbsent,

    /// A flow is already active on this controller.
    #[error("another flow is already in progress")]
    FlowInProgress,

    /// A service call is outstanding; input is rejected until it resolves.
    #[error("a verification request is in flight")]
    RequestInFlight,

    /// No dialog is being shown, so there is nothing to submit to.
    #[error("no prompt is active")]
    NoActivePrompt,

    /// The PIN lock is not enabled, so there is no PIN to change.
    #[error("PIN lock is not enabled")]
    LockNotEnabled,

    /// The lock is already in the requested state.
    #[error("lock is already in the requested state")]
    AlreadyInRequestedState,

    /// The card is not demanding a credential; nothing to unlock.
    #[error("card is not waiting for a credential")]
    NotLocked,

    /// A snapshot was restored against a handle for a different card.
    #[error("snapshot belongs to a different card")]
    SnapshotCardMismatch,

    /// Snapshot encoding or decoding failed.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl From<serde_json::Error> for LockError {
    fn from(err: serde_json::Error) -> Self {
        LockError::Snapshot(err.to_string())
    }
}

impl From<ServiceError> for LockError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Rejected { attempts_remaining } => {
                LockError::CredentialRejected { attempts_remaining }
            }
            ServiceError::Unavailable(_) => LockError::ServiceUnavailable,
        }
    }
}

fn display_attempts(attempts: &Option<u32>) -> String {
    match attempts {
        Some(n) => n.to_string(),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_display_includes_attempts() {
        let err = LockError::CredentialRejected {
            attempts_remaining: Some(2),
        };
        assert_eq!(err.to_string(), "credential rejected (2 attempts remaining)");

        let err = LockError::CredentialRejected {
            attempts_remaining: None,
        };
        assert_eq!(
            err.to_string(),
            "credential rejected (unknown attempts remaining)"
        );
    }

    #[test]
    fn test_length_display_includes_bounds() {
        let err = LockError::InvalidInputLength { len: 2 };
        assert_eq!(err.to_string(), "entry must be 4-8 characters (got 2)");
    }

    #[test]
    fn test_service_error_mapping() {
        let err: LockError = ServiceError::Rejected {
            attempts_remaining: Some(1),
        }
        .into();
        assert_eq!(
            err,
            LockError::CredentialRejected {
                attempts_remaining: Some(1)
            }
        );

        let err: LockError = ServiceError::Unavailable("socket closed".to_string()).into();
        assert_eq!(err, LockError::ServiceUnavailable);
    }
}
