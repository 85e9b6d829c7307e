//! Request correlation between the controller and the verification service.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dialog::DialogState;
use crate::types::{CardId, Secret};

/// Correlation token for one outstanding service call.
///
/// Allocated from a monotonic per-controller counter. A completion whose
/// token does not match the live request is stale and is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A verification call for the host to execute against the service.
///
/// Carries the collected credentials; the controller keeps only the
/// secret-free [`PendingRequest`] while the call is in flight.
#[derive(Debug)]
pub struct ServiceRequest {
    pub id: RequestId,
    pub card: CardId,
    pub op: ServiceOp,
}

/// The four mutually-exclusive card operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceOp {
    /// Verify the PIN to satisfy the card's unlock demand.
    VerifyPin { pin: Secret },
    /// Enable or disable the PIN lock, authorized by the current PIN.
    SetLockEnabled { enable: bool, pin: Secret },
    /// Replace the PIN, authorized by the old PIN.
    ChangePin { old_pin: Secret, new_pin: Secret },
    /// Recover a PUK-demanding card, installing a replacement PIN.
    UnlockPuk { puk: Secret, new_pin: Secret },
}

impl ServiceOp {
    /// Secret-free discriminant for bookkeeping and logging.
    pub fn kind(&self) -> ServiceOpKind {
        match self {
            ServiceOp::VerifyPin { .. } => ServiceOpKind::VerifyPin,
            ServiceOp::SetLockEnabled { enable, .. } => {
                ServiceOpKind::SetLockEnabled { enable: *enable }
            }
            ServiceOp::ChangePin { .. } => ServiceOpKind::ChangePin,
            ServiceOp::UnlockPuk { .. } => ServiceOpKind::UnlockPuk,
        }
    }
}

/// Secret-free discriminant of a [`ServiceOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceOpKind {
    VerifyPin,
    SetLockEnabled { enable: bool },
    ChangePin,
    UnlockPuk,
}

impl ServiceOpKind {
    /// The dialog step re-shown when this operation fails retryably.
    pub(crate) fn retry_anchor(&self) -> DialogState {
        match self {
            ServiceOpKind::VerifyPin => DialogState::UnlockPin,
            ServiceOpKind::SetLockEnabled { enable } => DialogState::ConfirmLockToggle {
                target_enabled: *enable,
            },
            ServiceOpKind::ChangePin => DialogState::EnterOldPin,
            ServiceOpKind::UnlockPuk => DialogState::UnlockPuk,
        }
    }
}

/// Bookkeeping for the single outstanding service call.
///
/// Holds no secrets: they were consumed into the dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub id: RequestId,
    pub op: ServiceOpKind,
}

/// Failure reported by the verification service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The card rejected the credential and decremented its counter.
    #[error("credential rejected by card ({attempts_remaining:?} attempts remaining)")]
    Rejected { attempts_remaining: Option<u32> },

    /// The verification subsystem is unreachable; the credential was never
    /// presented and no counter was touched.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of one service call.
pub type ServiceResult = std::result::Result<(), ServiceError>;
