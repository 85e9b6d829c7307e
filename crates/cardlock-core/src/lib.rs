//! Core state machine for removable credential-card lock flows.
//!
//! A [`LockController`] owns the multi-step dialog for one card: toggling
//! the PIN lock on or off, changing the PIN, and recovering a locked card
//! with its PIN or PUK. The controller is synchronous; steps that need the
//! card itself produce [`ServiceRequest`] values for the host to execute
//! against its verification service, and the results come back through
//! [`LockController::on_service_complete`], matched by token so stale
//! completions are harmless.
//!
//! Collected credentials live only inside the active [`DialogState`] (or
//! an ephemeral [`ControllerSnapshot`] during a UI handoff) and are
//! zeroized on drop. The [`Prompt`] handed to the UI never contains them.

pub mod controller;
pub mod dialog;
pub mod error;
pub mod manager;
pub mod prompt;
pub mod request;
pub mod snapshot;
pub mod types;

pub use controller::{Completion, FlowIntent, FlowOutcome, LockController};
pub use dialog::DialogState;
pub use error::{LockError, Result};
pub use manager::LockManager;
pub use prompt::{Prompt, PromptStep};
pub use request::{
    PendingRequest, RequestId, ServiceError, ServiceOp, ServiceOpKind, ServiceRequest,
    ServiceResult,
};
pub use snapshot::ControllerSnapshot;
pub use types::{
    CardHandle, CardId, CardLockState, CardStatus, Secret, MAX_PIN_LENGTH, MIN_PIN_LENGTH,
};

/// PIN attempts a fresh card grants before demanding the PUK.
pub const DEFAULT_PIN_ATTEMPTS: u32 = 3;

/// PUK attempts a card grants before blocking permanently.
pub const DEFAULT_PUK_ATTEMPTS: u32 = 10;
