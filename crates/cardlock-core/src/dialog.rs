//! Dialog states for the lock/unlock prompt sequences.
//!
//! One tagged variant per prompt, carrying exactly the values collected so
//! far, so that invalid combinations (holding a new PIN while still asking
//! for the old one) are unrepresentable.

use serde::{Deserialize, Serialize};

use crate::types::Secret;

/// The prompt currently shown, with the credentials collected so far.
///
/// Exactly one `DialogState` is active per controller. Every `Secret` held
/// here was length-validated at entry. Serialization exists for the
/// ephemeral snapshot handoff only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step")]
pub enum DialogState {
    /// No dialog is shown.
    #[default]
    Idle,
    /// Confirm enabling or disabling the PIN lock with the current PIN.
    ConfirmLockToggle { target_enabled: bool },
    /// Change flow: enter the current PIN.
    EnterOldPin,
    /// Change flow: choose the new PIN.
    EnterNewPin { old_pin: Secret },
    /// Change flow: repeat the new PIN.
    ReenterNewPin { old_pin: Secret, new_pin: Secret },
    /// Recovery: the card demands its PIN.
    UnlockPin,
    /// Recovery: PIN attempts are exhausted, the card demands its PUK.
    UnlockPuk,
    /// PUK recovery: choose the replacement PIN.
    PukEnterNewPin { puk: Secret },
    /// PUK recovery: repeat the replacement PIN.
    PukReenterNewPin { puk: Secret, new_pin: Secret },
}

impl DialogState {
    /// Whether no dialog is currently shown.
    pub fn is_idle(&self) -> bool {
        matches!(self, DialogState::Idle)
    }

    /// Whether this state holds collected credential material.
    pub fn holds_secrets(&self) -> bool {
        matches!(
            self,
            DialogState::EnterNewPin { .. }
                | DialogState::ReenterNewPin { .. }
                | DialogState::PukEnterNewPin { .. }
                | DialogState::PukReenterNewPin { .. }
        )
    }
}
