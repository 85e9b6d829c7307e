//! Prompt descriptors: the projection from dialog state to what the host
//! UI should display.

use crate::dialog::DialogState;
use crate::error::LockError;
use crate::types::{MAX_PIN_LENGTH, MIN_PIN_LENGTH};

/// The logical step a prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStep {
    ConfirmLockToggle { target_enabled: bool },
    EnterOldPin,
    EnterNewPin,
    ReenterNewPin,
    UnlockPin,
    UnlockPuk,
    PukEnterNewPin,
    PukReenterNewPin,
}

impl PromptStep {
    /// Default English title and instruction line for this step. Hosts
    /// that localize key off the step itself instead.
    pub fn text(&self) -> (&'static str, &'static str) {
        match self {
            PromptStep::ConfirmLockToggle {
                target_enabled: true,
            } => ("Enable card lock", "Enter the card PIN to require it from now on"),
            PromptStep::ConfirmLockToggle {
                target_enabled: false,
            } => ("Disable card lock", "Enter the card PIN to stop requiring it"),
            PromptStep::EnterOldPin => ("Change PIN", "Enter the current PIN"),
            PromptStep::EnterNewPin => ("Change PIN", "Enter the new PIN"),
            PromptStep::ReenterNewPin => ("Change PIN", "Re-enter the new PIN"),
            PromptStep::UnlockPin => ("Card locked", "Enter the PIN to unlock"),
            PromptStep::UnlockPuk => ("PIN blocked", "Enter the PUK to recover the card"),
            PromptStep::PukEnterNewPin => ("PIN blocked", "Choose a replacement PIN"),
            PromptStep::PukReenterNewPin => ("PIN blocked", "Re-enter the replacement PIN"),
        }
    }
}

/// Everything the host UI needs to render the current dialog.
///
/// Carries no credential material, only step identity, display text, and
/// entry metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Which logical step this is.
    pub step: PromptStep,
    /// Dialog title.
    pub title: &'static str,
    /// Instruction line.
    pub message: &'static str,
    /// Whether the host should restrict entry to digits.
    pub numeric_only: bool,
    /// Minimum accepted entry length.
    pub min_len: usize,
    /// Maximum accepted entry length.
    pub max_len: usize,
    /// Error annotation from the last rejected attempt, if any.
    pub error: Option<LockError>,
    /// True while a verification call is outstanding; entry is disabled.
    pub busy: bool,
}

impl Prompt {
    /// Build the prompt for a dialog state. `Idle` has no prompt.
    pub(crate) fn for_state(
        state: &DialogState,
        error: Option<LockError>,
        busy: bool,
    ) -> Option<Prompt> {
        let step = match state {
            DialogState::Idle => return None,
            DialogState::ConfirmLockToggle { target_enabled } => PromptStep::ConfirmLockToggle {
                target_enabled: *target_enabled,
            },
            DialogState::EnterOldPin => PromptStep::EnterOldPin,
            DialogState::EnterNewPin { .. } => PromptStep::EnterNewPin,
            DialogState::ReenterNewPin { .. } => PromptStep::ReenterNewPin,
            DialogState::UnlockPin => PromptStep::UnlockPin,
            DialogState::UnlockPuk => PromptStep::UnlockPuk,
            DialogState::PukEnterNewPin { .. } => PromptStep::PukEnterNewPin,
            DialogState::PukReenterNewPin { .. } => PromptStep::PukReenterNewPin,
        };
        let (title, message) = step.text();
        Some(Prompt {
            step,
            title,
            message,
            numeric_only: true,
            min_len: MIN_PIN_LENGTH,
            max_len: MAX_PIN_LENGTH,
            error,
            busy,
        })
    }
}
