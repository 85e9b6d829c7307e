//! Lock controller: owns the dialog state for one card and advances it on
//! host events and service completions.
//!
//! The controller is synchronous and never blocks. Submitting a complete
//! entry yields a [`ServiceRequest`] value; the host executes it against
//! the verification service on its own runtime and feeds the result back
//! through [`LockController::on_service_complete`]. Completions are
//! matched by token, so a response to a cancelled or superseded request
//! cannot corrupt a newer flow.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dialog::DialogState;
use crate::error::{LockError, Result};
use crate::prompt::Prompt;
use crate::request::{
    PendingRequest, RequestId, ServiceError, ServiceOp, ServiceOpKind, ServiceRequest,
    ServiceResult,
};
use crate::snapshot::ControllerSnapshot;
use crate::types::{CardHandle, CardId, CardLockState, CardStatus, Secret};

/// The overall flow a controller is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowIntent {
    /// Enable or disable the PIN lock.
    ToggleLock { enable: bool },
    /// Replace the current PIN.
    ChangePin,
    /// Standalone PIN or PUK recovery.
    Unlock,
}

/// Terminal result of a finished flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    /// The lock toggle was applied.
    LockToggled { enabled: bool },
    /// The PIN was replaced.
    PinChanged,
    /// The card accepted the credential and is ready.
    Unlocked,
    /// PUK attempts are exhausted; the card is permanently dead.
    CardBlocked,
}

/// What a service completion did to the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The token did not match the live request; nothing changed.
    Stale,
    /// The flow continues; re-read [`LockController::current_prompt`].
    Reprompt,
    /// The flow finished.
    Done(FlowOutcome),
}

/// Drives the lock/unlock prompt sequence for a single card.
pub struct LockController {
    /// Live view of the card; requeried at every decision point.
    card: Box<dyn CardHandle>,
    /// The dialog currently shown.
    state: DialogState,
    /// The flow being run, if any.
    intent: Option<FlowIntent>,
    /// The single outstanding service call, if any.
    pending: Option<PendingRequest>,
    /// Error annotation for the current prompt.
    error: Option<LockError>,
    /// Monotonic source for request tokens.
    next_request: u64,
}

impl std::fmt::Debug for LockController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockController")
            .field("card", &self.card.id())
            .field("state", &self.state)
            .field("intent", &self.intent)
            .field("pending", &self.pending)
            .field("error", &self.error)
            .field("next_request", &self.next_request)
            .finish()
    }
}

impl LockController {
    pub fn new(card: Box<dyn CardHandle>) -> Self {
        Self {
            card,
            state: DialogState::Idle,
            intent: None,
            pending: None,
            error: None,
            next_request: 0,
        }
    }

    pub fn card_id(&self) -> CardId {
        self.card.id()
    }

    /// Whether a verification call is outstanding.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// The dialog state currently active.
    pub fn state(&self) -> &DialogState {
        &self.state
    }

    /// The flow currently running.
    pub fn intent(&self) -> Option<FlowIntent> {
        self.intent
    }

    /// Begin an enable/disable flow for the PIN lock.
    pub fn start_toggle(&mut self, enable: bool) -> Result<()> {
        self.ensure_can_start()?;
        let status = self.checked_status()?;
        if status.lock_enabled == enable {
            return Err(LockError::AlreadyInRequestedState);
        }
        self.begin(FlowIntent::ToggleLock { enable }, &status);
        Ok(())
    }

    /// Begin a change-PIN flow. The lock must be enabled: a disabled lock
    /// has no PIN to change.
    pub fn start_change_pin(&mut self) -> Result<()> {
        self.ensure_can_start()?;
        let status = self.checked_status()?;
        if !status.lock_enabled {
            return Err(LockError::LockNotEnabled);
        }
        self.begin(FlowIntent::ChangePin, &status);
        Ok(())
    }

    /// Begin a standalone unlock flow for a card that is demanding its
    /// PIN or PUK.
    pub fn start_unlock(&mut self) -> Result<()> {
        self.ensure_can_start()?;
        let status = self.checked_status()?;
        if !status.unlock_required() {
            return Err(LockError::NotLocked);
        }
        self.begin(FlowIntent::Unlock, &status);
        Ok(())
    }

    fn ensure_can_start(&self) -> Result<()> {
        if self.pending.is_some() {
            return Err(LockError::RequestInFlight);
        }
        if !self.state.is_idle() || self.intent.is_some() {
            return Err(LockError::FlowInProgress);
        }
        Ok(())
    }

    fn checked_status(&self) -> Result<CardStatus> {
        let status = self.card.status();
        if !status.present {
            return Err(LockError::CardAbsent);
        }
        if status.lock_state == CardLockState::Blocked {
            return Err(LockError::CardBlocked);
        }
        Ok(status)
    }

    fn begin(&mut self, intent: FlowIntent, status: &CardStatus) {
        self.intent = Some(intent);
        self.error = None;
        self.state = Self::select_entry(intent, status);
        debug!(card = %self.card.id(), ?intent, state = ?self.state, "flow started");
    }

    /// Entry-mode selection: an outstanding card demand overrides the
    /// flow's own first prompt.
    fn select_entry(intent: FlowIntent, status: &CardStatus) -> DialogState {
        if status.lock_state == CardLockState::PinRequired {
            return DialogState::UnlockPin;
        }
        if status.pin_exhausted() {
            return DialogState::UnlockPuk;
        }
        match intent {
            FlowIntent::ToggleLock { enable } => DialogState::ConfirmLockToggle {
                target_enabled: enable,
            },
            FlowIntent::ChangePin => DialogState::EnterOldPin,
            // start_unlock rejects cards with no demand, so a ready card
            // only reaches here through resume; the flow ends there.
            FlowIntent::Unlock => DialogState::Idle,
        }
    }

    /// Feed one completed text entry to the active prompt.
    ///
    /// Returns `Ok(Some(request))` when the entry completes a step that
    /// needs the verification service; the host must execute the request
    /// and report its result via [`LockController::on_service_complete`].
    /// Returns `Ok(None)` when the flow advanced locally.
    pub fn submit(&mut self, text: &str) -> Result<Option<ServiceRequest>> {
        if self.pending.is_some() {
            return Err(LockError::RequestInFlight);
        }
        if self.state.is_idle() {
            return Err(LockError::NoActivePrompt);
        }

        // Length is checked before anything else; a local rejection
        // re-shows the same step with the error annotation.
        let secret = match Secret::parse(text) {
            Ok(secret) => secret,
            Err(err) => {
                self.error = Some(err.clone());
                return Err(err);
            }
        };
        self.error = None;

        let state = std::mem::take(&mut self.state);
        match state {
            DialogState::Idle => Err(LockError::NoActivePrompt),

            DialogState::ConfirmLockToggle { target_enabled } => {
                // The card may have been locked by another process since
                // the dialog opened; requery and unlock first if so. The
                // confirm step collects the PIN either way.
                let status = self.card.status();
                if status.lock_state == CardLockState::PinRequired {
                    Ok(Some(self.issue(ServiceOp::VerifyPin { pin: secret })))
                } else if status.pin_exhausted() {
                    debug!(card = %self.card.id(), "PIN exhausted under confirm step; routing to PUK recovery");
                    self.state = DialogState::UnlockPuk;
                    Ok(None)
                } else {
                    Ok(Some(self.issue(ServiceOp::SetLockEnabled {
                        enable: target_enabled,
                        pin: secret,
                    })))
                }
            }

            DialogState::EnterOldPin => {
                self.state = DialogState::EnterNewPin { old_pin: secret };
                Ok(None)
            }

            DialogState::EnterNewPin { old_pin } => {
                self.state = DialogState::ReenterNewPin {
                    old_pin,
                    new_pin: secret,
                };
                Ok(None)
            }

            DialogState::ReenterNewPin { old_pin, new_pin } => {
                if secret == new_pin {
                    Ok(Some(self.issue(ServiceOp::ChangePin { old_pin, new_pin })))
                } else {
                    // Keep the old PIN, drop both copies of the new one.
                    self.state = DialogState::EnterNewPin { old_pin };
                    self.error = Some(LockError::MismatchedReentry);
                    Ok(None)
                }
            }

            DialogState::UnlockPin => Ok(Some(self.issue(ServiceOp::VerifyPin { pin: secret }))),

            DialogState::UnlockPuk => {
                self.state = DialogState::PukEnterNewPin { puk: secret };
                Ok(None)
            }

            DialogState::PukEnterNewPin { puk } => {
                self.state = DialogState::PukReenterNewPin {
                    puk,
                    new_pin: secret,
                };
                Ok(None)
            }

            DialogState::PukReenterNewPin { puk, new_pin } => {
                if secret == new_pin {
                    Ok(Some(self.issue(ServiceOp::UnlockPuk { puk, new_pin })))
                } else {
                    self.state = DialogState::PukEnterNewPin { puk };
                    self.error = Some(LockError::MismatchedReentry);
                    Ok(None)
                }
            }
        }
    }

    fn issue(&mut self, op: ServiceOp) -> ServiceRequest {
        let id = RequestId::new(self.next_request);
        self.next_request += 1;
        let kind = op.kind();
        self.pending = Some(PendingRequest { id, op: kind });
        debug!(card = %self.card.id(), request = %id, op = ?kind, "service call issued");
        ServiceRequest {
            id,
            card: self.card.id(),
            op,
        }
    }

    /// Abandon the flow: discard all collected secrets and detach from any
    /// outstanding request, whose completion becomes stale. Idempotent.
    pub fn cancel(&mut self) {
        if self.intent.is_some() || self.pending.is_some() {
            debug!(card = %self.card.id(), "flow cancelled");
        }
        self.state = DialogState::Idle;
        self.intent = None;
        self.pending = None;
        self.error = None;
    }

    /// Report the result of a dispatched service call.
    ///
    /// A token that does not match the live request is answered with
    /// [`Completion::Stale`] and changes nothing.
    pub fn on_service_complete(&mut self, id: RequestId, result: ServiceResult) -> Completion {
        let Some(pending) = self.pending else {
            warn!(card = %self.card.id(), request = %id, "completion with no request in flight; ignoring");
            return Completion::Stale;
        };
        if pending.id != id {
            warn!(card = %self.card.id(), request = %id, live = %pending.id, "stale completion ignored");
            return Completion::Stale;
        }
        self.pending = None;

        match result {
            Ok(()) => self.on_success(pending.op),
            Err(ServiceError::Rejected { attempts_remaining }) => {
                self.on_rejected(pending.op, attempts_remaining)
            }
            Err(ServiceError::Unavailable(reason)) => {
                warn!(card = %self.card.id(), %reason, "verification service unreachable");
                // The credential never reached the card: no attempt was
                // consumed. Re-show the step so the user can retry.
                self.state = pending.op.retry_anchor();
                self.error = Some(LockError::ServiceUnavailable);
                Completion::Reprompt
            }
        }
    }

    fn on_success(&mut self, op: ServiceOpKind) -> Completion {
        self.error = None;
        match op {
            ServiceOpKind::SetLockEnabled { enable } => {
                info!(card = %self.card.id(), enabled = enable, "lock toggle applied");
                self.finish(FlowOutcome::LockToggled { enabled: enable })
            }
            ServiceOpKind::ChangePin => {
                info!(card = %self.card.id(), "PIN changed");
                self.finish(FlowOutcome::PinChanged)
            }
            ServiceOpKind::VerifyPin | ServiceOpKind::UnlockPuk => {
                self.continue_after_unlock(op)
            }
        }
    }

    /// An unlock succeeded. Resume the parent flow where it left off, or
    /// finish a standalone one.
    fn continue_after_unlock(&mut self, op: ServiceOpKind) -> Completion {
        match (op, self.intent) {
            // PUK recovery installed the user's replacement PIN, which
            // subsumes a pending change-PIN intent.
            (ServiceOpKind::UnlockPuk, Some(FlowIntent::ChangePin)) => {
                info!(card = %self.card.id(), "PIN replaced through PUK recovery");
                self.finish(FlowOutcome::PinChanged)
            }
            (_, Some(FlowIntent::ToggleLock { enable })) => {
                self.state = DialogState::ConfirmLockToggle {
                    target_enabled: enable,
                };
                Completion::Reprompt
            }
            (_, Some(FlowIntent::ChangePin)) => {
                self.state = DialogState::EnterOldPin;
                Completion::Reprompt
            }
            (_, Some(FlowIntent::Unlock) | None) => {
                info!(card = %self.card.id(), "card unlocked");
                self.finish(FlowOutcome::Unlocked)
            }
        }
    }

    fn on_rejected(&mut self, op: ServiceOpKind, attempts_remaining: Option<u32>) -> Completion {
        match op {
            ServiceOpKind::UnlockPuk => {
                if attempts_remaining == Some(0) {
                    warn!(card = %self.card.id(), "PUK attempts exhausted; card permanently blocked");
                    return self.finish(FlowOutcome::CardBlocked);
                }
                self.state = DialogState::UnlockPuk;
                self.error = Some(LockError::CredentialRejected { attempts_remaining });
                Completion::Reprompt
            }
            // PIN-consuming operations escalate to PUK recovery once the
            // card stops accepting PIN attempts.
            ServiceOpKind::VerifyPin
            | ServiceOpKind::SetLockEnabled { .. }
            | ServiceOpKind::ChangePin => {
                if attempts_remaining == Some(0) {
                    info!(card = %self.card.id(), "PIN attempts exhausted; escalating to PUK recovery");
                    self.state = DialogState::UnlockPuk;
                } else {
                    self.state = op.retry_anchor();
                }
                self.error = Some(LockError::CredentialRejected { attempts_remaining });
                Completion::Reprompt
            }
        }
    }

    fn finish(&mut self, outcome: FlowOutcome) -> Completion {
        debug!(card = %self.card.id(), ?outcome, "flow finished");
        self.state = DialogState::Idle;
        self.intent = None;
        self.error = None;
        Completion::Done(outcome)
    }

    /// Projection of the current dialog to a displayable prompt. `None`
    /// when no dialog is shown.
    pub fn current_prompt(&self) -> Option<Prompt> {
        if let Some(pending) = &self.pending {
            // While a call is in flight the step it came from is shown
            // disabled rather than dismissed.
            let anchor = pending.op.retry_anchor();
            return Prompt::for_state(&anchor, self.error.clone(), true);
        }
        Prompt::for_state(&self.state, self.error.clone(), false)
    }

    /// Capture the full dialog state, including collected secrets, for an
    /// ephemeral host handoff across a UI interruption. Never write the
    /// snapshot to durable storage.
    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            card: self.card.id(),
            state: self.state.clone(),
            intent: self.intent,
            pending: self.pending,
            error: self.error.clone(),
            next_request: self.next_request,
        }
    }

    /// Rebuild a controller from a snapshot around a fresh handle for the
    /// same card. The caller decides when to [`LockController::resume`].
    pub fn restore(card: Box<dyn CardHandle>, snapshot: ControllerSnapshot) -> Result<Self> {
        if card.id() != snapshot.card {
            return Err(LockError::SnapshotCardMismatch);
        }
        debug!(card = %snapshot.card, state = ?snapshot.state, "controller restored");
        Ok(Self {
            card,
            state: snapshot.state,
            intent: snapshot.intent,
            pending: snapshot.pending,
            error: snapshot.error,
            next_request: snapshot.next_request,
        })
    }

    /// Re-run entry-mode selection after an interruption.
    ///
    /// The card may have changed while the UI was away: removed, blocked,
    /// unlocked by another process, or escalated from PIN to PUK. Returns
    /// a terminal outcome when the interruption already decided the flow.
    pub fn resume(&mut self) -> Option<FlowOutcome> {
        if self.intent.is_none() && self.state.is_idle() && self.pending.is_none() {
            return None;
        }
        let status = self.card.status();
        if !status.present {
            info!(card = %self.card.id(), "card removed during interruption; abandoning flow");
            self.cancel();
            return None;
        }
        if status.lock_state == CardLockState::Blocked {
            self.pending = None;
            self.finish(FlowOutcome::CardBlocked);
            return Some(FlowOutcome::CardBlocked);
        }
        if self.pending.is_some() {
            // The dispatched call may still resolve through a surviving
            // driver; keep waiting for its completion.
            return None;
        }
        match &self.state {
            DialogState::UnlockPin if status.pin_exhausted() => {
                self.state = DialogState::UnlockPuk;
                None
            }
            DialogState::UnlockPin | DialogState::UnlockPuk if !status.unlock_required() => {
                // The demand was satisfied elsewhere; skip ahead.
                match self.intent {
                    Some(FlowIntent::ToggleLock { enable }) => {
                        self.state = DialogState::ConfirmLockToggle {
                            target_enabled: enable,
                        };
                        None
                    }
                    Some(FlowIntent::ChangePin) => {
                        self.state = DialogState::EnterOldPin;
                        None
                    }
                    Some(FlowIntent::Unlock) | None => {
                        self.finish(FlowOutcome::Unlocked);
                        Some(FlowOutcome::Unlocked)
                    }
                }
            }
            _ => None,
        }
    }
}
