//! Property-based tests for cardlock-core
//!
//! Drives the controller with arbitrary event scripts and checks the
//! invariants that must hold no matter what the host or the service does:
//! no panics, no credential text in any host-visible surface, stale
//! completions never mutate, and cancel always lands in Idle.

use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use cardlock_core::{
    CardHandle, CardId, CardLockState, CardStatus, ControllerSnapshot, LockController, RequestId,
    ServiceError, MIN_PIN_LENGTH,
};

// ============================================================
// Test card
// ============================================================

#[derive(Clone)]
struct FakeCard {
    status: Arc<Mutex<CardStatus>>,
}

impl FakeCard {
    fn new(status: CardStatus) -> Self {
        Self {
            status: Arc::new(Mutex::new(status)),
        }
    }

    fn handle(&self) -> Box<dyn CardHandle> {
        Box::new(self.clone())
    }
}

impl CardHandle for FakeCard {
    fn id(&self) -> CardId {
        CardId::new(0)
    }

    fn status(&self) -> CardStatus {
        *self.status.lock().unwrap()
    }
}

// ============================================================
// Strategies
// ============================================================

#[derive(Debug, Clone)]
enum Event {
    StartToggle(bool),
    StartChangePin,
    StartUnlock,
    Submit(String),
    Cancel,
    Complete { id: u64, result: CompletionResult },
}

#[derive(Debug, Clone)]
enum CompletionResult {
    Accepted,
    Rejected(Option<u32>),
    Unavailable,
}

fn arb_lock_state() -> impl Strategy<Value = CardLockState> {
    prop_oneof![
        Just(CardLockState::Ready),
        Just(CardLockState::PinRequired),
        Just(CardLockState::PukRequired),
        Just(CardLockState::Blocked),
    ]
}

fn arb_status() -> impl Strategy<Value = CardStatus> {
    (
        prop::bool::weighted(0.9),
        any::<bool>(),
        arb_lock_state(),
        prop::option::of(0u32..=3),
        prop::option::of(0u32..=10),
    )
        .prop_map(
            |(present, lock_enabled, lock_state, pin_attempts, puk_attempts)| CardStatus {
                present,
                lock_enabled,
                lock_state,
                pin_attempts_remaining: pin_attempts,
                puk_attempts_remaining: puk_attempts,
            },
        )
}

fn arb_completion() -> impl Strategy<Value = CompletionResult> {
    prop_oneof![
        Just(CompletionResult::Accepted),
        prop::option::of(0u32..=10).prop_map(CompletionResult::Rejected),
        Just(CompletionResult::Unavailable),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        any::<bool>().prop_map(Event::StartToggle),
        Just(Event::StartChangePin),
        Just(Event::StartUnlock),
        "[0-9]{0,12}".prop_map(Event::Submit),
        Just(Event::Cancel),
        (0u64..8, arb_completion()).prop_map(|(id, result)| Event::Complete { id, result }),
    ]
}

fn arb_script() -> impl Strategy<Value = Vec<Event>> {
    prop::collection::vec(arb_event(), 0..24)
}

fn apply(controller: &mut LockController, event: &Event) {
    match event {
        Event::StartToggle(enable) => {
            let _ = controller.start_toggle(*enable);
        }
        Event::StartChangePin => {
            let _ = controller.start_change_pin();
        }
        Event::StartUnlock => {
            let _ = controller.start_unlock();
        }
        Event::Submit(text) => {
            let was_busy = controller.is_busy();
            let result = controller.submit(text);
            if was_busy {
                assert!(result.is_err());
            }
        }
        Event::Cancel => controller.cancel(),
        Event::Complete { id, result } => {
            let result = match result {
                CompletionResult::Accepted => Ok(()),
                CompletionResult::Rejected(attempts) => Err(ServiceError::Rejected {
                    attempts_remaining: *attempts,
                }),
                CompletionResult::Unavailable => {
                    Err(ServiceError::Unavailable("injected outage".to_string()))
                }
            };
            let _ = controller.on_service_complete(RequestId::new(*id), result);
        }
    }
}

// ============================================================
// Properties
// ============================================================

proptest! {
    /// No event script panics the controller, and no host-visible surface
    /// (state debug, prompt) ever contains submitted credential text.
    #[test]
    fn prop_no_panics_no_credential_leaks(status in arb_status(), script in arb_script()) {
        let card = FakeCard::new(status);
        let mut controller = LockController::new(card.handle());
        let mut entries: Vec<String> = Vec::new();

        for event in &script {
            if let Event::Submit(text) = event {
                if text.chars().count() >= MIN_PIN_LENGTH {
                    entries.push(text.clone());
                }
            }
            apply(&mut controller, event);

            let surface = format!("{:?} {:?}", controller.state(), controller.current_prompt());
            for entry in &entries {
                prop_assert!(!surface.contains(entry.as_str()));
            }
        }
    }

    /// Cancel is always available and always lands in Idle with no prompt,
    /// no pending request, and no intent, no matter what came before.
    #[test]
    fn prop_cancel_always_returns_to_idle(status in arb_status(), script in arb_script()) {
        let card = FakeCard::new(status);
        let mut controller = LockController::new(card.handle());
        for event in &script {
            apply(&mut controller, event);
        }

        controller.cancel();
        prop_assert!(controller.state().is_idle());
        prop_assert!(!controller.is_busy());
        prop_assert!(controller.intent().is_none());
        prop_assert!(controller.current_prompt().is_none());

        // And again: cancel is idempotent.
        controller.cancel();
        prop_assert!(controller.state().is_idle());
    }

    /// A completion whose token was never issued changes nothing.
    #[test]
    fn prop_unissued_tokens_never_mutate(status in arb_status(), script in arb_script()) {
        let card = FakeCard::new(status);
        let mut controller = LockController::new(card.handle());
        for event in &script {
            apply(&mut controller, event);
        }

        let before = controller.snapshot();
        let bogus = RequestId::new(before.next_request + 1000);
        let completion = controller.on_service_complete(bogus, Ok(()));
        prop_assert_eq!(completion, cardlock_core::Completion::Stale);
        prop_assert_eq!(controller.snapshot(), before);
    }

    /// Snapshot, JSON round trip, and restore reproduce the controller
    /// exactly, whatever state the script left it in.
    #[test]
    fn prop_snapshot_restore_is_lossless(status in arb_status(), script in arb_script()) {
        let card = FakeCard::new(status);
        let mut controller = LockController::new(card.handle());
        for event in &script {
            apply(&mut controller, event);
        }

        let snapshot = controller.snapshot();
        let json = snapshot.to_json().unwrap();
        let decoded = ControllerSnapshot::from_json(&json).unwrap();
        prop_assert_eq!(&decoded, &snapshot);

        let restored = LockController::restore(card.handle(), decoded).unwrap();
        prop_assert_eq!(restored.snapshot(), snapshot);
    }

    /// An active dialog or in-flight request always belongs to a flow, and
    /// the busy flag on the prompt mirrors the pending request.
    #[test]
    fn prop_activity_implies_intent(status in arb_status(), script in arb_script()) {
        let card = FakeCard::new(status);
        let mut controller = LockController::new(card.handle());

        for event in &script {
            apply(&mut controller, event);

            if !controller.state().is_idle() || controller.is_busy() {
                prop_assert!(controller.intent().is_some());
            }
            if controller.is_busy() {
                let prompt = controller.current_prompt();
                prop_assert!(prompt.is_some());
                prop_assert!(prompt.unwrap().busy);
            }
        }
    }

    /// Submitting with no active prompt is rejected and fully inert.
    #[test]
    fn prop_idle_submit_is_inert(status in arb_status(), text in "[0-9]{0,12}") {
        let card = FakeCard::new(status);
        let mut controller = LockController::new(card.handle());
        let before = controller.snapshot();

        prop_assert!(controller.submit(&text).is_err());
        prop_assert_eq!(controller.snapshot(), before);
    }
}
