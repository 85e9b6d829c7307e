#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use cardlock_core::{
    CardHandle, CardId, CardLockState, CardStatus, LockController, RequestId, ServiceError,
};

#[derive(Arbitrary, Debug)]
struct Script {
    present: bool,
    lock_enabled: bool,
    lock_state: u8,
    pin_attempts: Option<u8>,
    puk_attempts: Option<u8>,
    events: Vec<Event>,
}

#[derive(Arbitrary, Debug)]
enum Event {
    StartToggle(bool),
    StartChangePin,
    StartUnlock,
    Submit(String),
    Cancel,
    Complete {
        id: u8,
        rejected: Option<u8>,
        unavailable: bool,
    },
    Resume,
}

struct FixedCard(CardStatus);

impl CardHandle for FixedCard {
    fn id(&self) -> CardId {
        CardId::new(0)
    }

    fn status(&self) -> CardStatus {
        self.0
    }
}

fuzz_target!(|script: Script| {
    let status = CardStatus {
        present: script.present,
        lock_enabled: script.lock_enabled,
        lock_state: match script.lock_state % 4 {
            0 => CardLockState::Ready,
            1 => CardLockState::PinRequired,
            2 => CardLockState::PukRequired,
            _ => CardLockState::Blocked,
        },
        pin_attempts_remaining: script.pin_attempts.map(u32::from),
        puk_attempts_remaining: script.puk_attempts.map(u32::from),
    };

    let mut controller = LockController::new(Box::new(FixedCard(status)));

    for event in &script.events {
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
                let _ = controller.submit(text);
            }
            Event::Cancel => controller.cancel(),
            Event::Complete {
                id,
                rejected,
                unavailable,
            } => {
                let result = if *unavailable {
                    Err(ServiceError::Unavailable("fuzzed outage".to_string()))
                } else if let Some(attempts) = rejected {
                    Err(ServiceError::Rejected {
                        attempts_remaining: Some(u32::from(*attempts)),
                    })
                } else {
                    Ok(())
                };
                let _ = controller.on_service_complete(RequestId::new(u64::from(*id)), result);
            }
            Event::Resume => {
                let _ = controller.resume();
            }
        }

        // The handoff snapshot must round-trip from any reachable state
        let snapshot = controller.snapshot();
        let json = snapshot.to_json().unwrap();
        let decoded = cardlock_core::ControllerSnapshot::from_json(&json).unwrap();
        assert_eq!(snapshot, decoded);

        // Prompt projection never panics and never exposes entered text
        let _ = controller.current_prompt();
    }

    // Cancel must always land in Idle, whatever the script did
    controller.cancel();
    assert!(controller.state().is_idle());
    assert!(controller.current_prompt().is_none());
});
