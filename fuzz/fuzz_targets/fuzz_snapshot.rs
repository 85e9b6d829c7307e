#![no_main]

use libfuzzer_sys::fuzz_target;

use cardlock_core::{CardHandle, CardId, CardStatus, ControllerSnapshot, LockController};

struct FixedCard(CardId);

impl CardHandle for FixedCard {
    fn id(&self) -> CardId {
        self.0
    }

    fn status(&self) -> CardStatus {
        CardStatus::absent()
    }
}

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Try parsing as a handoff payload
    if let Ok(snapshot) = ControllerSnapshot::from_json(text) {
        let card = snapshot.card;

        // Round-trip
        let reserialized = snapshot.to_json().unwrap();
        let snapshot2 = ControllerSnapshot::from_json(&reserialized).unwrap();
        assert_eq!(snapshot, snapshot2);

        // Restoring and projecting a prompt should not panic, whatever
        // state the payload described
        if let Ok(controller) = LockController::restore(Box::new(FixedCard(card)), snapshot) {
            let _ = controller.current_prompt();
            let _ = controller.snapshot();
        }
    }
});
