//! Ephemeral capture of a controller's dialog state.
//!
//! Snapshots exist so a host UI that is torn down and rebuilt (screen
//! rotation, process handoff) can resume an in-progress flow instead of
//! dropping the user's partially entered credentials. They contain those
//! credentials in the clear and must live only as long as the handoff:
//! never write one to durable storage.

use serde::{Deserialize, Serialize};

use crate::controller::FlowIntent;
use crate::dialog::DialogState;
use crate::error::{LockError, Result};
use crate::request::PendingRequest;
use crate::types::CardId;

/// Full dialog state of one controller at a point in time.
///
/// Restoring with [`crate::LockController::restore`] reproduces the
/// controller exactly, including the outstanding request token, so a
/// completion that arrives after the interruption is still accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub card: CardId,
    pub state: DialogState,
    pub intent: Option<FlowIntent>,
    pub pending: Option<PendingRequest>,
    pub error: Option<LockError>,
    pub next_request: u64,
}

impl ControllerSnapshot {
    /// Encode for an in-memory handoff.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a handoff payload. Credential fields are revalidated.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{RequestId, ServiceOpKind};
    use crate::types::Secret;

    #[test]
    fn test_json_round_trip() {
        let snapshot = ControllerSnapshot {
            card: CardId::new(1),
            state: DialogState::PukEnterNewPin {
                puk: Secret::parse("87654321").unwrap(),
            },
            intent: Some(FlowIntent::Unlock),
            pending: None,
            error: Some(LockError::CredentialRejected {
                attempts_remaining: Some(9),
            }),
            next_request: 4,
        };
        let json = snapshot.to_json().unwrap();
        let back = ControllerSnapshot::from_json(&json).unwrap();
        assert_eq!(snapshot, back);
    }

    #[test]
    fn test_pending_token_round_trips() {
        let snapshot = ControllerSnapshot {
            card: CardId::new(0),
            state: DialogState::Idle,
            intent: Some(FlowIntent::ToggleLock { enable: false }),
            pending: Some(PendingRequest {
                id: RequestId::new(3),
                op: ServiceOpKind::SetLockEnabled { enable: false },
            }),
            error: None,
            next_request: 4,
        };
        let back = ControllerSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(back.pending, snapshot.pending);
    }

    #[test]
    fn test_corrupt_payload_is_rejected() {
        assert!(ControllerSnapshot::from_json("not json").is_err());
        // Structurally valid JSON with an out-of-bounds secret fails the
        // revalidation inside Secret's Deserialize.
        let json = r#"{"card":0,"state":{"step":"EnterNewPin","old_pin":"12"},"intent":"ChangePin","pending":null,"error":null,"next_request":1}"#;
        assert!(ControllerSnapshot::from_json(json).is_err());
    }
}
