//! Core identifiers, credential wrappers, and card status types.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

use crate::error::LockError;

/// Minimum accepted credential length (PIN or PUK), in characters
pub const MIN_PIN_LENGTH: usize = 4;

/// Maximum accepted credential length (PIN or PUK), in characters
pub const MAX_PIN_LENGTH: usize = 8;

/// Identifies one card slot in a multi-card system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CardId(pub u32);

impl CardId {
    pub fn new(slot: u32) -> Self {
        Self(slot)
    }

    pub fn slot(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// A credential entry (PIN or PUK) collected from the user.
///
/// The only way to construct one is [`Secret::parse`], which enforces the
/// length bounds, so any state holding a `Secret` holds a validated one.
/// `Debug` output is redacted, there is no `Display`, and the backing
/// buffer is zeroized on drop. The serde impls exist solely for the
/// ephemeral snapshot handoff; never write serialized secrets to durable
/// storage.
#[derive(Clone)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    /// Validate raw entered text and wrap it.
    pub fn parse(text: &str) -> Result<Self, LockError> {
        let len = text.chars().count();
        if !(MIN_PIN_LENGTH..=MAX_PIN_LENGTH).contains(&len) {
            return Err(LockError::InvalidInputLength { len });
        }
        Ok(Self(Zeroizing::new(text.to_string())))
    }

    /// Expose the credential for handoff to the verification service.
    pub fn reveal(&self) -> &str {
        &self.0
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Equality exists only for the re-entry confirmation step.
impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes() == other.0.as_bytes()
    }
}

impl Eq for Secret {}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Revalidate so a restored snapshot holds the same invariant.
        let raw = Zeroizing::new(String::deserialize(deserializer)?);
        Secret::parse(&raw).map_err(D::Error::custom)
    }
}

/// What the card currently demands before it will serve requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardLockState {
    /// No credential outstanding.
    Ready,
    /// The PIN must be verified before the card serves.
    PinRequired,
    /// PIN attempts are exhausted; only the PUK can recover the card.
    PukRequired,
    /// PUK attempts are exhausted; the card is permanently dead.
    Blocked,
}

/// Point-in-time lock status of one card.
///
/// Other processes can consume attempts or toggle the lock at any moment,
/// so this is requeried at every decision point and never cached across
/// prompt steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardStatus {
    /// Whether a card is present in the slot.
    pub present: bool,
    /// Whether the PIN lock is enabled on the card.
    pub lock_enabled: bool,
    /// The credential the card is currently demanding.
    pub lock_state: CardLockState,
    /// Remaining PIN attempts, if the card reports them.
    pub pin_attempts_remaining: Option<u32>,
    /// Remaining PUK attempts, if the card reports them.
    pub puk_attempts_remaining: Option<u32>,
}

impl CardStatus {
    /// Status of an empty slot.
    pub fn absent() -> Self {
        Self {
            present: false,
            lock_enabled: false,
            lock_state: CardLockState::Ready,
            pin_attempts_remaining: None,
            puk_attempts_remaining: None,
        }
    }

    /// Whether the card demands an unlock credential right now.
    pub fn unlock_required(&self) -> bool {
        matches!(
            self.lock_state,
            CardLockState::PinRequired | CardLockState::PukRequired
        )
    }

    /// Whether PIN attempts are exhausted and only the PUK can recover.
    pub fn pin_exhausted(&self) -> bool {
        self.lock_state == CardLockState::PukRequired || self.pin_attempts_remaining == Some(0)
    }
}

/// Live window onto one card, owned by the controller but created by the
/// host.
///
/// `status` must query the platform fresh on every call; handles never
/// cache.
pub trait CardHandle: Send {
    /// The slot this handle is bound to.
    fn id(&self) -> CardId;

    /// Current lock status, requeried from the platform.
    fn status(&self) -> CardStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_length_bounds() {
        assert!(Secret::parse("123").is_err());
        assert!(Secret::parse("1234").is_ok());
        assert!(Secret::parse("12345678").is_ok());
        assert!(Secret::parse("123456789").is_err());
        assert!(Secret::parse("").is_err());
    }

    #[test]
    fn test_secret_length_counts_chars_not_bytes() {
        // Four multibyte characters are within bounds even at 8 bytes.
        let secret = Secret::parse("çãéñ").unwrap();
        assert_eq!(secret.len(), 4);
    }

    #[test]
    fn test_secret_rejection_reports_length() {
        match Secret::parse("12") {
            Err(LockError::InvalidInputLength { len }) => assert_eq!(len, 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::parse("123456").unwrap();
        let rendered = format!("{secret:?}");
        assert!(!rendered.contains("123456"));
        assert_eq!(rendered, "Secret(****)");
    }

    #[test]
    fn test_secret_equality() {
        let a = Secret::parse("4321").unwrap();
        let b = Secret::parse("4321").unwrap();
        let c = Secret::parse("43210").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_secret_serde_revalidates() {
        let secret = Secret::parse("998877").unwrap();
        let json = serde_json::to_string(&secret).unwrap();
        let back: Secret = serde_json::from_str(&json).unwrap();
        assert_eq!(secret, back);

        // Out-of-bounds serialized text is rejected on the way back in.
        assert!(serde_json::from_str::<Secret>("\"12\"").is_err());
    }

    #[test]
    fn test_status_predicates() {
        let mut status = CardStatus {
            present: true,
            lock_enabled: true,
            lock_state: CardLockState::PinRequired,
            pin_attempts_remaining: Some(3),
            puk_attempts_remaining: Some(10),
        };
        assert!(status.unlock_required());
        assert!(!status.pin_exhausted());

        status.lock_state = CardLockState::PukRequired;
        assert!(status.unlock_required());
        assert!(status.pin_exhausted());

        status.lock_state = CardLockState::Ready;
        status.pin_attempts_remaining = Some(0);
        assert!(!status.unlock_required());
        assert!(status.pin_exhausted());

        assert!(!CardStatus::absent().present);
    }

    #[test]
    fn test_card_id_display() {
        assert_eq!(CardId::new(2).to_string(), "slot 2");
    }
}
