//! In-memory simulated card bank with GSM-style attempt semantics.
//!
//! Used by tests and the reference host. Three PIN attempts, ten PUK
//! attempts, PUK recovery installs a replacement PIN, PUK exhaustion
//! blocks the card for good. Latency and outage injection stand in for
//! the real platform's verification subsystem.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;
use zeroize::Zeroizing;

use cardlock_core::{
    CardHandle, CardId, CardLockState, CardStatus, Secret, ServiceError, DEFAULT_PIN_ATTEMPTS,
    DEFAULT_PUK_ATTEMPTS,
};

use crate::CredentialService;

/// Provisioning parameters for one simulated card.
#[derive(Debug, Clone)]
pub struct SimCardConfig {
    /// Installed PIN.
    pub pin: String,
    /// Recovery PUK; an 8-digit one is generated when not supplied.
    pub puk: Option<String>,
    /// Whether the PIN lock starts enabled.
    pub lock_enabled: bool,
    /// Whether the card boots demanding its PIN.
    pub start_locked: bool,
}

impl Default for SimCardConfig {
    fn default() -> Self {
        Self {
            pin: "1234".to_string(),
            puk: None,
            lock_enabled: true,
            start_locked: false,
        }
    }
}

struct SimCard {
    pin: Zeroizing<String>,
    puk: Zeroizing<String>,
    lock_enabled: bool,
    lock_state: CardLockState,
    pin_attempts: u32,
    puk_attempts: u32,
}

impl SimCard {
    fn status(&self) -> CardStatus {
        CardStatus {
            present: true,
            lock_enabled: self.lock_enabled,
            lock_state: self.lock_state,
            pin_attempts_remaining: Some(self.pin_attempts),
            puk_attempts_remaining: Some(self.puk_attempts),
        }
    }

    /// Verify the PIN with real attempt bookkeeping: a correct entry
    /// resets the counter, a wrong one burns an attempt and escalates to
    /// the PUK when the last attempt goes. A card already demanding its
    /// PUK refuses PIN attempts entirely, even correct ones.
    fn check_pin(&mut self, pin: &Secret) -> Result<(), ServiceError> {
        if matches!(
            self.lock_state,
            CardLockState::Blocked | CardLockState::PukRequired
        ) {
            return Err(ServiceError::Rejected {
                attempts_remaining: Some(0),
            });
        }
        if pin.reveal() == self.pin.as_str() {
            self.pin_attempts = DEFAULT_PIN_ATTEMPTS;
            if self.lock_state == CardLockState::PinRequired {
                self.lock_state = CardLockState::Ready;
            }
            Ok(())
        } else {
            self.pin_attempts = self.pin_attempts.saturating_sub(1);
            if self.pin_attempts == 0 {
                self.lock_state = CardLockState::PukRequired;
            }
            Err(ServiceError::Rejected {
                attempts_remaining: Some(self.pin_attempts),
            })
        }
    }

    fn check_puk(&mut self, puk: &Secret, new_pin: &Secret) -> Result<(), ServiceError> {
        if self.lock_state == CardLockState::Blocked {
            return Err(ServiceError::Rejected {
                attempts_remaining: Some(0),
            });
        }
        if puk.reveal() == self.puk.as_str() {
            self.pin = Zeroizing::new(new_pin.reveal().to_string());
            self.pin_attempts = DEFAULT_PIN_ATTEMPTS;
            self.puk_attempts = DEFAULT_PUK_ATTEMPTS;
            self.lock_state = CardLockState::Ready;
            Ok(())
        } else {
            self.puk_attempts = self.puk_attempts.saturating_sub(1);
            if self.puk_attempts == 0 {
                self.lock_state = CardLockState::Blocked;
            }
            Err(ServiceError::Rejected {
                attempts_remaining: Some(self.puk_attempts),
            })
        }
    }
}

struct SimBank {
    cards: HashMap<CardId, SimCard>,
    latency: Duration,
    unreachable: bool,
}

/// Shared in-memory card bank implementing [`CredentialService`].
///
/// Clone-cheap; all clones and handles see the same live state.
#[derive(Clone)]
pub struct SimService {
    inner: Arc<Mutex<SimBank>>,
}

impl SimService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimBank {
                cards: HashMap::new(),
                latency: Duration::ZERO,
                unreachable: false,
            })),
        }
    }

    fn bank(&self) -> MutexGuard<'_, SimBank> {
        // The bank holds plain data; a panic mid-update cannot leave it
        // logically torn, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a card into a slot and return its PUK so hosts and tests
    /// can recover the card later.
    pub fn provision(&self, card: CardId, config: SimCardConfig) -> String {
        let puk = config
            .puk
            .unwrap_or_else(|| format!("{:08}", rand::thread_rng().gen_range(0..100_000_000u32)));
        let lock_state = if config.lock_enabled && config.start_locked {
            CardLockState::PinRequired
        } else {
            CardLockState::Ready
        };
        debug!(%card, lock_enabled = config.lock_enabled, ?lock_state, "card provisioned");
        self.bank().cards.insert(
            card,
            SimCard {
                pin: Zeroizing::new(config.pin),
                puk: Zeroizing::new(puk.clone()),
                lock_enabled: config.lock_enabled,
                lock_state,
                pin_attempts: DEFAULT_PIN_ATTEMPTS,
                puk_attempts: DEFAULT_PUK_ATTEMPTS,
            },
        );
        puk
    }

    /// Pull a card out of its slot.
    pub fn remove_card(&self, card: CardId) {
        self.bank().cards.remove(&card);
    }

    /// Per-operation latency, simulating platform IPC.
    pub fn set_latency(&self, latency: Duration) {
        self.bank().latency = latency;
    }

    /// Simulate the verification subsystem being unreachable. Operations
    /// fail without touching any attempt counter until cleared.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.bank().unreachable = unreachable;
    }

    /// A [`CardHandle`] bound to this bank's live state.
    pub fn handle(&self, card: CardId) -> SimCardHandle {
        SimCardHandle {
            service: self.clone(),
            card,
        }
    }

    /// Latency plus outage injection, shared by every operation.
    async fn transport(&self) -> Result<(), ServiceError> {
        let (latency, unreachable) = {
            let bank = self.bank();
            (bank.latency, bank.unreachable)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if unreachable {
            return Err(ServiceError::Unavailable(
                "verification subsystem unreachable".to_string(),
            ));
        }
        Ok(())
    }

    fn with_card<T>(
        &self,
        card: CardId,
        op: impl FnOnce(&mut SimCard) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut bank = self.bank();
        match bank.cards.get_mut(&card) {
            Some(sim) => op(sim),
            None => Err(ServiceError::Unavailable("no card in slot".to_string())),
        }
    }
}

impl Default for SimService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialService for SimService {
    fn status(&self, card: CardId) -> CardStatus {
        self.bank()
            .cards
            .get(&card)
            .map(SimCard::status)
            .unwrap_or_else(CardStatus::absent)
    }

    async fn verify_pin(&self, card: CardId, pin: Secret) -> Result<(), ServiceError> {
        self.transport().await?;
        self.with_card(card, |sim| sim.check_pin(&pin))
    }

    async fn set_lock_enabled(
        &self,
        card: CardId,
        enable: bool,
        pin: Secret,
    ) -> Result<(), ServiceError> {
        self.transport().await?;
        self.with_card(card, |sim| {
            sim.check_pin(&pin)?;
            sim.lock_enabled = enable;
            debug!(%card, enabled = enable, "lock toggled");
            Ok(())
        })
    }

    async fn change_pin(
        &self,
        card: CardId,
        old_pin: Secret,
        new_pin: Secret,
    ) -> Result<(), ServiceError> {
        self.transport().await?;
        self.with_card(card, |sim| {
            sim.check_pin(&old_pin)?;
            sim.pin = Zeroizing::new(new_pin.reveal().to_string());
            debug!(%card, "PIN replaced");
            Ok(())
        })
    }

    async fn unlock_puk(
        &self,
        card: CardId,
        puk: Secret,
        new_pin: Secret,
    ) -> Result<(), ServiceError> {
        self.transport().await?;
        self.with_card(card, |sim| sim.check_puk(&puk, &new_pin))
    }
}

/// Handle onto one simulated slot; `status` requeries the bank each call.
#[derive(Clone)]
pub struct SimCardHandle {
    service: SimService,
    card: CardId,
}

impl CardHandle for SimCardHandle {
    fn id(&self) -> CardId {
        self.card
    }

    fn status(&self) -> CardStatus {
        self.service.status(self.card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARD: CardId = CardId(0);

    fn secret(text: &str) -> Secret {
        Secret::parse(text).unwrap()
    }

    fn locked_service() -> SimService {
        let service = SimService::new();
        service.provision(
            CARD,
            SimCardConfig {
                puk: Some("87654321".to_string()),
                start_locked: true,
                ..SimCardConfig::default()
            },
        );
        service
    }

    #[tokio::test]
    async fn test_wrong_pin_decrements_and_escalates() {
        let service = locked_service();

        for expected in [2u32, 1] {
            let err = service.verify_pin(CARD, secret("9999")).await.unwrap_err();
            assert_eq!(
                err,
                ServiceError::Rejected {
                    attempts_remaining: Some(expected)
                }
            );
            assert_eq!(service.status(CARD).lock_state, CardLockState::PinRequired);
        }

        let err = service.verify_pin(CARD, secret("9999")).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::Rejected {
                attempts_remaining: Some(0)
            }
        );
        assert_eq!(service.status(CARD).lock_state, CardLockState::PukRequired);

        // PIN attempts are gone; even the right PIN is refused now.
        assert!(service.verify_pin(CARD, secret("1234")).await.is_err());
    }

    #[tokio::test]
    async fn test_correct_pin_resets_counter_and_unlocks() {
        let service = locked_service();

        service.verify_pin(CARD, secret("9999")).await.unwrap_err();
        assert_eq!(service.status(CARD).pin_attempts_remaining, Some(2));

        service.verify_pin(CARD, secret("1234")).await.unwrap();
        let status = service.status(CARD);
        assert_eq!(status.lock_state, CardLockState::Ready);
        assert_eq!(status.pin_attempts_remaining, Some(DEFAULT_PIN_ATTEMPTS));
    }

    #[tokio::test]
    async fn test_lock_toggle_applies() {
        let service = SimService::new();
        service.provision(CARD, SimCardConfig::default());

        service
            .set_lock_enabled(CARD, false, secret("1234"))
            .await
            .unwrap();
        assert!(!service.status(CARD).lock_enabled);

        service
            .set_lock_enabled(CARD, true, secret("1234"))
            .await
            .unwrap();
        assert!(service.status(CARD).lock_enabled);
    }

    #[tokio::test]
    async fn test_change_pin_swaps_credential() {
        let service = SimService::new();
        service.provision(CARD, SimCardConfig::default());

        service
            .change_pin(CARD, secret("1234"), secret("567890"))
            .await
            .unwrap();

        assert!(service.verify_pin(CARD, secret("1234")).await.is_err());
        service.verify_pin(CARD, secret("567890")).await.unwrap();
    }

    #[tokio::test]
    async fn test_puk_recovery_installs_new_pin() {
        let service = locked_service();

        // Burn through the PIN attempts.
        for _ in 0..DEFAULT_PIN_ATTEMPTS {
            service.verify_pin(CARD, secret("9999")).await.unwrap_err();
        }
        assert_eq!(service.status(CARD).lock_state, CardLockState::PukRequired);

        service
            .unlock_puk(CARD, secret("87654321"), secret("0000"))
            .await
            .unwrap();

        let status = service.status(CARD);
        assert_eq!(status.lock_state, CardLockState::Ready);
        assert_eq!(status.pin_attempts_remaining, Some(DEFAULT_PIN_ATTEMPTS));
        assert_eq!(status.puk_attempts_remaining, Some(DEFAULT_PUK_ATTEMPTS));

        service.verify_pin(CARD, secret("0000")).await.unwrap();
    }

    #[tokio::test]
    async fn test_puk_exhaustion_blocks_permanently() {
        let service = locked_service();

        for expected in (0..DEFAULT_PUK_ATTEMPTS).rev() {
            let err = service
                .unlock_puk(CARD, secret("00000000"), secret("0000"))
                .await
                .unwrap_err();
            assert_eq!(
                err,
                ServiceError::Rejected {
                    attempts_remaining: Some(expected)
                }
            );
        }
        assert_eq!(service.status(CARD).lock_state, CardLockState::Blocked);

        // Even the right PUK is refused once blocked.
        let err = service
            .unlock_puk(CARD, secret("87654321"), secret("0000"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Rejected {
                attempts_remaining: Some(0)
            }
        );
    }

    #[tokio::test]
    async fn test_outage_does_not_touch_counters() {
        let service = locked_service();
        service.set_unreachable(true);

        let err = service.verify_pin(CARD, secret("9999")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert_eq!(
            service.status(CARD).pin_attempts_remaining,
            Some(DEFAULT_PIN_ATTEMPTS)
        );

        // Back online, the same card works and the counter is intact.
        service.set_unreachable(false);
        service.verify_pin(CARD, secret("1234")).await.unwrap();
    }

    #[tokio::test]
    async fn test_absent_slot_is_unreachable() {
        let service = SimService::new();
        assert!(!service.status(CARD).present);

        let err = service.verify_pin(CARD, secret("1234")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_handle_reports_live_status() {
        let service = SimService::new();
        service.provision(CARD, SimCardConfig::default());
        let handle = service.handle(CARD);

        assert!(handle.status().lock_enabled);
        service
            .set_lock_enabled(CARD, false, secret("1234"))
            .await
            .unwrap();
        assert!(!handle.status().lock_enabled);

        service.remove_card(CARD);
        assert!(!handle.status().present);
    }

    #[test]
    fn test_generated_puk_is_well_formed() {
        let service = SimService::new();
        let puk = service.provision(CARD, SimCardConfig::default());
        assert_eq!(puk.len(), 8);
        assert!(puk.chars().all(|c| c.is_ascii_digit()));
    }
}
