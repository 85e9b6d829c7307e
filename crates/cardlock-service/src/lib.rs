//! Asynchronous platform boundary for cardlock.
//!
//! [`CredentialService`] is the verification boundary controller-issued
//! requests are executed against. [`ServiceDriver`] runs those requests on
//! the tokio runtime and marshals completions back to the controller's
//! owning task over a channel. [`SimService`] is an in-memory card bank
//! with GSM-style attempt semantics for tests and local development.

mod driver;
mod sim;

pub use driver::{ServiceCompletion, ServiceDriver};
pub use sim::{SimCardConfig, SimCardHandle, SimService};

use async_trait::async_trait;

use cardlock_core::{CardId, CardStatus, Secret, ServiceError};

/// Asynchronous credential-verification boundary.
///
/// `status` is synchronous and cheap; the four credential operations may
/// block on platform IPC. The controller never issues a second call for a
/// card before the first resolves, so implementations do not need to
/// serialize per-card access themselves.
#[async_trait]
pub trait CredentialService: Send + Sync {
    /// Current lock status of a card slot. Absent slots report
    /// [`CardStatus::absent`].
    fn status(&self, card: CardId) -> CardStatus;

    /// Verify the PIN to satisfy the card's unlock demand.
    async fn verify_pin(&self, card: CardId, pin: Secret) -> Result<(), ServiceError>;

    /// Enable or disable the PIN lock, authorized by the current PIN.
    async fn set_lock_enabled(
        &self,
        card: CardId,
        enable: bool,
        pin: Secret,
    ) -> Result<(), ServiceError>;

    /// Replace the PIN, authorized by the old PIN.
    async fn change_pin(
        &self,
        card: CardId,
        old_pin: Secret,
        new_pin: Secret,
    ) -> Result<(), ServiceError>;

    /// Recover a PUK-demanding card, installing a replacement PIN.
    async fn unlock_puk(
        &self,
        card: CardId,
        puk: Secret,
        new_pin: Secret,
    ) -> Result<(), ServiceError>;
}
