//! Executes controller-issued requests and marshals completions back to
//! the controller's owning task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use cardlock_core::{CardId, RequestId, ServiceError, ServiceOp, ServiceRequest};

use crate::CredentialService;

/// A finished service call, delivered on the completion channel.
#[derive(Debug)]
pub struct ServiceCompletion {
    pub card: CardId,
    pub request: RequestId,
    pub result: Result<(), ServiceError>,
}

/// Dispatches service calls onto the runtime and reports their results
/// over a channel.
///
/// The receiver half lives on the task that owns the controllers; feeding
/// received completions into `LockController::on_service_complete` keeps
/// all state mutation on that one task while the calls themselves run
/// concurrently.
#[derive(Clone)]
pub struct ServiceDriver {
    service: Arc<dyn CredentialService>,
    completions: mpsc::UnboundedSender<ServiceCompletion>,
}

impl ServiceDriver {
    /// Wrap a service; the returned receiver delivers completions.
    pub fn new(
        service: Arc<dyn CredentialService>,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceCompletion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                service,
                completions: tx,
            },
            rx,
        )
    }

    /// Execute one request in the background. Never blocks; the result
    /// arrives on the completion channel, carrying the request's token.
    pub fn dispatch(&self, request: ServiceRequest) {
        let service = Arc::clone(&self.service);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let ServiceRequest { id, card, op } = request;
            debug!(%card, request = %id, "executing service call");
            let result = match op {
                ServiceOp::VerifyPin { pin } => service.verify_pin(card, pin).await,
                ServiceOp::SetLockEnabled { enable, pin } => {
                    service.set_lock_enabled(card, enable, pin).await
                }
                ServiceOp::ChangePin { old_pin, new_pin } => {
                    service.change_pin(card, old_pin, new_pin).await
                }
                ServiceOp::UnlockPuk { puk, new_pin } => {
                    service.unlock_puk(card, puk, new_pin).await
                }
            };
            // A closed receiver means the host is shutting down; the
            // completion has nowhere to go.
            let _ = completions.send(ServiceCompletion {
                card,
                request: id,
                result,
            });
        });
    }
}
