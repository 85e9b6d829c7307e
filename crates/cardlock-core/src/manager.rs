//! Multi-card routing: one controller per slot.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::warn;

use crate::controller::{Completion, FlowOutcome, LockController};
use crate::error::Result;
use crate::request::{RequestId, ServiceResult};
use crate::snapshot::ControllerSnapshot;
use crate::types::{CardHandle, CardId};

/// Owns the lock controllers for every known card slot.
///
/// Flows on different cards are independent; completions are routed by
/// card id and then matched by token inside the controller.
#[derive(Default)]
pub struct LockManager {
    controllers: HashMap<CardId, LockController>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a card, building a fresh controller around its handle. An
    /// existing controller for the slot is replaced.
    pub fn attach(&mut self, card: Box<dyn CardHandle>) -> &mut LockController {
        let id = card.id();
        let controller = LockController::new(card);
        match self.controllers.entry(id) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(controller);
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(controller),
        }
    }

    /// Drop the controller for a removed card, abandoning any flow on it.
    pub fn detach(&mut self, card: CardId) -> Option<LockController> {
        self.controllers.remove(&card)
    }

    pub fn controller(&self, card: CardId) -> Option<&LockController> {
        self.controllers.get(&card)
    }

    pub fn controller_mut(&mut self, card: CardId) -> Option<&mut LockController> {
        self.controllers.get_mut(&card)
    }

    /// Known slots, in stable order.
    pub fn cards(&self) -> Vec<CardId> {
        let mut cards: Vec<CardId> = self.controllers.keys().copied().collect();
        cards.sort();
        cards
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Route a completion to the owning controller. Completions for
    /// unknown cards are stale by definition.
    pub fn on_service_complete(
        &mut self,
        card: CardId,
        id: RequestId,
        result: ServiceResult,
    ) -> Completion {
        match self.controllers.get_mut(&card) {
            Some(controller) => controller.on_service_complete(id, result),
            None => {
                warn!(%card, request = %id, "completion for unknown card ignored");
                Completion::Stale
            }
        }
    }

    /// Snapshot every controller for a UI-state handoff.
    pub fn snapshot_all(&self) -> Vec<ControllerSnapshot> {
        let mut snapshots: Vec<ControllerSnapshot> =
            self.controllers.values().map(|c| c.snapshot()).collect();
        snapshots.sort_by_key(|s| s.card);
        snapshots
    }

    /// Rebuild a manager from snapshots, pulling a fresh handle for each
    /// card from the host. Cards whose handle is gone are dropped along
    /// with their dialog state.
    pub fn restore_all<F>(snapshots: Vec<ControllerSnapshot>, mut handle_for: F) -> Result<Self>
    where
        F: FnMut(CardId) -> Option<Box<dyn CardHandle>>,
    {
        let mut manager = Self::new();
        for snapshot in snapshots {
            let card = snapshot.card;
            match handle_for(card) {
                Some(handle) => {
                    let controller = LockController::restore(handle, snapshot)?;
                    manager.controllers.insert(card, controller);
                }
                None => {
                    warn!(%card, "card gone after interruption; dropping its dialog state");
                }
            }
        }
        Ok(manager)
    }

    /// Re-run entry-mode selection on every controller after an
    /// interruption, collecting flows the interruption already decided.
    pub fn resume_all(&mut self) -> Vec<(CardId, FlowOutcome)> {
        let mut outcomes = Vec::new();
        for card in self.cards() {
            if let Some(controller) = self.controllers.get_mut(&card) {
                if let Some(outcome) = controller.resume() {
                    outcomes.push((card, outcome));
                }
            }
        }
        outcomes
    }
}
