//! Registry of the dialogues of one agent.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::EngineConfig;
use crate::dialogue::{Dialogue, OutboundStep, Role};
use crate::error::NegotiationError;
use crate::ids::{DialogueId, DialogueIdAllocator};
use crate::message::AgentMessage;
use crate::routing::RoutingContext;
use crate::state::{NegotiationState, Step, Transition};
use crate::uri::AgentAddress;

/// Dialogues touched by one [`DialogueTable::sweep_expired`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Live dialogues closed for inactivity, snapshotted when closed.
    pub timed_out: Vec<Dialogue>,
    /// Closed dialogues removed after their retention window.
    pub evicted: Vec<DialogueId>,
}

impl SweepReport {
    /// Returns true if the sweep changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timed_out.is_empty() && self.evicted.is_empty()
    }

    /// Returns the ids of the dialogues that timed out.
    #[must_use]
    pub fn timed_out_ids(&self) -> Vec<DialogueId> {
        self.timed_out.iter().map(Dialogue::id).collect()
    }
}

/// All dialogues of one agent, keyed by dialogue id.
///
/// Live and recently closed dialogues both count towards the capacity; closed
/// ones stay until the retention window has passed so that late duplicates
/// are still recognised.
#[derive(Debug)]
pub struct DialogueTable {
    dialogues: HashMap<DialogueId, Dialogue>,
    allocator: DialogueIdAllocator,
    capacity: usize,
    inactivity: chrono::Duration,
    retention: chrono::Duration,
}

impl DialogueTable {
    /// Creates an empty table with the limits from `config`.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_allocator(config, DialogueIdAllocator::new())
    }

    /// Creates an empty table drawing ids from `allocator`.
    #[must_use]
    pub fn with_allocator(config: &EngineConfig, allocator: DialogueIdAllocator) -> Self {
        Self {
            dialogues: HashMap::new(),
            allocator,
            capacity: config.max_dialogues,
            inactivity: config.inactivity_timeout(),
            retention: config.retention(),
        }
    }

    /// Returns the number of dialogues held, closed ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dialogues.len()
    }

    /// Returns true if the table holds no dialogue.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dialogues.is_empty()
    }

    /// Returns true if a dialogue with this id is held.
    #[must_use]
    pub fn contains(&self, id: DialogueId) -> bool {
        self.dialogues.contains_key(&id)
    }

    /// Looks up a dialogue.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::UnknownDialogue`] if no dialogue has this id.
    pub fn get(&self, id: DialogueId) -> Result<&Dialogue, NegotiationError> {
        self.dialogues
            .get(&id)
            .ok_or(NegotiationError::UnknownDialogue(id))
    }

    /// Iterates over dialogues that are not closed.
    pub fn live(&self) -> impl Iterator<Item = &Dialogue> {
        self.dialogues.values().filter(|d| !d.is_closed())
    }

    /// Returns the dialogue with this id, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::DialogueIdConflict`] if the id is held by a
    /// dialogue with another counterparty, or [`NegotiationError::TableFull`]
    /// if a new dialogue would exceed the capacity.
    pub fn create_or_get(
        &mut self,
        id: DialogueId,
        counterparty: &AgentAddress,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<&mut Dialogue, NegotiationError> {
        if let Some(existing) = self.dialogues.get(&id) {
            if !existing.counterparty().same_agent(counterparty) {
                return Err(NegotiationError::DialogueIdConflict(id));
            }
        } else {
            self.ensure_capacity()?;
        }

        Ok(self
            .dialogues
            .entry(id)
            .or_insert_with(|| Dialogue::new(id, counterparty.clone(), role, now)))
    }

    /// Allocates a fresh dialogue id and inserts an idle dialogue for it.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::TableFull`] if the table is at capacity.
    pub fn open_outbound(
        &mut self,
        counterparty: &AgentAddress,
        now: DateTime<Utc>,
    ) -> Result<DialogueId, NegotiationError> {
        self.ensure_capacity()?;

        // One more candidate than there are entries always finds a free id.
        let attempts = self.dialogues.len() + 1;
        let dialogues = &self.dialogues;
        let id = self
            .allocator
            .allocate(attempts, |id| dialogues.contains_key(&id))
            .ok_or(NegotiationError::TableFull {
                capacity: self.capacity,
            })?;

        self.dialogues.insert(
            id,
            Dialogue::new(id, counterparty.clone(), Role::Initiator, now),
        );
        Ok(id)
    }

    /// Removes a dialogue.
    pub fn remove(&mut self, id: DialogueId) -> Option<Dialogue> {
        self.dialogues.remove(&id)
    }

    /// Validates and commits a received step.
    ///
    /// An opening step (CFP or message) for an unknown id creates the
    /// dialogue; it is only kept if the step is accepted. Returns a snapshot
    /// of the dialogue after the step.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::UnknownDialogue`] for a non-opening step on
    /// an unknown id, [`NegotiationError::CounterpartyMismatch`] when an opening
    /// step reuses the id of a dialogue with another agent, and any error of
    /// [`Dialogue::receive`].
    pub fn receive(
        &mut self,
        message: &AgentMessage,
        context: RoutingContext,
        now: DateTime<Utc>,
    ) -> Result<Dialogue, NegotiationError> {
        let id = message.dialogue_id;
        if let Some(dialogue) = self.dialogues.get_mut(&id) {
            dialogue.receive(message, context, now)?;
            return Ok(dialogue.clone());
        }

        if !message.body.step().can_open() {
            return Err(NegotiationError::UnknownDialogue(id));
        }

        self.ensure_capacity()?;
        let mut dialogue = Dialogue::new(id, message.origin.clone(), Role::Responder, now);
        dialogue.receive(message, context, now)?;
        self.dialogues.insert(id, dialogue.clone());
        debug!(dialogue_id = %id, origin = %message.origin, "dialogue opened by counterparty");
        Ok(dialogue)
    }

    /// Performs a send transition on a dialogue.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::UnknownDialogue`] or the error of [`Dialogue::send`].
    pub fn send(
        &mut self,
        id: DialogueId,
        step: Step,
        local: &AgentAddress,
        now: DateTime<Utc>,
    ) -> Result<OutboundStep, NegotiationError> {
        self.dialogues
            .get_mut(&id)
            .ok_or(NegotiationError::UnknownDialogue(id))?
            .send(step, local, now)
    }

    /// Applies a lifecycle event to a dialogue.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::UnknownDialogue`] or the error of [`Dialogue::apply`].
    pub fn apply(
        &mut self,
        id: DialogueId,
        event: Transition,
        now: DateTime<Utc>,
    ) -> Result<NegotiationState, NegotiationError> {
        self.dialogues
            .get_mut(&id)
            .ok_or(NegotiationError::UnknownDialogue(id))?
            .apply(event, now)
    }

    /// Times out idle dialogues and evicts closed ones past retention.
    ///
    /// A dialogue timed out by this pass is only evicted by this same pass
    /// when the retention window is zero.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for dialogue in self.dialogues.values_mut() {
            if dialogue.is_idle(now, self.inactivity)
                && dialogue.apply(Transition::Timeout, now).is_ok()
            {
                report.timed_out.push(dialogue.clone());
            }
        }

        let retention = self.retention;
        self.dialogues.retain(|id, dialogue| {
            let expired = dialogue.is_expired(now, retention);
            if expired {
                report.evicted.push(*id);
            }
            !expired
        });

        report.timed_out.sort_unstable_by_key(Dialogue::id);
        report.evicted.sort_unstable();
        report
    }

    fn ensure_capacity(&self) -> Result<(), NegotiationError> {
        if self.dialogues.len() >= self.capacity {
            return Err(NegotiationError::TableFull {
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}
