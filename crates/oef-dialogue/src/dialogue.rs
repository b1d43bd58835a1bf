//! A single negotiation thread.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NegotiationError;
use crate::ids::{AnswerId, DialogueId};
use crate::message::AgentMessage;
use crate::routing::RoutingContext;
use crate::state::{transition, NegotiationState, Step, Transition};
use crate::uri::AgentAddress;

/// Which side of the dialogue the local agent is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// We opened the dialogue.
    Initiator,
    /// The counterparty opened the dialogue.
    Responder,
}

/// Sequencing and addressing of a step about to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundStep {
    /// Answer id allocated for the step.
    pub answer_id: AnswerId,
    /// Answer id the step replies to.
    pub target: AnswerId,
    /// Addressing of the step.
    pub context: RoutingContext,
}

/// State of one negotiation, as seen by the local agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialogue {
    id: DialogueId,
    counterparty: AgentAddress,
    role: Role,
    state: NegotiationState,
    last_answer_id: AnswerId,
    last_target: AnswerId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    reply_context: Option<RoutingContext>,
}

impl Dialogue {
    /// Creates an idle dialogue.
    #[must_use]
    pub fn new(id: DialogueId, counterparty: AgentAddress, role: Role, now: DateTime<Utc>) -> Self {
        Self {
            id,
            counterparty,
            role,
            state: NegotiationState::Idle,
            last_answer_id: AnswerId::START,
            last_target: AnswerId::START,
            created_at: now,
            updated_at: now,
            closed_at: None,
            reply_context: None,
        }
    }

    /// Returns the dialogue id.
    #[must_use]
    pub const fn id(&self) -> DialogueId {
        self.id
    }

    /// Returns the agent on the other side.
    #[must_use]
    pub const fn counterparty(&self) -> &AgentAddress {
        &self.counterparty
    }

    /// Returns our role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> NegotiationState {
        self.state
    }

    /// Returns the answer id of the latest accepted step, sent or received.
    #[must_use]
    pub const fn last_answer_id(&self) -> AnswerId {
        self.last_answer_id
    }

    /// Returns the target of the latest accepted step.
    #[must_use]
    pub const fn last_target(&self) -> AnswerId {
        self.last_target
    }

    /// Returns the creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the time of the latest accepted step or local transition.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns when the dialogue reached a terminal state.
    #[must_use]
    pub const fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    /// Returns true once the dialogue is closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns the routing context of the latest received step.
    #[must_use]
    pub const fn reply_context(&self) -> Option<&RoutingContext> {
        self.reply_context.as_ref()
    }

    /// Validates a received step and commits it.
    ///
    /// Checks run in order: sender, sequence, state. The dialogue is left
    /// untouched when any check fails.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::CounterpartyMismatch`],
    /// [`NegotiationError::OutOfSequence`] or
    /// [`NegotiationError::IllegalTransition`].
    pub fn receive(
        &mut self,
        message: &AgentMessage,
        context: RoutingContext,
        now: DateTime<Utc>,
    ) -> Result<NegotiationState, NegotiationError> {
        if !message.origin.same_agent(&self.counterparty) {
            return Err(NegotiationError::CounterpartyMismatch {
                dialogue_id: self.id,
                expected: self.counterparty.clone(),
                actual: message.origin.clone(),
            });
        }

        if message.target != self.last_answer_id || message.answer_id <= self.last_answer_id {
            return Err(NegotiationError::OutOfSequence {
                dialogue_id: self.id,
                answer_id: message.answer_id,
                target: message.target,
                expected: self.last_answer_id,
            });
        }

        let next = self.next_state(Transition::receive(message.body.step()))?;

        self.state = next;
        self.last_answer_id = message.answer_id;
        self.last_target = message.target;
        self.reply_context = Some(context);
        self.touch(now);
        Ok(next)
    }

    /// Performs the send transition for `step` and allocates its answer id.
    ///
    /// The step replies to the latest received context when there is one;
    /// otherwise it opens a fresh context towards the counterparty.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::IllegalTransition`] if `step` cannot be sent now.
    pub fn send(
        &mut self,
        step: Step,
        local: &AgentAddress,
        now: DateTime<Utc>,
    ) -> Result<OutboundStep, NegotiationError> {
        let next = self.next_state(Transition::send(step))?;

        let answer_id = self.last_answer_id.next();
        let target = self.last_answer_id;
        let context = match &self.reply_context {
            Some(inbound) => inbound.swap(),
            None => RoutingContext::for_agent(local, &self.counterparty, true),
        };

        self.state = next;
        self.last_answer_id = answer_id;
        self.last_target = target;
        self.touch(now);
        Ok(OutboundStep {
            answer_id,
            target,
            context,
        })
    }

    /// Applies a local lifecycle event: complete, cancel, dialogue error or timeout.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::IllegalTransition`] if the event is not allowed.
    pub fn apply(
        &mut self,
        event: Transition,
        now: DateTime<Utc>,
    ) -> Result<NegotiationState, NegotiationError> {
        let was_closed = self.is_closed();
        let next = self.next_state(event)?;
        self.state = next;
        if !was_closed {
            self.touch(now);
        }
        Ok(next)
    }

    /// Returns true if the dialogue is live and has been quiet for longer than `window`.
    #[must_use]
    pub fn is_idle(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        !self.is_closed() && now - self.updated_at >= window
    }

    /// Returns true if the dialogue is closed and its retention window has passed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, retention: chrono::Duration) -> bool {
        self.closed_at
            .is_some_and(|closed_at| now - closed_at >= retention)
    }

    fn next_state(&self, event: Transition) -> Result<NegotiationState, NegotiationError> {
        transition(self.state, event).ok_or(NegotiationError::IllegalTransition {
            dialogue_id: self.id,
            state: self.state,
            transition: event,
        })
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        if self.state.is_terminal() && self.closed_at.is_none() {
            self.closed_at = Some(now);
        }
    }
}
