//! Error types for oef-dialogue.

use thiserror::Error;

use crate::ids::{AnswerId, DialogueId};
use crate::state::{NegotiationState, Transition};
use crate::uri::AgentAddress;

/// Errors raised by the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The broker connection is gone.
    #[error("broker connection closed")]
    Disconnected,

    /// The broker refused or failed to take the message.
    #[error("send failed: {0}")]
    Send(String),

    /// No agent is connected under the destination key.
    #[error("unknown destination: {0}")]
    UnknownDestination(String),
}

/// Errors raised while negotiating.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// The event is not allowed in the dialogue's current state.
    #[error("dialogue {dialogue_id}: cannot {transition} in state {state}")]
    IllegalTransition {
        /// The dialogue concerned.
        dialogue_id: DialogueId,
        /// State at the time of the event.
        state: NegotiationState,
        /// The rejected event.
        transition: Transition,
    },

    /// The message does not continue the dialogue's sequence.
    #[error(
        "dialogue {dialogue_id}: message {answer_id} targets {target}, expected target {expected}"
    )]
    OutOfSequence {
        /// The dialogue concerned.
        dialogue_id: DialogueId,
        /// Answer id carried by the message.
        answer_id: AnswerId,
        /// Target carried by the message.
        target: AnswerId,
        /// Last answer id recorded for the dialogue.
        expected: AnswerId,
    },

    /// The message comes from an agent other than the dialogue's counterparty.
    #[error("dialogue {dialogue_id}: message from {actual}, counterparty is {expected}")]
    CounterpartyMismatch {
        /// The dialogue concerned.
        dialogue_id: DialogueId,
        /// The dialogue's counterparty.
        expected: AgentAddress,
        /// Origin of the message.
        actual: AgentAddress,
    },

    /// No dialogue with this id is known.
    #[error("unknown dialogue {0}")]
    UnknownDialogue(DialogueId),

    /// A live dialogue with this id already exists with another counterparty.
    #[error("dialogue {0} already exists with another counterparty")]
    DialogueIdConflict(DialogueId),

    /// The dialogue table reached its capacity.
    #[error("dialogue table full ({capacity} dialogues)")]
    TableFull {
        /// Configured capacity.
        capacity: usize,
    },

    /// The transport failed to deliver a message.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// An agent address could not be parsed.
    #[error("invalid agent address: {0:?}")]
    InvalidAddress(String),
}

impl NegotiationError {
    /// Returns true for errors after which the engine cannot continue.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::TableFull { .. })
    }

    /// Returns the dialogue the error concerns, if any.
    #[must_use]
    pub const fn dialogue_id(&self) -> Option<DialogueId> {
        match self {
            Self::IllegalTransition { dialogue_id, .. }
            | Self::OutOfSequence { dialogue_id, .. }
            | Self::CounterpartyMismatch { dialogue_id, .. } => Some(*dialogue_id),
            Self::UnknownDialogue(id) | Self::DialogueIdConflict(id) => Some(*id),
            _ => None,
        }
    }
}
