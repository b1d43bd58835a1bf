//! Application callbacks.
//!
//! The engine calls an [`AgentHandler`] for every accepted inbound event.
//! Callbacks answer with [`Action`]s, which the engine performs once the
//! callback has returned. No engine lock is held while a callback runs.

use oef_schema::{CfpPayload, Proposal};
use serde::{Deserialize, Serialize};

use crate::dialogue::Dialogue;
use crate::error::NegotiationError;
use crate::ids::{AnswerId, DialogueId};
use crate::message::{AgentMessage, OefErrorOperation, SearchResultItem};
use crate::uri::AgentAddress;

/// Something the application wants the engine to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Open a new dialogue with a CFP.
    Cfp {
        /// Agent to negotiate with.
        to: AgentAddress,
        /// CFP content.
        payload: CfpPayload,
    },
    /// Answer a CFP with a proposal.
    Propose {
        /// Dialogue to answer on.
        dialogue_id: DialogueId,
        /// The offer.
        proposal: Proposal,
    },
    /// Accept the last proposal.
    Accept {
        /// Dialogue to answer on.
        dialogue_id: DialogueId,
    },
    /// Decline and close the dialogue.
    Decline {
        /// Dialogue to answer on.
        dialogue_id: DialogueId,
    },
    /// Send free-form content.
    Message {
        /// Dialogue to send on.
        dialogue_id: DialogueId,
        /// Content bytes.
        content: Vec<u8>,
    },
    /// Close an accepted dialogue as completed.
    Complete {
        /// Dialogue to close.
        dialogue_id: DialogueId,
    },
    /// Abort a dialogue.
    Cancel {
        /// Dialogue to abort.
        dialogue_id: DialogueId,
    },
}

impl Action {
    /// Returns the dialogue the action applies to; `None` for a new CFP.
    #[must_use]
    pub const fn dialogue_id(&self) -> Option<DialogueId> {
        match self {
            Self::Cfp { .. } => None,
            Self::Propose { dialogue_id, .. }
            | Self::Accept { dialogue_id }
            | Self::Decline { dialogue_id }
            | Self::Message { dialogue_id, .. }
            | Self::Complete { dialogue_id }
            | Self::Cancel { dialogue_id } => Some(*dialogue_id),
        }
    }
}

/// Callbacks of an agent.
///
/// Every method has an empty default so agents only implement what they
/// care about. The `dialogue` argument is a snapshot taken right after the
/// event was committed.
#[allow(unused_variables)]
pub trait AgentHandler: Send {
    /// A CFP opened a dialogue.
    fn on_cfp(&mut self, dialogue: &Dialogue, payload: &CfpPayload) -> Vec<Action> {
        Vec::new()
    }

    /// The counterparty proposed.
    fn on_propose(&mut self, dialogue: &Dialogue, proposal: &Proposal) -> Vec<Action> {
        Vec::new()
    }

    /// The counterparty accepted our proposal.
    fn on_accept(&mut self, dialogue: &Dialogue) -> Vec<Action> {
        Vec::new()
    }

    /// The counterparty declined.
    fn on_decline(&mut self, dialogue: &Dialogue) -> Vec<Action> {
        Vec::new()
    }

    /// The counterparty sent free-form content.
    fn on_message(&mut self, dialogue: &Dialogue, content: &[u8]) -> Vec<Action> {
        Vec::new()
    }

    /// A search answered.
    fn on_search_result(&mut self, search_id: u32, agents: &[AgentAddress]) -> Vec<Action> {
        Vec::new()
    }

    /// A wide search answered.
    fn on_search_result_wide(&mut self, search_id: u32, items: &[SearchResultItem]) -> Vec<Action> {
        Vec::new()
    }

    /// A broker operation failed. Dialogues are left as they are.
    fn on_oef_error(
        &mut self,
        answer_id: AnswerId,
        operation: OefErrorOperation,
        cause: Option<&str>,
        detail: Option<&str>,
    ) -> Vec<Action> {
        Vec::new()
    }

    /// The broker could not deliver a message of this dialogue.
    ///
    /// `dialogue` is the aborted dialogue, or `None` if it was unknown or
    /// already closed.
    fn on_dialogue_error(
        &mut self,
        dialogue_id: DialogueId,
        origin: &AgentAddress,
        dialogue: Option<&Dialogue>,
    ) -> Vec<Action> {
        Vec::new()
    }

    /// A live dialogue was closed for inactivity.
    fn on_timeout(&mut self, dialogue: &Dialogue) -> Vec<Action> {
        Vec::new()
    }

    /// An inbound message failed validation and was dropped.
    fn on_rejected(&mut self, message: &AgentMessage, error: &NegotiationError) -> Vec<Action> {
        Vec::new()
    }

    /// An action returned by a callback failed and was skipped.
    ///
    /// Not called for fatal errors.
    fn on_action_failed(&mut self, action: &Action, error: &NegotiationError) -> Vec<Action> {
        Vec::new()
    }
}

/// Handler that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl AgentHandler for NoopHandler {}
