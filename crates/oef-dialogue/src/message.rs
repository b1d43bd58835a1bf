//! Events received from the broker and messages handed to it.

use oef_schema::{CfpPayload, Proposal};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{AnswerId, DialogueId};
use crate::routing::RoutingContext;
use crate::state::Step;
use crate::uri::AgentAddress;

/// Body of a dialogue message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum MessageBody {
    /// Call for proposals.
    Cfp(CfpPayload),
    /// Offer in response to a CFP.
    Propose(Proposal),
    /// Acceptance of the last proposal.
    Accept,
    /// Refusal to continue.
    Decline,
    /// Free-form content.
    Message(Vec<u8>),
}

impl MessageBody {
    /// Returns the protocol step this body represents.
    #[must_use]
    pub const fn step(&self) -> Step {
        match self {
            Self::Cfp(_) => Step::Cfp,
            Self::Propose(_) => Step::Propose,
            Self::Accept => Step::Accept,
            Self::Decline => Step::Decline,
            Self::Message(_) => Step::Message,
        }
    }
}

/// A dialogue message as delivered by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Sequence number of this step.
    pub answer_id: AnswerId,
    /// Dialogue the step belongs to.
    pub dialogue_id: DialogueId,
    /// Sending agent.
    pub origin: AgentAddress,
    /// Answer id this step replies to.
    pub target: AnswerId,
    /// Step content.
    pub body: MessageBody,
    /// Full sender URI, empty when the broker did not supply one.
    #[serde(default)]
    pub source_uri: String,
    /// Full recipient URI, empty when the broker did not supply one.
    #[serde(default)]
    pub target_uri: String,
}

impl AgentMessage {
    /// Creates a message without URIs.
    #[must_use]
    pub fn new(
        dialogue_id: DialogueId,
        answer_id: AnswerId,
        target: AnswerId,
        origin: AgentAddress,
        body: MessageBody,
    ) -> Self {
        Self {
            answer_id,
            dialogue_id,
            origin,
            target,
            body,
            source_uri: String::new(),
            target_uri: String::new(),
        }
    }
}

/// Broker operation an [`InboundEvent::OefError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OefErrorOperation {
    /// Service registration.
    RegisterService,
    /// Service unregistration.
    UnregisterService,
    /// Agent description registration.
    RegisterDescription,
    /// Agent description unregistration.
    UnregisterDescription,
    /// Service search.
    SearchServices,
    /// Wide service search.
    SearchServicesWide,
    /// Agent search.
    SearchAgents,
    /// Message delivery.
    SendMessage,
    /// Unclassified failure.
    Other,
    /// The broker could not decode the message.
    BadMessage,
    /// The broker does not support the operation.
    BadOperation,
}

impl OefErrorOperation {
    /// Returns the numeric code used on the wire.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::RegisterService => 0,
            Self::UnregisterService => 1,
            Self::RegisterDescription => 2,
            Self::UnregisterDescription => 3,
            Self::SearchServices => 4,
            Self::SearchServicesWide => 5,
            Self::SearchAgents => 6,
            Self::SendMessage => 7,
            Self::Other => 0x99,
            Self::BadMessage => 0x100,
            Self::BadOperation => 0x101,
        }
    }

    /// Maps a wire code back to an operation. Unknown codes map to [`Self::Other`].
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code {
            0 => Self::RegisterService,
            1 => Self::UnregisterService,
            2 => Self::RegisterDescription,
            3 => Self::UnregisterDescription,
            4 => Self::SearchServices,
            5 => Self::SearchServicesWide,
            6 => Self::SearchAgents,
            7 => Self::SendMessage,
            0x100 => Self::BadMessage,
            0x101 => Self::BadOperation,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for OefErrorOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One hit of a wide search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    /// Key of the matching agent.
    pub agent_key: String,
    /// Key of the core the agent is attached to.
    pub core_key: String,
    /// Host of that core.
    pub core_address: String,
    /// Port of that core.
    pub port: u16,
    /// Distance to the searcher, in kilometres, when locations are known.
    pub distance: Option<f64>,
}

/// Everything the broker can deliver to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A dialogue message.
    Agent(AgentMessage),

    /// Answer to a service or agent search.
    SearchResult {
        /// Id of the search this answers.
        search_id: u32,
        /// Matching agents.
        agents: Vec<AgentAddress>,
    },

    /// Answer to a wide search.
    SearchResultWide {
        /// Id of the search this answers.
        search_id: u32,
        /// Matching agents with their core coordinates.
        items: Vec<SearchResultItem>,
    },

    /// A broker operation failed.
    OefError {
        /// Answer id of the failed request.
        answer_id: AnswerId,
        /// The failed operation.
        operation: OefErrorOperation,
        /// Short cause, if the broker gave one.
        cause: Option<String>,
        /// Additional detail.
        detail: Option<String>,
    },

    /// A dialogue message could not be delivered.
    DialogueError {
        /// Answer id of the undeliverable message.
        answer_id: AnswerId,
        /// Dialogue concerned.
        dialogue_id: DialogueId,
        /// Agent the message was addressed to.
        origin: AgentAddress,
    },
}

/// A dialogue message ready for the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Sequence number of this step.
    pub answer_id: AnswerId,
    /// Dialogue the step belongs to.
    pub dialogue_id: DialogueId,
    /// Answer id this step replies to.
    pub target: AnswerId,
    /// Addressing.
    pub context: RoutingContext,
    /// Step content.
    pub body: MessageBody,
}

impl OutboundMessage {
    /// Returns the agent this message is for.
    #[must_use]
    pub fn destination(&self) -> Option<AgentAddress> {
        self.context.destination()
    }

    /// Turns the message into the event its recipient observes.
    ///
    /// The sender key is taken from `sender`; the alias comes from the
    /// routing context.
    #[must_use]
    pub fn into_delivery(self, sender: &AgentAddress) -> AgentMessage {
        let origin = self
            .context
            .origin()
            .filter(|o| o.same_agent(sender))
            .unwrap_or_else(|| sender.clone());
        AgentMessage {
            answer_id: self.answer_id,
            dialogue_id: self.dialogue_id,
            origin,
            target: self.target,
            source_uri: self.context.source().to_string(),
            target_uri: self.context.target().to_string(),
            body: self.body,
        }
    }
}
