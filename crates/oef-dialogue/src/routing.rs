//! Routing contexts.
//!
//! Every message carries a [`RoutingContext`] describing where it comes from
//! and where it goes. Replies are never addressed by hand: the context of the
//! message being answered is [`swap`](RoutingContext::swap)ped, and brand new
//! conversations start from [`RoutingContext::for_agent`].

use serde::{Deserialize, Serialize};

use crate::uri::{AgentAddress, OefUri};

/// Whether a context describes a received or a to-be-sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Received from the broker.
    Inbound,
    /// Handed to the broker.
    Outbound,
}

impl Direction {
    /// Returns the opposite direction.
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::Inbound => Self::Outbound,
            Self::Outbound => Self::Inbound,
        }
    }
}

/// Addressing data of a single message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingContext {
    source: OefUri,
    target: OefUri,
    direct: bool,
    direction: Direction,
    service_id: String,
}

impl RoutingContext {
    /// Context of a message that came from `origin` and is addressed to `local`.
    #[must_use]
    pub fn from_inbound(origin: &AgentAddress, local: &AgentAddress) -> Self {
        Self::from_inbound_uris(origin, local, "", "")
    }

    /// Like [`from_inbound`](Self::from_inbound), preferring the URIs carried by
    /// the message when they parse and name the same agents as `origin` and
    /// `local`.
    #[must_use]
    pub fn from_inbound_uris(
        origin: &AgentAddress,
        local: &AgentAddress,
        source_uri: &str,
        target_uri: &str,
    ) -> Self {
        let source = naming_or(OefUri::parse(source_uri), origin);
        let target = naming_or(OefUri::parse(target_uri), local);
        let service_id = target.agent_alias().to_string();
        Self {
            source,
            target,
            direct: true,
            direction: Direction::Inbound,
            service_id,
        }
    }

    /// Context for opening a conversation with `counterparty`.
    ///
    /// A `direct` context speaks from the same alias it addresses, so the
    /// counterparty's reply lands on the matching local service.
    #[must_use]
    pub fn for_agent(local: &AgentAddress, counterparty: &AgentAddress, direct: bool) -> Self {
        let target = OefUri::for_agent(counterparty);
        let mut source = OefUri::for_agent(local);
        if direct {
            source = source.with_agent_alias(target.agent_alias());
        }
        Self {
            service_id: target.agent_alias().to_string(),
            source,
            target,
            direct,
            direction: Direction::Outbound,
        }
    }

    /// Context for registering or unregistering one of our services.
    #[must_use]
    pub fn for_service(local: &AgentAddress, service_id: &str) -> Self {
        let source = OefUri::for_agent(&local.clone().with_alias(service_id));
        Self {
            source,
            target: OefUri::default(),
            direct: false,
            direction: Direction::Outbound,
            service_id: service_id.to_string(),
        }
    }

    /// Returns the context of a reply to this message.
    ///
    /// Source and target are exchanged and the direction flips; everything
    /// else is preserved, so swapping twice yields the original context.
    #[must_use]
    pub fn swap(&self) -> Self {
        Self {
            source: self.target.clone(),
            target: self.source.clone(),
            direct: self.direct,
            direction: self.direction.reversed(),
            service_id: self.service_id.clone(),
        }
    }

    /// Returns the sender URI.
    #[must_use]
    pub const fn source(&self) -> &OefUri {
        &self.source
    }

    /// Returns the recipient URI.
    #[must_use]
    pub const fn target(&self) -> &OefUri {
        &self.target
    }

    /// Returns the agent the message is addressed to.
    #[must_use]
    pub fn destination(&self) -> Option<AgentAddress> {
        self.target.agent_address()
    }

    /// Returns the agent the message comes from.
    #[must_use]
    pub fn origin(&self) -> Option<AgentAddress> {
        self.source.agent_address()
    }

    /// Returns true if the context addresses one specific agent service.
    #[must_use]
    pub const fn is_direct(&self) -> bool {
        self.direct
    }

    /// Returns the message direction.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the service the conversation is about (possibly empty).
    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.service_id
    }
}

/// Keeps `uri` only if it addresses the same agent as `fallback`.
fn naming_or(uri: OefUri, fallback: &AgentAddress) -> OefUri {
    if uri
        .agent_address()
        .is_some_and(|addr| addr.same_agent(fallback))
    {
        uri
    } else {
        OefUri::for_agent(fallback)
    }
}
