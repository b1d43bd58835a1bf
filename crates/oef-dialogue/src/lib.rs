//! # oef-dialogue
//!
//! Negotiation core for OEF agents.
//!
//! This crate provides:
//!
//! - **Identifiers**: [`DialogueId`], [`AnswerId`] and the [`DialogueIdAllocator`]
//! - **Addressing**: [`AgentAddress`], [`OefUri`] and [`RoutingContext`] with reply swapping
//! - **State machine**: [`NegotiationState`] and the [`transition`] table for CFP → Propose → Accept/Decline
//! - **Dialogue table**: [`DialogueTable`] with timeout and retention sweeps
//! - **Engine**: [`NegotiationEngine`], driving dialogues over a [`Broker`] on behalf of an [`AgentHandler`]
//!
//! ## Example
//!
//! ```rust
//! use oef_dialogue::{transition, NegotiationState, Step, Transition};
//!
//! let state = transition(NegotiationState::Idle, Transition::send(Step::Cfp));
//! assert_eq!(state, Some(NegotiationState::CfpSent));
//!
//! // A proposal cannot be accepted by the side that made it.
//! let state = transition(NegotiationState::ProposalSent, Transition::send(Step::Accept));
//! assert_eq!(state, None);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dialogue;
pub mod engine;
pub mod error;
pub mod handler;
pub mod ids;
pub mod message;
pub mod routing;
pub mod state;
pub mod table;
pub mod transport;
pub mod uri;

pub use config::EngineConfig;
pub use dialogue::{Dialogue, OutboundStep, Role};
pub use engine::NegotiationEngine;
pub use error::{NegotiationError, TransportError};
pub use handler::{Action, AgentHandler, NoopHandler};
pub use ids::{AnswerId, DialogueId, DialogueIdAllocator};
pub use message::{
    AgentMessage, InboundEvent, MessageBody, OefErrorOperation, OutboundMessage, SearchResultItem,
};
pub use routing::{Direction, RoutingContext};
pub use state::{transition, CloseReason, NegotiationState, Step, Transition};
pub use table::{DialogueTable, SweepReport};
pub use transport::{Broker, Discovery, Transport};
pub use uri::{AgentAddress, OefUri};
