//! # oef-local
//!
//! An OEF broker running inside the current process.
//!
//! This crate provides:
//!
//! - **Broker**: [`LocalBroker`], routing dialogue messages between connected agents
//! - **Connections**: [`LocalConnection`], implementing the
//!   [`Transport`](oef_dialogue::Transport) and [`Discovery`](oef_dialogue::Discovery)
//!   traits for one agent
//!
//! Undeliverable messages bounce back to the sender as
//! [`InboundEvent::DialogueError`](oef_dialogue::InboundEvent::DialogueError).
//! Searches match on the data model name of registered services; constraint
//! expressions are not evaluated.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broker;
pub mod error;

pub use broker::{
    EventReceiver, EventSender, LocalBroker, LocalConnection, DEFAULT_CHANNEL_CAPACITY,
    LOCAL_CORE_KEY,
};
pub use error::BrokerError;
