//! Error types for oef-local.

use thiserror::Error;

/// Errors raised by the local broker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// An agent with this key is already connected.
    #[error("agent '{0}' is already connected")]
    DuplicateAgent(String),

    /// The agent key is empty.
    #[error("agent key cannot be empty")]
    EmptyKey,
}
