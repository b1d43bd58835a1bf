//! CLI error types.

use thiserror::Error;

use oef_dialogue::NegotiationError;
use oef_local::BrokerError;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The negotiation engine failed.
    #[error("negotiation error: {0}")]
    Engine(#[from] NegotiationError),

    /// The local broker refused an operation.
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// The demo did not reach an outcome.
    #[error("demo failed: {0:#}")]
    Demo(#[from] anyhow::Error),

    /// Output could not be encoded.
    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
