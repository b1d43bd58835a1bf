//! Engine configuration.
//!
//! Timing and capacity limits of a [`NegotiationEngine`](crate::NegotiationEngine):
//! - Inactivity window after which a live dialogue times out
//! - Retention window during which closed dialogues are kept for duplicate detection
//! - Dialogue table capacity
//! - Sweep interval of the engine loop

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::NegotiationError;

/// Configuration of the negotiation engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds without traffic after which a live dialogue times out.
    pub inactivity_timeout_secs: u64,
    /// Seconds a closed dialogue is retained before eviction. Zero evicts on the next sweep.
    pub retention_secs: u64,
    /// Maximum number of dialogues held at once, closed ones included.
    pub max_dialogues: usize,
    /// Seconds between two sweeps of the engine loop.
    pub sweep_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 300,
            retention_secs: 60,
            max_dialogues: 10_000,
            sweep_interval_secs: 5,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, NegotiationError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            NegotiationError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, NegotiationError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| NegotiationError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any limit is zero.
    pub fn validate(&self) -> Result<(), NegotiationError> {
        if self.inactivity_timeout_secs == 0 {
            return Err(NegotiationError::Config(
                "inactivity_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.max_dialogues == 0 {
            return Err(NegotiationError::Config(
                "max_dialogues must be greater than 0".to_string(),
            ));
        }

        if self.sweep_interval_secs == 0 {
            return Err(NegotiationError::Config(
                "sweep_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Inactivity window as a [`chrono::Duration`].
    #[must_use]
    pub fn inactivity_timeout(&self) -> chrono::Duration {
        secs(self.inactivity_timeout_secs)
    }

    /// Retention window as a [`chrono::Duration`].
    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        secs(self.retention_secs)
    }

    /// Sweep interval for the engine loop.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

// Largest second count chrono::Duration represents.
const MAX_SECS: i64 = i64::MAX / 1_000;

fn secs(value: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(value).map_or(MAX_SECS, |v| v.min(MAX_SECS)))
}
