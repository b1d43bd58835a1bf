//! Demo configuration.
//!
//! A demo is described by a TOML file:
//! - The client agent
//! - One entry per weather station, with its asking price and position
//! - Optional `[engine]` limits shared by every agent

use std::path::Path;

use oef_dialogue::{AgentAddress, EngineConfig};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::CliError;

/// Identity of one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentConfig {
    /// Base58-encoded public key.
    pub public_key: String,
}

impl AgentConfig {
    /// Creates an agent with a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            public_key: generate_key(),
        }
    }

    /// Returns the agent's routing address.
    #[must_use]
    pub fn address(&self) -> AgentAddress {
        AgentAddress::new(self.public_key.clone())
    }

    /// Validate the agent identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or not valid base58.
    pub fn validate(&self) -> Result<(), CliError> {
        if self.public_key.is_empty() {
            return Err(CliError::Config("public_key cannot be empty".to_string()));
        }

        bs58::decode(&self.public_key).into_vec().map_err(|e| {
            CliError::Config(format!(
                "public_key '{}' is not valid base58: {e}",
                self.public_key
            ))
        })?;

        Ok(())
    }
}

/// One weather station.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationConfig {
    /// Station identity.
    #[serde(flatten)]
    pub agent: AgentConfig,
    /// Price asked for one measurement.
    pub price: i64,
    /// Latitude of the station in degrees.
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Longitude of the station in degrees.
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Whole demo configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DemoConfig {
    /// The buying agent.
    pub client: AgentConfig,
    /// Selling agents.
    #[serde(default)]
    pub stations: Vec<StationConfig>,
    /// Seconds the client waits for a measurement.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Engine limits.
    #[serde(default)]
    pub engine: EngineConfig,
}

const fn default_timeout_secs() -> u64 {
    10
}

impl DemoConfig {
    /// Builds a configuration with `stations` stations at increasing prices.
    #[must_use]
    pub fn generated(stations: usize) -> Self {
        let stations = (0..stations)
            .map(|i| {
                let i = i as i64;
                StationConfig {
                    agent: AgentConfig::generate(),
                    price: 50 + 10 * i,
                    latitude: Some(51.5 + i as f64),
                    longitude: Some(-0.1),
                }
            })
            .collect();

        Self {
            client: AgentConfig::generate(),
            stations,
            timeout_secs: default_timeout_secs(),
            engine: EngineConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CliError::Config(format!(
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
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CliError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any key is invalid or duplicated, a price is
    /// negative, or the engine limits are invalid.
    pub fn validate(&self) -> Result<(), CliError> {
        self.client.validate()?;

        if self.stations.is_empty() {
            return Err(CliError::Config(
                "at least one station is required".to_string(),
            ));
        }

        let mut keys = vec![self.client.public_key.as_str()];
        for station in &self.stations {
            station.agent.validate()?;
            if keys.contains(&station.agent.public_key.as_str()) {
                return Err(CliError::Config(format!(
                    "duplicate public_key '{}'",
                    station.agent.public_key
                )));
            }
            keys.push(&station.agent.public_key);

            if station.price < 0 {
                return Err(CliError::Config(format!(
                    "station '{}' has a negative price",
                    station.agent.public_key
                )));
            }

            if station.latitude.is_some() != station.longitude.is_some() {
                return Err(CliError::Config(format!(
                    "station '{}' needs both latitude and longitude",
                    station.agent.public_key
                )));
            }
        }

        if self.timeout_secs == 0 {
            return Err(CliError::Config(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }

        self.engine
            .validate()
            .map_err(|e| CliError::Config(format!("engine: {e}")))
    }
}

/// Returns a random base58 key of 32 bytes.
#[must_use]
pub fn generate_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bs58::encode(bytes).into_string()
}
