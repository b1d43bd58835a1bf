//! Agent addresses and OEF URIs.
//!
//! An [`AgentAddress`] is what the broker routes on: an agent's public key,
//! optionally suffixed with an alias naming one of its services
//! (`key/alias`). An [`OefUri`] additionally names the core the agent is
//! attached to: `protocol://core_address/core_key/ns.../agent_key/alias`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::NegotiationError;

/// Routing address of an agent, optionally narrowed to one of its services.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentAddress {
    key: String,
    alias: Option<String>,
}

impl AgentAddress {
    /// Creates an address from an agent public key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            alias: None,
        }
    }

    /// Parses `key` or `key/alias`.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::InvalidAddress`] for an empty key or more
    /// than one separator.
    pub fn parse(s: &str) -> Result<Self, NegotiationError> {
        let mut parts = s.split('/');
        let key = parts.next().unwrap_or_default();
        let alias = parts.next();
        if key.is_empty() || parts.next().is_some() {
            return Err(NegotiationError::InvalidAddress(s.to_string()));
        }
        Ok(Self {
            key: key.to_string(),
            alias: alias.filter(|a| !a.is_empty()).map(str::to_string),
        })
    }

    /// Narrows the address to a service alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.alias = (!alias.is_empty()).then_some(alias);
        self
    }

    /// Returns the agent public key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the service alias, if any.
    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Returns true if both addresses name the same agent, whatever the alias.
    #[must_use]
    pub fn same_agent(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl fmt::Display for AgentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{}/{}", self.key, alias),
            None => f.write_str(&self.key),
        }
    }
}

/// Fully qualified location of an agent on an OEF core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OefUri {
    protocol: String,
    core_uri: String,
    core_key: String,
    namespaces: Vec<String>,
    agent_key: String,
    agent_alias: String,
    empty: bool,
}

impl Default for OefUri {
    fn default() -> Self {
        Self {
            protocol: "tcp".to_string(),
            core_uri: String::new(),
            core_key: String::new(),
            namespaces: Vec::new(),
            agent_key: String::new(),
            agent_alias: String::new(),
            empty: true,
        }
    }
}

impl OefUri {
    /// Starts building a non-empty URI.
    #[must_use]
    pub fn builder() -> Self {
        Self {
            empty: false,
            ..Self::default()
        }
    }

    /// Parses a full URI. Strings with fewer than seven `/`-separated parts
    /// yield an empty URI.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let parts: Vec<&str> = s.split('/').collect();
        let size = parts.len();
        if size < 7 {
            return Self::default();
        }
        Self {
            protocol: parts[0].trim_end_matches(':').to_string(),
            core_uri: parts[2].to_string(),
            core_key: parts[3].to_string(),
            namespaces: parts[4..size - 2]
                .iter()
                .filter(|ns| !ns.is_empty())
                .map(|ns| (*ns).to_string())
                .collect(),
            agent_key: parts[size - 2].to_string(),
            agent_alias: parts[size - 1].to_string(),
            empty: false,
        }
    }

    /// A URI naming only an agent (and its alias).
    #[must_use]
    pub fn for_agent(address: &AgentAddress) -> Self {
        Self::builder()
            .with_agent_key(address.key())
            .with_agent_alias(address.alias().unwrap_or_default())
    }

    /// Sets the transport protocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Sets the core address as `host:port`.
    #[must_use]
    pub fn with_core_address(mut self, host: &str, port: u16) -> Self {
        self.core_uri = format!("{host}:{port}");
        self
    }

    /// Sets the core public key.
    #[must_use]
    pub fn with_core_key(mut self, key: impl Into<String>) -> Self {
        self.core_key = key.into();
        self
    }

    /// Appends a namespace segment.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespaces.push(namespace.into());
        self
    }

    /// Sets the agent public key.
    #[must_use]
    pub fn with_agent_key(mut self, key: impl Into<String>) -> Self {
        self.agent_key = key.into();
        self
    }

    /// Sets the agent alias.
    #[must_use]
    pub fn with_agent_alias(mut self, alias: impl Into<String>) -> Self {
        self.agent_alias = alias.into();
        self
    }

    /// Returns true if the URI carries no information.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.empty
    }

    /// Returns the core address.
    #[must_use]
    pub fn core_uri(&self) -> &str {
        &self.core_uri
    }

    /// Returns the namespace segments.
    #[must_use]
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Returns the agent alias (possibly empty).
    #[must_use]
    pub fn agent_alias(&self) -> &str {
        &self.agent_alias
    }

    /// Returns the agent address named by this URI.
    #[must_use]
    pub fn agent_address(&self) -> Option<AgentAddress> {
        if self.empty || self.agent_key.is_empty() {
            return None;
        }
        Some(AgentAddress::new(self.agent_key.clone()).with_alias(self.agent_alias.clone()))
    }
}

impl fmt::Display for OefUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.empty {
            return Ok(());
        }
        write!(
            f,
            "{}://{}/{}/{}/{}/{}",
            self.protocol,
            self.core_uri,
            self.core_key,
            self.namespaces.join("/"),
            self.agent_key,
            self.agent_alias
        )
    }
}
