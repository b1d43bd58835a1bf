//! In-process broker.
//!
//! Every connected agent owns an event channel. Dialogue messages are
//! routed by destination key; search and registration answers are posted
//! back on the requester's own channel, as a remote core would.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use oef_dialogue::{
    AgentAddress, Discovery, InboundEvent, OefErrorOperation, OutboundMessage, RoutingContext,
    SearchResultItem, Transport, TransportError,
};
use oef_schema::{AttributeValue, Description, Location, Query};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::error::BrokerError;

/// Sending half of an agent's event channel.
pub type EventSender = mpsc::Sender<InboundEvent>;

/// Receiving half of an agent's event channel.
pub type EventReceiver = mpsc::Receiver<InboundEvent>;

/// Default buffer of each agent's event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Core key reported in wide search results.
pub const LOCAL_CORE_KEY: &str = "local-core";

#[derive(Default)]
struct BrokerState {
    agents: HashMap<String, EventSender>,
    // (agent key, service id) -> description
    services: BTreeMap<(String, String), Description>,
}

/// A broker living in the current process.
#[derive(Clone)]
pub struct LocalBroker {
    state: Arc<RwLock<BrokerState>>,
    channel_capacity: usize,
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LocalBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("LocalBroker")
            .field("agents", &state.agents.len())
            .field("services", &state.services.len())
            .finish()
    }
}

impl LocalBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates an empty broker whose agent channels hold `capacity` events.
    #[must_use]
    pub fn with_channel_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(BrokerState::default())),
            channel_capacity: capacity.max(1),
        }
    }

    /// Connects an agent.
    ///
    /// Returns the connection to hand to a
    /// [`NegotiationEngine`](oef_dialogue::NegotiationEngine) and the
    /// receiver of the agent's inbound events.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::DuplicateAgent`] if the key is already connected.
    pub fn connect(&self, key: &str) -> Result<(LocalConnection, EventReceiver), BrokerError> {
        if key.is_empty() {
            return Err(BrokerError::EmptyKey);
        }

        let mut state = self.state.write();
        if state.agents.contains_key(key) {
            return Err(BrokerError::DuplicateAgent(key.to_string()));
        }

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        state.agents.insert(key.to_string(), tx);
        info!(agent = %key, "agent connected");

        let connection = LocalConnection {
            address: AgentAddress::new(key),
            broker: self.clone(),
        };
        Ok((connection, rx))
    }

    /// Disconnects an agent and drops its services.
    pub fn disconnect(&self, key: &str) {
        let mut state = self.state.write();
        if state.agents.remove(key).is_some() {
            state.services.retain(|(agent, _), _| agent != key);
            info!(agent = %key, "agent disconnected");
        }
    }

    /// Returns the keys of connected agents, sorted.
    #[must_use]
    pub fn agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self.state.read().agents.keys().cloned().collect();
        agents.sort_unstable();
        agents
    }

    /// Returns the number of registered services.
    #[must_use]
    pub fn service_count(&self) -> usize {
        self.state.read().services.len()
    }

    fn sender(&self, key: &str) -> Option<EventSender> {
        self.state.read().agents.get(key).cloned()
    }

    /// Queues `event` for `key` without waiting for room in its channel.
    fn post(&self, key: &str, event: InboundEvent) -> Result<(), TransportError> {
        let Some(tx) = self.sender(key) else {
            return Err(TransportError::UnknownDestination(key.to_string()));
        };
        match tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(agent = %key, "event queue full");
                Err(TransportError::Send(format!("event queue of {key} is full")))
            }
            Err(TrySendError::Closed(_)) => {
                self.disconnect(key);
                Err(TransportError::UnknownDestination(key.to_string()))
            }
        }
    }

    fn matching_services(&self, query: &Query) -> Vec<(AgentAddress, Option<Location>)> {
        let state = self.state.read();
        state
            .services
            .iter()
            .filter(|(_, description)| {
                query
                    .model_name()
                    .is_none_or(|name| description.model().name() == name)
            })
            .map(|((agent, service), description)| {
                (
                    AgentAddress::new(agent.clone()).with_alias(service.clone()),
                    location_of(description),
                )
            })
            .collect()
    }

    fn location_of_agent(&self, key: &str) -> Option<Location> {
        let state = self.state.read();
        state
            .services
            .iter()
            .filter(|((agent, _), _)| agent == key)
            .find_map(|(_, description)| location_of(description))
    }
}

fn location_of(description: &Description) -> Option<Location> {
    description.values().values().find_map(|value| match value {
        AttributeValue::Location(location) => Some(*location),
        _ => None,
    })
}

/// One agent's connection to a [`LocalBroker`].
#[derive(Debug, Clone)]
pub struct LocalConnection {
    address: AgentAddress,
    broker: LocalBroker,
}

impl LocalConnection {
    /// Returns the connected agent's address.
    #[must_use]
    pub const fn address(&self) -> &AgentAddress {
        &self.address
    }

    /// Returns the broker this connection belongs to.
    #[must_use]
    pub const fn broker(&self) -> &LocalBroker {
        &self.broker
    }

    fn key(&self) -> &str {
        self.address.key()
    }

    async fn deliver(&self, message: OutboundMessage) -> Result<(), TransportError> {
        if self.broker.sender(self.key()).is_none() {
            return Err(TransportError::Disconnected);
        }

        let Some(destination) = message.destination() else {
            return Err(TransportError::Send(format!(
                "dialogue {} has no destination",
                message.dialogue_id
            )));
        };

        let answer_id = message.answer_id;
        let dialogue_id = message.dialogue_id;
        let delivery = message.into_delivery(&self.address);

        match self
            .broker
            .post(destination.key(), InboundEvent::Agent(delivery))
        {
            Ok(()) => {
                debug!(from = %self.address, to = %destination, dialogue_id = %dialogue_id, "delivered");
                Ok(())
            }
            Err(TransportError::UnknownDestination(_)) => {
                warn!(from = %self.address, to = %destination, dialogue_id = %dialogue_id, "destination not connected");
                let bounce = InboundEvent::DialogueError {
                    answer_id,
                    dialogue_id,
                    origin: destination,
                };
                self.reply(bounce)
            }
            Err(e) => Err(e),
        }
    }

    fn reply(&self, event: InboundEvent) -> Result<(), TransportError> {
        self.broker.post(self.key(), event).map_err(|e| match e {
            TransportError::Send(_) => e,
            _ => TransportError::Disconnected,
        })
    }

    fn service_key(&self, context: &RoutingContext) -> (String, String) {
        (self.key().to_string(), context.service_id().to_string())
    }

    async fn register(
        &self,
        context: RoutingContext,
        description: Description,
    ) -> Result<(), TransportError> {
        let key = self.service_key(&context);
        debug!(agent = %key.0, service = %key.1, model = %description.model().name(), "register service");
        self.broker.state.write().services.insert(key, description);
        Ok(())
    }

    async fn unregister(&self, request_id: u32, context: RoutingContext) -> Result<(), TransportError> {
        let key = self.service_key(&context);
        let removed = self.broker.state.write().services.remove(&key).is_some();
        if removed {
            return Ok(());
        }

        self.reply(InboundEvent::OefError {
            answer_id: oef_dialogue::AnswerId::new(request_id),
            operation: OefErrorOperation::UnregisterService,
            cause: Some("service not registered".to_string()),
            detail: Some(key.1),
        })
    }

    async fn search(&self, search_id: u32, query: Query) -> Result<(), TransportError> {
        let agents = self
            .broker
            .matching_services(&query)
            .into_iter()
            .map(|(agent, _)| agent)
            .collect();
        self.reply(InboundEvent::SearchResult { search_id, agents })
    }

    async fn search_wide(&self, search_id: u32, query: Query) -> Result<(), TransportError> {
        let origin = self.broker.location_of_agent(self.key());
        let items = self
            .broker
            .matching_services(&query)
            .into_iter()
            .map(|(agent, location)| SearchResultItem {
                agent_key: agent.to_string(),
                core_key: LOCAL_CORE_KEY.to_string(),
                core_address: "127.0.0.1".to_string(),
                port: 0,
                distance: origin.zip(location).map(|(a, b)| a.distance(&b)),
            })
            .collect();
        self.reply(InboundEvent::SearchResultWide { search_id, items })
    }
}

impl Transport for LocalConnection {
    fn send(&self, message: OutboundMessage) -> BoxFuture<'_, Result<(), TransportError>> {
        self.deliver(message).boxed()
    }
}

impl Discovery for LocalConnection {
    fn register_service(
        &self,
        _request_id: u32,
        context: RoutingContext,
        description: Description,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        self.register(context, description).boxed()
    }

    fn unregister_service(
        &self,
        request_id: u32,
        context: RoutingContext,
        _description: Description,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        self.unregister(request_id, context).boxed()
    }

    fn search_services(&self, search_id: u32, query: Query) -> BoxFuture<'_, Result<(), TransportError>> {
        self.search(search_id, query).boxed()
    }

    fn search_services_wide(
        &self,
        search_id: u32,
        query: Query,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        self.search_wide(search_id, query).boxed()
    }
}
