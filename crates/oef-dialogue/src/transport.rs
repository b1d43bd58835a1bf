//! Collaborators the engine talks to.
//!
//! The broker connection is split in two traits: [`Transport`] carries
//! dialogue messages and [`Discovery`] covers service registration and
//! search. A type implementing both is a [`Broker`].

use futures::future::BoxFuture;
use oef_schema::{Description, Query};

use crate::error::TransportError;
use crate::message::OutboundMessage;
use crate::routing::RoutingContext;

/// Delivers dialogue messages to the broker.
pub trait Transport: Send + Sync {
    /// Hands a message to the broker.
    ///
    /// Success means the broker accepted the message, not that the
    /// counterparty received it; delivery failures come back as
    /// [`InboundEvent::DialogueError`](crate::InboundEvent::DialogueError).
    fn send(&self, message: OutboundMessage) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Service registration and search.
///
/// Answers arrive later as inbound events carrying `request_id`.
pub trait Discovery: Send + Sync {
    /// Registers a service described by `description` under the context's source.
    fn register_service(
        &self,
        request_id: u32,
        context: RoutingContext,
        description: Description,
    ) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Removes a previously registered service.
    fn unregister_service(
        &self,
        request_id: u32,
        context: RoutingContext,
        description: Description,
    ) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Searches services on the local core.
    fn search_services(
        &self,
        search_id: u32,
        query: Query,
    ) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Searches services across cores.
    fn search_services_wide(
        &self,
        search_id: u32,
        query: Query,
    ) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// A full broker connection.
pub trait Broker: Transport + Discovery {}

impl<T: Transport + Discovery> Broker for T {}
