//! The agent negotiation engine.
//!
//! [`NegotiationEngine`] ties the dialogue table, the state machine and the
//! routing contexts to a [`Broker`]. Inbound events are validated and
//! committed under the table lock; the lock is released before the
//! application's [`AgentHandler`] runs and before anything is handed to the
//! transport.
//!
//! The engine is cheap to clone. Clones share the same table, so several
//! tasks may send on behalf of the same agent.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use oef_schema::{CfpPayload, Description, Proposal, Query};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::dialogue::{Dialogue, OutboundStep};
use crate::error::NegotiationError;
use crate::handler::{Action, AgentHandler};
use crate::ids::{DialogueId, DialogueIdAllocator};
use crate::message::{AgentMessage, InboundEvent, MessageBody, OutboundMessage};
use crate::routing::RoutingContext;
use crate::state::{NegotiationState, Transition};
use crate::table::{DialogueTable, SweepReport};
use crate::transport::Broker;
use crate::uri::AgentAddress;

struct EngineInner<B> {
    local: AgentAddress,
    broker: B,
    config: EngineConfig,
    table: Mutex<DialogueTable>,
    request_ids: AtomicU32,
}

/// Negotiation engine of one agent.
pub struct NegotiationEngine<B> {
    inner: Arc<EngineInner<B>>,
}

impl<B> Clone for NegotiationEngine<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B> std::fmt::Debug for NegotiationEngine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegotiationEngine")
            .field("local", &self.inner.local)
            .field("dialogues", &self.inner.table.lock().len())
            .finish_non_exhaustive()
    }
}

impl<B: Broker> NegotiationEngine<B> {
    /// Creates an engine for the agent at `local`.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::Config`] if `config` is invalid.
    pub fn new(
        local: AgentAddress,
        broker: B,
        config: EngineConfig,
    ) -> Result<Self, NegotiationError> {
        Self::with_allocator(local, broker, config, DialogueIdAllocator::new())
    }

    /// Creates an engine drawing dialogue ids from `allocator`.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::Config`] if `config` is invalid.
    pub fn with_allocator(
        local: AgentAddress,
        broker: B,
        config: EngineConfig,
        allocator: DialogueIdAllocator,
    ) -> Result<Self, NegotiationError> {
        config.validate()?;
        let table = DialogueTable::with_allocator(&config, allocator);
        Ok(Self {
            inner: Arc::new(EngineInner {
                local,
                broker,
                config,
                table: Mutex::new(table),
                request_ids: AtomicU32::new(1),
            }),
        })
    }

    /// Returns the address of the local agent.
    #[must_use]
    pub fn local(&self) -> &AgentAddress {
        &self.inner.local
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Returns the broker connection.
    #[must_use]
    pub fn broker(&self) -> &B {
        &self.inner.broker
    }

    /// Returns a snapshot of a dialogue.
    #[must_use]
    pub fn dialogue(&self, id: DialogueId) -> Option<Dialogue> {
        self.inner.table.lock().get(id).ok().cloned()
    }

    /// Returns snapshots of all dialogues that are not closed, by id.
    #[must_use]
    pub fn live_dialogues(&self) -> Vec<Dialogue> {
        let mut live: Vec<Dialogue> = self.inner.table.lock().live().cloned().collect();
        live.sort_unstable_by_key(Dialogue::id);
        live
    }

    // ========================================================================
    // Send side
    // ========================================================================

    /// Opens a dialogue with `to` by sending a CFP.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::TableFull`] or a transport error.
    pub async fn send_cfp(
        &self,
        to: &AgentAddress,
        payload: CfpPayload,
    ) -> Result<DialogueId, NegotiationError> {
        self.open(to, MessageBody::Cfp(payload)).await
    }

    /// Opens a free-form conversation with `to`.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::TableFull`] or a transport error.
    pub async fn send_opening_message(
        &self,
        to: &AgentAddress,
        content: Vec<u8>,
    ) -> Result<DialogueId, NegotiationError> {
        self.open(to, MessageBody::Message(content)).await
    }

    /// Answers a CFP with a proposal.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::UnknownDialogue`],
    /// [`NegotiationError::IllegalTransition`] or a transport error.
    pub async fn send_propose(
        &self,
        dialogue_id: DialogueId,
        proposal: Proposal,
    ) -> Result<(), NegotiationError> {
        self.reply(dialogue_id, MessageBody::Propose(proposal)).await
    }

    /// Accepts the counterparty's proposal.
    ///
    /// # Errors
    ///
    /// See [`send_propose`](Self::send_propose).
    pub async fn send_accept(&self, dialogue_id: DialogueId) -> Result<(), NegotiationError> {
        self.reply(dialogue_id, MessageBody::Accept).await
    }

    /// Declines and closes the dialogue.
    ///
    /// # Errors
    ///
    /// See [`send_propose`](Self::send_propose).
    pub async fn send_decline(&self, dialogue_id: DialogueId) -> Result<(), NegotiationError> {
        self.reply(dialogue_id, MessageBody::Decline).await
    }

    /// Sends free-form content on an accepted or messaging dialogue.
    ///
    /// # Errors
    ///
    /// See [`send_propose`](Self::send_propose).
    pub async fn send_message(
        &self,
        dialogue_id: DialogueId,
        content: Vec<u8>,
    ) -> Result<(), NegotiationError> {
        self.reply(dialogue_id, MessageBody::Message(content)).await
    }

    /// Closes an accepted dialogue as completed.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::UnknownDialogue`] or
    /// [`NegotiationError::IllegalTransition`] if the dialogue was never accepted.
    pub fn complete(&self, dialogue_id: DialogueId) -> Result<NegotiationState, NegotiationError> {
        let state = self.lifecycle(dialogue_id, Transition::Complete)?;
        info!(dialogue_id = %dialogue_id, "dialogue completed");
        Ok(state)
    }

    /// Aborts a dialogue. Cancelling a closed dialogue changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::UnknownDialogue`] if the id is not held.
    pub fn cancel(&self, dialogue_id: DialogueId) -> Result<NegotiationState, NegotiationError> {
        let state = self.lifecycle(dialogue_id, Transition::Cancel)?;
        info!(dialogue_id = %dialogue_id, state = %state, "dialogue cancelled");
        Ok(state)
    }

    async fn open(
        &self,
        to: &AgentAddress,
        body: MessageBody,
    ) -> Result<DialogueId, NegotiationError> {
        let (dialogue_id, message) = {
            let mut table = self.inner.table.lock();
            let now = Utc::now();
            let dialogue_id = table.open_outbound(to, now)?;
            let step = match table.send(dialogue_id, body.step(), &self.inner.local, now) {
                Ok(step) => step,
                Err(e) => {
                    table.remove(dialogue_id);
                    return Err(e);
                }
            };
            (dialogue_id, outbound(dialogue_id, step, body))
        };

        info!(dialogue_id = %dialogue_id, to = %to, step = %message.body.step(), "dialogue opened");
        if let Err(e) = self.transmit(message).await {
            // never left this agent
            self.inner.table.lock().remove(dialogue_id);
            return Err(e);
        }
        Ok(dialogue_id)
    }

    async fn reply(&self, dialogue_id: DialogueId, body: MessageBody) -> Result<(), NegotiationError> {
        let message = {
            let mut table = self.inner.table.lock();
            let step = table.send(dialogue_id, body.step(), &self.inner.local, Utc::now())?;
            outbound(dialogue_id, step, body)
        };
        self.transmit(message).await
    }

    fn lifecycle(
        &self,
        dialogue_id: DialogueId,
        event: Transition,
    ) -> Result<NegotiationState, NegotiationError> {
        self.inner
            .table
            .lock()
            .apply(dialogue_id, event, Utc::now())
    }

    async fn transmit(&self, message: OutboundMessage) -> Result<(), NegotiationError> {
        let dialogue_id = message.dialogue_id;
        debug!(
            dialogue_id = %dialogue_id,
            answer_id = %message.answer_id,
            target = %message.target,
            step = %message.body.step(),
            "sending"
        );
        self.inner.broker.send(message).await.map_err(|e| {
            warn!(dialogue_id = %dialogue_id, error = %e, "transport rejected message");
            NegotiationError::from(e)
        })
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Registers one of our services.
    ///
    /// Returns the request id any [`InboundEvent::OefError`] about it will carry.
    ///
    /// # Errors
    ///
    /// Returns a transport error.
    pub async fn register_service(
        &self,
        service_id: &str,
        description: Description,
    ) -> Result<u32, NegotiationError> {
        let request_id = self.next_request_id();
        let context = RoutingContext::for_service(&self.inner.local, service_id);
        self.inner
            .broker
            .register_service(request_id, context, description)
            .await?;
        info!(service_id = %service_id, request_id, "service registered");
        Ok(request_id)
    }

    /// Unregisters one of our services.
    ///
    /// # Errors
    ///
    /// Returns a transport error.
    pub async fn unregister_service(
        &self,
        service_id: &str,
        description: Description,
    ) -> Result<u32, NegotiationError> {
        let request_id = self.next_request_id();
        let context = RoutingContext::for_service(&self.inner.local, service_id);
        self.inner
            .broker
            .unregister_service(request_id, context, description)
            .await?;
        info!(service_id = %service_id, request_id, "service unregistered");
        Ok(request_id)
    }

    /// Searches services on the local core. Returns the search id.
    ///
    /// # Errors
    ///
    /// Returns a transport error.
    pub async fn search_services(&self, query: Query) -> Result<u32, NegotiationError> {
        let search_id = self.next_request_id();
        debug!(search_id, model = ?query.model_name(), "searching services");
        self.inner.broker.search_services(search_id, query).await?;
        Ok(search_id)
    }

    /// Searches services across cores. Returns the search id.
    ///
    /// # Errors
    ///
    /// Returns a transport error.
    pub async fn search_services_wide(&self, query: Query) -> Result<u32, NegotiationError> {
        let search_id = self.next_request_id();
        debug!(search_id, model = ?query.model_name(), "searching services wide");
        self.inner
            .broker
            .search_services_wide(search_id, query)
            .await?;
        Ok(search_id)
    }

    fn next_request_id(&self) -> u32 {
        self.inner.request_ids.fetch_add(1, Ordering::Relaxed)
    }

    // ========================================================================
    // Inbound side
    // ========================================================================

    /// Processes one inbound event.
    ///
    /// Accepted dialogue messages are passed to the matching `handler`
    /// callback and the returned actions are performed. A message failing
    /// validation is reported through [`AgentHandler::on_rejected`] and
    /// returned as the error. Actions that fail are reported through
    /// [`AgentHandler::on_action_failed`].
    ///
    /// # Errors
    ///
    /// Returns the validation error of a rejected message, or the first fatal
    /// error raised while performing actions.
    pub async fn handle_event<H: AgentHandler>(
        &self,
        event: InboundEvent,
        handler: &mut H,
    ) -> Result<(), NegotiationError> {
        let actions = match event {
            InboundEvent::Agent(message) => match self.receive(&message) {
                Ok(dialogue) => dispatch(handler, &dialogue, &message.body),
                Err(error) => {
                    warn!(
                        dialogue_id = %message.dialogue_id,
                        origin = %message.origin,
                        answer_id = %message.answer_id,
                        target = %message.target,
                        error = %error,
                        "rejected message"
                    );
                    let actions = handler.on_rejected(&message, &error);
                    self.perform_for(actions, handler).await?;
                    return Err(error);
                }
            },
            InboundEvent::SearchResult { search_id, agents } => {
                debug!(search_id, count = agents.len(), "search result");
                handler.on_search_result(search_id, &agents)
            }
            InboundEvent::SearchResultWide { search_id, items } => {
                debug!(search_id, count = items.len(), "wide search result");
                handler.on_search_result_wide(search_id, &items)
            }
            InboundEvent::OefError {
                answer_id,
                operation,
                cause,
                detail,
            } => {
                warn!(answer_id = %answer_id, operation = %operation, cause = ?cause, "broker error");
                handler.on_oef_error(answer_id, operation, cause.as_deref(), detail.as_deref())
            }
            InboundEvent::DialogueError {
                answer_id,
                dialogue_id,
                origin,
            } => {
                let aborted = self.abort(dialogue_id);
                warn!(
                    dialogue_id = %dialogue_id,
                    answer_id = %answer_id,
                    origin = %origin,
                    aborted = aborted.is_some(),
                    "dialogue error"
                );
                handler.on_dialogue_error(dialogue_id, &origin, aborted.as_ref())
            }
        };

        self.perform_for(actions, handler).await
    }

    fn receive(&self, message: &AgentMessage) -> Result<Dialogue, NegotiationError> {
        let context = RoutingContext::from_inbound_uris(
            &message.origin,
            &self.inner.local,
            &message.source_uri,
            &message.target_uri,
        );
        let dialogue = self
            .inner
            .table
            .lock()
            .receive(message, context, Utc::now())?;
        debug!(
            dialogue_id = %message.dialogue_id,
            answer_id = %message.answer_id,
            step = %message.body.step(),
            state = %dialogue.state(),
            "received"
        );
        Ok(dialogue)
    }

    fn abort(&self, dialogue_id: DialogueId) -> Option<Dialogue> {
        let mut table = self.inner.table.lock();
        table
            .apply(dialogue_id, Transition::DialogueError, Utc::now())
            .ok()?;
        table.get(dialogue_id).ok().cloned()
    }

    /// Performs actions returned by a callback, in order.
    ///
    /// Failing actions are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; remaining actions are dropped.
    pub async fn perform(&self, actions: Vec<Action>) -> Result<(), NegotiationError> {
        for action in actions {
            if let Err(e) = self.execute(action).await {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(error = %e, "action failed");
            }
        }
        Ok(())
    }

    /// Like [`perform`](Self::perform), reporting each skipped action to
    /// [`AgentHandler::on_action_failed`] and performing what it returns.
    async fn perform_for<H: AgentHandler>(
        &self,
        actions: Vec<Action>,
        handler: &mut H,
    ) -> Result<(), NegotiationError> {
        let mut queue = VecDeque::from(actions);
        while let Some(action) = queue.pop_front() {
            let Err(e) = self.execute(action.clone()).await else {
                continue;
            };
            if e.is_fatal() {
                return Err(e);
            }
            warn!(error = %e, "action failed");
            queue.extend(handler.on_action_failed(&action, &e));
        }
        Ok(())
    }

    async fn execute(&self, action: Action) -> Result<(), NegotiationError> {
        match action {
            Action::Cfp { to, payload } => self.send_cfp(&to, payload).await.map(drop),
            Action::Propose {
                dialogue_id,
                proposal,
            } => self.send_propose(dialogue_id, proposal).await,
            Action::Accept { dialogue_id } => self.send_accept(dialogue_id).await,
            Action::Decline { dialogue_id } => self.send_decline(dialogue_id).await,
            Action::Message {
                dialogue_id,
                content,
            } => self.send_message(dialogue_id, content).await,
            Action::Complete { dialogue_id } => self.complete(dialogue_id).map(drop),
            Action::Cancel { dialogue_id } => self.cancel(dialogue_id).map(drop),
        }
    }

    // ========================================================================
    // Housekeeping
    // ========================================================================

    /// Times out idle dialogues and evicts expired closed ones.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let report = self.inner.table.lock().sweep_expired(now);
        if !report.is_empty() {
            info!(
                timed_out = report.timed_out.len(),
                evicted = report.evicted.len(),
                "swept dialogues"
            );
        }
        report
    }

    async fn sweep_and_notify<H: AgentHandler>(
        &self,
        now: DateTime<Utc>,
        handler: &mut H,
    ) -> Result<(), NegotiationError> {
        let report = self.sweep(now);
        for dialogue in &report.timed_out {
            let actions = handler.on_timeout(dialogue);
            self.perform_for(actions, handler).await?;
        }
        Ok(())
    }

    /// Consumes inbound events until `shutdown` resolves or the channel closes.
    ///
    /// The loop waits on the next event, the sweep tick and `shutdown`;
    /// sends issued by callbacks are awaited before the next event is taken.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error. Per-message errors are logged and the
    /// loop continues.
    pub async fn run<H, S>(
        &self,
        mut events: mpsc::Receiver<InboundEvent>,
        handler: &mut H,
        shutdown: S,
    ) -> Result<(), NegotiationError>
    where
        H: AgentHandler,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut sweep = tokio::time::interval(self.inner.config.sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(agent = %self.inner.local, "negotiation engine started");

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!(agent = %self.inner.local, "negotiation engine stopped");
                    return Ok(());
                }

                event = events.recv() => {
                    let Some(event) = event else {
                        info!(agent = %self.inner.local, "event channel closed");
                        return Ok(());
                    };
                    if let Err(e) = self.handle_event(event, handler).await {
                        if e.is_fatal() {
                            error!(agent = %self.inner.local, error = %e, "negotiation engine failed");
                            return Err(e);
                        }
                    }
                }

                _ = sweep.tick() => {
                    self.sweep_and_notify(Utc::now(), handler).await?;
                }
            }
        }
    }
}

fn outbound(dialogue_id: DialogueId, step: OutboundStep, body: MessageBody) -> OutboundMessage {
    OutboundMessage {
        answer_id: step.answer_id,
        dialogue_id,
        target: step.target,
        context: step.context,
        body,
    }
}

fn dispatch<H: AgentHandler>(handler: &mut H, dialogue: &Dialogue, body: &MessageBody) -> Vec<Action> {
    match body {
        MessageBody::Cfp(payload) => handler.on_cfp(dialogue, payload),
        MessageBody::Propose(proposal) => handler.on_propose(dialogue, proposal),
        MessageBody::Accept => handler.on_accept(dialogue),
        MessageBody::Decline => handler.on_decline(dialogue),
        MessageBody::Message(content) => handler.on_message(dialogue, content),
    }
}

