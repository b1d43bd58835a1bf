//! Engine behaviour against a recording broker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use oef_dialogue::{
    Action, AgentAddress, AgentHandler, AgentMessage, AnswerId, CloseReason, Dialogue,
    DialogueId, DialogueIdAllocator, Discovery, EngineConfig, InboundEvent, MessageBody,
    NegotiationEngine, NegotiationError, NegotiationState, OefErrorOperation, OutboundMessage,
    Role, RoutingContext, Transport, TransportError,
};
use oef_schema::{CfpPayload, Description, Proposal, Query};
use parking_lot::Mutex;
use tokio::sync::mpsc;

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Default)]
struct RecordingBroker {
    sent: Mutex<Vec<OutboundMessage>>,
    registered: Mutex<Vec<(u32, RoutingContext)>>,
    searches: Mutex<Vec<(u32, Query)>>,
    disconnected: AtomicBool,
}

impl RecordingBroker {
    fn take_sent(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Transport for RecordingBroker {
    fn send(&self, message: OutboundMessage) -> BoxFuture<'_, Result<(), TransportError>> {
        async move {
            if self.disconnected.load(Ordering::SeqCst) {
                return Err(TransportError::Disconnected);
            }
            self.sent.lock().push(message);
            Ok(())
        }
        .boxed()
    }
}

impl Discovery for RecordingBroker {
    fn register_service(
        &self,
        request_id: u32,
        context: RoutingContext,
        _description: Description,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        self.registered.lock().push((request_id, context));
        future::ready(Ok(())).boxed()
    }

    fn unregister_service(
        &self,
        _request_id: u32,
        context: RoutingContext,
        _description: Description,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        self.registered
            .lock()
            .retain(|(_, c)| c.service_id() != context.service_id());
        future::ready(Ok(())).boxed()
    }

    fn search_services(&self, search_id: u32, query: Query) -> BoxFuture<'_, Result<(), TransportError>> {
        self.searches.lock().push((search_id, query));
        future::ready(Ok(())).boxed()
    }

    fn search_services_wide(
        &self,
        search_id: u32,
        query: Query,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        self.search_services(search_id, query)
    }
}

/// Handler that proposes on CFP, accepts proposals and records what it saw.
#[derive(Default)]
struct Recorder {
    propose_on_cfp: bool,
    accept_proposals: bool,
    seen: Vec<String>,
    rejected: Vec<NegotiationError>,
    timed_out: Vec<DialogueId>,
    failed: Vec<(Action, NegotiationError)>,
}

impl Recorder {
    fn seller() -> Self {
        Self {
            propose_on_cfp: true,
            ..Self::default()
        }
    }

    fn buyer() -> Self {
        Self {
            accept_proposals: true,
            ..Self::default()
        }
    }
}

impl AgentHandler for Recorder {
    fn on_cfp(&mut self, dialogue: &Dialogue, _payload: &CfpPayload) -> Vec<Action> {
        self.seen.push(format!("cfp {}", dialogue.id()));
        if self.propose_on_cfp {
            vec![Action::Propose {
                dialogue_id: dialogue.id(),
                proposal: Proposal::Content(b"10".to_vec()),
            }]
        } else {
            Vec::new()
        }
    }

    fn on_propose(&mut self, dialogue: &Dialogue, _proposal: &Proposal) -> Vec<Action> {
        self.seen.push(format!("propose {}", dialogue.id()));
        if self.accept_proposals {
            vec![Action::Accept {
                dialogue_id: dialogue.id(),
            }]
        } else {
            Vec::new()
        }
    }

    fn on_accept(&mut self, dialogue: &Dialogue) -> Vec<Action> {
        self.seen.push(format!("accept {}", dialogue.id()));
        Vec::new()
    }

    fn on_message(&mut self, dialogue: &Dialogue, content: &[u8]) -> Vec<Action> {
        self.seen
            .push(format!("message {} {}", dialogue.id(), String::from_utf8_lossy(content)));
        Vec::new()
    }

    fn on_oef_error(
        &mut self,
        _answer_id: AnswerId,
        operation: OefErrorOperation,
        _cause: Option<&str>,
        _detail: Option<&str>,
    ) -> Vec<Action> {
        self.seen.push(format!("oef error {operation}"));
        Vec::new()
    }

    fn on_dialogue_error(
        &mut self,
        dialogue_id: DialogueId,
        _origin: &AgentAddress,
        dialogue: Option<&Dialogue>,
    ) -> Vec<Action> {
        self.seen
            .push(format!("dialogue error {dialogue_id} {}", dialogue.is_some()));
        Vec::new()
    }

    fn on_timeout(&mut self, dialogue: &Dialogue) -> Vec<Action> {
        self.timed_out.push(dialogue.id());
        Vec::new()
    }

    fn on_rejected(&mut self, _message: &AgentMessage, error: &NegotiationError) -> Vec<Action> {
        self.rejected.push(error.clone());
        Vec::new()
    }

    fn on_action_failed(&mut self, action: &Action, error: &NegotiationError) -> Vec<Action> {
        self.failed.push((action.clone(), error.clone()));
        match action.dialogue_id() {
            Some(dialogue_id) => vec![Action::Cancel { dialogue_id }],
            None => Vec::new(),
        }
    }
}

type Engine = NegotiationEngine<RecordingBroker>;

fn alice() -> AgentAddress {
    AgentAddress::new("alice")
}

fn bob() -> AgentAddress {
    AgentAddress::new("bob")
}

fn engine_with(local: AgentAddress, config: EngineConfig) -> Engine {
    NegotiationEngine::new(local, RecordingBroker::default(), config).unwrap()
}

fn engine(local: AgentAddress) -> Engine {
    engine_with(local, EngineConfig::default())
}

fn agent(dialogue: u32, answer: u32, target: u32, origin: AgentAddress, body: MessageBody) -> InboundEvent {
    InboundEvent::Agent(AgentMessage::new(
        DialogueId::new(dialogue),
        AnswerId::new(answer),
        AnswerId::new(target),
        origin,
        body,
    ))
}

fn cfp() -> MessageBody {
    MessageBody::Cfp(CfpPayload::Nothing)
}

fn propose() -> MessageBody {
    MessageBody::Propose(Proposal::Content(b"offer".to_vec()))
}

/// Delivers everything `from` sent to `to`.
async fn pump(from: &Engine, to: &Engine, handler: &mut Recorder) {
    for message in from.broker().take_sent() {
        let event = InboundEvent::Agent(message.into_delivery(from.local()));
        to.handle_event(event, handler).await.unwrap();
    }
}

// ============================================================================
// Reference scenario
// ============================================================================

#[tokio::test]
async fn responder_reaches_accepted() {
    let b = engine(bob());
    let mut handler = Recorder::seller();

    b.handle_event(agent(7, 1, 0, alice(), cfp()), &mut handler)
        .await
        .unwrap();

    let sent = b.broker().take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].answer_id, AnswerId::new(2));
    assert_eq!(sent[0].target, AnswerId::new(1));
    assert_eq!(sent[0].destination(), Some(alice()));

    b.handle_event(agent(7, 3, 2, alice(), MessageBody::Accept), &mut handler)
        .await
        .unwrap();

    let dialogue = b.dialogue(DialogueId::new(7)).unwrap();
    assert_eq!(dialogue.state(), NegotiationState::Accepted);
    assert_eq!(dialogue.last_answer_id(), AnswerId::new(3));
    assert_eq!(dialogue.role(), Role::Responder);
    assert_eq!(handler.seen, vec!["cfp 7", "accept 7"]);
}

#[tokio::test]
async fn full_exchange_between_two_engines() {
    let a = engine(alice());
    let b = engine(bob());
    let mut buyer = Recorder::buyer();
    let mut seller = Recorder::seller();

    let id = a.send_cfp(&bob(), CfpPayload::Nothing).await.unwrap();
    pump(&a, &b, &mut seller).await; // CFP
    pump(&b, &a, &mut buyer).await; // Propose
    pump(&a, &b, &mut seller).await; // Accept

    let a_view = a.dialogue(id).unwrap();
    let b_view = b.dialogue(id).unwrap();
    assert_eq!(a_view.state(), NegotiationState::Accepted);
    assert_eq!(b_view.state(), NegotiationState::Accepted);
    assert_eq!(a_view.last_answer_id(), AnswerId::new(3));
    assert_eq!(b_view.last_answer_id(), AnswerId::new(3));
    assert_eq!(a_view.role(), Role::Initiator);
}

#[tokio::test]
async fn replayed_propose_is_out_of_sequence() {
    let a = engine(alice());
    let b = engine(bob());
    let mut buyer = Recorder::buyer();
    let mut seller = Recorder::seller();

    let id = a.send_cfp(&bob(), CfpPayload::Nothing).await.unwrap();
    pump(&a, &b, &mut seller).await;

    let proposal = b.broker().take_sent().remove(0);
    let replay = InboundEvent::Agent(proposal.clone().into_delivery(b.local()));
    a.handle_event(InboundEvent::Agent(proposal.into_delivery(b.local())), &mut buyer)
        .await
        .unwrap();
    let before = a.dialogue(id).unwrap();
    assert_eq!(before.state(), NegotiationState::Accepted);

    let err = a.handle_event(replay, &mut buyer).await.unwrap_err();
    assert!(matches!(err, NegotiationError::OutOfSequence { .. }));
    assert_eq!(a.dialogue(id).unwrap(), before);
    assert_eq!(buyer.rejected, vec![err]);
}

#[tokio::test]
async fn reply_ignores_source_uri_of_another_agent() {
    let b = engine(bob());
    let mut handler = Recorder::seller();
    let mut message = AgentMessage::new(DialogueId::new(7), AnswerId::new(1), AnswerId::START, alice(), cfp());
    message.source_uri = "tcp://core:1/ck/ns/mallory/svc".to_string();

    b.handle_event(InboundEvent::Agent(message), &mut handler)
        .await
        .unwrap();

    let sent = b.broker().take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].destination().map(|d| d.key().to_string()), Some("alice".to_string()));
}

#[tokio::test]
async fn propose_for_unknown_dialogue() {
    let a = engine(alice());
    let mut handler = Recorder::default();

    let err = a
        .handle_event(agent(99, 2, 1, bob(), propose()), &mut handler)
        .await
        .unwrap_err();
    assert_eq!(err, NegotiationError::UnknownDialogue(DialogueId::new(99)));
    assert!(a.dialogue(DialogueId::new(99)).is_none());
    assert_eq!(handler.rejected.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cfps_get_distinct_ids() {
    let a = engine(alice());

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let a = a.clone();
            tokio::spawn(async move {
                a.send_cfp(&AgentAddress::new(format!("peer{i}")), CfpPayload::Nothing)
                    .await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 32);
    assert_eq!(a.live_dialogues().len(), 32);
}

// ============================================================================
// After accept
// ============================================================================

#[tokio::test]
async fn messages_flow_after_accept() {
    let b = engine(bob());
    let mut handler = Recorder::seller();
    b.handle_event(agent(7, 1, 0, alice(), cfp()), &mut handler).await.unwrap();
    b.handle_event(agent(7, 3, 2, alice(), MessageBody::Accept), &mut handler)
        .await
        .unwrap();

    let id = DialogueId::new(7);
    for _ in 0..5 {
        b.send_message(id, b"reading".to_vec()).await.unwrap();
    }
    let last = b.dialogue(id).unwrap().last_answer_id();
    assert_eq!(last, AnswerId::new(8));

    b.handle_event(
        agent(7, 9, 8, alice(), MessageBody::Message(b"thanks".to_vec())),
        &mut handler,
    )
    .await
    .unwrap();

    let err = b
        .handle_event(agent(7, 10, 9, alice(), propose()), &mut handler)
        .await
        .unwrap_err();
    assert!(matches!(err, NegotiationError::IllegalTransition { .. }));

    let err = b.send_propose(id, Proposal::Content(Vec::new())).await.unwrap_err();
    assert!(matches!(err, NegotiationError::IllegalTransition { .. }));

    assert_eq!(
        b.complete(id).unwrap(),
        NegotiationState::Closed(CloseReason::Completed)
    );
    assert!(b.live_dialogues().is_empty());
}

#[tokio::test]
async fn complete_requires_accept() {
    let a = engine(alice());
    let id = a.send_cfp(&bob(), CfpPayload::Nothing).await.unwrap();
    assert!(matches!(
        a.complete(id),
        Err(NegotiationError::IllegalTransition { .. })
    ));
}

#[tokio::test]
async fn opening_message_starts_conversation() {
    let a = engine(alice());
    let b = engine(bob());
    let mut handler = Recorder::default();

    let id = a.send_opening_message(&bob(), b"hello".to_vec()).await.unwrap();
    pump(&a, &b, &mut handler).await;

    assert_eq!(b.dialogue(id).unwrap().state(), NegotiationState::Messaging);
    assert_eq!(handler.seen, vec![format!("message {id} hello")]);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn cancel_is_idempotent() {
    let a = engine(alice());
    let id = a.send_cfp(&bob(), CfpPayload::Nothing).await.unwrap();

    let aborted = NegotiationState::Closed(CloseReason::Aborted);
    assert_eq!(a.cancel(id).unwrap(), aborted);
    assert_eq!(a.cancel(id).unwrap(), aborted);
    assert_eq!(
        a.cancel(DialogueId::new(1)).unwrap_err(),
        NegotiationError::UnknownDialogue(DialogueId::new(1))
    );
}

#[tokio::test]
async fn dialogue_error_aborts_live_dialogue() {
    let a = engine(alice());
    let mut handler = Recorder::default();
    let id = a.send_cfp(&bob(), CfpPayload::Nothing).await.unwrap();

    let event = InboundEvent::DialogueError {
        answer_id: AnswerId::new(1),
        dialogue_id: id,
        origin: bob(),
    };
    a.handle_event(event.clone(), &mut handler).await.unwrap();
    a.handle_event(event, &mut handler).await.unwrap();

    assert_eq!(
        a.dialogue(id).unwrap().state(),
        NegotiationState::Closed(CloseReason::Aborted)
    );
    assert_eq!(
        handler.seen,
        vec![
            format!("dialogue error {id} true"),
            format!("dialogue error {id} false"),
        ]
    );
}

#[tokio::test]
async fn oef_error_leaves_dialogues_alone() {
    let a = engine(alice());
    let mut handler = Recorder::default();
    let id = a.send_cfp(&bob(), CfpPayload::Nothing).await.unwrap();

    let event = InboundEvent::OefError {
        answer_id: AnswerId::new(1),
        operation: OefErrorOperation::SendMessage,
        cause: Some("busy".into()),
        detail: None,
    };
    a.handle_event(event, &mut handler).await.unwrap();

    assert_eq!(a.dialogue(id).unwrap().state(), NegotiationState::CfpSent);
    assert_eq!(handler.seen, vec!["oef error SendMessage"]);
}

#[tokio::test]
async fn transport_failure_is_surfaced() {
    let a = engine(alice());
    a.broker().disconnected.store(true, Ordering::SeqCst);
    let err = a.send_cfp(&bob(), CfpPayload::Nothing).await.unwrap_err();
    assert_eq!(err, NegotiationError::Transport(TransportError::Disconnected));
    assert!(a.live_dialogues().is_empty());
}

#[tokio::test]
async fn failed_action_is_reported_to_handler() {
    let b = engine(bob());
    b.broker().disconnected.store(true, Ordering::SeqCst);
    let mut handler = Recorder::seller();

    b.handle_event(agent(7, 1, 0, alice(), cfp()), &mut handler)
        .await
        .unwrap();

    assert_eq!(handler.failed.len(), 1);
    let (action, error) = &handler.failed[0];
    assert!(matches!(action, Action::Propose { dialogue_id, .. } if *dialogue_id == DialogueId::new(7)));
    assert_eq!(
        *error,
        NegotiationError::Transport(TransportError::Disconnected)
    );
    assert_eq!(
        b.dialogue(DialogueId::new(7)).unwrap().state(),
        NegotiationState::Closed(CloseReason::Aborted)
    );
}

#[tokio::test]
async fn sweep_times_out_idle_dialogues() {
    let a = engine(alice());
    let id = a.send_cfp(&bob(), CfpPayload::Nothing).await.unwrap();

    let report = a.sweep(Utc::now() + chrono::Duration::seconds(301));
    assert_eq!(report.timed_out_ids(), vec![id]);
    assert_eq!(
        a.dialogue(id).unwrap().state(),
        NegotiationState::Closed(CloseReason::TimedOut)
    );

    let report = a.sweep(Utc::now() + chrono::Duration::seconds(400));
    assert_eq!(report.evicted, vec![id]);
    assert!(a.dialogue(id).is_none());
}

// ============================================================================
// Discovery
// ============================================================================

#[tokio::test]
async fn register_and_search_use_service_context() {
    let a = engine(alice());
    let description = Description::builder().with("city", "London").build();

    let request_id = a.register_service("weather", description.clone()).await.unwrap();
    {
        let registered = a.broker().registered.lock();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].0, request_id);
        assert_eq!(registered[0].1.service_id(), "weather");
        assert_eq!(
            registered[0].1.origin(),
            Some(alice().with_alias("weather"))
        );
    }

    a.unregister_service("weather", description).await.unwrap();
    assert!(a.broker().registered.lock().is_empty());

    let first = a.search_services(Query::any()).await.unwrap();
    let second = a.search_services_wide(Query::any()).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(a.broker().searches.lock().len(), 2);
}

// ============================================================================
// Run loop
// ============================================================================

#[tokio::test]
async fn run_processes_events_until_channel_closes() {
    let b = engine(bob());
    let mut handler = Recorder::seller();
    let (tx, rx) = mpsc::channel(8);

    tx.send(agent(7, 1, 0, alice(), cfp())).await.unwrap();
    tx.send(agent(99, 2, 1, alice(), MessageBody::Accept)).await.unwrap();
    drop(tx);

    b.run(rx, &mut handler, future::pending::<()>()).await.unwrap();

    assert_eq!(handler.seen, vec!["cfp 7"]);
    assert_eq!(handler.rejected.len(), 1);
    assert_eq!(b.broker().take_sent().len(), 1);
}

#[tokio::test]
async fn run_stops_on_shutdown() {
    let b = engine(bob());
    let mut handler = Recorder::default();
    let (_tx, rx) = mpsc::channel::<InboundEvent>(1);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        b.run(rx, &mut handler, future::ready(())),
    )
    .await;
    assert!(matches!(result, Ok(Ok(()))));
}

#[tokio::test]
async fn run_returns_fatal_table_full() {
    let config = EngineConfig {
        max_dialogues: 1,
        ..EngineConfig::default()
    };
    let b = engine_with(bob(), config);
    let mut handler = Recorder::default();
    let (tx, rx) = mpsc::channel(8);

    tx.send(agent(1, 1, 0, alice(), cfp())).await.unwrap();
    tx.send(agent(2, 1, 0, alice(), cfp())).await.unwrap();

    let err = b.run(rx, &mut handler, future::pending::<()>()).await.unwrap_err();
    assert!(matches!(err, NegotiationError::TableFull { capacity: 1 }));
    assert!(err.is_fatal());
    drop(tx);
}

#[tokio::test]
async fn run_notifies_timeouts() {
    let config = EngineConfig {
        inactivity_timeout_secs: 1,
        sweep_interval_secs: 1,
        ..EngineConfig::default()
    };
    let a = NegotiationEngine::with_allocator(
        alice(),
        RecordingBroker::default(),
        config,
        DialogueIdAllocator::starting_at(40),
    )
    .unwrap();
    let id = a.send_cfp(&bob(), CfpPayload::Nothing).await.unwrap();
    assert_eq!(id, DialogueId::new(40));

    let mut handler = Recorder::default();
    let (_tx, rx) = mpsc::channel::<InboundEvent>(1);
    let shutdown = tokio::time::sleep(Duration::from_millis(2500));

    a.run(rx, &mut handler, shutdown).await.unwrap();
    assert_eq!(handler.timed_out, vec![id]);
}
