//! Integration tests for dialogues carried by the local broker.
//!
//! Tests the negotiation core end to end:
//! 1. A raw peer drives a responder engine with hand-numbered messages
//! 2. Two engines negotiate with each other through the broker
//! 3. Out-of-sequence, unknown and illegal messages are rejected without side effects
//! 4. Undeliverable messages abort the sender's dialogue

use std::time::Duration;

use futures::future::join_all;
use oef_dialogue::{
    Action, AgentAddress, AgentHandler, AnswerId, CloseReason, Dialogue, DialogueId,
    EngineConfig, InboundEvent, MessageBody, NegotiationEngine, NegotiationError,
    NegotiationState, NoopHandler, OutboundMessage, RoutingContext, Transport,
};
use oef_local::{EventReceiver, LocalBroker, LocalConnection};
use oef_schema::{CfpPayload, Description, Proposal};
use proptest::prelude::*;

// ============================================================================
// Helper Functions
// ============================================================================

/// Proposes a fixed price to every CFP and accepts every proposal.
#[derive(Debug, Default)]
struct Trader {
    messages: Vec<Vec<u8>>,
    aborted: Vec<DialogueId>,
}

impl AgentHandler for Trader {
    fn on_cfp(&mut self, dialogue: &Dialogue, _payload: &CfpPayload) -> Vec<Action> {
        vec![Action::Propose {
            dialogue_id: dialogue.id(),
            proposal: Proposal::single(Description::builder().with("price", 10_i64).build()),
        }]
    }

    fn on_propose(&mut self, dialogue: &Dialogue, _proposal: &Proposal) -> Vec<Action> {
        vec![Action::Accept {
            dialogue_id: dialogue.id(),
        }]
    }

    fn on_message(&mut self, _dialogue: &Dialogue, content: &[u8]) -> Vec<Action> {
        self.messages.push(content.to_vec());
        Vec::new()
    }

    fn on_dialogue_error(
        &mut self,
        dialogue_id: DialogueId,
        _origin: &AgentAddress,
        _dialogue: Option<&Dialogue>,
    ) -> Vec<Action> {
        self.aborted.push(dialogue_id);
        Vec::new()
    }
}

/// A peer sending hand-numbered messages straight through the broker.
struct RawPeer {
    connection: LocalConnection,
    events: EventReceiver,
    to: AgentAddress,
}

impl RawPeer {
    async fn send(&self, dialogue: u32, answer: u32, target: u32, body: MessageBody) {
        let message = OutboundMessage {
            answer_id: AnswerId::new(answer),
            dialogue_id: DialogueId::new(dialogue),
            target: AnswerId::new(target),
            context: RoutingContext::for_agent(self.connection.address(), &self.to, true),
            body,
        };
        self.connection.send(message).await.unwrap();
    }

    async fn next(&mut self) -> InboundEvent {
        next_event(&mut self.events).await
    }
}

async fn next_event(events: &mut EventReceiver) -> InboundEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

fn engine(broker: &LocalBroker, key: &str) -> (NegotiationEngine<LocalConnection>, EventReceiver) {
    let (connection, events) = broker.connect(key).unwrap();
    let engine =
        NegotiationEngine::new(connection.address().clone(), connection, EngineConfig::default())
            .unwrap();
    (engine, events)
}

/// Responder engine "B" plus a raw peer "A" aimed at it.
fn responder_setup() -> (
    NegotiationEngine<LocalConnection>,
    EventReceiver,
    RawPeer,
) {
    let broker = LocalBroker::new();
    let (b, b_events) = engine(&broker, "B");
    let (connection, events) = broker.connect("A").unwrap();
    let peer = RawPeer {
        connection,
        events,
        to: AgentAddress::new("B"),
    };
    (b, b_events, peer)
}

/// Drives B through CFP(7,1,0) -> Propose(2,1) -> Accept(3,2).
async fn accepted_dialogue(
    b: &NegotiationEngine<LocalConnection>,
    b_events: &mut EventReceiver,
    peer: &mut RawPeer,
    trader: &mut Trader,
) {
    peer.send(7, 1, 0, MessageBody::Cfp(CfpPayload::Nothing)).await;
    b.handle_event(next_event(b_events).await, trader).await.unwrap();

    let InboundEvent::Agent(proposal) = peer.next().await else {
        panic!("expected a proposal");
    };
    assert_eq!(proposal.dialogue_id, DialogueId::new(7));
    assert_eq!(proposal.answer_id, AnswerId::new(2));
    assert_eq!(proposal.target, AnswerId::new(1));
    assert!(matches!(proposal.body, MessageBody::Propose(_)));

    peer.send(7, 3, 2, MessageBody::Accept).await;
    b.handle_event(next_event(b_events).await, trader).await.unwrap();
}

// ============================================================================
// Responder Scenario Tests
// ============================================================================

#[tokio::test]
async fn responder_reaches_accepted_through_broker() {
    let (b, mut b_events, mut peer) = responder_setup();
    let mut trader = Trader::default();

    accepted_dialogue(&b, &mut b_events, &mut peer, &mut trader).await;

    let dialogue = b.dialogue(DialogueId::new(7)).unwrap();
    assert_eq!(dialogue.state(), NegotiationState::Accepted);
    assert_eq!(dialogue.last_answer_id(), AnswerId::new(3));
    assert!(dialogue.counterparty().same_agent(&AgentAddress::new("A")));
}

#[tokio::test]
async fn replayed_proposal_is_out_of_sequence() {
    let (b, mut b_events, mut peer) = responder_setup();
    let mut trader = Trader::default();
    accepted_dialogue(&b, &mut b_events, &mut peer, &mut trader).await;

    let proposal = Proposal::single(Description::builder().with("price", 10_i64).build());
    peer.send(7, 2, 1, MessageBody::Propose(proposal)).await;
    let err = b
        .handle_event(next_event(&mut b_events).await, &mut trader)
        .await
        .unwrap_err();

    assert!(matches!(err, NegotiationError::OutOfSequence { .. }));
    let dialogue = b.dialogue(DialogueId::new(7)).unwrap();
    assert_eq!(dialogue.state(), NegotiationState::Accepted);
    assert_eq!(dialogue.last_answer_id(), AnswerId::new(3));
}

#[tokio::test]
async fn proposal_for_unknown_dialogue_is_rejected() {
    let (b, mut b_events, peer) = responder_setup();
    let proposal = Proposal::single(Description::builder().with("price", 1_i64).build());

    peer.send(99, 2, 1, MessageBody::Propose(proposal)).await;
    let err = b
        .handle_event(next_event(&mut b_events).await, &mut NoopHandler)
        .await
        .unwrap_err();

    assert_eq!(err, NegotiationError::UnknownDialogue(DialogueId::new(99)));
    assert!(b.live_dialogues().is_empty());
}

#[tokio::test]
async fn messages_flow_after_accept_but_cfp_does_not() {
    let (b, mut b_events, mut peer) = responder_setup();
    let mut trader = Trader::default();
    accepted_dialogue(&b, &mut b_events, &mut peer, &mut trader).await;

    for (answer, content) in [(4, "one"), (5, "two"), (6, "three")] {
        peer.send(7, answer, answer - 1, MessageBody::Message(content.into()))
            .await;
        b.handle_event(next_event(&mut b_events).await, &mut trader)
            .await
            .unwrap();
    }
    assert_eq!(trader.messages.len(), 3);
    assert_eq!(
        b.dialogue(DialogueId::new(7)).unwrap().state(),
        NegotiationState::Accepted
    );

    b.send_message(DialogueId::new(7), b"reply".to_vec())
        .await
        .unwrap();
    let InboundEvent::Agent(reply) = peer.next().await else {
        panic!("expected a message");
    };
    assert_eq!(reply.answer_id, AnswerId::new(7));
    assert_eq!(reply.target, AnswerId::new(6));

    peer.send(7, 8, 7, MessageBody::Cfp(CfpPayload::Nothing)).await;
    let err = b
        .handle_event(next_event(&mut b_events).await, &mut trader)
        .await
        .unwrap_err();
    assert!(matches!(err, NegotiationError::IllegalTransition { .. }));
}

#[tokio::test]
async fn message_from_another_agent_is_rejected() {
    let broker = LocalBroker::new();
    let (b, mut b_events) = engine(&broker, "B");
    let mut trader = Trader::default();

    let (connection, events) = broker.connect("A").unwrap();
    let mut peer = RawPeer {
        connection,
        events,
        to: AgentAddress::new("B"),
    };
    accepted_dialogue(&b, &mut b_events, &mut peer, &mut trader).await;

    let (connection, events) = broker.connect("Mallory").unwrap();
    let intruder = RawPeer {
        connection,
        events,
        to: AgentAddress::new("B"),
    };
    intruder
        .send(7, 4, 3, MessageBody::Message(b"hi".to_vec()))
        .await;
    let err = b
        .handle_event(next_event(&mut b_events).await, &mut trader)
        .await
        .unwrap_err();

    assert!(matches!(err, NegotiationError::CounterpartyMismatch { .. }));
    assert_eq!(
        b.dialogue(DialogueId::new(7)).unwrap().last_answer_id(),
        AnswerId::new(3)
    );
}

// ============================================================================
// Engine-to-Engine Tests
// ============================================================================

#[tokio::test]
async fn two_engines_negotiate_and_complete() {
    let broker = LocalBroker::new();
    let (buyer, mut buyer_events) = engine(&broker, "buyer");
    let (seller, mut seller_events) = engine(&broker, "seller");
    let mut buyer_handler = Trader::default();
    let mut seller_handler = Trader::default();

    let id = buyer
        .send_cfp(&AgentAddress::new("seller"), CfpPayload::Nothing)
        .await
        .unwrap();

    // CFP at the seller, proposal at the buyer, accept at the seller.
    seller
        .handle_event(next_event(&mut seller_events).await, &mut seller_handler)
        .await
        .unwrap();
    buyer
        .handle_event(next_event(&mut buyer_events).await, &mut buyer_handler)
        .await
        .unwrap();
    seller
        .handle_event(next_event(&mut seller_events).await, &mut seller_handler)
        .await
        .unwrap();

    assert_eq!(buyer.dialogue(id).unwrap().state(), NegotiationState::Accepted);
    assert_eq!(seller.dialogue(id).unwrap().state(), NegotiationState::Accepted);
    assert_eq!(buyer.dialogue(id).unwrap().last_answer_id(), AnswerId::new(3));
    assert_eq!(seller.dialogue(id).unwrap().last_answer_id(), AnswerId::new(3));

    assert_eq!(
        buyer.complete(id).unwrap(),
        NegotiationState::Closed(CloseReason::Completed)
    );
}

#[tokio::test]
async fn seller_decline_closes_both_sides() {
    let broker = LocalBroker::new();
    let (buyer, mut buyer_events) = engine(&broker, "buyer");
    let (seller, mut seller_events) = engine(&broker, "seller");

    let id = buyer
        .send_cfp(&AgentAddress::new("seller"), CfpPayload::Nothing)
        .await
        .unwrap();
    seller
        .handle_event(next_event(&mut seller_events).await, &mut NoopHandler)
        .await
        .unwrap();
    seller.send_decline(id).await.unwrap();
    buyer
        .handle_event(next_event(&mut buyer_events).await, &mut NoopHandler)
        .await
        .unwrap();

    let declined = NegotiationState::Closed(CloseReason::Declined);
    assert_eq!(seller.dialogue(id).unwrap().state(), declined);
    assert_eq!(buyer.dialogue(id).unwrap().state(), declined);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cfps_get_distinct_ids() {
    let broker = LocalBroker::new();
    let (buyer, _buyer_events) = engine(&broker, "buyer");
    let mut sellers = Vec::new();
    for i in 0..24 {
        let key = format!("seller-{i}");
        sellers.push((AgentAddress::new(key.clone()), broker.connect(&key).unwrap()));
    }

    let sends = sellers.iter().map(|(address, _)| {
        let buyer = buyer.clone();
        let address = address.clone();
        tokio::spawn(async move { buyer.send_cfp(&address, CfpPayload::Nothing).await })
    });
    let mut ids: Vec<DialogueId> = join_all(sends)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), sellers.len());
    assert_eq!(buyer.live_dialogues().len(), sellers.len());
}

#[tokio::test]
async fn undeliverable_cfp_aborts_dialogue() {
    let broker = LocalBroker::new();
    let (buyer, mut buyer_events) = engine(&broker, "buyer");
    let mut handler = Trader::default();

    let id = buyer
        .send_cfp(&AgentAddress::new("nobody"), CfpPayload::Nothing)
        .await
        .unwrap();
    let event = next_event(&mut buyer_events).await;
    assert!(matches!(event, InboundEvent::DialogueError { .. }));
    buyer.handle_event(event, &mut handler).await.unwrap();

    assert_eq!(handler.aborted, vec![id]);
    assert_eq!(
        buyer.dialogue(id).unwrap().state(),
        NegotiationState::Closed(CloseReason::Aborted)
    );
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn stale_target_is_rejected_whatever_the_step(target in 0u32..1000, step in 0usize..4) {
        prop_assume!(target != 3);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let (b, mut b_events, mut peer) = responder_setup();
            let mut trader = Trader::default();
            accepted_dialogue(&b, &mut b_events, &mut peer, &mut trader).await;

            let body = match step {
                0 => MessageBody::Cfp(CfpPayload::Nothing),
                1 => MessageBody::Accept,
                2 => MessageBody::Decline,
                _ => MessageBody::Message(b"late".to_vec()),
            };
            peer.send(7, target.saturating_add(1), target, body).await;
            let err = b
                .handle_event(next_event(&mut b_events).await, &mut trader)
                .await
                .unwrap_err();

            assert!(matches!(err, NegotiationError::OutOfSequence { .. }));
            let dialogue = b.dialogue(DialogueId::new(7)).unwrap();
            assert_eq!(dialogue.state(), NegotiationState::Accepted);
            assert_eq!(dialogue.last_answer_id(), AnswerId::new(3));
        });
    }
}
