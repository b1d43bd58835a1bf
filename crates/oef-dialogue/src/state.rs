//! Negotiation state machine.
//!
//! A dialogue moves through the FIPA-style sequence
//! `Idle → CFP → Propose → Accept/Decline`, followed by free-form messages
//! once a proposal is accepted. All legal moves live in [`transition`];
//! everything else is an illegal transition.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::routing::Direction;

/// A protocol step carried by a dialogue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Call for proposals.
    Cfp,
    /// Offer in response to a CFP.
    Propose,
    /// Acceptance of a proposal.
    Accept,
    /// Refusal to continue.
    Decline,
    /// Free-form content.
    Message,
}

impl Step {
    /// Returns true for steps that may open a new dialogue.
    #[must_use]
    pub const fn can_open(self) -> bool {
        matches!(self, Self::Cfp | Self::Message)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cfp => "cfp",
            Self::Propose => "propose",
            Self::Accept => "accept",
            Self::Decline => "decline",
            Self::Message => "message",
        };
        f.write_str(name)
    }
}

/// Why a dialogue reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// One side declined.
    Declined,
    /// The application finished the dialogue after an accept.
    Completed,
    /// Cancelled locally or aborted by a broker dialogue error.
    Aborted,
    /// No activity within the inactivity window.
    TimedOut,
}

/// State of one dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    /// Created, nothing exchanged yet.
    Idle,
    /// We sent a CFP.
    CfpSent,
    /// We received a CFP.
    CfpReceived,
    /// We sent a proposal.
    ProposalSent,
    /// We received a proposal.
    ProposalReceived,
    /// A proposal was accepted; messages may follow.
    Accepted,
    /// Free-form conversation opened without a CFP.
    Messaging,
    /// Terminal.
    Closed(CloseReason),
}

impl NegotiationState {
    /// Returns true for [`NegotiationState::Closed`].
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    /// Returns the close reason of a terminal state.
    #[must_use]
    pub const fn close_reason(&self) -> Option<CloseReason> {
        match self {
            Self::Closed(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::CfpSent => f.write_str("cfp_sent"),
            Self::CfpReceived => f.write_str("cfp_received"),
            Self::ProposalSent => f.write_str("proposal_sent"),
            Self::ProposalReceived => f.write_str("proposal_received"),
            Self::Accepted => f.write_str("accepted"),
            Self::Messaging => f.write_str("messaging"),
            Self::Closed(reason) => write!(f, "closed({reason:?})"),
        }
    }
}

/// Something that happens to a dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// A step sent or received.
    Step {
        /// The protocol step.
        step: Step,
        /// Whether we sent or received it.
        direction: Direction,
    },
    /// The application finished an accepted dialogue.
    Complete,
    /// The application cancelled the dialogue.
    Cancel,
    /// The broker reported a dialogue error.
    DialogueError,
    /// The inactivity window elapsed.
    Timeout,
}

impl Transition {
    /// Sending `step`.
    #[must_use]
    pub const fn send(step: Step) -> Self {
        Self::Step {
            step,
            direction: Direction::Outbound,
        }
    }

    /// Receiving `step`.
    #[must_use]
    pub const fn receive(step: Step) -> Self {
        Self::Step {
            step,
            direction: Direction::Inbound,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step {
                step,
                direction: Direction::Outbound,
            } => write!(f, "send {step}"),
            Self::Step {
                step,
                direction: Direction::Inbound,
            } => write!(f, "receive {step}"),
            Self::Complete => f.write_str("complete"),
            Self::Cancel => f.write_str("cancel"),
            Self::DialogueError => f.write_str("dialogue error"),
            Self::Timeout => f.write_str("timeout"),
        }
    }
}

/// Computes the state reached from `state` through `event`.
///
/// Returns `None` if the move is illegal. Cancelling a closed dialogue is
/// legal and leaves it unchanged.
#[must_use]
pub fn transition(state: NegotiationState, event: Transition) -> Option<NegotiationState> {
    use Direction::{Inbound, Outbound};
    use NegotiationState as S;

    match (state, event) {
        (S::Closed(_), Transition::Cancel) => Some(state),
        (S::Closed(_), _) => None,

        (_, Transition::Cancel | Transition::DialogueError) => {
            Some(S::Closed(CloseReason::Aborted))
        }
        (_, Transition::Timeout) => Some(S::Closed(CloseReason::TimedOut)),
        (S::Accepted | S::Messaging, Transition::Complete) => {
            Some(S::Closed(CloseReason::Completed))
        }
        (_, Transition::Complete) => None,

        (S::Idle, Transition::Step { step: Step::Cfp, direction: Outbound }) => Some(S::CfpSent),
        (S::Idle, Transition::Step { step: Step::Cfp, direction: Inbound }) => Some(S::CfpReceived),

        (S::CfpReceived, Transition::Step { step: Step::Propose, direction: Outbound }) => {
            Some(S::ProposalSent)
        }
        (S::CfpSent, Transition::Step { step: Step::Propose, direction: Inbound }) => {
            Some(S::ProposalReceived)
        }

        (S::ProposalReceived, Transition::Step { step: Step::Accept, direction: Outbound })
        | (S::ProposalSent, Transition::Step { step: Step::Accept, direction: Inbound }) => {
            Some(S::Accepted)
        }

        (
            S::CfpSent | S::CfpReceived | S::ProposalSent | S::ProposalReceived,
            Transition::Step { step: Step::Decline, .. },
        ) => Some(S::Closed(CloseReason::Declined)),

        (S::Accepted, Transition::Step { step: Step::Message, .. }) => Some(S::Accepted),
        (S::Idle | S::Messaging, Transition::Step { step: Step::Message, .. }) => {
            Some(S::Messaging)
        }

        (_, Transition::Step { .. }) => None,
    }
}
