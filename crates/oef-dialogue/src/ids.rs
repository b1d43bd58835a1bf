//! Dialogue and answer identifiers.
//!
//! A conversation is threaded by the triple (dialogue id, answer id, target):
//! the dialogue id names the negotiation, the answer id numbers each step and
//! the target names the step being answered.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one negotiation thread, chosen by its initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DialogueId(u32);

impl DialogueId {
    /// Wraps a raw dialogue id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DialogueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequence number of a step within a dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerId(u32);

impl AnswerId {
    /// Target of the opening message of a dialogue.
    pub const START: Self = Self(0);

    /// Wraps a raw answer id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns the id following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns true for the opening sentinel.
    #[must_use]
    pub const fn is_start(self) -> bool {
        self.0 == Self::START.0
    }
}

impl fmt::Display for AnswerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out dialogue ids for negotiations this agent initiates.
///
/// Ids come from a counter seeded at a random point so that independent
/// agents rarely pick the same ids. Zero is never handed out.
#[derive(Debug, Clone)]
pub struct DialogueIdAllocator {
    next: u32,
}

impl DialogueIdAllocator {
    /// Creates an allocator seeded from the thread RNG.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(rand::thread_rng().gen_range(1..=u32::MAX))
    }

    /// Creates an allocator whose first candidate is `start`.
    #[must_use]
    pub const fn starting_at(start: u32) -> Self {
        Self { next: start }
    }

    /// Allocates the first candidate for which `is_taken` is false.
    ///
    /// Gives up after `max_attempts` candidates.
    pub fn allocate(
        &mut self,
        max_attempts: usize,
        is_taken: impl Fn(DialogueId) -> bool,
    ) -> Option<DialogueId> {
        for _ in 0..max_attempts {
            let candidate = self.advance();
            if !is_taken(candidate) {
                return Some(candidate);
            }
        }
        None
    }

    fn advance(&mut self) -> DialogueId {
        if self.next == 0 {
            self.next = 1;
        }
        let id = DialogueId(self.next);
        self.next = self.next.wrapping_add(1);
        id
    }
}

impl Default for DialogueIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
