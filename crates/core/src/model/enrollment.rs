use chrono::{DateTime, Utc};

use crate::model::ids::{CardId, DeckId, StudentId};

/// A student's subscription to a deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub student: StudentId,
    pub deck_id: DeckId,
    pub joined_at: DateTime<Utc>,
}

impl Enrollment {
    #[must_use]
    pub fn new(student: StudentId, deck_id: DeckId, joined_at: DateTime<Utc>) -> Self {
        Self {
            student,
            deck_id,
            joined_at,
        }
    }
}

/// A student's report that a card is broken (bad audio, wrong answer, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    pub student: StudentId,
    pub deck_id: DeckId,
    pub card_id: CardId,
    pub created_at: DateTime<Utc>,
}

/// Admin view of how often a card was flagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSummary {
    pub card_id: CardId,
    pub primary_answer: String,
    pub flags: u32,
}
