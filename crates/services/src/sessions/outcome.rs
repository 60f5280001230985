use listen_core::matcher::Verdict;
use listen_core::model::{CardId, DeckId};

/// What caused a session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTrigger {
    /// The deck's daily trigger. Only starts pairs that have no record for
    /// the day yet.
    Scheduled,
    /// "Study more", or opening a deck link.
    Manual,
}

/// Result of driving `Idle → Presenting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// The card is on its way. The session waits in `Presenting` until the
    /// transport confirms delivery.
    Card(CardId),
    /// Nothing eligible today; the student was told so. `has_more` is set
    /// when a start right now would still present a card.
    Finished { has_more: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(Presentation),
    /// Another trigger owns the pair; this one was discarded.
    AlreadyActive,
    /// A scheduled trigger found the day already opened.
    AlreadyStartedToday,
    DeckInactive,
}

impl StartOutcome {
    #[must_use]
    pub fn started(&self) -> bool {
        matches!(self, StartOutcome::Started(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Scored { card_id: CardId, verdict: Verdict },
    /// No card is waiting for an answer.
    NothingPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOutcome {
    /// Card suspended for this student; the next one was presented.
    Suspended {
        card_id: CardId,
        next: Option<Presentation>,
    },
    AlreadySuspended { card_id: CardId },
    /// No card on screen to flag.
    NothingToFlag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollOutcome {
    pub deck_id: DeckId,
    pub newly_enrolled: bool,
    pub start: StartOutcome,
}

/// Tally of one scheduled fire over a deck's enrollments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireReport {
    pub started: usize,
    pub skipped: usize,
    pub failed: usize,
}
