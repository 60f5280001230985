use async_trait::async_trait;
use listen_core::matcher::{Verdict, letter_hint};
use listen_core::model::{Card, CardId, DeckId, MediaRef, StudentId};
use thiserror::Error;

/// Why the transport could not hand a message to the student.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeliveryError {
    /// The transport keeps retrying; the session waits in `Presenting`.
    #[error("delivery pending: {0}")]
    Transient(String),
    /// The student cannot be reached (blocked the bot, deleted chat, ...).
    #[error("delivery failed: {0}")]
    Permanent(String),
}

/// A card as shown to a student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub deck_id: DeckId,
    pub card_id: CardId,
    pub media: MediaRef,
    pub hint: Option<String>,
}

impl Prompt {
    #[must_use]
    pub fn for_card(card: &Card) -> Self {
        Self {
            deck_id: card.deck_id(),
            card_id: card.id(),
            media: card.media().clone(),
            hint: letter_hint(card.answers().primary()),
        }
    }
}

/// Result of a scored answer, revealed right after submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub deck_id: DeckId,
    pub card_id: CardId,
    pub verdict: Verdict,
    pub revealed_answer: String,
    pub submitted: String,
}

/// Outbound side of the chat surface.
///
/// Implementations must keep per-student FIFO order.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver_prompt(&self, student: StudentId, prompt: &Prompt) -> Result<(), DeliveryError>;

    async fn deliver_feedback(
        &self,
        student: StudentId,
        feedback: &Feedback,
    ) -> Result<(), DeliveryError>;

    /// "It's all for today", with a "Study more" affordance when `has_more`.
    async fn deliver_finished(
        &self,
        student: StudentId,
        deck_id: DeckId,
        has_more: bool,
    ) -> Result<(), DeliveryError>;

    /// Surface a permanent delivery failure to the deck's admin.
    async fn report_delivery_failure(&self, student: StudentId, deck_id: DeckId, reason: &str);
}
