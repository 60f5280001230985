use chrono::NaiveDate;
use thiserror::Error;

use crate::model::{CardId, DeckId, StudentId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionTransitionError {
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },
}

/// Live phase of a study session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Presenting(CardId),
    AwaitingAnswer(CardId),
    Evaluating(CardId),
    AutoAdvancing { answered: CardId },
    Finished,
}

impl SessionPhase {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Presenting(_) => "presenting",
            SessionPhase::AwaitingAnswer(_) => "awaiting answer",
            SessionPhase::Evaluating(_) => "evaluating",
            SessionPhase::AutoAdvancing { .. } => "auto-advancing",
            SessionPhase::Finished => "finished",
        }
    }
}

/// Ephemeral study loop for one (student, deck) pair.
///
/// Holds no durable state: the current card is mirrored on the day's
/// `DailyState`, so a session can be rebuilt after a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    student: StudentId,
    deck_id: DeckId,
    date: NaiveDate,
    phase: SessionPhase,
    presented: u32,
}

impl Session {
    #[must_use]
    pub fn new(student: StudentId, deck_id: DeckId, date: NaiveDate) -> Self {
        Self {
            student,
            deck_id,
            date,
            phase: SessionPhase::Idle,
            presented: 0,
        }
    }

    /// Rebuild a session whose prompt was already delivered before a restart.
    #[must_use]
    pub fn resume_awaiting(
        student: StudentId,
        deck_id: DeckId,
        date: NaiveDate,
        card: CardId,
    ) -> Self {
        Self {
            phase: SessionPhase::AwaitingAnswer(card),
            presented: 1,
            ..Self::new(student, deck_id, date)
        }
    }

    #[must_use]
    pub fn student(&self) -> StudentId {
        self.student
    }

    #[must_use]
    pub fn deck_id(&self) -> DeckId {
        self.deck_id
    }

    /// Local calendar day the session is currently counting against.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn presented(&self) -> u32 {
        self.presented
    }

    /// True between the first prompt and the end of the day's rotation.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self.phase, SessionPhase::Idle | SessionPhase::Finished)
    }

    /// Card the student is currently looking at, if any.
    #[must_use]
    pub fn current_card(&self) -> Option<CardId> {
        match self.phase {
            SessionPhase::Presenting(c)
            | SessionPhase::AwaitingAnswer(c)
            | SessionPhase::Evaluating(c) => Some(c),
            _ => None,
        }
    }

    /// Card a "Bad card" report applies to.
    ///
    /// While auto-advancing this is the card that was just answered.
    #[must_use]
    pub fn flaggable_card(&self) -> Option<CardId> {
        match self.phase {
            SessionPhase::AwaitingAnswer(c)
            | SessionPhase::Evaluating(c)
            | SessionPhase::AutoAdvancing { answered: c } => Some(c),
            _ => None,
        }
    }

    fn invalid(&self, action: &'static str) -> SessionTransitionError {
        SessionTransitionError::InvalidTransition {
            from: self.phase.name(),
            action,
        }
    }

    /// `Finished → Idle` on the next trigger, moving to `date`.
    ///
    /// # Errors
    ///
    /// Fails while the session is active.
    pub fn restart(&mut self, date: NaiveDate) -> Result<(), SessionTransitionError> {
        if self.is_active() {
            return Err(self.invalid("restart"));
        }
        self.phase = SessionPhase::Idle;
        self.date = date;
        self.presented = 0;
        Ok(())
    }

    /// Move the session onto a new calendar day between cards.
    pub fn roll_to(&mut self, date: NaiveDate) {
        self.date = date;
    }

    /// `Idle | AutoAdvancing → Presenting`.
    ///
    /// # Errors
    ///
    /// Fails from any other phase.
    pub fn present(&mut self, card: CardId) -> Result<(), SessionTransitionError> {
        match self.phase {
            SessionPhase::Idle | SessionPhase::AutoAdvancing { .. } => {
                self.phase = SessionPhase::Presenting(card);
                self.presented = self.presented.saturating_add(1);
                Ok(())
            }
            _ => Err(self.invalid("present a card")),
        }
    }

    /// `Presenting → AwaitingAnswer` once the transport confirmed delivery.
    ///
    /// # Errors
    ///
    /// Fails unless presenting.
    pub fn delivered(&mut self) -> Result<CardId, SessionTransitionError> {
        match self.phase {
            SessionPhase::Presenting(card) => {
                self.phase = SessionPhase::AwaitingAnswer(card);
                Ok(card)
            }
            _ => Err(self.invalid("confirm delivery")),
        }
    }

    /// `AwaitingAnswer → Evaluating`.
    ///
    /// # Errors
    ///
    /// Fails unless awaiting an answer.
    pub fn begin_evaluating(&mut self) -> Result<CardId, SessionTransitionError> {
        match self.phase {
            SessionPhase::AwaitingAnswer(card) => {
                self.phase = SessionPhase::Evaluating(card);
                Ok(card)
            }
            _ => Err(self.invalid("evaluate an answer")),
        }
    }

    /// `Evaluating → AutoAdvancing`.
    ///
    /// # Errors
    ///
    /// Fails unless evaluating.
    pub fn begin_auto_advance(&mut self) -> Result<(), SessionTransitionError> {
        match self.phase {
            SessionPhase::Evaluating(card) => {
                self.phase = SessionPhase::AutoAdvancing { answered: card };
                Ok(())
            }
            _ => Err(self.invalid("auto-advance")),
        }
    }

    /// Drop the current card after a "Bad card" report so the next one can be
    /// presented right away.
    ///
    /// # Errors
    ///
    /// Fails when there is no flaggable card.
    pub fn skip_flagged(&mut self) -> Result<CardId, SessionTransitionError> {
        match self.flaggable_card() {
            Some(card) => {
                self.phase = SessionPhase::AutoAdvancing { answered: card };
                Ok(card)
            }
            None => Err(self.invalid("skip a flagged card")),
        }
    }

    /// `Idle | AutoAdvancing → Finished` when no eligible card remains.
    ///
    /// # Errors
    ///
    /// Fails while a card is on screen.
    pub fn finish(&mut self) -> Result<(), SessionTransitionError> {
        match self.phase {
            SessionPhase::Idle | SessionPhase::AutoAdvancing { .. } | SessionPhase::Finished => {
                self.phase = SessionPhase::Finished;
                Ok(())
            }
            _ => Err(self.invalid("finish")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            StudentId::new(1),
            DeckId::new(1),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        )
    }

    #[test]
    fn full_cycle() {
        let mut s = session();
        assert!(!s.is_active());
        s.present(CardId::new(1)).unwrap();
        assert!(s.is_active());
        assert_eq!(s.delivered().unwrap(), CardId::new(1));
        assert_eq!(s.begin_evaluating().unwrap(), CardId::new(1));
        s.begin_auto_advance().unwrap();
        assert_eq!(s.phase(), SessionPhase::AutoAdvancing { answered: CardId::new(1) });
        s.present(CardId::new(2)).unwrap();
        s.delivered().unwrap();
        s.begin_evaluating().unwrap();
        s.begin_auto_advance().unwrap();
        s.finish().unwrap();
        assert_eq!(s.phase(), SessionPhase::Finished);
        assert_eq!(s.presented(), 2);
    }

    #[test]
    fn idle_can_finish_directly() {
        let mut s = session();
        s.finish().unwrap();
        assert!(!s.is_active());
    }

    #[test]
    fn cannot_evaluate_before_delivery() {
        let mut s = session();
        s.present(CardId::new(1)).unwrap();
        let err = s.begin_evaluating().unwrap_err();
        assert_eq!(
            err,
            SessionTransitionError::InvalidTransition {
                from: "presenting",
                action: "evaluate an answer"
            }
        );
    }

    #[test]
    fn cannot_present_while_awaiting() {
        let mut s = session();
        s.present(CardId::new(1)).unwrap();
        s.delivered().unwrap();
        assert!(s.present(CardId::new(2)).is_err());
        assert!(s.finish().is_err());
    }

    #[test]
    fn skip_flagged_from_awaiting() {
        let mut s = session();
        s.present(CardId::new(4)).unwrap();
        assert!(s.skip_flagged().is_err());
        s.delivered().unwrap();
        assert_eq!(s.skip_flagged().unwrap(), CardId::new(4));
        assert_eq!(s.phase(), SessionPhase::AutoAdvancing { answered: CardId::new(4) });
    }

    #[test]
    fn restart_only_when_inactive() {
        let mut s = session();
        s.present(CardId::new(1)).unwrap();
        let next_day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        assert!(s.restart(next_day).is_err());

        let mut done = session();
        done.finish().unwrap();
        done.restart(next_day).unwrap();
        assert_eq!(done.phase(), SessionPhase::Idle);
        assert_eq!(done.date(), next_day);
    }

    #[test]
    fn resume_awaiting_accepts_answer() {
        let mut s = Session::resume_awaiting(
            StudentId::new(1),
            DeckId::new(1),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            CardId::new(9),
        );
        assert_eq!(s.begin_evaluating().unwrap(), CardId::new(9));
    }
}
