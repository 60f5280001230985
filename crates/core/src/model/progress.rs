use chrono::{DateTime, NaiveDate, Utc};

use crate::matcher::Verdict;
use crate::model::ids::{CardId, DeckId, StudentId};

/// Where a card stands in one student's rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardState {
    New,
    Introduced,
    Suspended,
}

impl CardState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CardState::New => "new",
            CardState::Introduced => "introduced",
            CardState::Suspended => "suspended",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "new" => Some(CardState::New),
            "introduced" => Some(CardState::Introduced),
            "suspended" => Some(CardState::Suspended),
            _ => None,
        }
    }
}

/// Per-student state of a single card.
///
/// Suspension lives here and never on the shared `Card`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub student: StudentId,
    pub deck_id: DeckId,
    pub card_id: CardId,
    pub state: CardState,
    pub introduced_on: Option<NaiveDate>,
    pub last_seen_on: Option<NaiveDate>,
    pub times_seen: u32,
    pub last_answer: Option<String>,
    pub last_verdict: Option<Verdict>,
    pub updated_at: DateTime<Utc>,
}

impl Progress {
    #[must_use]
    pub fn new(student: StudentId, deck_id: DeckId, card_id: CardId, now: DateTime<Utc>) -> Self {
        Self {
            student,
            deck_id,
            card_id,
            state: CardState::New,
            introduced_on: None,
            last_seen_on: None,
            times_seen: 0,
            last_answer: None,
            last_verdict: None,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.state == CardState::Suspended
    }

    #[must_use]
    pub fn seen_on(&self, date: NaiveDate) -> bool {
        self.last_seen_on == Some(date)
    }

    /// Move a New card into rotation. No-op for any other state.
    pub fn introduce(&mut self, today: NaiveDate, now: DateTime<Utc>) {
        if self.state == CardState::New {
            self.state = CardState::Introduced;
            self.introduced_on = Some(today);
            self.updated_at = now;
        }
    }

    /// Record a scored answer. The card counts as seen for `today`.
    pub fn record_answer(
        &mut self,
        today: NaiveDate,
        submitted: &str,
        verdict: Verdict,
        now: DateTime<Utc>,
    ) {
        if self.state == CardState::New {
            self.introduce(today, now);
        }
        self.last_seen_on = Some(today);
        self.times_seen = self.times_seen.saturating_add(1);
        self.last_answer = Some(submitted.to_string());
        self.last_verdict = Some(verdict);
        self.updated_at = now;
    }

    /// Suspend the card for this student.
    ///
    /// Returns `false` when it was already suspended.
    pub fn suspend(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_suspended() {
            return false;
        }
        self.state = CardState::Suspended;
        self.updated_at = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn progress() -> Progress {
        Progress::new(StudentId::new(1), DeckId::new(1), CardId::new(1), fixed_now())
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn introduce_only_from_new() {
        let mut p = progress();
        p.introduce(day(1), fixed_now());
        assert_eq!(p.state, CardState::Introduced);
        assert_eq!(p.introduced_on, Some(day(1)));

        p.introduce(day(2), fixed_now());
        assert_eq!(p.introduced_on, Some(day(1)));
    }

    #[test]
    fn record_answer_marks_seen() {
        let mut p = progress();
        p.introduce(day(1), fixed_now());
        p.record_answer(day(1), "salut", Verdict::Correct, fixed_now());
        assert!(p.seen_on(day(1)));
        assert!(!p.seen_on(day(2)));
        assert_eq!(p.times_seen, 1);
        assert_eq!(p.last_verdict, Some(Verdict::Correct));
    }

    #[test]
    fn suspend_is_idempotent() {
        let mut p = progress();
        assert!(p.suspend(fixed_now()));
        let once = p.clone();
        assert!(!p.suspend(fixed_now()));
        assert_eq!(p, once);
    }

    #[test]
    fn suspended_card_stays_suspended_after_introduce() {
        let mut p = progress();
        p.suspend(fixed_now());
        p.introduce(day(3), fixed_now());
        assert!(p.is_suspended());
    }
}
