use chrono::NaiveDate;

use crate::matcher::Verdict;
use crate::model::ids::{CardId, DeckId, StudentId};

/// Identity of a daily record: one per student, deck and local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DailyKey {
    pub student: StudentId,
    pub deck_id: DeckId,
    pub date: NaiveDate,
}

impl DailyKey {
    #[must_use]
    pub fn new(student: StudentId, deck_id: DeckId, date: NaiveDate) -> Self {
        Self {
            student,
            deck_id,
            date,
        }
    }
}

/// Answer from the quota tracker when a New card is about to be introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Granted,
    Denied,
}

/// Per-day bookkeeping for one enrollment.
///
/// `new_limit` is the deck's `new_per_day` when this record was created, so a
/// quota change only applies from the next day on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyState {
    pub key: DailyKey,
    pub new_limit: u32,
    pub new_introduced: u32,
    pub answered: u32,
    pub correct: u32,
    pub done_for_today: bool,
    pub current_card: Option<CardId>,
}

impl DailyState {
    #[must_use]
    pub fn new(key: DailyKey, new_limit: u32) -> Self {
        Self {
            key,
            new_limit,
            new_introduced: 0,
            answered: 0,
            correct: 0,
            done_for_today: false,
            current_card: None,
        }
    }

    #[must_use]
    pub fn remaining_new(&self) -> u32 {
        self.new_limit.saturating_sub(self.new_introduced)
    }

    /// Compare-and-increment on the introduced counter.
    pub fn try_reserve_new(&mut self) -> QuotaDecision {
        if self.new_introduced >= self.new_limit {
            return QuotaDecision::Denied;
        }
        self.new_introduced += 1;
        QuotaDecision::Granted
    }

    /// Give back a slot whose introduction never happened.
    pub fn release_new(&mut self) {
        self.new_introduced = self.new_introduced.saturating_sub(1);
    }

    pub fn record_answer(&mut self, verdict: Verdict) {
        self.answered = self.answered.saturating_add(1);
        if verdict.is_correct() {
            self.correct = self.correct.saturating_add(1);
        }
    }

    /// Monotonic within the day. Nothing is on screen once done.
    pub fn mark_done(&mut self) {
        self.done_for_today = true;
        self.current_card = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(limit: u32) -> DailyState {
        let key = DailyKey::new(
            StudentId::new(1),
            DeckId::new(1),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        );
        DailyState::new(key, limit)
    }

    #[test]
    fn reserve_stops_at_limit() {
        let mut daily = state(2);
        assert_eq!(daily.try_reserve_new(), QuotaDecision::Granted);
        assert_eq!(daily.try_reserve_new(), QuotaDecision::Granted);
        assert_eq!(daily.try_reserve_new(), QuotaDecision::Denied);
        assert_eq!(daily.new_introduced, 2);
        assert_eq!(daily.remaining_new(), 0);
    }

    #[test]
    fn record_answer_counts_correct() {
        let mut daily = state(1);
        daily.record_answer(Verdict::Correct);
        daily.record_answer(Verdict::Incorrect);
        assert_eq!(daily.answered, 2);
        assert_eq!(daily.correct, 1);
    }

    #[test]
    fn released_slot_can_be_reserved_again() {
        let mut daily = state(1);
        assert_eq!(daily.try_reserve_new(), QuotaDecision::Granted);
        daily.release_new();
        daily.release_new();
        assert_eq!(daily.new_introduced, 0);
        assert_eq!(daily.try_reserve_new(), QuotaDecision::Granted);
    }

    #[test]
    fn done_is_sticky() {
        let mut daily = state(1);
        daily.current_card = Some(CardId::new(3));
        daily.mark_done();
        daily.mark_done();
        assert!(daily.done_for_today);
        assert_eq!(daily.current_card, None);
    }
}
