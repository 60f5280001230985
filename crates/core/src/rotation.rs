//! Which card comes next for one student in one deck.
//!
//! Pure selection over the deck's cards (import order), the student's
//! progress and today's `DailyState`. Quota reservation is left to the
//! caller: a `NextPick::New` is only a candidate until the slot is granted.

use std::collections::HashMap;

use crate::model::{Card, CardId, CardState, DailyState, Progress};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPick {
    /// Card already on screen before a restart or a failed delivery.
    Resume(CardId),
    /// Introduced card not yet seen today.
    Review(CardId),
    /// Never-introduced card, subject to the daily quota.
    New(CardId),
    /// Nothing left for today.
    Exhausted,
}

fn state_of(progress: &HashMap<CardId, Progress>, card: CardId) -> CardState {
    progress.get(&card).map_or(CardState::New, |p| p.state)
}

/// Pick the next card for the day.
///
/// `cards` must be sorted by position.
#[must_use]
pub fn pick_next(
    cards: &[Card],
    progress: &HashMap<CardId, Progress>,
    daily: &DailyState,
) -> NextPick {
    let today = daily.key.date;

    if let Some(current) = daily.current_card {
        let known = cards.iter().any(|c| c.id() == current);
        if known && state_of(progress, current) != CardState::Suspended {
            return NextPick::Resume(current);
        }
    }

    let review = cards.iter().find(|card| {
        progress
            .get(&card.id())
            .is_some_and(|p| p.state == CardState::Introduced && !p.seen_on(today))
    });
    if let Some(card) = review {
        return NextPick::Review(card.id());
    }

    if daily.remaining_new() == 0 {
        return NextPick::Exhausted;
    }

    cards
        .iter()
        .find(|card| state_of(progress, card.id()) == CardState::New)
        .map_or(NextPick::Exhausted, |card| NextPick::New(card.id()))
}

/// Cards the student has never been introduced to and has not suspended.
#[must_use]
pub fn count_new(cards: &[Card], progress: &HashMap<CardId, Progress>) -> usize {
    cards
        .iter()
        .filter(|card| state_of(progress, card.id()) == CardState::New)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AcceptedAnswers, DailyKey, DeckId, MediaKind, MediaRef, StudentId};
    use crate::time::fixed_now;
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
    }

    fn cards(n: u64) -> Vec<Card> {
        (1..=n)
            .map(|i| {
                Card::new(
                    CardId::new(i),
                    DeckId::new(1),
                    u32::try_from(i).unwrap(),
                    MediaRef::new(MediaKind::Audio, format!("m{i}")).unwrap(),
                    AcceptedAnswers::parse(&format!("answer {i}")).unwrap(),
                    fixed_now(),
                )
            })
            .collect()
    }

    fn daily(limit: u32) -> DailyState {
        DailyState::new(DailyKey::new(StudentId::new(1), DeckId::new(1), today()), limit)
    }

    fn progress_with(entries: &[(u64, CardState, Option<NaiveDate>)]) -> HashMap<CardId, Progress> {
        entries
            .iter()
            .map(|(id, state, seen)| {
                let mut p = Progress::new(StudentId::new(1), DeckId::new(1), CardId::new(*id), fixed_now());
                p.state = *state;
                p.last_seen_on = *seen;
                (CardId::new(*id), p)
            })
            .collect()
    }

    #[test]
    fn new_cards_in_import_order() {
        let cards = cards(3);
        assert_eq!(pick_next(&cards, &HashMap::new(), &daily(2)), NextPick::New(CardId::new(1)));
    }

    #[test]
    fn reviews_come_before_new() {
        let cards = cards(3);
        let yesterday = today().pred_opt();
        let progress = progress_with(&[
            (1, CardState::Introduced, Some(today())),
            (2, CardState::Introduced, yesterday),
        ]);
        assert_eq!(pick_next(&cards, &progress, &daily(2)), NextPick::Review(CardId::new(2)));
    }

    #[test]
    fn exhausted_when_quota_used_even_with_new_left() {
        let cards = cards(5);
        let mut day = daily(2);
        day.new_introduced = 2;
        let progress = progress_with(&[
            (1, CardState::Introduced, Some(today())),
            (2, CardState::Introduced, Some(today())),
        ]);
        assert_eq!(pick_next(&cards, &progress, &day), NextPick::Exhausted);
        assert_eq!(count_new(&cards, &progress), 3);
    }

    #[test]
    fn suspended_cards_are_skipped() {
        let cards = cards(2);
        let progress = progress_with(&[(1, CardState::Suspended, None)]);
        assert_eq!(pick_next(&cards, &progress, &daily(5)), NextPick::New(CardId::new(2)));
        assert_eq!(count_new(&cards, &progress), 1);
    }

    #[test]
    fn resume_current_unless_suspended() {
        let cards = cards(2);
        let mut day = daily(5);
        day.current_card = Some(CardId::new(2));
        assert_eq!(pick_next(&cards, &HashMap::new(), &day), NextPick::Resume(CardId::new(2)));

        let progress = progress_with(&[(2, CardState::Suspended, None)]);
        assert_eq!(pick_next(&cards, &progress, &day), NextPick::New(CardId::new(1)));
    }
}
