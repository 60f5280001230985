use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use listen_core::model::{CardState, DailyKey, DeckId, StudentId};
use listen_core::rotation::count_new;
use storage::repository::{
    CardRepository, DailyStateRepository, DeckRepository, ProgressRepository,
};

use crate::error::StudyError;
use crate::Clock;

/// A student's standing in one deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressStats {
    pub date: NaiveDate,
    pub total_cards: usize,
    pub introduced: usize,
    pub suspended: usize,
    pub new_remaining: usize,
    pub introduced_today: u32,
    pub answered_today: u32,
    pub correct_today: u32,
    pub done_for_today: bool,
}

#[derive(Clone)]
pub struct StatsService {
    clock: Clock,
    decks: Arc<dyn DeckRepository>,
    cards: Arc<dyn CardRepository>,
    progress: Arc<dyn ProgressRepository>,
    daily: Arc<dyn DailyStateRepository>,
}

impl StatsService {
    #[must_use]
    pub fn new(
        clock: Clock,
        decks: Arc<dyn DeckRepository>,
        cards: Arc<dyn CardRepository>,
        progress: Arc<dyn ProgressRepository>,
        daily: Arc<dyn DailyStateRepository>,
    ) -> Self {
        Self {
            clock,
            decks,
            cards,
            progress,
            daily,
        }
    }

    /// Counts for the deck's current local day.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::UnknownDeck` if the deck does not exist.
    pub async fn progress_stats(
        &self,
        student: StudentId,
        deck_id: DeckId,
    ) -> Result<ProgressStats, StudyError> {
        let deck = self
            .decks
            .get_deck(deck_id)
            .await?
            .ok_or(StudyError::UnknownDeck(deck_id))?;
        let date = deck.local_date(self.clock.now());
        let cards = self.cards.list_cards(deck_id).await?;
        let progress: HashMap<_, _> = self
            .progress
            .list_progress(student, deck_id)
            .await?
            .into_iter()
            .map(|p| (p.card_id, p))
            .collect();
        let count = |state: CardState| progress.values().filter(|p| p.state == state).count();
        let introduced = count(CardState::Introduced);
        let suspended = count(CardState::Suspended);

        let daily = self
            .daily
            .get_daily(DailyKey::new(student, deck_id, date))
            .await?;

        Ok(ProgressStats {
            date,
            total_cards: cards.len(),
            introduced,
            suspended,
            new_remaining: count_new(&cards, &progress),
            introduced_today: daily.as_ref().map_or(0, |d| d.new_introduced),
            answered_today: daily.as_ref().map_or(0, |d| d.answered),
            correct_today: daily.as_ref().map_or(0, |d| d.correct),
            done_for_today: daily.as_ref().is_some_and(|d| d.done_for_today),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Kyiv;
    use listen_core::matcher::Verdict;
    use listen_core::model::{
        AcceptedAnswers, AdminId, DailyState, DeckSettings, DeckToken, MediaKind, MediaRef,
        Progress,
    };
    use listen_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, NewCardRecord, NewDeckRecord};

    #[tokio::test]
    async fn counts_progress_and_today() {
        let repo = InMemoryRepository::new();
        let deck_id = repo
            .insert_new_deck(NewDeckRecord {
                owner: AdminId::new(1),
                title: "Deck".into(),
                token: DeckToken::new("stats-token-1").unwrap(),
                settings: DeckSettings::default_in(Kyiv),
                created_at: fixed_now(),
            })
            .await
            .unwrap();
        let ids = repo
            .insert_cards(
                deck_id,
                (0..4)
                    .map(|i| NewCardRecord {
                        position: i,
                        media: MediaRef::new(MediaKind::Audio, format!("a{i}")).unwrap(),
                        answers: AcceptedAnswers::parse("yes").unwrap(),
                        created_at: fixed_now(),
                    })
                    .collect(),
            )
            .await
            .unwrap();

        let student = StudentId::new(5);
        let service = StatsService::new(
            Clock::fixed(fixed_now()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        );
        let date = service.progress_stats(student, deck_id).await.unwrap().date;

        let mut seen = Progress::new(student, deck_id, ids[0], fixed_now());
        seen.record_answer(date, "yes", Verdict::Correct, fixed_now());
        repo.upsert_progress(&seen).await.unwrap();
        let mut bad = Progress::new(student, deck_id, ids[1], fixed_now());
        bad.suspend(fixed_now());
        repo.upsert_progress(&bad).await.unwrap();

        let key = DailyKey::new(student, deck_id, date);
        repo.create_daily_if_absent(&DailyState::new(key, 10)).await.unwrap();
        repo.try_reserve_new(key).await.unwrap();
        repo.record_answer(key, Verdict::Correct).await.unwrap();

        let stats = service.progress_stats(student, deck_id).await.unwrap();
        assert_eq!(stats.total_cards, 4);
        assert_eq!(stats.introduced, 1);
        assert_eq!(stats.suspended, 1);
        assert_eq!(stats.new_remaining, 2);
        assert_eq!(stats.introduced_today, 1);
        assert_eq!((stats.answered_today, stats.correct_today), (1, 1));
        assert!(!stats.done_for_today);
    }
}
