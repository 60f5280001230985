use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use listen_core::model::{Card, CardId, DailyKey, DeckId, Progress, QuotaDecision, StudentId};
use listen_core::rotation::{NextPick, pick_next};
use storage::repository::{CardRepository, DailyStateRepository, ProgressRepository, StorageError};

use crate::quota::QuotaTracker;
use crate::Clock;

/// Chooses the next card for a student and introduces New cards.
#[derive(Clone)]
pub struct CardStore {
    clock: Clock,
    cards: Arc<dyn CardRepository>,
    progress: Arc<dyn ProgressRepository>,
    daily: Arc<dyn DailyStateRepository>,
    quota: QuotaTracker,
}

impl CardStore {
    #[must_use]
    pub fn new(
        clock: Clock,
        cards: Arc<dyn CardRepository>,
        progress: Arc<dyn ProgressRepository>,
        daily: Arc<dyn DailyStateRepository>,
        quota: QuotaTracker,
    ) -> Self {
        Self {
            clock,
            cards,
            progress,
            daily,
            quota,
        }
    }

    async fn progress_map(
        &self,
        student: StudentId,
        deck_id: DeckId,
    ) -> Result<HashMap<CardId, Progress>, StorageError> {
        Ok(self
            .progress
            .list_progress(student, deck_id)
            .await?
            .into_iter()
            .map(|p| (p.card_id, p))
            .collect())
    }

    /// Next card to show on `today`, or `None` when the student is done.
    ///
    /// Introduced cards not yet seen today come first, in import order, then
    /// New cards while the daily quota grants slots. Suspended cards are never
    /// returned. The day must already be opened through `QuotaTracker`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on repository failures.
    pub async fn next_eligible(
        &self,
        student: StudentId,
        deck_id: DeckId,
        today: NaiveDate,
    ) -> Result<Option<Card>, StorageError> {
        let key = DailyKey::new(student, deck_id, today);
        let daily = self.daily.get_daily(key).await?.ok_or(StorageError::NotFound)?;
        let cards = self.cards.list_cards(deck_id).await?;
        let progress = self.progress_map(student, deck_id).await?;

        let card_id = match pick_next(&cards, &progress, &daily) {
            NextPick::Resume(id) | NextPick::Review(id) => id,
            NextPick::New(id) => {
                if self.quota.reserve_new_slot(key).await? == QuotaDecision::Denied {
                    return Ok(None);
                }
                let now = self.clock.now();
                let mut record = progress
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| Progress::new(student, deck_id, id, now));
                record.introduce(today, now);
                if let Err(e) = self.progress.upsert_progress(&record).await {
                    self.quota.release_new_slot(key).await?;
                    return Err(e);
                }
                log::debug!("introduced card {id} to student {student} in deck {deck_id}");
                id
            }
            NextPick::Exhausted => return Ok(None),
        };

        Ok(cards.into_iter().find(|c| c.id() == card_id))
    }

    /// Whether a start right now would present a card on `today`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the day was never opened.
    pub async fn has_more(
        &self,
        student: StudentId,
        deck_id: DeckId,
        today: NaiveDate,
    ) -> Result<bool, StorageError> {
        let key = DailyKey::new(student, deck_id, today);
        let daily = self.daily.get_daily(key).await?.ok_or(StorageError::NotFound)?;
        let cards = self.cards.list_cards(deck_id).await?;
        let progress = self.progress_map(student, deck_id).await?;
        Ok(!matches!(pick_next(&cards, &progress, &daily), NextPick::Exhausted))
    }
}
