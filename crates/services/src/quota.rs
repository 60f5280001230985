use std::sync::Arc;

use listen_core::model::{DailyKey, DailyState, Deck, QuotaDecision};
use storage::repository::{DailyStateRepository, StorageError};

/// Daily new-card allowance per (student, deck, local date).
///
/// All increments go through the repository's compare-and-increment, so two
/// sessions racing on the same key can never overshoot the limit.
#[derive(Clone)]
pub struct QuotaTracker {
    daily: Arc<dyn DailyStateRepository>,
}

impl QuotaTracker {
    #[must_use]
    pub fn new(daily: Arc<dyn DailyStateRepository>) -> Self {
        Self { daily }
    }

    /// Load the day's record, creating it from the deck's current quota.
    ///
    /// The flag is `true` when this call created the record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be created or read back.
    pub async fn ensure_daily(
        &self,
        key: DailyKey,
        deck: &Deck,
    ) -> Result<(DailyState, bool), StorageError> {
        let fresh = DailyState::new(key, deck.settings().new_per_day());
        let created = self.daily.create_daily_if_absent(&fresh).await?;
        if created {
            log::debug!(
                "opened day {} for student {} in deck {} (limit {})",
                key.date,
                key.student,
                key.deck_id,
                fresh.new_limit
            );
        }
        let state = self.daily.get_daily(key).await?.ok_or(StorageError::NotFound)?;
        Ok((state, created))
    }

    /// Claim one New-card slot for the day.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the day was never opened.
    pub async fn reserve_new_slot(&self, key: DailyKey) -> Result<QuotaDecision, StorageError> {
        let decision = self.daily.try_reserve_new(key).await?;
        if decision == QuotaDecision::Denied {
            log::debug!(
                "new-card quota used up for student {} in deck {} on {}",
                key.student,
                key.deck_id,
                key.date
            );
        }
        Ok(decision)
    }

    /// Return a slot claimed by [`QuotaTracker::reserve_new_slot`] whose card
    /// was never introduced.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the day was never opened.
    pub async fn release_new_slot(&self, key: DailyKey) -> Result<(), StorageError> {
        self.daily.release_new(key).await?;
        log::debug!(
            "released a new-card slot for student {} in deck {} on {}",
            key.student,
            key.deck_id,
            key.date
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Kyiv;
    use listen_core::model::{AdminId, DeckId, DeckSettings, DeckToken, StudentId};
    use listen_core::time::{fixed_now, DEFAULT_TRIGGER_TIME};
    use storage::repository::InMemoryRepository;

    fn deck(limit: u32) -> Deck {
        Deck::new(
            DeckId::new(1),
            AdminId::new(1),
            "Deck",
            DeckToken::new("quota-test-token").unwrap(),
            DeckSettings::new(limit, DEFAULT_TRIGGER_TIME, Kyiv).unwrap(),
            fixed_now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn concurrent_reservations_never_exceed_limit() {
        let tracker = QuotaTracker::new(Arc::new(InMemoryRepository::new()));
        let deck = deck(3);
        let key = DailyKey::new(StudentId::new(1), deck.id(), deck.local_date(fixed_now()));
        tracker.ensure_daily(key, &deck).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move { tracker.reserve_new_slot(key).await }));
        }
        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == QuotaDecision::Granted {
                granted += 1;
            }
        }
        assert_eq!(granted, 3);
    }

    #[tokio::test]
    async fn limit_is_snapshotted_at_creation() {
        let tracker = QuotaTracker::new(Arc::new(InMemoryRepository::new()));
        let mut deck = deck(2);
        let key = DailyKey::new(StudentId::new(1), deck.id(), deck.local_date(fixed_now()));
        let (state, created) = tracker.ensure_daily(key, &deck).await.unwrap();
        assert!(created);
        assert_eq!(state.new_limit, 2);

        deck.set_new_per_day(7).unwrap();
        let (state, created) = tracker.ensure_daily(key, &deck).await.unwrap();
        assert!(!created);
        assert_eq!(state.new_limit, 2);
    }
}
