use async_trait::async_trait;
use chrono::{DateTime, Utc};
use listen_core::matcher::Verdict;
use listen_core::model::{
    AcceptedAnswers, AdminId, Card, CardId, DailyKey, DailyState, Deck, DeckId, DeckSettings,
    DeckToken, Enrollment, Flag, FlagSummary, MediaRef, Progress, QuotaDecision, StudentId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Insert shape for a deck whose id is assigned by the backend.
#[derive(Debug, Clone)]
pub struct NewDeckRecord {
    pub owner: AdminId,
    pub title: String,
    pub token: DeckToken,
    pub settings: DeckSettings,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for an imported card whose id is assigned by the backend.
#[derive(Debug, Clone)]
pub struct NewCardRecord {
    pub position: u32,
    pub media: MediaRef,
    pub answers: AcceptedAnswers,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait DeckRepository: Send + Sync {
    /// Insert a new deck and return its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the token is already taken.
    async fn insert_new_deck(&self, deck: NewDeckRecord) -> Result<DeckId, StorageError>;

    /// Persist admin changes (quota, activation, token).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the deck cannot be stored.
    async fn upsert_deck(&self, deck: &Deck) -> Result<(), StorageError>;

    /// Fetch a deck by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; a missing deck is `Ok(None)`.
    async fn get_deck(&self, id: DeckId) -> Result<Option<Deck>, StorageError>;

    /// Fetch a deck by its join token.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_deck_by_token(&self, token: &DeckToken) -> Result<Option<Deck>, StorageError>;

    /// All decks ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_decks(&self) -> Result<Vec<Deck>, StorageError>;
}

#[async_trait]
pub trait CardRepository: Send + Sync {
    /// Insert imported cards for a deck, returning ids in input order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if any card cannot be stored.
    async fn insert_cards(
        &self,
        deck_id: DeckId,
        cards: Vec<NewCardRecord>,
    ) -> Result<Vec<CardId>, StorageError>;

    /// Cards of a deck sorted by position.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_cards(&self, deck_id: DeckId) -> Result<Vec<Card>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; a missing card is `Ok(None)`.
    async fn get_card(&self, id: CardId) -> Result<Option<Card>, StorageError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Enroll a student. Returns `false` if the enrollment already existed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn enroll(&self, enrollment: &Enrollment) -> Result<bool, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_enrollment(
        &self,
        student: StudentId,
        deck_id: DeckId,
    ) -> Result<Option<Enrollment>, StorageError>;

    /// Enrollments of a deck ordered by join time.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_enrollments(&self, deck_id: DeckId) -> Result<Vec<Enrollment>, StorageError>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Progress rows of one student for one deck.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_progress(
        &self,
        student: StudentId,
        deck_id: DeckId,
    ) -> Result<Vec<Progress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_progress(
        &self,
        student: StudentId,
        card_id: CardId,
    ) -> Result<Option<Progress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn upsert_progress(&self, progress: &Progress) -> Result<(), StorageError>;
}

/// Daily records are only written through targeted updates so that the
/// quota counter can be bumped concurrently with other bookkeeping.
#[async_trait]
pub trait DailyStateRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_daily(&self, key: DailyKey) -> Result<Option<DailyState>, StorageError>;

    /// Insert `state` unless a record for its key exists. Returns `true` if
    /// this call created it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn create_daily_if_absent(&self, state: &DailyState) -> Result<bool, StorageError>;

    /// Compare-and-increment of `new_introduced` against `new_limit`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist.
    async fn try_reserve_new(&self, key: DailyKey) -> Result<QuotaDecision, StorageError>;

    /// Undo one reservation. Never drops `new_introduced` below zero.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist.
    async fn release_new(&self, key: DailyKey) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist.
    async fn record_answer(&self, key: DailyKey, verdict: Verdict) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist.
    async fn set_current_card(
        &self,
        key: DailyKey,
        card: Option<CardId>,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist.
    async fn mark_done(&self, key: DailyKey) -> Result<(), StorageError>;
}

#[async_trait]
pub trait FlagRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the flag cannot be stored.
    async fn record_flag(&self, flag: &Flag) -> Result<(), StorageError>;

    /// Most-flagged cards of a deck first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn flag_summary(&self, deck_id: DeckId, limit: u32)
    -> Result<Vec<FlagSummary>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    next_deck_id: u64,
    next_card_id: u64,
    decks: HashMap<DeckId, Deck>,
    cards: HashMap<CardId, Card>,
    enrollments: HashMap<(StudentId, DeckId), Enrollment>,
    progress: HashMap<(StudentId, CardId), Progress>,
    daily: HashMap<DailyKey, DailyState>,
    flags: Vec<Flag>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    fn with_daily<T>(
        &self,
        key: DailyKey,
        f: impl FnOnce(&mut DailyState) -> T,
    ) -> Result<T, StorageError> {
        let mut guard = self.lock()?;
        let daily = guard.daily.get_mut(&key).ok_or(StorageError::NotFound)?;
        Ok(f(daily))
    }
}

#[async_trait]
impl DeckRepository for InMemoryRepository {
    async fn insert_new_deck(&self, deck: NewDeckRecord) -> Result<DeckId, StorageError> {
        let mut guard = self.lock()?;
        if guard.decks.values().any(|d| d.token() == &deck.token) {
            return Err(StorageError::Conflict);
        }
        guard.next_deck_id += 1;
        let id = DeckId::new(guard.next_deck_id);
        let deck = Deck::new(id, deck.owner, deck.title, deck.token, deck.settings, deck.created_at)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        guard.decks.insert(id, deck);
        Ok(id)
    }

    async fn upsert_deck(&self, deck: &Deck) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let token_taken = guard
            .decks
            .values()
            .any(|d| d.id() != deck.id() && d.token() == deck.token());
        if token_taken {
            return Err(StorageError::Conflict);
        }
        guard.next_deck_id = guard.next_deck_id.max(deck.id().value());
        guard.decks.insert(deck.id(), deck.clone());
        Ok(())
    }

    async fn get_deck(&self, id: DeckId) -> Result<Option<Deck>, StorageError> {
        Ok(self.lock()?.decks.get(&id).cloned())
    }

    async fn get_deck_by_token(&self, token: &DeckToken) -> Result<Option<Deck>, StorageError> {
        Ok(self
            .lock()?
            .decks
            .values()
            .find(|d| d.token() == token)
            .cloned())
    }

    async fn list_decks(&self) -> Result<Vec<Deck>, StorageError> {
        let mut decks: Vec<Deck> = self.lock()?.decks.values().cloned().collect();
        decks.sort_by_key(Deck::id);
        Ok(decks)
    }
}

#[async_trait]
impl CardRepository for InMemoryRepository {
    async fn insert_cards(
        &self,
        deck_id: DeckId,
        cards: Vec<NewCardRecord>,
    ) -> Result<Vec<CardId>, StorageError> {
        let mut guard = self.lock()?;
        if !guard.decks.contains_key(&deck_id) {
            return Err(StorageError::NotFound);
        }
        let mut ids = Vec::with_capacity(cards.len());
        for record in cards {
            guard.next_card_id += 1;
            let id = CardId::new(guard.next_card_id);
            let card = Card::new(
                id,
                deck_id,
                record.position,
                record.media,
                record.answers,
                record.created_at,
            );
            guard.cards.insert(id, card);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn list_cards(&self, deck_id: DeckId) -> Result<Vec<Card>, StorageError> {
        let mut cards: Vec<Card> = self
            .lock()?
            .cards
            .values()
            .filter(|c| c.deck_id() == deck_id)
            .cloned()
            .collect();
        cards.sort_by_key(|c| (c.position(), c.id()));
        Ok(cards)
    }

    async fn get_card(&self, id: CardId) -> Result<Option<Card>, StorageError> {
        Ok(self.lock()?.cards.get(&id).cloned())
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn enroll(&self, enrollment: &Enrollment) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        let key = (enrollment.student, enrollment.deck_id);
        if guard.enrollments.contains_key(&key) {
            return Ok(false);
        }
        guard.enrollments.insert(key, enrollment.clone());
        Ok(true)
    }

    async fn get_enrollment(
        &self,
        student: StudentId,
        deck_id: DeckId,
    ) -> Result<Option<Enrollment>, StorageError> {
        Ok(self.lock()?.enrollments.get(&(student, deck_id)).cloned())
    }

    async fn list_enrollments(&self, deck_id: DeckId) -> Result<Vec<Enrollment>, StorageError> {
        let mut found: Vec<Enrollment> = self
            .lock()?
            .enrollments
            .values()
            .filter(|e| e.deck_id == deck_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| (e.joined_at, e.student));
        Ok(found)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn list_progress(
        &self,
        student: StudentId,
        deck_id: DeckId,
    ) -> Result<Vec<Progress>, StorageError> {
        Ok(self
            .lock()?
            .progress
            .values()
            .filter(|p| p.student == student && p.deck_id == deck_id)
            .cloned()
            .collect())
    }

    async fn get_progress(
        &self,
        student: StudentId,
        card_id: CardId,
    ) -> Result<Option<Progress>, StorageError> {
        Ok(self.lock()?.progress.get(&(student, card_id)).cloned())
    }

    async fn upsert_progress(&self, progress: &Progress) -> Result<(), StorageError> {
        self.lock()?
            .progress
            .insert((progress.student, progress.card_id), progress.clone());
        Ok(())
    }
}

#[async_trait]
impl DailyStateRepository for InMemoryRepository {
    async fn get_daily(&self, key: DailyKey) -> Result<Option<DailyState>, StorageError> {
        Ok(self.lock()?.daily.get(&key).cloned())
    }

    async fn create_daily_if_absent(&self, state: &DailyState) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        if guard.daily.contains_key(&state.key) {
            return Ok(false);
        }
        guard.daily.insert(state.key, state.clone());
        Ok(true)
    }

    async fn try_reserve_new(&self, key: DailyKey) -> Result<QuotaDecision, StorageError> {
        self.with_daily(key, DailyState::try_reserve_new)
    }

    async fn release_new(&self, key: DailyKey) -> Result<(), StorageError> {
        self.with_daily(key, DailyState::release_new)
    }

    async fn record_answer(&self, key: DailyKey, verdict: Verdict) -> Result<(), StorageError> {
        self.with_daily(key, |d| d.record_answer(verdict))
    }

    async fn set_current_card(
        &self,
        key: DailyKey,
        card: Option<CardId>,
    ) -> Result<(), StorageError> {
        self.with_daily(key, |d| d.current_card = card)
    }

    async fn mark_done(&self, key: DailyKey) -> Result<(), StorageError> {
        self.with_daily(key, DailyState::mark_done)
    }
}

#[async_trait]
impl FlagRepository for InMemoryRepository {
    async fn record_flag(&self, flag: &Flag) -> Result<(), StorageError> {
        self.lock()?.flags.push(flag.clone());
        Ok(())
    }

    async fn flag_summary(
        &self,
        deck_id: DeckId,
        limit: u32,
    ) -> Result<Vec<FlagSummary>, StorageError> {
        let guard = self.lock()?;
        let mut counts: HashMap<CardId, u32> = HashMap::new();
        for flag in guard.flags.iter().filter(|f| f.deck_id == deck_id) {
            *counts.entry(flag.card_id).or_default() += 1;
        }
        let mut summary: Vec<FlagSummary> = counts
            .into_iter()
            .filter_map(|(card_id, flags)| {
                guard.cards.get(&card_id).map(|card| FlagSummary {
                    card_id,
                    primary_answer: card.answers().primary().to_string(),
                    flags,
                })
            })
            .collect();
        summary.sort_by(|a, b| b.flags.cmp(&a.flags).then(a.card_id.cmp(&b.card_id)));
        summary.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(summary)
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub decks: Arc<dyn DeckRepository>,
    pub cards: Arc<dyn CardRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub daily: Arc<dyn DailyStateRepository>,
    pub flags: Arc<dyn FlagRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Wire every repository trait to one backend value.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: DeckRepository
            + CardRepository
            + EnrollmentRepository
            + ProgressRepository
            + DailyStateRepository
            + FlagRepository
            + Clone
            + 'static,
    {
        Self {
            decks: Arc::new(repo.clone()),
            cards: Arc::new(repo.clone()),
            enrollments: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            daily: Arc::new(repo.clone()),
            flags: Arc::new(repo),
        }
    }
}
