#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use listen_core::matcher::Verdict;
use listen_core::model::{
    AdminId, CardId, DailyKey, DailyState, DeckId, Enrollment, QuotaDecision, StudentId,
};
use listen_core::time::fixed_now;
use services::{
    AppServices, Clock, DeliveryError, EngineConfig, Feedback, ImportReport, ImportedCard,
    ImportedDeck, Prompt, Transport,
};
use storage::repository::{DailyStateRepository, Storage, StorageError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Prompt(StudentId, CardId),
    Feedback(StudentId, CardId, Verdict),
    Finished(StudentId, DeckId, bool),
    Failure(StudentId, DeckId),
}

/// Transport that records everything and can be told to fail or stall.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    unreachable: Mutex<HashSet<StudentId>>,
    prompt_delay: Mutex<Option<Duration>>,
    transient_failures: Mutex<u32>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn prompts_to(&self, student: StudentId) -> Vec<CardId> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Prompt(to, card) if to == student => Some(card),
                _ => None,
            })
            .collect()
    }

    pub fn finished_for(&self, student: StudentId) -> Vec<bool> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Finished(to, _, has_more) if to == student => Some(has_more),
                _ => None,
            })
            .collect()
    }

    pub fn set_unreachable(&self, student: StudentId) {
        self.unreachable.lock().unwrap().insert(student);
    }

    /// The next `count` prompts fail with a retryable error.
    pub fn fail_next_prompts(&self, count: u32) {
        *self.transient_failures.lock().unwrap() = count;
    }

    pub fn delay_prompts(&self, delay: Duration) {
        *self.prompt_delay.lock().unwrap() = Some(delay);
    }

    fn push(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn deliver_prompt(&self, student: StudentId, prompt: &Prompt) -> Result<(), DeliveryError> {
        if self.unreachable.lock().unwrap().contains(&student) {
            return Err(DeliveryError::Permanent("chat closed".into()));
        }
        {
            let mut failures = self.transient_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(DeliveryError::Transient("rate limited".into()));
            }
        }
        let delay = *self.prompt_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.push(Sent::Prompt(student, prompt.card_id));
        Ok(())
    }

    async fn deliver_feedback(&self, student: StudentId, feedback: &Feedback) -> Result<(), DeliveryError> {
        self.push(Sent::Feedback(student, feedback.card_id, feedback.verdict));
        Ok(())
    }

    async fn deliver_finished(
        &self,
        student: StudentId,
        deck_id: DeckId,
        has_more: bool,
    ) -> Result<(), DeliveryError> {
        self.push(Sent::Finished(student, deck_id, has_more));
        Ok(())
    }

    async fn report_delivery_failure(&self, student: StudentId, deck_id: DeckId, _reason: &str) {
        self.push(Sent::Failure(student, deck_id));
    }
}

/// Daily-state repository that can be made to fail or stall every call.
pub struct FaultyDaily {
    inner: Arc<dyn DailyStateRepository>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl FaultyDaily {
    pub fn new(inner: Arc<dyn DailyStateRepository>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
            delay: Mutex::new(None),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    async fn check(&self) -> Result<(), StorageError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("database is locked".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DailyStateRepository for FaultyDaily {
    async fn get_daily(&self, key: DailyKey) -> Result<Option<DailyState>, StorageError> {
        self.check().await?;
        self.inner.get_daily(key).await
    }

    async fn create_daily_if_absent(&self, state: &DailyState) -> Result<bool, StorageError> {
        self.check().await?;
        self.inner.create_daily_if_absent(state).await
    }

    async fn try_reserve_new(&self, key: DailyKey) -> Result<QuotaDecision, StorageError> {
        self.check().await?;
        self.inner.try_reserve_new(key).await
    }

    async fn release_new(&self, key: DailyKey) -> Result<(), StorageError> {
        self.check().await?;
        self.inner.release_new(key).await
    }

    async fn record_answer(&self, key: DailyKey, verdict: Verdict) -> Result<(), StorageError> {
        self.check().await?;
        self.inner.record_answer(key, verdict).await
    }

    async fn set_current_card(
        &self,
        key: DailyKey,
        card: Option<CardId>,
    ) -> Result<(), StorageError> {
        self.check().await?;
        self.inner.set_current_card(key, card).await
    }

    async fn mark_done(&self, key: DailyKey) -> Result<(), StorageError> {
        self.check().await?;
        self.inner.mark_done(key).await
    }
}

pub struct Harness {
    pub services: AppServices,
    pub storage: Storage,
    pub transport: Arc<RecordingTransport>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_clock(Clock::fixed(fixed_now()))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self::with_storage(clock, Storage::in_memory())
    }

    /// Harness whose daily-state repository can be made to fail or stall.
    pub fn with_faulty_daily() -> (Self, Arc<FaultyDaily>) {
        let mut storage = Storage::in_memory();
        let faulty = Arc::new(FaultyDaily::new(Arc::clone(&storage.daily)));
        storage.daily = faulty.clone() as Arc<dyn DailyStateRepository>;
        (Self::with_storage(Clock::fixed(fixed_now()), storage), faulty)
    }

    pub fn with_storage(clock: Clock, storage: Storage) -> Self {
        let transport = Arc::new(RecordingTransport::default());
        let services = AppServices::from_storage(
            EngineConfig::default(),
            clock,
            storage.clone(),
            transport.clone(),
        );
        Self {
            services,
            storage,
            transport,
        }
    }

    /// Import without starting the deck's timer.
    pub async fn import(
        &self,
        timezone: &str,
        new_per_day: u32,
        answers: &[&str],
    ) -> ImportReport {
        let manifest = ImportedDeck {
            title: "Listening".into(),
            timezone: Some(timezone.into()),
            new_per_day: Some(new_per_day),
            cards: answers
                .iter()
                .enumerate()
                .map(|(i, answer)| ImportedCard {
                    kind: "audio".into(),
                    media: format!("media-{i}"),
                    answer: (*answer).into(),
                })
                .collect(),
        };
        self.services
            .decks()
            .import_deck(AdminId::new(1), manifest)
            .await
            .unwrap()
    }

    /// Enroll without starting a session.
    pub async fn enroll_quietly(&self, student: StudentId, deck_id: DeckId) {
        self.storage
            .enrollments
            .enroll(&Enrollment::new(student, deck_id, fixed_now()))
            .await
            .unwrap();
    }
}

/// Let a pending auto-advance fire.
pub async fn past_auto_advance() {
    tokio::time::sleep(Duration::from_millis(1_100)).await;
}
