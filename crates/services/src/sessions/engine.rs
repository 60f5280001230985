use std::sync::Arc;
use std::time::Duration;

use listen_core::matcher::{self, Verdict};
use chrono::NaiveDate;
use listen_core::model::{
    Card, CardId, DailyKey, Deck, DeckId, DeckToken, Enrollment, Flag, Progress, Session,
    SessionPhase, StudentId,
};
use storage::repository::Storage;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::outcome::{
    AnswerOutcome, EnrollOutcome, FireReport, FlagOutcome, Presentation, StartOutcome,
    StartTrigger,
};
use super::slots::{SessionSlot, SessionSlots};
use crate::card_store::CardStore;
use crate::error::StudyError;
use crate::quota::QuotaTracker;
use crate::transport::{DeliveryError, Feedback, Prompt, Transport};
use crate::Clock;

/// Drives study sessions for every (student, deck) pair.
///
/// Operations on one pair are serialized through its slot; different pairs
/// never wait on each other.
pub struct StudyEngine {
    clock: Clock,
    auto_advance: Duration,
    storage: Storage,
    cards: CardStore,
    quota: QuotaTracker,
    transport: Arc<dyn Transport>,
    slots: SessionSlots,
}

impl StudyEngine {
    #[must_use]
    pub fn new(
        clock: Clock,
        auto_advance: Duration,
        storage: Storage,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let quota = QuotaTracker::new(Arc::clone(&storage.daily));
        let cards = CardStore::new(
            clock.clone(),
            Arc::clone(&storage.cards),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.daily),
            quota.clone(),
        );
        Arc::new(Self {
            clock,
            auto_advance,
            storage,
            cards,
            quota,
            transport,
            slots: SessionSlots::default(),
        })
    }

    async fn load_deck(&self, deck_id: DeckId) -> Result<Deck, StudyError> {
        self.storage
            .decks
            .get_deck(deck_id)
            .await?
            .ok_or(StudyError::UnknownDeck(deck_id))
    }

    async fn require_enrollment(&self, student: StudentId, deck: DeckId) -> Result<(), StudyError> {
        match self.storage.enrollments.get_enrollment(student, deck).await? {
            Some(_) => Ok(()),
            None => Err(StudyError::UnknownEnrollment { student, deck }),
        }
    }

    //
    // ─── STARTING ──────────────────────────────────────────────────────────────
    //

    /// Drive `Idle → Presenting` for one pair.
    ///
    /// A trigger that finds the pair studying today is discarded with
    /// `StartOutcome::AlreadyActive`. A session left open on an earlier day
    /// is replaced, and the card it had on screen becomes today's first.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::UnknownDeck`/`UnknownEnrollment` for identity
    /// errors, `StudyError::DeliveryFailed` when the student is unreachable.
    pub async fn start(
        self: &Arc<Self>,
        student: StudentId,
        deck_id: DeckId,
        trigger: StartTrigger,
    ) -> Result<StartOutcome, StudyError> {
        let shared = self.slots.slot(student, deck_id)?;
        let mut slot = shared.lock().await;

        let deck = self.load_deck(deck_id).await?;
        if !deck.is_active() {
            return Ok(StartOutcome::DeckInactive);
        }
        self.require_enrollment(student, deck_id).await?;

        let today = deck.local_date(self.clock.now());
        let stale_since = slot
            .session
            .as_ref()
            .filter(|s| s.is_active() && s.date() != today)
            .map(Session::date);
        if stale_since.is_none() && slot.session.as_ref().is_some_and(Session::is_active) {
            log::debug!("start for student {student} in deck {deck_id} discarded, already studying");
            return Ok(StartOutcome::AlreadyActive);
        }

        let key = DailyKey::new(student, deck_id, today);
        let (_, created) = self.quota.ensure_daily(key, &deck).await?;
        if trigger == StartTrigger::Scheduled && !created {
            return Ok(StartOutcome::AlreadyStartedToday);
        }

        slot.cancel_advance();
        if let Some(previous) = stale_since {
            self.carry_over(&slot, previous, key).await?;
        }
        match slot.session.as_mut() {
            Some(session) if !session.is_active() => session.restart(today)?,
            _ => slot.session = Some(Session::new(student, deck_id, today)),
        }
        log::info!("session started for student {student} in deck {deck_id} ({trigger:?})");

        let presentation = self.present_next(&mut slot, &deck, student).await?;
        Ok(StartOutcome::Started(presentation))
    }

    /// Hand the card left on screen on `previous` over to today's record.
    async fn carry_over(
        &self,
        slot: &SessionSlot,
        previous: NaiveDate,
        key: DailyKey,
    ) -> Result<(), StudyError> {
        let Some(card_id) = slot.session.as_ref().and_then(Session::current_card) else {
            return Ok(());
        };
        let old = DailyKey::new(key.student, key.deck_id, previous);
        self.storage.daily.set_current_card(old, None).await?;
        self.storage.daily.set_current_card(key, Some(card_id)).await?;
        log::info!(
            "card {card_id} for student {} in deck {} carried over from {previous}",
            key.student,
            key.deck_id
        );
        Ok(())
    }

    /// "Study more": the manual start, under the same exclusion.
    ///
    /// # Errors
    ///
    /// See [`StudyEngine::start`].
    pub async fn study_more(
        self: &Arc<Self>,
        student: StudentId,
        deck_id: DeckId,
    ) -> Result<StartOutcome, StudyError> {
        self.start(student, deck_id, StartTrigger::Manual).await
    }

    /// Join a deck from a link payload (`deck_<token>` or a bare token) and
    /// start studying right away.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::UnknownDeckToken` when no deck matches.
    pub async fn enroll(
        self: &Arc<Self>,
        student: StudentId,
        payload: &str,
    ) -> Result<EnrollOutcome, StudyError> {
        let token = DeckToken::from_payload(payload).ok_or(StudyError::UnknownDeckToken)?;
        let deck = self
            .storage
            .decks
            .get_deck_by_token(&token)
            .await?
            .ok_or(StudyError::UnknownDeckToken)?;

        if !deck.is_active() {
            return Ok(EnrollOutcome {
                deck_id: deck.id(),
                newly_enrolled: false,
                start: StartOutcome::DeckInactive,
            });
        }

        let enrollment = Enrollment::new(student, deck.id(), self.clock.now());
        let newly_enrolled = self.storage.enrollments.enroll(&enrollment).await?;
        if newly_enrolled {
            log::info!("student {student} joined deck {}", deck.id());
        }

        let start = self.start(student, deck.id(), StartTrigger::Manual).await?;
        Ok(EnrollOutcome {
            deck_id: deck.id(),
            newly_enrolled,
            start,
        })
    }

    /// Scheduled start for every enrollment of the deck, run concurrently.
    ///
    /// # Errors
    ///
    /// Returns `StudyError` if the deck or its enrollments cannot be loaded.
    /// Per-student failures are counted in the report.
    pub async fn fire_deck(self: &Arc<Self>, deck_id: DeckId) -> Result<FireReport, StudyError> {
        let deck = self.load_deck(deck_id).await?;
        if !deck.is_active() {
            log::info!("deck {deck_id} is inactive, skipping daily start");
            return Ok(FireReport::default());
        }

        let enrollments = self.storage.enrollments.list_enrollments(deck_id).await?;
        let mut tasks = JoinSet::new();
        for enrollment in enrollments {
            let engine = Arc::clone(self);
            let student = enrollment.student;
            tasks.spawn(async move {
                let outcome = engine.start(student, deck_id, StartTrigger::Scheduled).await;
                (student, outcome)
            });
        }

        let mut report = FireReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) if outcome.started() => report.started += 1,
                Ok((_, Ok(_))) => report.skipped += 1,
                Ok((student, Err(e))) => {
                    report.failed += 1;
                    log::warn!("daily start for student {student} in deck {deck_id} failed: {e}");
                }
                Err(e) => {
                    report.failed += 1;
                    log::error!("daily start task for deck {deck_id} died: {e}");
                }
            }
        }

        log::info!(
            "deck {deck_id} fired: {} started, {} skipped, {} failed",
            report.started,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    //
    // ─── ANSWERING ─────────────────────────────────────────────────────────────
    //

    /// Score the student's answer to the card on screen and schedule the
    /// auto-advance.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::UnknownDeck`/`UnknownEnrollment` for identity
    /// errors and `StudyError::Storage` on persistence failures.
    pub async fn submit_answer(
        self: &Arc<Self>,
        student: StudentId,
        deck_id: DeckId,
        text: &str,
    ) -> Result<AnswerOutcome, StudyError> {
        let shared = self.slots.slot(student, deck_id)?;
        let mut slot = shared.lock().await;
        let deck = self.load_deck(deck_id).await?;
        self.require_enrollment(student, deck_id).await?;
        if !deck.is_active() {
            return Ok(AnswerOutcome::NothingPending);
        }
        self.rebuild_if_missing(&mut slot, &deck, student).await?;

        let Some(session) = slot.session.as_mut() else {
            return Ok(AnswerOutcome::NothingPending);
        };
        // An answer proves the prompt arrived even if the transport never
        // confirmed it.
        if matches!(session.phase(), SessionPhase::Presenting(_)) {
            session.delivered()?;
        }
        if !matches!(session.phase(), SessionPhase::AwaitingAnswer(_)) {
            return Ok(AnswerOutcome::NothingPending);
        }
        let card_id = session.begin_evaluating()?;
        let evaluating_since = Instant::now();
        let answered_on = session.date();

        let verdict = match self.evaluate(student, &deck, card_id, answered_on, text).await {
            Ok(verdict) => verdict,
            Err(e) => {
                slot.reset();
                return Err(e);
            }
        };

        if let Some(session) = slot.session.as_mut() {
            session.begin_auto_advance()?;
            session.roll_to(deck.local_date(self.clock.now()));
        }
        self.schedule_advance(&mut slot, student, deck_id, evaluating_since + self.auto_advance);
        Ok(AnswerOutcome::Scored { card_id, verdict })
    }

    /// Score and record an answer against the deck's current local day.
    ///
    /// `answered_on` is the day the card was presented; its record no longer
    /// points at the card once answered.
    async fn evaluate(
        &self,
        student: StudentId,
        deck: &Deck,
        card_id: CardId,
        answered_on: NaiveDate,
        text: &str,
    ) -> Result<Verdict, StudyError> {
        let deck_id = deck.id();
        let card = self
            .storage
            .cards
            .get_card(card_id)
            .await?
            .ok_or(StudyError::UnknownCard(card_id))?;
        let verdict = matcher::score(&card, text);
        let now = self.clock.now();
        let today = deck.local_date(now);

        let mut progress = self
            .storage
            .progress
            .get_progress(student, card_id)
            .await?
            .unwrap_or_else(|| Progress::new(student, deck_id, card_id, now));
        progress.record_answer(today, text, verdict, now);
        self.storage.progress.upsert_progress(&progress).await?;

        let key = DailyKey::new(student, deck_id, today);
        self.quota.ensure_daily(key, deck).await?;
        self.storage.daily.record_answer(key, verdict).await?;
        self.storage.daily.set_current_card(key, None).await?;
        if answered_on != today {
            let old = DailyKey::new(student, deck_id, answered_on);
            self.storage.daily.set_current_card(old, None).await?;
        }
        log::debug!("student {student} answered card {card_id}: {}", verdict.as_str());

        let feedback = Feedback {
            deck_id,
            card_id,
            verdict,
            revealed_answer: card.answers().primary().to_string(),
            submitted: text.to_string(),
        };
        if let Err(e) = self.transport.deliver_feedback(student, &feedback).await {
            log::warn!("feedback for card {card_id} to student {student} not delivered: {e}");
        }
        Ok(verdict)
    }

    fn schedule_advance(
        self: &Arc<Self>,
        slot: &mut SessionSlot,
        student: StudentId,
        deck_id: DeckId,
        deadline: Instant,
    ) {
        slot.cancel_advance();
        let epoch = slot.epoch;
        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            engine.run_advance(student, deck_id, epoch).await;
        });
        slot.set_advance(task.abort_handle());
    }

    async fn run_advance(&self, student: StudentId, deck_id: DeckId, epoch: u64) {
        let shared = match self.slots.slot(student, deck_id) {
            Ok(shared) => shared,
            Err(e) => {
                log::error!("auto-advance for student {student} lost its slot: {e}");
                return;
            }
        };
        let mut slot = shared.lock().await;
        if slot.epoch != epoch {
            return;
        }
        slot.clear_advance();
        let advancing = slot
            .session
            .as_ref()
            .is_some_and(|s| matches!(s.phase(), SessionPhase::AutoAdvancing { .. }));
        if !advancing {
            return;
        }

        // Any failure drops the session; the next action or trigger rebuilds
        // it from the day's record.
        let deck = match self.storage.decks.get_deck(deck_id).await {
            Ok(Some(deck)) if deck.is_active() => deck,
            Ok(_) => {
                slot.reset();
                return;
            }
            Err(e) => {
                log::error!("auto-advance for student {student} in deck {deck_id} failed: {e}");
                slot.reset();
                return;
            }
        };
        if let Err(e) = self.present_next(&mut slot, &deck, student).await {
            log::warn!("auto-advance for student {student} in deck {deck_id} failed: {e}");
            slot.reset();
        }
    }

    //
    // ─── FLAGGING ──────────────────────────────────────────────────────────────
    //

    /// "Bad card" on whatever the student is looking at: suspend it for this
    /// student and move on immediately.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::UnknownDeck`/`UnknownEnrollment` for identity
    /// errors and `StudyError::Storage` on persistence failures.
    pub async fn flag_bad(
        self: &Arc<Self>,
        student: StudentId,
        deck_id: DeckId,
    ) -> Result<FlagOutcome, StudyError> {
        let shared = self.slots.slot(student, deck_id)?;
        let mut slot = shared.lock().await;
        let deck = self.load_deck(deck_id).await?;
        self.require_enrollment(student, deck_id).await?;
        if !deck.is_active() {
            return Ok(FlagOutcome::NothingToFlag);
        }
        self.rebuild_if_missing(&mut slot, &deck, student).await?;

        let Some(card_id) = slot.session.as_ref().and_then(Session::flaggable_card) else {
            return Ok(FlagOutcome::NothingToFlag);
        };
        self.flag_on_screen(&mut slot, &deck, student, card_id).await
    }

    /// Suspend a specific card for one student. Idempotent.
    ///
    /// If the card is on screen the session advances as with
    /// [`StudyEngine::flag_bad`].
    ///
    /// # Errors
    ///
    /// Returns `StudyError::UnknownCard`/`UnknownEnrollment` for identity
    /// errors and `StudyError::Storage` on persistence failures.
    pub async fn flag_card(
        self: &Arc<Self>,
        student: StudentId,
        card_id: CardId,
    ) -> Result<FlagOutcome, StudyError> {
        let card = self
            .storage
            .cards
            .get_card(card_id)
            .await?
            .ok_or(StudyError::UnknownCard(card_id))?;
        let deck_id = card.deck_id();
        let shared = self.slots.slot(student, deck_id)?;
        let mut slot = shared.lock().await;
        let deck = self.load_deck(deck_id).await?;
        self.require_enrollment(student, deck_id).await?;

        if deck.is_active() {
            self.rebuild_if_missing(&mut slot, &deck, student).await?;
            let on_screen = slot.session.as_ref().and_then(Session::flaggable_card) == Some(card_id);
            if on_screen {
                return self.flag_on_screen(&mut slot, &deck, student, card_id).await;
            }
        }

        if self.suspend(student, deck_id, card_id).await? {
            Ok(FlagOutcome::Suspended { card_id, next: None })
        } else {
            Ok(FlagOutcome::AlreadySuspended { card_id })
        }
    }

    async fn flag_on_screen(
        &self,
        slot: &mut SessionSlot,
        deck: &Deck,
        student: StudentId,
        card_id: CardId,
    ) -> Result<FlagOutcome, StudyError> {
        let newly = self.suspend(student, deck.id(), card_id).await?;
        slot.cancel_advance();
        if let Some(session) = slot.session.as_mut() {
            session.skip_flagged()?;
        }
        let next = self.present_next(slot, deck, student).await?;
        if newly {
            Ok(FlagOutcome::Suspended {
                card_id,
                next: Some(next),
            })
        } else {
            Ok(FlagOutcome::AlreadySuspended { card_id })
        }
    }

    /// Suspend and record the flag. Returns `false` if already suspended.
    async fn suspend(
        &self,
        student: StudentId,
        deck_id: DeckId,
        card_id: CardId,
    ) -> Result<bool, StudyError> {
        let now = self.clock.now();
        let mut progress = self
            .storage
            .progress
            .get_progress(student, card_id)
            .await?
            .unwrap_or_else(|| Progress::new(student, deck_id, card_id, now));
        if !progress.suspend(now) {
            return Ok(false);
        }
        self.storage.progress.upsert_progress(&progress).await?;
        self.storage
            .flags
            .record_flag(&Flag {
                student,
                deck_id,
                card_id,
                created_at: now,
            })
            .await?;
        log::info!("card {card_id} suspended for student {student} in deck {deck_id}");
        Ok(true)
    }

    //
    // ─── PRESENTING ────────────────────────────────────────────────────────────
    //

    /// Present the next eligible card, or finish the day.
    async fn present_next(
        &self,
        slot: &mut SessionSlot,
        deck: &Deck,
        student: StudentId,
    ) -> Result<Presentation, StudyError> {
        let today = deck.local_date(self.clock.now());
        let deck_id = deck.id();
        let session = slot
            .session
            .get_or_insert_with(|| Session::new(student, deck_id, today));
        if session.date() != today {
            session.roll_to(today);
        }

        let key = DailyKey::new(student, deck_id, today);
        self.quota.ensure_daily(key, deck).await?;

        let Some(card) = self.cards.next_eligible(student, deck_id, today).await? else {
            self.storage.daily.mark_done(key).await?;
            session.finish()?;
            let has_more = self.cards.has_more(student, deck_id, today).await?;
            log::info!("student {student} is done with deck {deck_id} for {today}");
            if let Err(e) = self.transport.deliver_finished(student, deck_id, has_more).await {
                log::warn!("end-of-day notice to student {student} not delivered: {e}");
            }
            return Ok(Presentation::Finished { has_more });
        };

        self.storage.daily.set_current_card(key, Some(card.id())).await?;
        session.present(card.id())?;
        self.deliver_prompt(slot, deck_id, student, &card).await?;
        Ok(Presentation::Card(card.id()))
    }

    async fn deliver_prompt(
        &self,
        slot: &mut SessionSlot,
        deck_id: DeckId,
        student: StudentId,
        card: &Card,
    ) -> Result<(), StudyError> {
        match self.transport.deliver_prompt(student, &Prompt::for_card(card)).await {
            Ok(()) => {
                if let Some(session) = slot.session.as_mut() {
                    session.delivered()?;
                }
                Ok(())
            }
            Err(DeliveryError::Transient(reason)) => {
                log::warn!(
                    "prompt for card {} to student {student} still pending: {reason}",
                    card.id()
                );
                Ok(())
            }
            Err(DeliveryError::Permanent(reason)) => {
                log::error!("student {student} unreachable in deck {deck_id}: {reason}");
                slot.reset();
                self.transport
                    .report_delivery_failure(student, deck_id, &reason)
                    .await;
                Err(StudyError::DeliveryFailed { student, reason })
            }
        }
    }

    /// Retry delivering the card a session is stuck presenting.
    ///
    /// Returns `false` if nothing was waiting for delivery.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::DeliveryFailed` if the student is unreachable.
    pub async fn redeliver(
        self: &Arc<Self>,
        student: StudentId,
        deck_id: DeckId,
    ) -> Result<bool, StudyError> {
        let shared = self.slots.slot(student, deck_id)?;
        let mut slot = shared.lock().await;
        let Some(SessionPhase::Presenting(card_id)) = slot.session.as_ref().map(Session::phase) else {
            return Ok(false);
        };
        let card = self
            .storage
            .cards
            .get_card(card_id)
            .await?
            .ok_or(StudyError::UnknownCard(card_id))?;
        self.deliver_prompt(&mut slot, deck_id, student, &card).await?;
        Ok(true)
    }

    /// Rebuild a session lost to a restart from the day's current card.
    async fn rebuild_if_missing(
        &self,
        slot: &mut SessionSlot,
        deck: &Deck,
        student: StudentId,
    ) -> Result<(), StudyError> {
        if slot.session.as_ref().is_some_and(Session::is_active) {
            return Ok(());
        }
        let today = deck.local_date(self.clock.now());
        let key = DailyKey::new(student, deck.id(), today);
        let Some(daily) = self.storage.daily.get_daily(key).await? else {
            return Ok(());
        };
        let Some(card_id) = daily.current_card.filter(|_| !daily.done_for_today) else {
            return Ok(());
        };
        let suspended = self
            .storage
            .progress
            .get_progress(student, card_id)
            .await?
            .is_some_and(|p| p.is_suspended());
        if suspended {
            return Ok(());
        }
        log::info!("resuming card {card_id} for student {student} in deck {}", deck.id());
        slot.session = Some(Session::resume_awaiting(student, deck.id(), today, card_id));
        Ok(())
    }

    //
    // ─── ADMIN HOOKS ───────────────────────────────────────────────────────────
    //

    /// Destroy every live session of the deck and cancel pending advances.
    ///
    /// Returns how many sessions were active.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::Storage` if the slot table is unusable.
    pub async fn force_finish_deck(&self, deck_id: DeckId) -> Result<usize, StudyError> {
        let mut finished = 0;
        for shared in self.slots.for_deck(deck_id)? {
            let mut slot = shared.lock().await;
            if slot.session.as_ref().is_some_and(Session::is_active) || slot.has_pending_advance() {
                finished += 1;
            }
            slot.reset();
        }
        log::info!("force-finished {finished} sessions in deck {deck_id}");
        Ok(finished)
    }

    /// Current phase of the pair's session, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::Storage` if the slot table is unusable.
    pub async fn phase(
        &self,
        student: StudentId,
        deck_id: DeckId,
    ) -> Result<Option<SessionPhase>, StudyError> {
        let shared = self.slots.slot(student, deck_id)?;
        let slot = shared.lock().await;
        Ok(slot.session.as_ref().map(Session::phase))
    }
}
