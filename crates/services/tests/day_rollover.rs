mod support;

use chrono::NaiveDate;
use listen_core::matcher::Verdict;
use listen_core::model::{DailyKey, DailyState, DeckId, SessionPhase, StudentId};
use listen_core::time::fixed_now;
use services::{AnswerOutcome, Clock};
use support::{Harness, past_auto_advance};

const S1: StudentId = StudentId::new(1);
const S2: StudentId = StudentId::new(2);

// fixed_now() is 00:13 on 2023-11-15 in Kyiv.
fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 11, d).unwrap()
}

fn next_day(clock: &mut Clock) {
    clock.advance(chrono::Duration::days(1));
}

async fn daily(h: &Harness, student: StudentId, deck: DeckId, date: NaiveDate) -> DailyState {
    h.storage
        .daily
        .get_daily(DailyKey::new(student, deck, date))
        .await
        .unwrap()
        .expect("daily record")
}

#[tokio::test(start_paused = true)]
async fn second_day_reviews_before_new_cards() {
    let mut clock = Clock::manual(fixed_now());
    let h = Harness::with_clock(clock.clone());
    let deck = h.import("Europe/Kyiv", 2, &["a", "b", "c", "d", "e"]).await;
    let engine = h.services.engine();
    let ids: Vec<_> = h
        .storage
        .cards
        .list_cards(deck.deck_id)
        .await
        .unwrap()
        .iter()
        .map(|c| c.id())
        .collect();
    h.enroll_quietly(S1, deck.deck_id).await;
    h.enroll_quietly(S2, deck.deck_id).await;

    let report = engine.fire_deck(deck.deck_id).await.unwrap();
    assert_eq!(report.started, 2);

    // S1 works through the day's quota; S2 leaves its first card unanswered.
    engine.submit_answer(S1, deck.deck_id, "a").await.unwrap();
    past_auto_advance().await;
    engine.submit_answer(S1, deck.deck_id, "nope").await.unwrap();
    past_auto_advance().await;
    assert_eq!(h.transport.finished_for(S1), vec![false]);
    assert!(daily(&h, S1, deck.deck_id, day(15)).await.done_for_today);

    next_day(&mut clock);
    let report = engine.fire_deck(deck.deck_id).await.unwrap();
    assert_eq!((report.started, report.skipped, report.failed), (2, 0, 0));

    let fresh = daily(&h, S1, deck.deck_id, day(16)).await;
    assert_eq!((fresh.new_introduced, fresh.answered), (0, 0));
    assert!(!fresh.done_for_today);

    for answer in ["a", "b", "c", "d"] {
        engine.submit_answer(S1, deck.deck_id, answer).await.unwrap();
        past_auto_advance().await;
    }
    assert_eq!(
        h.transport.prompts_to(S1),
        vec![ids[0], ids[1], ids[0], ids[1], ids[2], ids[3]]
    );
    assert_eq!(h.transport.finished_for(S1), vec![false, false]);
    let second = daily(&h, S1, deck.deck_id, day(16)).await;
    assert_eq!((second.new_introduced, second.answered, second.correct), (2, 4, 4));

    // The card S2 left on screen overnight comes first, once.
    assert_eq!(h.transport.prompts_to(S2), vec![ids[0], ids[0]]);
    let outcome = engine.submit_answer(S2, deck.deck_id, "a").await.unwrap();
    assert_eq!(outcome, AnswerOutcome::Scored { card_id: ids[0], verdict: Verdict::Correct });
    past_auto_advance().await;
    assert_eq!(h.transport.prompts_to(S2), vec![ids[0], ids[0], ids[1]]);
    assert_eq!(daily(&h, S2, deck.deck_id, day(16)).await.answered, 1);
    assert_eq!(daily(&h, S2, deck.deck_id, day(15)).await.current_card, None);
}

#[tokio::test(start_paused = true)]
async fn answer_after_midnight_counts_for_the_new_day() {
    let mut clock = Clock::manual(fixed_now());
    let h = Harness::with_clock(clock.clone());
    let deck = h.import("Europe/Kyiv", 10, &["a", "b"]).await;
    let engine = h.services.engine();
    let ids: Vec<_> = h
        .storage
        .cards
        .list_cards(deck.deck_id)
        .await
        .unwrap()
        .iter()
        .map(|c| c.id())
        .collect();
    engine.enroll(S1, deck.token.as_str()).await.unwrap();

    next_day(&mut clock);
    let outcome = engine.submit_answer(S1, deck.deck_id, "a").await.unwrap();
    assert_eq!(outcome, AnswerOutcome::Scored { card_id: ids[0], verdict: Verdict::Correct });

    let yesterday = daily(&h, S1, deck.deck_id, day(15)).await;
    assert_eq!((yesterday.answered, yesterday.current_card), (0, None));
    assert_eq!(daily(&h, S1, deck.deck_id, day(16)).await.answered, 1);
    let progress = h.storage.progress.get_progress(S1, ids[0]).await.unwrap().unwrap();
    assert!(progress.seen_on(day(16)));

    past_auto_advance().await;
    assert_eq!(
        engine.phase(S1, deck.deck_id).await.unwrap(),
        Some(SessionPhase::AwaitingAnswer(ids[1]))
    );
    assert_eq!(h.transport.prompts_to(S1), vec![ids[0], ids[1]]);

    // The rolled session already owns the new day.
    let report = engine.fire_deck(deck.deck_id).await.unwrap();
    assert_eq!((report.started, report.skipped), (0, 1));
}

#[tokio::test(start_paused = true)]
async fn finished_student_is_started_next_morning_only() {
    let mut clock = Clock::manual(fixed_now());
    let h = Harness::with_clock(clock.clone());
    let deck = h.import("Europe/Kyiv", 1, &["a", "b"]).await;
    let engine = h.services.engine();
    engine.enroll(S1, deck.token.as_str()).await.unwrap();
    engine.submit_answer(S1, deck.deck_id, "a").await.unwrap();
    past_auto_advance().await;
    assert_eq!(h.transport.finished_for(S1), vec![false]);

    // Same day: the record exists, the fire leaves the student alone.
    let report = engine.fire_deck(deck.deck_id).await.unwrap();
    assert_eq!((report.started, report.skipped), (0, 1));

    next_day(&mut clock);
    let report = engine.fire_deck(deck.deck_id).await.unwrap();
    assert_eq!((report.started, report.skipped), (1, 0));
    assert_eq!(h.transport.prompts_to(S1).len(), 2);
}
