mod support;

use std::time::Duration;

use chrono::NaiveDate;
use listen_core::model::{DailyKey, StudentId};
use listen_core::time::fixed_now;
use services::Clock;
use support::Harness;

const S1: StudentId = StudentId::new(1);
const S2: StudentId = StudentId::new(2);

// fixed_now() is 2023-11-14 22:13:20 UTC: 00:13 on the 15th in Kyiv and
// 17:13 on the 14th in New York.
const UNTIL_KYIV_SEVEN: Duration = Duration::from_secs(6 * 3600 + 46 * 60 + 40);

#[tokio::test(start_paused = true)]
async fn fires_at_local_trigger_time() {
    let h = Harness::new();
    let deck = h.import("Europe/Kyiv", 10, &["p", "q"]).await;
    h.enroll_quietly(S1, deck.deck_id).await;

    let scheduler = h.services.scheduler();
    scheduler.watch_deck(deck.deck_id).unwrap();
    assert_eq!(scheduler.watched(), 1);

    tokio::time::sleep(UNTIL_KYIV_SEVEN - Duration::from_secs(1)).await;
    assert!(h.transport.prompts_to(S1).is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.transport.prompts_to(S1).len(), 1);

    // The frozen clock makes the next fire land on the same local date, which
    // is already opened.
    tokio::time::sleep(UNTIL_KYIV_SEVEN).await;
    assert_eq!(h.transport.prompts_to(S1).len(), 1);

    scheduler.shutdown();
    assert_eq!(scheduler.watched(), 0);
}

/// Move the engine clock and tokio's paused clock together.
async fn pass(clock: &mut Clock, by: Duration) {
    clock.advance(chrono::Duration::from_std(by).unwrap());
    tokio::time::sleep(by).await;
}

#[tokio::test(start_paused = true)]
async fn next_morning_fire_opens_a_new_day() {
    let mut clock = Clock::manual(fixed_now());
    let h = Harness::with_clock(clock.clone());
    let deck = h.import("Europe/Kyiv", 1, &["p", "q"]).await;
    let first = h.storage.cards.list_cards(deck.deck_id).await.unwrap()[0].id();
    h.enroll_quietly(S1, deck.deck_id).await;

    let scheduler = h.services.scheduler();
    scheduler.watch_deck(deck.deck_id).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    pass(&mut clock, UNTIL_KYIV_SEVEN).await;
    assert_eq!(h.transport.prompts_to(S1), vec![first]);

    // Left unanswered, the card opens the next day's session.
    pass(&mut clock, Duration::from_secs(24 * 3600)).await;
    assert_eq!(h.transport.prompts_to(S1), vec![first, first]);
    let next_day = NaiveDate::from_ymd_opt(2023, 11, 16).unwrap();
    let daily = h
        .storage
        .daily
        .get_daily(DailyKey::new(S1, deck.deck_id, next_day))
        .await
        .unwrap()
        .expect("next day opened");
    assert_eq!(daily.current_card, Some(first));
    assert_eq!(daily.new_introduced, 0);

    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn decks_follow_their_own_timezone() {
    let h = Harness::new();
    let kyiv = h.import("Europe/Kyiv", 10, &["p"]).await;
    let new_york = h.import("America/New_York", 10, &["q"]).await;
    h.enroll_quietly(S1, kyiv.deck_id).await;
    h.enroll_quietly(S2, new_york.deck_id).await;

    let scheduler = h.services.scheduler();
    assert_eq!(scheduler.start_all().await.unwrap(), 2);
    tokio::time::sleep(Duration::from_millis(10)).await;

    // New York already passed 07:00 today and catches up; Kyiv has not.
    assert!(h.transport.prompts_to(S1).is_empty());
    assert_eq!(h.transport.prompts_to(S2).len(), 1);
    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn late_start_catches_up_once() {
    let mut clock = Clock::fixed(fixed_now());
    clock.advance(chrono::Duration::hours(10));
    let h = Harness::with_clock(clock);
    let deck = h.import("Europe/Kyiv", 10, &["p", "q"]).await;
    h.enroll_quietly(S1, deck.deck_id).await;

    let scheduler = h.services.scheduler();
    scheduler.watch_deck(deck.deck_id).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.transport.prompts_to(S1).len(), 1);

    // Restarting the timer catches up again, but the day is already opened.
    scheduler.watch_deck(deck.deck_id).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.transport.prompts_to(S1).len(), 1);
    assert_eq!(scheduler.watched(), 1);

    assert!(scheduler.unwatch_deck(deck.deck_id).unwrap());
    assert!(!scheduler.unwatch_deck(deck.deck_id).unwrap());
}

#[tokio::test(start_paused = true)]
async fn inactive_deck_is_not_started() {
    let h = Harness::new();
    let deck = h.import("America/New_York", 10, &["p"]).await;
    h.enroll_quietly(S1, deck.deck_id).await;
    h.services.decks().set_active(deck.deck_id, false).await.unwrap();

    let report = h.services.engine().fire_deck(deck.deck_id).await.unwrap();
    assert_eq!(report.started, 0);
    assert!(h.transport.sent().is_empty());
}
