use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use listen_core::model::DeckId;
use storage::repository::{DeckRepository, StorageError};
use tokio::task::AbortHandle;

use crate::sessions::StudyEngine;
use crate::Clock;

/// Shortest sleep between two fires of the same deck.
const MIN_SLEEP: Duration = Duration::from_secs(1);

/// Back-off after a failed deck lookup.
const RETRY_AFTER: Duration = Duration::from_secs(60);

/// One recurring timer per deck, firing at the deck's local trigger time.
///
/// The next instant is recomputed from the deck's timezone after every fire,
/// so DST moves the absolute instant and never the local hour.
pub struct DailyScheduler {
    clock: Clock,
    catch_up: bool,
    engine: Arc<StudyEngine>,
    decks: Arc<dyn DeckRepository>,
    timers: Mutex<HashMap<DeckId, AbortHandle>>,
}

impl DailyScheduler {
    #[must_use]
    pub fn new(
        clock: Clock,
        catch_up: bool,
        engine: Arc<StudyEngine>,
        decks: Arc<dyn DeckRepository>,
    ) -> Arc<Self> {
        Arc::new(Self {
            clock,
            catch_up,
            engine,
            decks,
            timers: Mutex::new(HashMap::new()),
        })
    }

    /// Start a timer for every stored deck. Returns how many were started.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if decks cannot be listed.
    pub async fn start_all(self: &Arc<Self>) -> Result<usize, StorageError> {
        let decks = self.decks.list_decks().await?;
        for deck in &decks {
            self.watch_deck(deck.id())?;
        }
        log::info!("scheduler watching {} decks", decks.len());
        Ok(decks.len())
    }

    /// Start (or restart) the timer of one deck.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the timer table is poisoned.
    pub fn watch_deck(self: &Arc<Self>, deck_id: DeckId) -> Result<(), StorageError> {
        let mut timers = self
            .timers
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let scheduler = Arc::clone(self);
        let task = tokio::spawn(async move { scheduler.run_deck(deck_id).await });
        if let Some(previous) = timers.insert(deck_id, task.abort_handle()) {
            previous.abort();
        }
        Ok(())
    }

    /// Stop the timer of one deck. Returns `false` if none was running.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the timer table is poisoned.
    pub fn unwatch_deck(&self, deck_id: DeckId) -> Result<bool, StorageError> {
        let mut timers = self
            .timers
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        match timers.remove(&deck_id) {
            Some(timer) => {
                timer.abort();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stop every timer.
    pub fn shutdown(&self) {
        match self.timers.lock() {
            Ok(mut timers) => {
                for (_, timer) in timers.drain() {
                    timer.abort();
                }
            }
            Err(e) => log::error!("scheduler timers unavailable at shutdown: {e}"),
        }
    }

    #[must_use]
    pub fn watched(&self) -> usize {
        self.timers.lock().map_or(0, |t| t.len())
    }

    async fn run_deck(&self, deck_id: DeckId) {
        if self.catch_up {
            self.catch_up_deck(deck_id).await;
        }

        loop {
            let deck = match self.decks.get_deck(deck_id).await {
                Ok(Some(deck)) => deck,
                Ok(None) => {
                    log::info!("deck {deck_id} is gone, stopping its timer");
                    return;
                }
                Err(e) => {
                    log::warn!("could not load deck {deck_id}, retrying: {e}");
                    tokio::time::sleep(RETRY_AFTER).await;
                    continue;
                }
            };

            let now = self.clock.now();
            let next = deck.next_trigger_after(now);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO).max(MIN_SLEEP);
            log::debug!("deck {deck_id} fires at {next} (in {}s)", wait.as_secs());
            tokio::time::sleep(wait).await;

            if let Err(e) = self.engine.fire_deck(deck_id).await {
                log::warn!("daily fire of deck {deck_id} failed: {e}");
            }
        }
    }

    /// Fire once right away when today's trigger already passed, so a late
    /// start does not skip a day.
    async fn catch_up_deck(&self, deck_id: DeckId) {
        match self.decks.get_deck(deck_id).await {
            Ok(Some(deck)) if deck.trigger_passed_today(self.clock.now()) => {
                log::info!("deck {deck_id} missed today's trigger, catching up");
                if let Err(e) = self.engine.fire_deck(deck_id).await {
                    log::warn!("catch-up fire of deck {deck_id} failed: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => log::warn!("could not load deck {deck_id} for catch-up: {e}"),
        }
    }
}
