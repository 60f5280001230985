use std::sync::Arc;

use listen_core::model::AdminId;
use storage::repository::Storage;

use crate::config::EngineConfig;
use crate::deck_service::{DeckAdminService, ImportReport, ImportedDeck};
use crate::error::{AdminError, AppServicesError};
use crate::scheduler::DailyScheduler;
use crate::sessions::StudyEngine;
use crate::stats::StatsService;
use crate::transport::Transport;
use crate::Clock;

/// Assembles the study engine, the scheduler and the admin services.
#[derive(Clone)]
pub struct AppServices {
    config: EngineConfig,
    engine: Arc<StudyEngine>,
    scheduler: Arc<DailyScheduler>,
    decks: Arc<DeckAdminService>,
    stats: Arc<StatsService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage at `config.database_url`.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        config: EngineConfig,
        clock: Clock,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(&config.database_url).await?;
        Ok(Self::from_storage(config, clock, storage, transport))
    }

    /// Build services over an already opened storage.
    #[must_use]
    pub fn from_storage(
        config: EngineConfig,
        clock: Clock,
        storage: Storage,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let engine = StudyEngine::new(clock.clone(), config.auto_advance, storage.clone(), transport);
        let scheduler = DailyScheduler::new(
            clock.clone(),
            config.catch_up_on_start,
            Arc::clone(&engine),
            Arc::clone(&storage.decks),
        );
        let decks = Arc::new(DeckAdminService::new(
            clock.clone(),
            config.clone(),
            Arc::clone(&storage.decks),
            Arc::clone(&storage.cards),
            Arc::clone(&storage.flags),
            Arc::clone(&engine),
        ));
        let stats = Arc::new(StatsService::new(
            clock,
            Arc::clone(&storage.decks),
            Arc::clone(&storage.cards),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.daily),
        ));

        Self {
            config,
            engine,
            scheduler,
            decks,
            stats,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn engine(&self) -> Arc<StudyEngine> {
        Arc::clone(&self.engine)
    }

    #[must_use]
    pub fn scheduler(&self) -> Arc<DailyScheduler> {
        Arc::clone(&self.scheduler)
    }

    #[must_use]
    pub fn decks(&self) -> Arc<DeckAdminService> {
        Arc::clone(&self.decks)
    }

    #[must_use]
    pub fn stats(&self) -> Arc<StatsService> {
        Arc::clone(&self.stats)
    }

    /// Import a deck and start its daily timer.
    ///
    /// # Errors
    ///
    /// Returns `AdminError` if the import fails.
    pub async fn import_deck(
        &self,
        owner: AdminId,
        manifest: ImportedDeck,
    ) -> Result<ImportReport, AdminError> {
        let report = self.decks.import_deck(owner, manifest).await?;
        self.scheduler.watch_deck(report.deck_id)?;
        Ok(report)
    }
}
