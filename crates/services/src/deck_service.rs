use std::sync::Arc;

use listen_core::model::{
    AcceptedAnswers, AdminId, Deck, DeckError, DeckId, DeckToken, FlagSummary, MediaKind,
    MediaRef, parse_timezone,
};
use rand::Rng;
use serde::Deserialize;
use storage::repository::{
    CardRepository, DeckRepository, FlagRepository, NewCardRecord, NewDeckRecord, StorageError,
};

use crate::config::EngineConfig;
use crate::error::AdminError;
use crate::sessions::StudyEngine;
use crate::Clock;

/// Length of generated join tokens.
pub const TOKEN_LEN: usize = 24;

/// Most flagged cards listed in one report.
pub const FLAG_REPORT_LIMIT: u32 = 200;

const TOKEN_ATTEMPTS: usize = 3;

//
// ─── IMPORT MANIFEST ───────────────────────────────────────────────────────────
//

/// A deck as handed over by the importer.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportedDeck {
    pub title: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub new_per_day: Option<u32>,
    pub cards: Vec<ImportedCard>,
}

impl ImportedDeck {
    /// Parse a JSON manifest.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Manifest` for malformed JSON.
    pub fn from_json(raw: &str) -> Result<Self, AdminError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// One card row; `answer` holds the primary answer and `||`-separated
/// alternatives.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportedCard {
    #[serde(default = "default_kind")]
    pub kind: String,
    pub media: String,
    pub answer: String,
}

fn default_kind() -> String {
    MediaKind::Audio.as_str().to_string()
}

/// A manifest row that was left out of the deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCard {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub deck_id: DeckId,
    pub token: DeckToken,
    pub imported: usize,
    pub skipped: Vec<SkippedCard>,
}

fn random_token() -> Result<DeckToken, AdminError> {
    let raw: String = rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect();
    Ok(DeckToken::new(raw)?)
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Admin operations on decks: import, quota, activation, links and flags.
#[derive(Clone)]
pub struct DeckAdminService {
    clock: Clock,
    config: EngineConfig,
    decks: Arc<dyn DeckRepository>,
    cards: Arc<dyn CardRepository>,
    flags: Arc<dyn FlagRepository>,
    engine: Arc<StudyEngine>,
}

impl DeckAdminService {
    #[must_use]
    pub fn new(
        clock: Clock,
        config: EngineConfig,
        decks: Arc<dyn DeckRepository>,
        cards: Arc<dyn CardRepository>,
        flags: Arc<dyn FlagRepository>,
        engine: Arc<StudyEngine>,
    ) -> Self {
        Self {
            clock,
            config,
            decks,
            cards,
            flags,
            engine,
        }
    }

    async fn load(&self, deck_id: DeckId) -> Result<Deck, AdminError> {
        self.decks
            .get_deck(deck_id)
            .await?
            .ok_or(AdminError::UnknownDeck(deck_id))
    }

    /// Create a deck from an imported manifest.
    ///
    /// Rows without media or without a usable answer are reported as skipped
    /// and never stored, so they can never be scheduled.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Deck` for an invalid title, timezone or quota and
    /// `AdminError::Storage` if persistence fails.
    pub async fn import_deck(
        &self,
        owner: AdminId,
        manifest: ImportedDeck,
    ) -> Result<ImportReport, AdminError> {
        let timezone = manifest
            .timezone
            .as_deref()
            .map(parse_timezone)
            .transpose()?;
        let settings = self.config.deck_settings(timezone, manifest.new_per_day)?;
        let title = manifest.title.trim().to_string();
        if title.is_empty() {
            return Err(DeckError::EmptyTitle.into());
        }
        let now = self.clock.now();

        let mut records = Vec::with_capacity(manifest.cards.len());
        let mut skipped = Vec::new();
        for (index, row) in manifest.cards.into_iter().enumerate() {
            let parsed = MediaKind::parse(&row.kind)
                .and_then(|kind| MediaRef::new(kind, row.media.trim()))
                .and_then(|media| Ok((media, AcceptedAnswers::parse(&row.answer)?)));
            match parsed {
                Ok((media, answers)) => records.push(NewCardRecord {
                    position: u32::try_from(records.len()).unwrap_or(u32::MAX),
                    media,
                    answers,
                    created_at: now,
                }),
                Err(e) => {
                    log::warn!("skipping manifest row {index}: {e}");
                    skipped.push(SkippedCard {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut attempt = 0;
        let (deck_id, token) = loop {
            attempt += 1;
            let token = random_token()?;
            let record = NewDeckRecord {
                owner,
                title: title.clone(),
                token: token.clone(),
                settings: settings.clone(),
                created_at: now,
            };
            match self.decks.insert_new_deck(record).await {
                Ok(id) => break (id, token),
                Err(StorageError::Conflict) if attempt < TOKEN_ATTEMPTS => continue,
                Err(e) => return Err(e.into()),
            }
        };

        let imported = self.cards.insert_cards(deck_id, records).await?.len();
        log::info!(
            "imported deck {deck_id} \"{title}\": {imported} cards, {} skipped",
            skipped.len()
        );
        Ok(ImportReport {
            deck_id,
            token,
            imported,
            skipped,
        })
    }

    /// Change the daily new-card quota. Days already opened keep their limit.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Deck` if `n` is outside `1..=500`.
    pub async fn set_new_per_day(&self, deck_id: DeckId, n: u32) -> Result<Deck, AdminError> {
        let mut deck = self.load(deck_id).await?;
        deck.set_new_per_day(n)?;
        self.decks.upsert_deck(&deck).await?;
        log::info!("deck {deck_id} now introduces {n} new cards per day");
        Ok(deck)
    }

    /// Enable or disable a deck. Disabling force-finishes its live sessions.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::UnknownDeck` if the deck does not exist.
    pub async fn set_active(&self, deck_id: DeckId, active: bool) -> Result<Deck, AdminError> {
        let mut deck = self.load(deck_id).await?;
        deck.set_active(active);
        self.decks.upsert_deck(&deck).await?;
        if active {
            log::info!("deck {deck_id} enabled");
        } else {
            let finished = self.engine.force_finish_deck(deck_id).await?;
            log::info!("deck {deck_id} disabled, {finished} sessions finished");
        }
        Ok(deck)
    }

    /// Replace the join token; old links stop working.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::UnknownDeck` if the deck does not exist.
    pub async fn rotate_token(&self, deck_id: DeckId) -> Result<DeckToken, AdminError> {
        let mut deck = self.load(deck_id).await?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let token = random_token()?;
            deck.replace_token(token.clone());
            match self.decks.upsert_deck(&deck).await {
                Ok(()) => {
                    log::info!("deck {deck_id} got a new join link");
                    return Ok(token);
                }
                Err(StorageError::Conflict) if attempt < TOKEN_ATTEMPTS => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Flagged cards of a deck, most flagged first.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::UnknownDeck` if the deck does not exist.
    pub async fn flag_report(&self, deck_id: DeckId) -> Result<Vec<FlagSummary>, AdminError> {
        self.load(deck_id).await?;
        Ok(self.flags.flag_summary(deck_id, FLAG_REPORT_LIMIT).await?)
    }

    /// # Errors
    ///
    /// Returns `AdminError::Storage` if repository access fails.
    pub async fn list_decks(&self) -> Result<Vec<Deck>, AdminError> {
        Ok(self.decks.list_decks().await?)
    }

    /// # Errors
    ///
    /// Returns `AdminError::Storage` if repository access fails.
    pub async fn get_deck(&self, deck_id: DeckId) -> Result<Option<Deck>, AdminError> {
        Ok(self.decks.get_deck(deck_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use listen_core::model::StudentId;
    use listen_core::time::fixed_now;
    use storage::repository::Storage;

    use crate::transport::{DeliveryError, Feedback, Prompt, Transport};

    struct Silent;

    #[async_trait]
    impl Transport for Silent {
        async fn deliver_prompt(&self, _: StudentId, _: &Prompt) -> Result<(), DeliveryError> {
            Ok(())
        }
        async fn deliver_feedback(&self, _: StudentId, _: &Feedback) -> Result<(), DeliveryError> {
            Ok(())
        }
        async fn deliver_finished(&self, _: StudentId, _: DeckId, _: bool) -> Result<(), DeliveryError> {
            Ok(())
        }
        async fn report_delivery_failure(&self, _: StudentId, _: DeckId, _: &str) {}
    }

    fn service() -> DeckAdminService {
        let storage = Storage::in_memory();
        let clock = Clock::fixed(fixed_now());
        let engine = StudyEngine::new(clock.clone(), Duration::from_secs(1), storage.clone(), Arc::new(Silent));
        DeckAdminService::new(
            clock,
            EngineConfig::default(),
            storage.decks,
            storage.cards,
            storage.flags,
            engine,
        )
    }

    fn manifest() -> ImportedDeck {
        ImportedDeck::from_json(
            r#"{
                "title": "French A1",
                "new_per_day": 2,
                "cards": [
                    {"media": "file-1", "answer": "bonjour || salut"},
                    {"media": "  ", "answer": "merci"},
                    {"kind": "video", "media": "file-3", "answer": " || "},
                    {"kind": "video", "media": "file-4", "answer": "au revoir"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn import_skips_unusable_rows() {
        let admin = service();
        let report = admin.import_deck(AdminId::new(1), manifest()).await.unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(
            report.skipped.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(report.token.as_str().len(), TOKEN_LEN);

        let deck = admin.get_deck(report.deck_id).await.unwrap().unwrap();
        assert_eq!(deck.settings().new_per_day(), 2);
        assert_eq!(deck.settings().timezone(), chrono_tz::Europe::Kyiv);
        let cards = admin.cards.list_cards(report.deck_id).await.unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[1].media().kind(), MediaKind::Video);
    }

    #[tokio::test]
    async fn import_rejects_bad_timezone() {
        let admin = service();
        let mut manifest = manifest();
        manifest.timezone = Some("Atlantis/Capital".into());
        let err = admin.import_deck(AdminId::new(1), manifest).await.unwrap_err();
        assert!(matches!(err, AdminError::Deck(_)));
    }

    #[tokio::test]
    async fn set_new_per_day_is_bounded() {
        let admin = service();
        let report = admin.import_deck(AdminId::new(1), manifest()).await.unwrap();
        assert!(admin.set_new_per_day(report.deck_id, 0).await.is_err());
        assert!(admin.set_new_per_day(report.deck_id, 501).await.is_err());
        let deck = admin.set_new_per_day(report.deck_id, 500).await.unwrap();
        assert_eq!(deck.settings().new_per_day(), 500);
    }

    #[tokio::test]
    async fn rotate_token_replaces_link() {
        let admin = service();
        let report = admin.import_deck(AdminId::new(1), manifest()).await.unwrap();
        let fresh = admin.rotate_token(report.deck_id).await.unwrap();
        assert_ne!(fresh, report.token);
        assert!(admin.decks.get_deck_by_token(&report.token).await.unwrap().is_none());
        assert!(admin.decks.get_deck_by_token(&fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_deck_is_reported() {
        let admin = service();
        let err = admin.set_active(DeckId::new(99), false).await.unwrap_err();
        assert!(matches!(err, AdminError::UnknownDeck(_)));
    }
}
