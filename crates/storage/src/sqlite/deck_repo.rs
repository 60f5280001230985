use listen_core::model::{Deck, DeckId, DeckToken};

use super::mapping::{deck_id_from_i64, id_to_i64, map_deck_row, time_to_text};
use super::{SqliteRepository, conn_err, write_err};
use crate::repository::{DeckRepository, NewDeckRecord, StorageError};

const DECK_COLUMNS: &str =
    "id, owner_id, title, token, new_per_day, trigger_time, timezone, is_active, created_at";

#[async_trait::async_trait]
impl DeckRepository for SqliteRepository {
    async fn insert_new_deck(&self, deck: NewDeckRecord) -> Result<DeckId, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO decks (owner_id, title, token, new_per_day, trigger_time, timezone, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)
            ",
        )
        .bind(id_to_i64("owner_id", deck.owner.value())?)
        .bind(deck.title.trim().to_string())
        .bind(deck.token.as_str().to_string())
        .bind(i64::from(deck.settings.new_per_day()))
        .bind(time_to_text(deck.settings.trigger_time()))
        .bind(deck.settings.timezone().name().to_string())
        .bind(deck.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        deck_id_from_i64(res.last_insert_rowid())
    }

    async fn upsert_deck(&self, deck: &Deck) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO decks (id, owner_id, title, token, new_per_day, trigger_time, timezone, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                token = excluded.token,
                new_per_day = excluded.new_per_day,
                trigger_time = excluded.trigger_time,
                timezone = excluded.timezone,
                is_active = excluded.is_active
            ",
        )
        .bind(id_to_i64("deck_id", deck.id().value())?)
        .bind(id_to_i64("owner_id", deck.owner().value())?)
        .bind(deck.title().to_string())
        .bind(deck.token().as_str().to_string())
        .bind(i64::from(deck.settings().new_per_day()))
        .bind(time_to_text(deck.settings().trigger_time()))
        .bind(deck.settings().timezone().name().to_string())
        .bind(i64::from(deck.is_active()))
        .bind(deck.created_at())
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(())
    }

    async fn get_deck(&self, id: DeckId) -> Result<Option<Deck>, StorageError> {
        let row = sqlx::query(&format!("SELECT {DECK_COLUMNS} FROM decks WHERE id = ?1"))
            .bind(id_to_i64("deck_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn_err)?;

        row.as_ref().map(map_deck_row).transpose()
    }

    async fn get_deck_by_token(&self, token: &DeckToken) -> Result<Option<Deck>, StorageError> {
        let row = sqlx::query(&format!("SELECT {DECK_COLUMNS} FROM decks WHERE token = ?1"))
            .bind(token.as_str().to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn_err)?;

        row.as_ref().map(map_deck_row).transpose()
    }

    async fn list_decks(&self) -> Result<Vec<Deck>, StorageError> {
        let rows = sqlx::query(&format!("SELECT {DECK_COLUMNS} FROM decks ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(conn_err)?;

        rows.iter().map(map_deck_row).collect()
    }
}
