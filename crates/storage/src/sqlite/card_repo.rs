use listen_core::model::{Card, CardId, DeckId};

use super::mapping::{alternatives_to_json, card_id_from_i64, id_to_i64, map_card_row};
use super::{SqliteRepository, conn_err, write_err};
use crate::repository::{CardRepository, NewCardRecord, StorageError};

#[async_trait::async_trait]
impl CardRepository for SqliteRepository {
    async fn insert_cards(
        &self,
        deck_id: DeckId,
        cards: Vec<NewCardRecord>,
    ) -> Result<Vec<CardId>, StorageError> {
        let deck = id_to_i64("deck_id", deck_id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn_err)?;
        let mut ids = Vec::with_capacity(cards.len());

        for card in cards {
            let res = sqlx::query(
                r"
                INSERT INTO cards (deck_id, position, media_kind, media_handle, primary_answer, alternatives, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
            )
            .bind(deck)
            .bind(i64::from(card.position))
            .bind(card.media.kind().as_str())
            .bind(card.media.handle().to_string())
            .bind(card.answers.primary().to_string())
            .bind(alternatives_to_json(&card.answers)?)
            .bind(card.created_at)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
            ids.push(card_id_from_i64(res.last_insert_rowid())?);
        }

        tx.commit().await.map_err(conn_err)?;
        Ok(ids)
    }

    async fn list_cards(&self, deck_id: DeckId) -> Result<Vec<Card>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, deck_id, position, media_kind, media_handle, primary_answer, alternatives, created_at
            FROM cards
            WHERE deck_id = ?1
            ORDER BY position ASC, id ASC
            ",
        )
        .bind(id_to_i64("deck_id", deck_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        rows.iter().map(map_card_row).collect()
    }

    async fn get_card(&self, id: CardId) -> Result<Option<Card>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, deck_id, position, media_kind, media_handle, primary_answer, alternatives, created_at
            FROM cards
            WHERE id = ?1
            ",
        )
        .bind(id_to_i64("card_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn_err)?;

        row.as_ref().map(map_card_row).transpose()
    }
}
