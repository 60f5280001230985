use listen_core::model::{DeckId, Flag, FlagSummary};
use sqlx::Row;

use super::mapping::{card_id_from_i64, id_to_i64, ser};
use super::{SqliteRepository, conn_err, write_err};
use crate::repository::{FlagRepository, StorageError};

#[async_trait::async_trait]
impl FlagRepository for SqliteRepository {
    async fn record_flag(&self, flag: &Flag) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO flags (student_id, deck_id, card_id, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(id_to_i64("student_id", flag.student.value())?)
        .bind(id_to_i64("deck_id", flag.deck_id.value())?)
        .bind(id_to_i64("card_id", flag.card_id.value())?)
        .bind(flag.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(())
    }

    async fn flag_summary(
        &self,
        deck_id: DeckId,
        limit: u32,
    ) -> Result<Vec<FlagSummary>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT c.id AS card_id, c.primary_answer AS primary_answer, COUNT(f.id) AS flags
            FROM flags f
            JOIN cards c ON c.id = f.card_id
            WHERE f.deck_id = ?1
            GROUP BY c.id, c.primary_answer
            ORDER BY flags DESC, c.id ASC
            LIMIT ?2
            ",
        )
        .bind(id_to_i64("deck_id", deck_id.value())?)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        rows.iter()
            .map(|row| {
                let flags: i64 = row.try_get("flags").map_err(ser)?;
                Ok(FlagSummary {
                    card_id: card_id_from_i64(row.try_get("card_id").map_err(ser)?)?,
                    primary_answer: row.try_get("primary_answer").map_err(ser)?,
                    flags: u32::try_from(flags).map_err(ser)?,
                })
            })
            .collect()
    }
}
