use listen_core::model::{CardId, DeckId, Progress, StudentId};

use super::mapping::{id_to_i64, map_progress_row};
use super::{SqliteRepository, conn_err, write_err};
use crate::repository::{ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn list_progress(
        &self,
        student: StudentId,
        deck_id: DeckId,
    ) -> Result<Vec<Progress>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT student_id, card_id, deck_id, state, introduced_on, last_seen_on,
                   times_seen, last_answer, last_verdict, updated_at
            FROM progress
            WHERE student_id = ?1 AND deck_id = ?2
            ",
        )
        .bind(id_to_i64("student_id", student.value())?)
        .bind(id_to_i64("deck_id", deck_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        rows.iter().map(map_progress_row).collect()
    }

    async fn get_progress(
        &self,
        student: StudentId,
        card_id: CardId,
    ) -> Result<Option<Progress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT student_id, card_id, deck_id, state, introduced_on, last_seen_on,
                   times_seen, last_answer, last_verdict, updated_at
            FROM progress
            WHERE student_id = ?1 AND card_id = ?2
            ",
        )
        .bind(id_to_i64("student_id", student.value())?)
        .bind(id_to_i64("card_id", card_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn_err)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn upsert_progress(&self, progress: &Progress) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO progress (
                student_id, card_id, deck_id, state, introduced_on, last_seen_on,
                times_seen, last_answer, last_verdict, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(student_id, card_id) DO UPDATE SET
                state = excluded.state,
                introduced_on = excluded.introduced_on,
                last_seen_on = excluded.last_seen_on,
                times_seen = excluded.times_seen,
                last_answer = excluded.last_answer,
                last_verdict = excluded.last_verdict,
                updated_at = excluded.updated_at
            ",
        )
        .bind(id_to_i64("student_id", progress.student.value())?)
        .bind(id_to_i64("card_id", progress.card_id.value())?)
        .bind(id_to_i64("deck_id", progress.deck_id.value())?)
        .bind(progress.state.as_str())
        .bind(progress.introduced_on)
        .bind(progress.last_seen_on)
        .bind(i64::from(progress.times_seen))
        .bind(progress.last_answer.clone())
        .bind(progress.last_verdict.map(|v| v.as_str()))
        .bind(progress.updated_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(())
    }
}
