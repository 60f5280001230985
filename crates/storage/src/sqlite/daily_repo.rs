use listen_core::matcher::Verdict;
use listen_core::model::{CardId, DailyKey, DailyState, QuotaDecision};
use sqlx::sqlite::SqliteQueryResult;

use super::mapping::{id_to_i64, map_daily_row};
use super::{SqliteRepository, conn_err, write_err};
use crate::repository::{DailyStateRepository, StorageError};

fn key_params(key: DailyKey) -> Result<(i64, i64), StorageError> {
    Ok((
        id_to_i64("student_id", key.student.value())?,
        id_to_i64("deck_id", key.deck_id.value())?,
    ))
}

fn require_row(res: &SqliteQueryResult) -> Result<(), StorageError> {
    if res.rows_affected() == 0 {
        return Err(StorageError::NotFound);
    }
    Ok(())
}

#[async_trait::async_trait]
impl DailyStateRepository for SqliteRepository {
    async fn get_daily(&self, key: DailyKey) -> Result<Option<DailyState>, StorageError> {
        let (student, deck) = key_params(key)?;
        let row = sqlx::query(
            r"
            SELECT student_id, deck_id, day, new_limit, new_introduced, answered, correct,
                   done_for_today, current_card_id
            FROM daily_states
            WHERE student_id = ?1 AND deck_id = ?2 AND day = ?3
            ",
        )
        .bind(student)
        .bind(deck)
        .bind(key.date)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn_err)?;

        row.as_ref().map(map_daily_row).transpose()
    }

    async fn create_daily_if_absent(&self, state: &DailyState) -> Result<bool, StorageError> {
        let (student, deck) = key_params(state.key)?;
        let current = state
            .current_card
            .map(|c| id_to_i64("card_id", c.value()))
            .transpose()?;
        let res = sqlx::query(
            r"
            INSERT INTO daily_states (
                student_id, deck_id, day, new_limit, new_introduced, answered, correct,
                done_for_today, current_card_id
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(student_id, deck_id, day) DO NOTHING
            ",
        )
        .bind(student)
        .bind(deck)
        .bind(state.key.date)
        .bind(i64::from(state.new_limit))
        .bind(i64::from(state.new_introduced))
        .bind(i64::from(state.answered))
        .bind(i64::from(state.correct))
        .bind(i64::from(state.done_for_today))
        .bind(current)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(res.rows_affected() == 1)
    }

    async fn try_reserve_new(&self, key: DailyKey) -> Result<QuotaDecision, StorageError> {
        let (student, deck) = key_params(key)?;
        let res = sqlx::query(
            r"
            UPDATE daily_states
            SET new_introduced = new_introduced + 1
            WHERE student_id = ?1 AND deck_id = ?2 AND day = ?3
              AND new_introduced < new_limit
            ",
        )
        .bind(student)
        .bind(deck)
        .bind(key.date)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        if res.rows_affected() == 1 {
            return Ok(QuotaDecision::Granted);
        }
        match self.get_daily(key).await? {
            Some(_) => Ok(QuotaDecision::Denied),
            None => Err(StorageError::NotFound),
        }
    }

    async fn release_new(&self, key: DailyKey) -> Result<(), StorageError> {
        let (student, deck) = key_params(key)?;
        let res = sqlx::query(
            r"
            UPDATE daily_states
            SET new_introduced = MAX(new_introduced - 1, 0)
            WHERE student_id = ?1 AND deck_id = ?2 AND day = ?3
            ",
        )
        .bind(student)
        .bind(deck)
        .bind(key.date)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        require_row(&res)
    }

    async fn record_answer(&self, key: DailyKey, verdict: Verdict) -> Result<(), StorageError> {
        let (student, deck) = key_params(key)?;
        let res = sqlx::query(
            r"
            UPDATE daily_states
            SET answered = answered + 1,
                correct = correct + ?4
            WHERE student_id = ?1 AND deck_id = ?2 AND day = ?3
            ",
        )
        .bind(student)
        .bind(deck)
        .bind(key.date)
        .bind(i64::from(verdict.is_correct()))
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        require_row(&res)
    }

    async fn set_current_card(
        &self,
        key: DailyKey,
        card: Option<CardId>,
    ) -> Result<(), StorageError> {
        let (student, deck) = key_params(key)?;
        let card = card.map(|c| id_to_i64("card_id", c.value())).transpose()?;
        let res = sqlx::query(
            r"
            UPDATE daily_states
            SET current_card_id = ?4
            WHERE student_id = ?1 AND deck_id = ?2 AND day = ?3
            ",
        )
        .bind(student)
        .bind(deck)
        .bind(key.date)
        .bind(card)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        require_row(&res)
    }

    async fn mark_done(&self, key: DailyKey) -> Result<(), StorageError> {
        let (student, deck) = key_params(key)?;
        let res = sqlx::query(
            r"
            UPDATE daily_states
            SET done_for_today = 1, current_card_id = NULL
            WHERE student_id = ?1 AND deck_id = ?2 AND day = ?3
            ",
        )
        .bind(student)
        .bind(deck)
        .bind(key.date)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        require_row(&res)
    }
}
