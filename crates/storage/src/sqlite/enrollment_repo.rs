use listen_core::model::{DeckId, Enrollment, StudentId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::mapping::{deck_id_from_i64, id_to_i64, ser, student_id_from_i64};
use super::{SqliteRepository, conn_err, write_err};
use crate::repository::{EnrollmentRepository, StorageError};

fn map_enrollment_row(row: &SqliteRow) -> Result<Enrollment, StorageError> {
    Ok(Enrollment::new(
        student_id_from_i64(row.try_get("student_id").map_err(ser)?)?,
        deck_id_from_i64(row.try_get("deck_id").map_err(ser)?)?,
        row.try_get("joined_at").map_err(ser)?,
    ))
}

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn enroll(&self, enrollment: &Enrollment) -> Result<bool, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO enrollments (student_id, deck_id, joined_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(student_id, deck_id) DO NOTHING
            ",
        )
        .bind(id_to_i64("student_id", enrollment.student.value())?)
        .bind(id_to_i64("deck_id", enrollment.deck_id.value())?)
        .bind(enrollment.joined_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(res.rows_affected() == 1)
    }

    async fn get_enrollment(
        &self,
        student: StudentId,
        deck_id: DeckId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT student_id, deck_id, joined_at
            FROM enrollments
            WHERE student_id = ?1 AND deck_id = ?2
            ",
        )
        .bind(id_to_i64("student_id", student.value())?)
        .bind(id_to_i64("deck_id", deck_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn_err)?;

        row.as_ref().map(map_enrollment_row).transpose()
    }

    async fn list_enrollments(&self, deck_id: DeckId) -> Result<Vec<Enrollment>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT student_id, deck_id, joined_at
            FROM enrollments
            WHERE deck_id = ?1
            ORDER BY joined_at ASC, student_id ASC
            ",
        )
        .bind(id_to_i64("deck_id", deck_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        rows.iter().map(map_enrollment_row).collect()
    }
}
