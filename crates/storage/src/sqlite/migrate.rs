use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS decks (
            id INTEGER PRIMARY KEY,
            owner_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            token TEXT NOT NULL UNIQUE,
            new_per_day INTEGER NOT NULL CHECK (new_per_day BETWEEN 1 AND 500),
            trigger_time TEXT NOT NULL,
            timezone TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS cards (
            id INTEGER PRIMARY KEY,
            deck_id INTEGER NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            media_kind TEXT NOT NULL,
            media_handle TEXT NOT NULL,
            primary_answer TEXT NOT NULL,
            alternatives TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS enrollments (
            student_id INTEGER NOT NULL,
            deck_id INTEGER NOT NULL,
            joined_at TEXT NOT NULL,
            PRIMARY KEY (student_id, deck_id),
            FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS progress (
            student_id INTEGER NOT NULL,
            card_id INTEGER NOT NULL,
            deck_id INTEGER NOT NULL,
            state TEXT NOT NULL,
            introduced_on TEXT,
            last_seen_on TEXT,
            times_seen INTEGER NOT NULL DEFAULT 0 CHECK (times_seen >= 0),
            last_answer TEXT,
            last_verdict TEXT,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (student_id, card_id),
            FOREIGN KEY (card_id) REFERENCES cards(id) ON DELETE CASCADE,
            FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS daily_states (
            student_id INTEGER NOT NULL,
            deck_id INTEGER NOT NULL,
            day TEXT NOT NULL,
            new_limit INTEGER NOT NULL CHECK (new_limit >= 0),
            new_introduced INTEGER NOT NULL DEFAULT 0
                CHECK (new_introduced >= 0 AND new_introduced <= new_limit),
            answered INTEGER NOT NULL DEFAULT 0,
            correct INTEGER NOT NULL DEFAULT 0,
            done_for_today INTEGER NOT NULL DEFAULT 0,
            current_card_id INTEGER,
            PRIMARY KEY (student_id, deck_id, day),
            FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS flags (
            id INTEGER PRIMARY KEY,
            student_id INTEGER NOT NULL,
            deck_id INTEGER NOT NULL,
            card_id INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (card_id) REFERENCES cards(id) ON DELETE CASCADE,
            FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_cards_deck_position
            ON cards(deck_id, position, id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_progress_student_deck
            ON progress(student_id, deck_id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_flags_deck_card
            ON flags(deck_id, card_id);
    ",
];

/// Runs the schema migrations that have not been applied yet.
///
/// Version 1 creates decks, cards, enrollments, per-student progress, daily
/// states and flags.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        log::info!("applied schema migration v1");
    }

    Ok(())
}
