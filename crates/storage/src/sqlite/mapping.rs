use chrono::{DateTime, NaiveTime, Utc};
use listen_core::matcher::Verdict;
use listen_core::model::{
    AcceptedAnswers, AdminId, Card, CardId, CardState, DailyKey, DailyState, Deck, DeckId,
    DeckSettings, DeckToken, MediaKind, MediaRef, Progress, StudentId, parse_timezone,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn deck_id_from_i64(v: i64) -> Result<DeckId, StorageError> {
    Ok(DeckId::new(i64_to_u64("deck_id", v)?))
}

pub(crate) fn card_id_from_i64(v: i64) -> Result<CardId, StorageError> {
    Ok(CardId::new(i64_to_u64("card_id", v)?))
}

pub(crate) fn student_id_from_i64(v: i64) -> Result<StudentId, StorageError> {
    Ok(StudentId::new(i64_to_u64("student_id", v)?))
}

pub(crate) fn time_to_text(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

fn time_from_text(raw: &str) -> Result<NaiveTime, StorageError> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|_| StorageError::Serialization(format!("invalid trigger_time: {raw}")))
}

pub(crate) fn alternatives_to_json(answers: &AcceptedAnswers) -> Result<String, StorageError> {
    serde_json::to_string(answers.alternatives()).map_err(ser)
}

pub(crate) fn map_deck_row(row: &SqliteRow) -> Result<Deck, StorageError> {
    let new_per_day = i64_to_u32("new_per_day", row.try_get("new_per_day").map_err(ser)?)?;
    let trigger_time = time_from_text(&row.try_get::<String, _>("trigger_time").map_err(ser)?)?;
    let timezone = parse_timezone(&row.try_get::<String, _>("timezone").map_err(ser)?).map_err(ser)?;
    let settings = DeckSettings::new(new_per_day, trigger_time, timezone).map_err(ser)?;
    let token = DeckToken::new(row.try_get::<String, _>("token").map_err(ser)?).map_err(ser)?;

    Deck::from_persisted(
        deck_id_from_i64(row.try_get("id").map_err(ser)?)?,
        AdminId::new(i64_to_u64("owner_id", row.try_get("owner_id").map_err(ser)?)?),
        row.try_get::<String, _>("title").map_err(ser)?,
        token,
        settings,
        row.try_get::<i64, _>("is_active").map_err(ser)? != 0,
        row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_card_row(row: &SqliteRow) -> Result<Card, StorageError> {
    let kind = MediaKind::parse(&row.try_get::<String, _>("media_kind").map_err(ser)?).map_err(ser)?;
    let media = MediaRef::new(kind, row.try_get::<String, _>("media_handle").map_err(ser)?)
        .map_err(ser)?;
    let alternatives: Vec<String> =
        serde_json::from_str(&row.try_get::<String, _>("alternatives").map_err(ser)?)
            .map_err(ser)?;
    let answers = AcceptedAnswers::from_parts(
        row.try_get::<String, _>("primary_answer").map_err(ser)?,
        alternatives,
    )
    .map_err(ser)?;

    Ok(Card::new(
        card_id_from_i64(row.try_get("id").map_err(ser)?)?,
        deck_id_from_i64(row.try_get("deck_id").map_err(ser)?)?,
        i64_to_u32("position", row.try_get("position").map_err(ser)?)?,
        media,
        answers,
        row.try_get("created_at").map_err(ser)?,
    ))
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<Progress, StorageError> {
    let state_raw: String = row.try_get("state").map_err(ser)?;
    let state = CardState::parse(&state_raw)
        .ok_or_else(|| StorageError::Serialization(format!("invalid state: {state_raw}")))?;
    let last_verdict = row
        .try_get::<Option<String>, _>("last_verdict")
        .map_err(ser)?
        .map(|raw| {
            Verdict::parse(&raw)
                .ok_or_else(|| StorageError::Serialization(format!("invalid verdict: {raw}")))
        })
        .transpose()?;

    Ok(Progress {
        student: student_id_from_i64(row.try_get("student_id").map_err(ser)?)?,
        deck_id: deck_id_from_i64(row.try_get("deck_id").map_err(ser)?)?,
        card_id: card_id_from_i64(row.try_get("card_id").map_err(ser)?)?,
        state,
        introduced_on: row.try_get("introduced_on").map_err(ser)?,
        last_seen_on: row.try_get("last_seen_on").map_err(ser)?,
        times_seen: i64_to_u32("times_seen", row.try_get("times_seen").map_err(ser)?)?,
        last_answer: row.try_get("last_answer").map_err(ser)?,
        last_verdict,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

pub(crate) fn map_daily_row(row: &SqliteRow) -> Result<DailyState, StorageError> {
    let key = DailyKey::new(
        student_id_from_i64(row.try_get("student_id").map_err(ser)?)?,
        deck_id_from_i64(row.try_get("deck_id").map_err(ser)?)?,
        row.try_get("day").map_err(ser)?,
    );
    Ok(DailyState {
        key,
        new_limit: i64_to_u32("new_limit", row.try_get("new_limit").map_err(ser)?)?,
        new_introduced: i64_to_u32("new_introduced", row.try_get("new_introduced").map_err(ser)?)?,
        answered: i64_to_u32("answered", row.try_get("answered").map_err(ser)?)?,
        correct: i64_to_u32("correct", row.try_get("correct").map_err(ser)?)?,
        done_for_today: row.try_get::<i64, _>("done_for_today").map_err(ser)? != 0,
        current_card: row
            .try_get::<Option<i64>, _>("current_card_id")
            .map_err(ser)?
            .map(card_id_from_i64)
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_time_text_roundtrip() {
        let t = NaiveTime::from_hms_opt(7, 0, 0).unwrap();
        assert_eq!(time_to_text(t), "07:00");
        assert_eq!(time_from_text("07:00").unwrap(), t);
        assert!(time_from_text("7am").is_err());
    }

    #[test]
    fn negative_ids_are_rejected() {
        assert!(deck_id_from_i64(-1).is_err());
        assert_eq!(card_id_from_i64(5).unwrap(), CardId::new(5));
        assert!(id_to_i64("card_id", u64::MAX).is_err());
    }
}
