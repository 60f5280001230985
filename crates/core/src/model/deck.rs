use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use std::fmt;
use thiserror::Error;

use crate::model::ids::{AdminId, DeckId};
use crate::time::{self, DEFAULT_TRIGGER_TIME};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeckError {
    #[error("deck title cannot be empty")]
    EmptyTitle,

    #[error("new cards per day must be between 1 and {max}, got {provided}")]
    InvalidNewPerDay { provided: u32, max: u32 },

    #[error("deck token must be 8-64 characters of [A-Za-z0-9_-]")]
    InvalidToken,

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
}

//
// ─── TOKEN ─────────────────────────────────────────────────────────────────────
//

/// Shareable secret a student uses to join a deck.
///
/// Restricted to characters that survive chat deep links unchanged.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DeckToken(String);

impl DeckToken {
    /// Prefix carried by deep-link payloads (`deck_<token>`).
    pub const PAYLOAD_PREFIX: &'static str = "deck_";

    /// Validate a raw token.
    ///
    /// # Errors
    ///
    /// Returns `DeckError::InvalidToken` for empty, oversized or non URL-safe input.
    pub fn new(raw: impl Into<String>) -> Result<Self, DeckError> {
        let raw = raw.into();
        let valid_len = (8..=64).contains(&raw.len());
        let valid_chars = raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid_len && valid_chars {
            Ok(Self(raw))
        } else {
            Err(DeckError::InvalidToken)
        }
    }

    /// Extract the token from a deep-link payload or a bare token.
    #[must_use]
    pub fn from_payload(payload: &str) -> Option<Self> {
        let payload = payload.trim();
        let raw = payload
            .strip_prefix(Self::PAYLOAD_PREFIX)
            .unwrap_or(payload);
        Self::new(raw).ok()
    }

    /// Payload to embed in a join link.
    #[must_use]
    pub fn payload(&self) -> String {
        format!("{}{}", Self::PAYLOAD_PREFIX, self.0)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeckToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeckToken(..)")
    }
}

impl fmt::Display for DeckToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Scheduling parameters shared by every student of a deck.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckSettings {
    new_per_day: u32,
    trigger_time: NaiveTime,
    timezone: Tz,
}

impl DeckSettings {
    /// Upper bound accepted for `new_per_day`.
    pub const MAX_NEW_PER_DAY: u32 = 500;

    /// Creates validated settings.
    ///
    /// # Errors
    ///
    /// Returns `DeckError::InvalidNewPerDay` if `new_per_day` is outside `1..=500`.
    pub fn new(new_per_day: u32, trigger_time: NaiveTime, timezone: Tz) -> Result<Self, DeckError> {
        validate_new_per_day(new_per_day)?;
        Ok(Self {
            new_per_day,
            trigger_time,
            timezone,
        })
    }

    /// Ten new cards a day, triggered at 07:00 in `timezone`.
    #[must_use]
    pub fn default_in(timezone: Tz) -> Self {
        Self {
            new_per_day: 10,
            trigger_time: DEFAULT_TRIGGER_TIME,
            timezone,
        }
    }

    #[must_use]
    pub fn new_per_day(&self) -> u32 {
        self.new_per_day
    }

    #[must_use]
    pub fn trigger_time(&self) -> NaiveTime {
        self.trigger_time
    }

    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

fn validate_new_per_day(n: u32) -> Result<(), DeckError> {
    if n == 0 || n > DeckSettings::MAX_NEW_PER_DAY {
        return Err(DeckError::InvalidNewPerDay {
            provided: n,
            max: DeckSettings::MAX_NEW_PER_DAY,
        });
    }
    Ok(())
}

/// Parse an IANA timezone name such as `Europe/Kyiv`.
///
/// # Errors
///
/// Returns `DeckError::UnknownTimezone` when the name is not in the tz database.
pub fn parse_timezone(name: &str) -> Result<Tz, DeckError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| DeckError::UnknownTimezone(name.to_string()))
}

//
// ─── DECK ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq)]
pub struct Deck {
    id: DeckId,
    owner: AdminId,
    title: String,
    token: DeckToken,
    settings: DeckSettings,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl Deck {
    /// Creates a new active deck.
    ///
    /// # Errors
    ///
    /// Returns `DeckError::EmptyTitle` if the title is blank.
    pub fn new(
        id: DeckId,
        owner: AdminId,
        title: impl Into<String>,
        token: DeckToken,
        settings: DeckSettings,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DeckError> {
        Self::from_persisted(id, owner, title, token, settings, true, created_at)
    }

    /// Rehydrate a deck from storage.
    ///
    /// # Errors
    ///
    /// Returns `DeckError::EmptyTitle` if the title is blank.
    pub fn from_persisted(
        id: DeckId,
        owner: AdminId,
        title: impl Into<String>,
        token: DeckToken,
        settings: DeckSettings,
        is_active: bool,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DeckError> {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(DeckError::EmptyTitle);
        }
        Ok(Self {
            id,
            owner,
            title,
            token,
            settings,
            is_active,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> DeckId {
        self.id
    }

    #[must_use]
    pub fn owner(&self) -> AdminId {
        self.owner
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn token(&self) -> &DeckToken {
        &self.token
    }

    #[must_use]
    pub fn settings(&self) -> &DeckSettings {
        &self.settings
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Today's calendar date in the deck's timezone.
    #[must_use]
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        time::local_date(now, self.settings.timezone)
    }

    /// Next absolute instant of the deck's daily trigger.
    #[must_use]
    pub fn next_trigger_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        time::next_trigger_after(now, self.settings.trigger_time, self.settings.timezone)
    }

    #[must_use]
    pub fn trigger_passed_today(&self, now: DateTime<Utc>) -> bool {
        time::trigger_passed_today(now, self.settings.trigger_time, self.settings.timezone)
    }

    /// Change the daily new-card quota.
    ///
    /// Already-created daily states keep the quota they were created with.
    ///
    /// # Errors
    ///
    /// Returns `DeckError::InvalidNewPerDay` if `n` is outside `1..=500`.
    pub fn set_new_per_day(&mut self, n: u32) -> Result<(), DeckError> {
        validate_new_per_day(n)?;
        self.settings.new_per_day = n;
        Ok(())
    }

    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    pub fn replace_token(&mut self, token: DeckToken) {
        self.token = token;
    }
}
