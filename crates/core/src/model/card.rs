use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CardId, DeckId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CardError {
    #[error("card must have at least one accepted answer")]
    NoAcceptedAnswer,

    #[error("media handle cannot be empty")]
    EmptyMediaHandle,

    #[error("unknown media kind: {0}")]
    UnknownMediaKind(String),
}

//
// ─── MEDIA ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    /// # Errors
    ///
    /// Returns `CardError::UnknownMediaKind` for anything but `audio`/`video`.
    pub fn parse(raw: &str) -> Result<Self, CardError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            other => Err(CardError::UnknownMediaKind(other.to_string())),
        }
    }
}

/// Opaque reference into the external media cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaRef {
    kind: MediaKind,
    handle: String,
}

impl MediaRef {
    /// # Errors
    ///
    /// Returns `CardError::EmptyMediaHandle` if `handle` is blank.
    pub fn new(kind: MediaKind, handle: impl Into<String>) -> Result<Self, CardError> {
        let handle = handle.into();
        if handle.trim().is_empty() {
            return Err(CardError::EmptyMediaHandle);
        }
        Ok(Self { kind, handle })
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    #[must_use]
    pub fn handle(&self) -> &str {
        &self.handle
    }
}

//
// ─── ACCEPTED ANSWERS ──────────────────────────────────────────────────────────
//

/// Primary answer plus alternatives, never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedAnswers {
    primary: String,
    alternatives: Vec<String>,
}

impl AcceptedAnswers {
    /// Separator between alternatives in imported answer fields.
    pub const DELIMITER: &'static str = "||";

    /// Split an imported answer field such as `"bonjour || salut"`.
    ///
    /// The first non-blank piece becomes the primary answer.
    ///
    /// # Errors
    ///
    /// Returns `CardError::NoAcceptedAnswer` if every piece is blank.
    pub fn parse(raw: &str) -> Result<Self, CardError> {
        let mut pieces = raw.split(Self::DELIMITER).map(str::to_string);
        let primary = pieces
            .by_ref()
            .find(|p| !p.trim().is_empty())
            .ok_or(CardError::NoAcceptedAnswer)?;
        Self::from_parts(primary, pieces.collect())
    }

    /// Build from an already split primary answer and alternatives.
    ///
    /// Blank alternatives and exact duplicates are dropped.
    ///
    /// # Errors
    ///
    /// Returns `CardError::NoAcceptedAnswer` if `primary` is blank.
    pub fn from_parts(primary: impl Into<String>, alternatives: Vec<String>) -> Result<Self, CardError> {
        let primary = primary.into().trim().to_string();
        if primary.is_empty() {
            return Err(CardError::NoAcceptedAnswer);
        }
        let mut kept: Vec<String> = Vec::with_capacity(alternatives.len());
        for alt in alternatives {
            let alt = alt.trim().to_string();
            if alt.is_empty() || alt == primary || kept.contains(&alt) {
                continue;
            }
            kept.push(alt);
        }
        Ok(Self {
            primary,
            alternatives: kept,
        })
    }

    #[must_use]
    pub fn primary(&self) -> &str {
        &self.primary
    }

    #[must_use]
    pub fn alternatives(&self) -> &[String] {
        &self.alternatives
    }

    /// Primary answer followed by alternatives.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.alternatives.iter().map(String::as_str))
    }
}

//
// ─── CARD ──────────────────────────────────────────────────────────────────────
//

/// One listening prompt of a deck.
///
/// `position` is the import order and drives rotation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    id: CardId,
    deck_id: DeckId,
    position: u32,
    media: MediaRef,
    answers: AcceptedAnswers,
    created_at: DateTime<Utc>,
}

impl Card {
    #[must_use]
    pub fn new(
        id: CardId,
        deck_id: DeckId,
        position: u32,
        media: MediaRef,
        answers: AcceptedAnswers,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            deck_id,
            position,
            media,
            answers,
            created_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> CardId {
        self.id
    }

    #[must_use]
    pub fn deck_id(&self) -> DeckId {
        self.deck_id
    }

    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    #[must_use]
    pub fn media(&self) -> &MediaRef {
        &self.media
    }

    #[must_use]
    pub fn answers(&self) -> &AcceptedAnswers {
        &self.answers
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_alternatives() {
        let answers = AcceptedAnswers::parse("bonjour || salut||  coucou ").unwrap();
        assert_eq!(answers.primary(), "bonjour");
        assert_eq!(answers.alternatives(), ["salut", "coucou"]);
        assert_eq!(answers.iter().count(), 3);
    }

    #[test]
    fn parse_skips_leading_blank_pieces() {
        let answers = AcceptedAnswers::parse(" || hello").unwrap();
        assert_eq!(answers.primary(), "hello");
        assert!(answers.alternatives().is_empty());
    }

    #[test]
    fn parse_rejects_all_blank() {
        assert_eq!(
            AcceptedAnswers::parse(" || ").unwrap_err(),
            CardError::NoAcceptedAnswer
        );
    }

    #[test]
    fn from_parts_drops_duplicates() {
        let answers = AcceptedAnswers::from_parts(
            "hello",
            vec!["hello".into(), "hi".into(), "hi".into(), " ".into()],
        )
        .unwrap();
        assert_eq!(answers.alternatives(), ["hi"]);
    }

    #[test]
    fn media_ref_requires_handle() {
        assert_eq!(
            MediaRef::new(MediaKind::Audio, "  ").unwrap_err(),
            CardError::EmptyMediaHandle
        );
        assert_eq!(MediaKind::parse("VIDEO").unwrap(), MediaKind::Video);
        assert!(MediaKind::parse("gif").is_err());
    }
}
