//! Shared error types for the services crate.

use thiserror::Error;

use listen_core::model::{CardId, DeckError, DeckId, SessionTransitionError, StudentId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the study engine.
///
/// Running out of cards, quota denials and discarded concurrent starts are
/// outcomes, not errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StudyError {
    #[error("student {student} is not enrolled in deck {deck}")]
    UnknownEnrollment { student: StudentId, deck: DeckId },
    #[error("deck {0} does not exist")]
    UnknownDeck(DeckId),
    #[error("no deck matches this link")]
    UnknownDeckToken,
    #[error("card {0} does not exist")]
    UnknownCard(CardId),
    #[error("could not deliver to student {student}: {reason}")]
    DeliveryFailed { student: StudentId, reason: String },
    #[error(transparent)]
    Transition(#[from] SessionTransitionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `DeckAdminService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdminError {
    #[error("deck {0} does not exist")]
    UnknownDeck(DeckId),
    #[error("invalid deck manifest: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error(transparent)]
    Deck(#[from] DeckError),
    #[error(transparent)]
    Study(#[from] StudyError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Invalid configuration value, named by its environment variable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
