mod card;
mod daily;
mod deck;
mod enrollment;
mod ids;
mod progress;
mod session;

pub use ids::{AdminId, CardId, DeckId, ParseIdError, StudentId};

pub use card::{AcceptedAnswers, Card, CardError, MediaKind, MediaRef};
pub use daily::{DailyKey, DailyState, QuotaDecision};
pub use deck::{Deck, DeckError, DeckSettings, DeckToken, parse_timezone};
pub use enrollment::{Enrollment, Flag, FlagSummary};
pub use progress::{CardState, Progress};
pub use session::{Session, SessionPhase, SessionTransitionError};
