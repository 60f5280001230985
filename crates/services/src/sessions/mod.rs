mod engine;
mod outcome;
mod slots;

// Public API of the session subsystem.
pub use crate::error::StudyError;
pub use engine::StudyEngine;
pub use outcome::{
    AnswerOutcome, EnrollOutcome, FireReport, FlagOutcome, Presentation, StartOutcome,
    StartTrigger,
};
