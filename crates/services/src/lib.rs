#![forbid(unsafe_code)]

pub mod app_services;
pub mod card_store;
pub mod config;
pub mod deck_service;
pub mod error;
pub mod quota;
pub mod scheduler;
pub mod sessions;
pub mod stats;
pub mod transport;

pub use listen_core::Clock;

pub use app_services::AppServices;
pub use card_store::CardStore;
pub use config::EngineConfig;
pub use deck_service::{DeckAdminService, ImportReport, ImportedCard, ImportedDeck, SkippedCard};
pub use error::{AdminError, AppServicesError, ConfigError, StudyError};
pub use quota::QuotaTracker;
pub use scheduler::DailyScheduler;
pub use stats::{ProgressStats, StatsService};
pub use transport::{DeliveryError, Feedback, Prompt, Transport};

pub use sessions::{
    AnswerOutcome, EnrollOutcome, FireReport, FlagOutcome, Presentation, StartOutcome,
    StartTrigger, StudyEngine,
};
