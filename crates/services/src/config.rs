use std::env;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use listen_core::model::{DeckSettings, parse_timezone};
use listen_core::time::DEFAULT_TRIGGER_TIME;

use crate::error::ConfigError;

pub const DB_URL_VAR: &str = "LISTEN_DB_URL";
pub const DEFAULT_TZ_VAR: &str = "LISTEN_DEFAULT_TZ";
pub const TRIGGER_TIME_VAR: &str = "LISTEN_TRIGGER_TIME";
pub const NEW_PER_DAY_VAR: &str = "LISTEN_NEW_PER_DAY";
pub const AUTO_ADVANCE_VAR: &str = "LISTEN_AUTO_ADVANCE_MS";
pub const CATCH_UP_VAR: &str = "LISTEN_CATCH_UP_ON_START";

/// Runtime settings for the engine and the defaults given to imported decks.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub database_url: String,
    pub default_timezone: Tz,
    pub trigger_time: NaiveTime,
    pub new_per_day: u32,
    pub auto_advance: Duration,
    pub catch_up_on_start: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://listen.sqlite3".into(),
            default_timezone: chrono_tz::Europe::Kyiv,
            trigger_time: DEFAULT_TRIGGER_TIME,
            new_per_day: 10,
            auto_advance: Duration::from_secs(1),
            catch_up_on_start: true,
        }
    }
}

fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, raw, "expected true or false")),
    }
}

impl EngineConfig {
    /// Load from `LISTEN_*` environment variables, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first malformed variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load using `lookup` in place of the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first malformed variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(DB_URL_VAR) {
            config.database_url = url.trim().to_string();
        }
        if let Some(raw) = get(DEFAULT_TZ_VAR) {
            config.default_timezone =
                parse_timezone(&raw).map_err(|e| invalid(DEFAULT_TZ_VAR, &raw, e.to_string()))?;
        }
        if let Some(raw) = get(TRIGGER_TIME_VAR) {
            config.trigger_time = NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .map_err(|_| invalid(TRIGGER_TIME_VAR, &raw, "expected HH:MM"))?;
        }
        if let Some(raw) = get(NEW_PER_DAY_VAR) {
            let n: u32 = raw
                .trim()
                .parse()
                .map_err(|_| invalid(NEW_PER_DAY_VAR, &raw, "expected a whole number"))?;
            DeckSettings::new(n, config.trigger_time, config.default_timezone)
                .map_err(|e| invalid(NEW_PER_DAY_VAR, &raw, e.to_string()))?;
            config.new_per_day = n;
        }
        if let Some(raw) = get(AUTO_ADVANCE_VAR) {
            let ms: u64 = raw
                .trim()
                .parse()
                .map_err(|_| invalid(AUTO_ADVANCE_VAR, &raw, "expected milliseconds"))?;
            config.auto_advance = Duration::from_millis(ms);
        }
        if let Some(raw) = get(CATCH_UP_VAR) {
            config.catch_up_on_start = parse_bool(CATCH_UP_VAR, &raw)?;
        }

        Ok(config)
    }

    /// Settings given to a freshly imported deck.
    ///
    /// `timezone` and `new_per_day` override the configured defaults.
    ///
    /// # Errors
    ///
    /// Returns `DeckError::InvalidNewPerDay` for an out-of-range override.
    pub fn deck_settings(
        &self,
        timezone: Option<Tz>,
        new_per_day: Option<u32>,
    ) -> Result<DeckSettings, listen_core::model::DeckError> {
        DeckSettings::new(
            new_per_day.unwrap_or(self.new_per_day),
            self.trigger_time,
            timezone.unwrap_or(self.default_timezone),
        )
    }
}
