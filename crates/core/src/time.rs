use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// A simple clock abstraction for deterministic time in services and tests.
///
/// `Manual` is shared between clones: advancing one moves every service
/// holding a copy.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
    Manual(Arc<Mutex<DateTime<Utc>>>),
}

impl Clock {
    /// Returns a clock that uses the current system time.
    #[must_use]
    pub fn default_clock() -> Self {
        Self::Default
    }

    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns a clock starting at `at` that only moves through
    /// [`Clock::advance`], on this handle or any clone of it.
    #[must_use]
    pub fn manual(at: DateTime<Utc>) -> Self {
        Self::Manual(Arc::new(Mutex::new(at)))
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
            Clock::Manual(shared) => *shared.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// If this is a fixed or manual clock, advance it by the given duration.
    ///
    /// Has no effect on `Clock::Default`.
    pub fn advance(&mut self, delta: Duration) {
        match self {
            Clock::Default => {}
            Clock::Fixed(t) => *t += delta,
            Clock::Manual(shared) => {
                *shared.lock().unwrap_or_else(PoisonError::into_inner) += delta;
            }
        }
    }

    /// Returns true if this clock is fixed.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Clock::Fixed(_))
    }
}

//
// ─── CALENDAR HELPERS ──────────────────────────────────────────────────────────
//

/// Default local time at which a deck's daily trigger fires.
pub const DEFAULT_TRIGGER_TIME: NaiveTime = match NaiveTime::from_hms_opt(7, 0, 0) {
    Some(t) => t,
    None => NaiveTime::MIN,
};

/// Calendar date of `at` as seen on a wall clock in `tz`.
#[must_use]
pub fn local_date(at: DateTime<Utc>, tz: Tz) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// Absolute instant of `time` on `date` in `tz`.
///
/// Ambiguous local times (clocks turned back) resolve to the earlier
/// instant. Local times inside a daylight-saving gap move forward to the
/// first representable wall-clock time after the gap.
#[must_use]
pub fn trigger_instant(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(time);
    if let Some(at) = resolve_local(naive, tz) {
        return at;
    }
    // Gaps are at most two hours in every zone in use.
    for minutes in (15..=120).step_by(15) {
        if let Some(at) = resolve_local(naive + Duration::minutes(minutes), tz) {
            return at;
        }
    }
    Utc.from_utc_datetime(&naive)
}

fn resolve_local(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(at) => Some(at.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// Next instant strictly after `now` at which the local clock in `tz` shows `time`.
#[must_use]
pub fn next_trigger_after(now: DateTime<Utc>, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let today = local_date(now, tz);
    let candidate = trigger_instant(today, time, tz);
    if now < candidate {
        return candidate;
    }
    today
        .succ_opt()
        .map_or(candidate, |tomorrow| trigger_instant(tomorrow, time, tz))
}

/// True once today's trigger in `tz` has already been reached.
#[must_use]
pub fn trigger_passed_today(now: DateTime<Utc>, time: NaiveTime, tz: Tz) -> bool {
    now >= trigger_instant(local_date(now, tz), time, tz)
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::{America::New_York, Asia::Tokyo, Europe::Kyiv};

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn local_date_depends_on_zone() {
        let at = utc(2024, 3, 1, 23, 30);
        assert_eq!(local_date(at, Tokyo), date(2024, 3, 2));
        assert_eq!(local_date(at, New_York), date(2024, 3, 1));
    }

    #[test]
    fn next_trigger_same_day_before_seven() {
        // 04:00 in Kyiv (UTC+2 in winter).
        let now = utc(2024, 1, 10, 2, 0);
        let next = next_trigger_after(now, DEFAULT_TRIGGER_TIME, Kyiv);
        assert_eq!(next, utc(2024, 1, 10, 5, 0));
    }

    #[test]
    fn next_trigger_rolls_to_tomorrow_at_or_after_seven() {
        let now = utc(2024, 1, 10, 5, 0);
        let next = next_trigger_after(now, DEFAULT_TRIGGER_TIME, Kyiv);
        assert_eq!(next, utc(2024, 1, 11, 5, 0));
    }

    #[test]
    fn dst_shift_keeps_local_hour() {
        // New York springs forward on 2024-03-10.
        let before = trigger_instant(date(2024, 3, 9), DEFAULT_TRIGGER_TIME, New_York);
        let after = trigger_instant(date(2024, 3, 10), DEFAULT_TRIGGER_TIME, New_York);
        assert_eq!(before, utc(2024, 3, 9, 12, 0));
        assert_eq!(after, utc(2024, 3, 10, 11, 0));
        assert_eq!(after - before, Duration::hours(23));
    }

    #[test]
    fn gap_time_moves_forward() {
        // 02:30 does not exist in New York on 2024-03-10.
        let gap = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        let at = trigger_instant(date(2024, 3, 10), gap, New_York);
        assert_eq!(at.with_timezone(&New_York).time(), NaiveTime::from_hms_opt(3, 0, 0).unwrap());
    }

    #[test]
    fn trigger_passed_today_flips_at_trigger() {
        assert!(!trigger_passed_today(utc(2024, 1, 10, 4, 59), DEFAULT_TRIGGER_TIME, Kyiv));
        assert!(trigger_passed_today(utc(2024, 1, 10, 5, 0), DEFAULT_TRIGGER_TIME, Kyiv));
    }

    #[test]
    fn fixed_clock_advances() {
        let mut clock = fixed_clock();
        clock.advance(Duration::days(1));
        assert_eq!(clock.now(), fixed_now() + Duration::days(1));
    }

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let mut driver = Clock::manual(fixed_now());
        let observer = driver.clone();
        driver.advance(Duration::hours(25));
        assert_eq!(observer.now(), fixed_now() + Duration::hours(25));
        assert!(!observer.is_fixed());
    }
}
