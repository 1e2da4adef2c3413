//! Day-of-week / time-of-day operating window.
//!
//! All times are UTC. Windows never wrap midnight.

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use thiserror::Error;

/// True iff `now_utc` falls on a business day (`weekday < weekday_limit`,
/// Monday = 0) and `window_start <= time_of_day <= window_end`, both ends
/// inclusive.
#[must_use]
pub fn is_open(
    now_utc: DateTime<Utc>,
    weekday_limit: u32,
    window_start: NaiveTime,
    window_end: NaiveTime,
) -> bool {
    let time_of_day = now_utc.time();
    now_utc.weekday().num_days_from_monday() < weekday_limit
        && window_start <= time_of_day
        && time_of_day <= window_end
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("weekday limit must be between 1 and 7, got {0}")]
    WeekdayLimit(u32),
    #[error("session start {start} is after session end {end}; windows cannot cross midnight")]
    Inverted { start: NaiveTime, end: NaiveTime },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    weekday_limit: u32,
    start: NaiveTime,
    end: NaiveTime,
}

impl SessionWindow {
    pub fn new(weekday_limit: u32, start: NaiveTime, end: NaiveTime) -> Result<Self, ScheduleError> {
        if !(1..=7).contains(&weekday_limit) {
            return Err(ScheduleError::WeekdayLimit(weekday_limit));
        }
        if start > end {
            return Err(ScheduleError::Inverted { start, end });
        }
        Ok(Self {
            weekday_limit,
            start,
            end,
        })
    }

    #[must_use]
    pub fn contains(&self, now_utc: DateTime<Utc>) -> bool {
        is_open(now_utc, self.weekday_limit, self.start, self.end)
    }

    pub fn weekday_limit(&self) -> u32 {
        self.weekday_limit
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }
}

impl std::fmt::Display for SessionWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{} UTC, first {} weekdays",
            self.start.format("%H:%M:%S"),
            self.end.format("%H:%M:%S"),
            self.weekday_limit
        )
    }
}

/// Whether an instrument trades around the clock or only inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePolicy {
    /// 24/7 instrument. The engine skips the gate entirely.
    AlwaysOpen,
    Session(SessionWindow),
}

/// Source of "now" for the engine loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
