//! World calendar and time-of-day classification.
//!
//! The calendar is deliberately simple:
//! - 60 minutes per hour, 24 hours per day
//! - 30 days per month, 12 months per year
//! - Totals count a year as 365 days, so `total_minutes` leaves a gap at every
//!   year boundary but stays strictly ordered

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Minutes in an hour.
pub const MINUTES_PER_HOUR: u64 = 60;
/// Hours in a day.
pub const HOURS_PER_DAY: u64 = 24;
/// Days in a month.
pub const DAYS_PER_MONTH: u64 = 30;
/// Months in a year.
pub const MONTHS_PER_YEAR: u64 = 12;
/// Minutes in a day.
pub const MINUTES_PER_DAY: u64 = MINUTES_PER_HOUR * HOURS_PER_DAY;
/// Days counted per year by [`GameTime::total_minutes`].
const DAYS_PER_YEAR_TOTAL: u64 = 365;

/// Invalid calendar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimeError {
    /// Year must be at least 1
    #[error("year must be at least 1")]
    InvalidYear,
    /// Month outside 1-12
    #[error("month {0} is outside 1-12")]
    InvalidMonth(u8),
    /// Day outside 1-30
    #[error("day {0} is outside 1-30")]
    InvalidDay(u8),
    /// Hour outside 0-23
    #[error("hour {0} is outside 0-23")]
    InvalidHour(u8),
    /// Minute outside 0-59
    #[error("minute {0} is outside 0-59")]
    InvalidMinute(u8),
}

/// A point on the world calendar.
///
/// Always holds a valid date; construct through [`GameTime::new`] or
/// [`GameTime::default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameTime {
    year: u32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
}

impl Default for GameTime {
    /// Year 1, month 1, day 1, 06:00.
    fn default() -> Self {
        Self {
            year: 1,
            month: 1,
            day: 1,
            hour: 6,
            minute: 0,
        }
    }
}

impl PartialOrd for GameTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GameTime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.total_minutes().cmp(&other.total_minutes())
    }
}

impl GameTime {
    /// Creates a validated calendar time.
    pub fn new(year: u32, month: u8, day: u8, hour: u8, minute: u8) -> Result<Self, TimeError> {
        if year == 0 {
            return Err(TimeError::InvalidYear);
        }
        if !(1..=12).contains(&month) {
            return Err(TimeError::InvalidMonth(month));
        }
        if !(1..=30).contains(&day) {
            return Err(TimeError::InvalidDay(day));
        }
        if hour > 23 {
            return Err(TimeError::InvalidHour(hour));
        }
        if minute > 59 {
            return Err(TimeError::InvalidMinute(minute));
        }
        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
        })
    }

    /// Get the year (1+).
    #[must_use]
    pub const fn year(&self) -> u32 {
        self.year
    }

    /// Get the month (1-12).
    #[must_use]
    pub const fn month(&self) -> u8 {
        self.month
    }

    /// Get the day of the month (1-30).
    #[must_use]
    pub const fn day(&self) -> u8 {
        self.day
    }

    /// Get the hour (0-23).
    #[must_use]
    pub const fn hour(&self) -> u8 {
        self.hour
    }

    /// Get the minute (0-59).
    #[must_use]
    pub const fn minute(&self) -> u8 {
        self.minute
    }

    /// Minutes since year 1, month 1, day 1, 00:00.
    #[must_use]
    pub fn total_minutes(&self) -> u64 {
        let days = (u64::from(self.year) - 1) * DAYS_PER_YEAR_TOTAL
            + (u64::from(self.month) - 1) * DAYS_PER_MONTH
            + (u64::from(self.day) - 1);
        days * MINUTES_PER_DAY + u64::from(self.hour) * MINUTES_PER_HOUR + u64::from(self.minute)
    }

    /// Advances by `minutes`, carrying into hours, days, months and years.
    ///
    /// Saturates at the end of the representable calendar.
    pub fn advance(&mut self, minutes: u64) {
        let minute_total = u64::from(self.minute).saturating_add(minutes);
        self.minute = (minute_total % MINUTES_PER_HOUR) as u8;

        let hour_total = u64::from(self.hour) + minute_total / MINUTES_PER_HOUR;
        self.hour = (hour_total % HOURS_PER_DAY) as u8;

        let day_total = u64::from(self.day) - 1 + hour_total / HOURS_PER_DAY;
        self.day = (day_total % DAYS_PER_MONTH) as u8 + 1;

        let month_total = u64::from(self.month) - 1 + day_total / DAYS_PER_MONTH;
        self.month = (month_total % MONTHS_PER_YEAR) as u8 + 1;

        let years = month_total / MONTHS_PER_YEAR;
        self.year = u32::try_from(u64::from(self.year) + years).unwrap_or(u32::MAX);
    }

    /// Returns a copy advanced by `minutes`.
    #[must_use]
    pub fn plus_minutes(mut self, minutes: u64) -> Self {
        self.advance(minutes);
        self
    }

    /// Get the time-of-day bucket.
    #[must_use]
    pub const fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay::from_hour(self.hour)
    }

    /// Get the season.
    #[must_use]
    pub const fn season(&self) -> Season {
        Season::from_month(self.month)
    }

    /// Check if it's daytime (dawn through afternoon).
    #[must_use]
    pub const fn is_daytime(&self) -> bool {
        self.time_of_day().is_daytime()
    }

    /// Serializes into a notification payload value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "year": self.year,
            "month": self.month,
            "day": self.day,
            "hour": self.hour,
            "minute": self.minute,
            "time_of_day": self.time_of_day().name(),
            "season": self.season().name(),
        })
    }
}

impl fmt::Display for GameTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02} - Day {}, Month {}, Year {}",
            self.hour, self.minute, self.day, self.month, self.year
        )
    }
}

/// Time-of-day bucket derived from the hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    /// 05:00-06:59
    Dawn,
    /// 07:00-09:59
    Morning,
    /// 10:00-13:59
    Midday,
    /// 14:00-16:59
    Afternoon,
    /// 17:00-18:59
    Dusk,
    /// 19:00-21:59
    Evening,
    /// 22:00-01:59
    Night,
    /// 02:00-04:59
    Midnight,
}

impl TimeOfDay {
    /// Classifies an hour. Hours past 23 wrap.
    #[must_use]
    pub const fn from_hour(hour: u8) -> Self {
        match hour % 24 {
            5 | 6 => Self::Dawn,
            7..=9 => Self::Morning,
            10..=13 => Self::Midday,
            14..=16 => Self::Afternoon,
            17 | 18 => Self::Dusk,
            19..=21 => Self::Evening,
            2..=4 => Self::Midnight,
            _ => Self::Night,
        }
    }

    /// Lowercase name used in payloads.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dawn => "dawn",
            Self::Morning => "morning",
            Self::Midday => "midday",
            Self::Afternoon => "afternoon",
            Self::Dusk => "dusk",
            Self::Evening => "evening",
            Self::Night => "night",
            Self::Midnight => "midnight",
        }
    }

    /// Dawn, morning, midday and afternoon count as daytime.
    #[must_use]
    pub const fn is_daytime(self) -> bool {
        matches!(self, Self::Dawn | Self::Morning | Self::Midday | Self::Afternoon)
    }

    /// Sub-notification announced when this bucket is entered, if any.
    #[must_use]
    pub const fn transition_label(self) -> Option<&'static str> {
        match self {
            Self::Dawn => Some("sunrise"),
            Self::Dusk => Some("sunset"),
            Self::Midnight => Some("midnight"),
            _ => None,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Season derived from the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    /// Months 3-5
    Spring,
    /// Months 6-8
    Summer,
    /// Months 9-11
    Autumn,
    /// Months 12, 1, 2
    Winter,
}

impl Season {
    /// Classifies a month.
    #[must_use]
    pub const fn from_month(month: u8) -> Self {
        match month {
            3..=5 => Self::Spring,
            6..=8 => Self::Summer,
            9..=11 => Self::Autumn,
            _ => Self::Winter,
        }
    }

    /// Lowercase name used in payloads.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Spring => "spring",
            Self::Summer => "summer",
            Self::Autumn => "autumn",
            Self::Winter => "winter",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
