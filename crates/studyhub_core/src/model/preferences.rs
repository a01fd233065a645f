//! User notification preferences.
//!
//! Owned by user settings outside this crate; the scheduler only reads
//! snapshots of it.

use chrono::{FixedOffset, NaiveTime, Offset, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

static TIME_OF_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)(?::[0-5]\d)?$").expect("static time-of-day regex")
});

/// Wall-clock time with minute precision, serialized as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self, PreferencesError> {
        if hour > 23 || minute > 59 {
            return Err(PreferencesError::InvalidTimeOfDay(format!("{hour}:{minute}")));
        }
        Ok(Self { hour, minute })
    }

    pub fn parse(value: &str) -> Result<Self, PreferencesError> {
        let trimmed = value.trim();
        let captures = TIME_OF_DAY_RE
            .captures(trimmed)
            .ok_or_else(|| PreferencesError::InvalidTimeOfDay(trimmed.to_string()))?;
        let hour = captures[1]
            .parse::<u32>()
            .map_err(|_| PreferencesError::InvalidTimeOfDay(trimmed.to_string()))?;
        let minute = captures[2]
            .parse::<u32>()
            .map_err(|_| PreferencesError::InvalidTimeOfDay(trimmed.to_string()))?;
        Self::new(hour, minute)
    }

    pub fn to_naive(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }

    pub fn from_naive(time: NaiveTime) -> Self {
        Self {
            hour: time.hour(),
            minute: time.minute(),
        }
    }

    pub fn hour(self) -> u32 {
        self.hour
    }

    pub fn minute(self) -> u32 {
        self.minute
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = PreferencesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        format!("{:02}:{:02}", value.hour, value.minute)
    }
}

/// Daily window during which fires are deferred to `end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    /// Weekdays (0 = Sunday) on which the window starts. Empty = every day.
    #[serde(default)]
    pub days: Vec<u8>,
}

impl QuietHours {
    pub fn every_day(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self {
            start,
            end,
            days: Vec::new(),
        }
    }

    pub fn crosses_midnight(&self) -> bool {
        self.start > self.end
    }

    pub fn starts_on(&self, weekday_from_sunday: u32) -> bool {
        self.days.is_empty()
            || self
                .days
                .iter()
                .any(|day| u32::from(*day) == weekday_from_sunday)
    }
}

/// Notification preferences snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub quiet_hours: Option<QuietHours>,
    #[serde(default = "default_reminder_minutes")]
    pub default_reminder_minutes: Vec<u32>,
    #[serde(default = "enabled")]
    pub sound_enabled: bool,
    #[serde(default = "enabled")]
    pub vibration_enabled: bool,
    #[serde(default)]
    pub batch_notifications: bool,
    /// Local offset used for weekdays, quiet hours and recurrence.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn enabled() -> bool {
    true
}

fn default_reminder_minutes() -> Vec<u32> {
    vec![15]
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            quiet_hours: None,
            default_reminder_minutes: default_reminder_minutes(),
            sound_enabled: true,
            vibration_enabled: true,
            batch_notifications: false,
            utc_offset_minutes: 0,
        }
    }
}

impl UserPreferences {
    /// Local offset; out-of-range values fall back to UTC.
    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn validate(&self) -> Result<(), PreferencesError> {
        if FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).is_none() {
            return Err(PreferencesError::InvalidOffset(self.utc_offset_minutes));
        }
        if let Some(quiet) = &self.quiet_hours {
            if let Some(day) = quiet.days.iter().copied().find(|day| *day > 6) {
                return Err(PreferencesError::InvalidWeekday(day));
            }
        }
        Ok(())
    }
}

/// Preference parse/validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreferencesError {
    InvalidTimeOfDay(String),
    InvalidWeekday(u8),
    InvalidOffset(i32),
}

impl Display for PreferencesError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTimeOfDay(value) => {
                write!(f, "time of day is invalid: `{value}` (expected HH:MM)")
            }
            Self::InvalidWeekday(day) => write!(f, "quiet hours weekday {day} is out of range"),
            Self::InvalidOffset(minutes) => write!(f, "utc offset {minutes} minutes is invalid"),
        }
    }
}

impl Error for PreferencesError {}
