//! Quiet-hours deferral.
//!
//! The window is `[start, end)` in the user's local time. For windows that
//! cross midnight the weekday of the window start decides whether it applies.
//! `start == end` disables the window.

use crate::model::preferences::{QuietHours, UserPreferences};
use crate::scheduler::recurrence::local_to_utc;
use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Outcome of checking one fire time against quiet hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuietHoursDecision {
    Unchanged(DateTime<Utc>),
    Deferred {
        original: DateTime<Utc>,
        until: DateTime<Utc>,
    },
}

impl QuietHoursDecision {
    /// Instant the fire should happen at.
    pub fn fire_at(&self) -> DateTime<Utc> {
        match self {
            Self::Unchanged(at) => *at,
            Self::Deferred { until, .. } => *until,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }
}

/// Shifts `fire` to the end of the quiet window it falls in, if any.
pub fn apply_quiet_hours(fire: DateTime<Utc>, prefs: &UserPreferences) -> QuietHoursDecision {
    let Some(quiet) = prefs.quiet_hours.as_ref() else {
        return QuietHoursDecision::Unchanged(fire);
    };
    if quiet.start == quiet.end {
        return QuietHoursDecision::Unchanged(fire);
    }

    let offset = prefs.local_offset();
    let local = fire.with_timezone(&offset).naive_local();
    let time = local.time();
    let date = local.date();
    let start = quiet.start.to_naive();
    let end = quiet.end.to_naive();

    let resume_on = if quiet.crosses_midnight() {
        if time >= start && window_starts(quiet, date) {
            date.succ_opt()
        } else if time < end
            && date
                .pred_opt()
                .is_some_and(|previous| window_starts(quiet, previous))
        {
            Some(date)
        } else {
            None
        }
    } else if time >= start && time < end && window_starts(quiet, date) {
        Some(date)
    } else {
        None
    };

    match resume_on.and_then(|day| local_to_utc(day.and_time(end), offset)) {
        Some(until) if until > fire => QuietHoursDecision::Deferred {
            original: fire,
            until,
        },
        _ => QuietHoursDecision::Unchanged(fire),
    }
}

fn window_starts(quiet: &QuietHours, date: NaiveDate) -> bool {
    quiet.starts_on(date.weekday().num_days_from_sunday())
}
