//! Occurrence arithmetic for recurring tasks.
//!
//! Occurrences are derived from an anchor instant (the task's due date) in the
//! user's local calendar; the anchor's wall-clock time is kept for every
//! occurrence. Results never exceed `recurrence_end_date`.

use crate::model::task::{Recurrence, RecurrenceType, Subtask, Task};
use chrono::{
    DateTime, Datelike, Days, Duration, FixedOffset, Months, NaiveDateTime, TimeZone, Utc,
};
use log::info;
use uuid::Uuid;

// Stepping is checked; leaving chrono's range yields no occurrence.

/// Upper bound for `occurrences_between`.
pub const MAX_OCCURRENCES: usize = 366;

/// First occurrence at or after `at`.
pub fn occurrence_on_or_after(
    rule: &Recurrence,
    anchor: DateTime<Utc>,
    at: DateTime<Utc>,
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    first_occurrence(rule, anchor, offset, |candidate| candidate >= at, at)
}

/// First occurrence strictly after `after`.
pub fn next_occurrence(
    rule: &Recurrence,
    anchor: DateTime<Utc>,
    after: DateTime<Utc>,
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    first_occurrence(rule, anchor, offset, |candidate| candidate > after, after)
}

/// Occurrences inside `[from, to]`, capped at [`MAX_OCCURRENCES`].
pub fn occurrences_between(
    rule: &Recurrence,
    anchor: DateTime<Utc>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    offset: FixedOffset,
) -> Vec<DateTime<Utc>> {
    let mut found = Vec::new();
    let mut current = occurrence_on_or_after(rule, anchor, from, offset);
    while let Some(occurrence) = current {
        if occurrence > to || found.len() >= MAX_OCCURRENCES {
            break;
        }
        found.push(occurrence);
        current = next_occurrence(rule, anchor, occurrence, offset);
    }
    found
}

/// Spawns the instance following `task` in its series.
///
/// The new instance is due at the first occurrence after both the current
/// due date and `now`, points at the series root and has fresh subtasks.
/// Returns `None` for non-recurring tasks and ended series.
pub fn spawn_next_instance(task: &Task, now: DateTime<Utc>, offset: FixedOffset) -> Option<Task> {
    let rule = task.recurrence.as_ref()?;
    let due = task.due_date?;
    let next_due = next_occurrence(rule, due, due.max(now), offset)?;

    let mut next_rule = rule.clone();
    next_rule.parent_task_id = Some(task.series_root_id());
    next_rule.occurrence_count = rule.occurrence_count.saturating_add(1);

    let next = Task {
        id: Uuid::new_v4(),
        owner_id: task.owner_id,
        title: task.title.clone(),
        due_date: Some(next_due),
        completed: false,
        deleted: false,
        recurrence: Some(next_rule),
        snooze: Default::default(),
        reminder_minutes_before: task.reminder_minutes_before.clone(),
        subtasks: task
            .ordered_subtasks()
            .into_iter()
            .map(|item| Subtask::new(item.title.clone(), item.order))
            .collect(),
    };
    info!(
        "event=recurrence_spawn module=scheduler status=ok task_id={} next_task_id={} occurrence_count={}",
        task.id,
        next.id,
        rule.occurrence_count.saturating_add(1)
    );
    Some(next)
}

fn first_occurrence(
    rule: &Recurrence,
    anchor: DateTime<Utc>,
    offset: FixedOffset,
    accept: impl Fn(DateTime<Utc>) -> bool,
    bound: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let interval = rule.recurrence_interval.max(1);
    let found = match rule.recurrence_type {
        RecurrenceType::Daily => {
            fixed_step(anchor, Duration::try_days(i64::from(interval))?, bound, &accept)
        }
        RecurrenceType::Weekly => {
            let days = rule.active_days();
            if days.is_empty() {
                fixed_step(anchor, Duration::try_weeks(i64::from(interval))?, bound, &accept)
            } else {
                weekly_on_days(anchor, offset, interval, &days, bound, &accept)
            }
        }
        RecurrenceType::Monthly => month_step(anchor, offset, interval, bound, &accept),
        RecurrenceType::Yearly => {
            month_step(anchor, offset, interval.saturating_mul(12), bound, &accept)
        }
    };
    found.filter(|occurrence| rule.allows(*occurrence))
}

fn fixed_step(
    anchor: DateTime<Utc>,
    step: Duration,
    bound: DateTime<Utc>,
    accept: &impl Fn(DateTime<Utc>) -> bool,
) -> Option<DateTime<Utc>> {
    let step_seconds = step.num_seconds().max(1);
    let mut index = ((bound - anchor).num_seconds() / step_seconds).max(0);
    for _ in 0..3 {
        let candidate = step
            .checked_mul(i32::try_from(index).ok()?)
            .and_then(|delta| anchor.checked_add_signed(delta))?;
        if accept(candidate) {
            return Some(candidate);
        }
        index += 1;
    }
    None
}

fn weekly_on_days(
    anchor: DateTime<Utc>,
    offset: FixedOffset,
    interval: u32,
    days: &[u8],
    bound: DateTime<Utc>,
    accept: &impl Fn(DateTime<Utc>) -> bool,
) -> Option<DateTime<Utc>> {
    let anchor_local = anchor.with_timezone(&offset).naive_local();
    let anchor_date = anchor_local.date();
    // Weeks start on Sunday; the interval counts weeks from the anchor's week.
    let first_week = anchor_date.checked_sub_days(Days::new(u64::from(
        anchor_date.weekday().num_days_from_sunday(),
    )))?;
    let period_days = 7 * i64::from(interval);
    let bound_date = bound.with_timezone(&offset).date_naive();
    let mut week_index = ((bound_date - first_week).num_days() / period_days).max(0);

    for _ in 0..3 {
        let week_start = week_index
            .checked_mul(period_days)
            .and_then(Duration::try_days)
            .and_then(|delta| first_week.checked_add_signed(delta))?;
        for day in days {
            let date = week_start.checked_add_days(Days::new(u64::from(*day)))?;
            let candidate = local_to_utc(date.and_time(anchor_local.time()), offset)?;
            if candidate >= anchor && accept(candidate) {
                return Some(candidate);
            }
        }
        week_index += 1;
    }
    None
}

fn month_step(
    anchor: DateTime<Utc>,
    offset: FixedOffset,
    step_months: u32,
    bound: DateTime<Utc>,
    accept: &impl Fn(DateTime<Utc>) -> bool,
) -> Option<DateTime<Utc>> {
    let anchor_local = anchor.with_timezone(&offset).naive_local();
    let bound_local = bound.with_timezone(&offset).naive_local();
    let months_apart = i64::from(bound_local.year() - anchor_local.year()) * 12
        + i64::from(bound_local.month())
        - i64::from(anchor_local.month());
    let step = i64::from(step_months.max(1));
    let mut index = (months_apart / step - 1).max(0);

    for _ in 0..4 {
        let months = u32::try_from(index * step).ok()?;
        // Always derived from the anchor, so a clamped month does not drift
        // the day-of-month of later occurrences.
        let date = anchor_local.date().checked_add_months(Months::new(months))?;
        let candidate = local_to_utc(date.and_time(anchor_local.time()), offset)?;
        if accept(candidate) {
            return Some(candidate);
        }
        index += 1;
    }
    None
}

pub(crate) fn local_to_utc(local: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&local)
        .single()
        .map(|value| value.with_timezone(&Utc))
}
