//! Next-fire computation for one task.
//!
//! Planning is pure: it reads a task snapshot, its pending snoozes, the
//! user's preferences and `now`, and returns the fires that should be
//! scheduled. Rules are applied in order:
//!
//! 1. Pick the occurrence: the due date, or for a recurring task whose due
//!    date has passed, the first occurrence at or after `now`.
//! 2. Build one candidate per reminder offset plus the due instant.
//! 3. Drop candidates already delivered (at or before `last_reminder_at`).
//! 4. Apply a pending snooze for this occurrence: it replaces its own stage
//!    and every candidate up to `snooze_until`.
//! 5. Collapse past candidates into a single fire at `now`.
//! 6. Shift fires out of quiet hours, then drop anything past the series end.

use crate::model::notification::NotificationId;
use crate::model::preferences::UserPreferences;
use crate::model::snooze::{ReminderStage, SnoozedReminder};
use crate::model::task::{Task, TaskId};
use crate::scheduler::quiet_hours::apply_quiet_hours;
use crate::scheduler::recurrence::occurrence_on_or_after;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Why a fire is scheduled at its time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireOrigin {
    /// Regular offset candidate.
    Scheduled,
    /// Candidate was already in the past; fires immediately.
    Clamped,
    /// User snoozed this stage.
    Snoozed,
}

/// One notification the scheduler intends to issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedFire {
    pub task_id: TaskId,
    pub stage: ReminderStage,
    pub occurrence_at: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
    pub origin: FireOrigin,
    /// Pre-shift time when quiet hours moved this fire.
    #[serde(default)]
    pub deferred_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub snooze_id: Option<Uuid>,
    /// Series end; batching never moves the fire past it.
    #[serde(default)]
    pub not_after: Option<DateTime<Utc>>,
}

impl PlannedFire {
    pub fn notification_id(&self) -> NotificationId {
        NotificationId::for_fire(self.task_id, self.occurrence_at, self.stage)
    }
}

/// Fires computed for one task occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPlan {
    pub task_id: TaskId,
    /// Occurrence the fires belong to; `None` when nothing is upcoming.
    pub occurrence_at: Option<DateTime<Utc>>,
    pub fires: Vec<PlannedFire>,
}

impl ReminderPlan {
    fn empty(task_id: TaskId) -> Self {
        Self {
            task_id,
            occurrence_at: None,
            fires: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fires.is_empty()
    }

    pub fn fire_times(&self) -> Vec<DateTime<Utc>> {
        self.fires.iter().map(|fire| fire.fire_at).collect()
    }
}

/// Occurrence a task's reminders currently target.
pub fn current_occurrence(
    task: &Task,
    prefs: &UserPreferences,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let due = task.due_date?;
    match &task.recurrence {
        // A due date on an inactive weekday snaps to the next active day.
        Some(rule) => occurrence_on_or_after(rule, due, now.max(due), prefs.local_offset()),
        None => Some(due),
    }
}

/// Computes the fires for `task` as of `now`.
///
/// `snoozes` may contain any snoozes of the task; only pending ones issued
/// against the current occurrence are applied.
pub fn plan_task_reminders(
    task: &Task,
    snoozes: &[SnoozedReminder],
    prefs: &UserPreferences,
    now: DateTime<Utc>,
) -> ReminderPlan {
    if !task.is_active() {
        return ReminderPlan::empty(task.id);
    }
    let Some(occurrence_at) = current_occurrence(task, prefs, now) else {
        return ReminderPlan::empty(task.id);
    };

    let not_after = task
        .recurrence
        .as_ref()
        .and_then(|rule| rule.recurrence_end_date);
    let mut candidates = candidate_fires(task, occurrence_at);

    if let Some(last) = task.snooze.last_reminder_at {
        candidates.retain(|(_, at)| *at > last);
    }

    let snooze = snoozes
        .iter()
        .filter(|item| {
            item.task_id == task.id && item.is_pending() && item.occurrence_at == occurrence_at
        })
        .max_by_key(|item| (item.created_at, item.snooze_until));

    let mut fires = Vec::new();
    if let Some(snooze) = snooze {
        candidates.retain(|(stage, at)| *stage != snooze.stage && *at > snooze.snooze_until);
        fires.push(PlannedFire {
            task_id: task.id,
            stage: snooze.stage,
            occurrence_at,
            fire_at: snooze.snooze_until.max(now),
            origin: FireOrigin::Snoozed,
            deferred_from: None,
            snooze_id: Some(snooze.id),
            not_after,
        });
    }

    let (past, upcoming): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|(_, at)| *at < now);
    if let Some((stage, _)) = past.into_iter().max_by_key(|(_, at)| *at) {
        fires.push(PlannedFire {
            task_id: task.id,
            stage,
            occurrence_at,
            fire_at: now,
            origin: FireOrigin::Clamped,
            deferred_from: None,
            snooze_id: None,
            not_after,
        });
    }
    fires.extend(upcoming.into_iter().map(|(stage, at)| PlannedFire {
        task_id: task.id,
        stage,
        occurrence_at,
        fire_at: at,
        origin: FireOrigin::Scheduled,
        deferred_from: None,
        snooze_id: None,
        not_after,
    }));

    for fire in &mut fires {
        let decision = apply_quiet_hours(fire.fire_at, prefs);
        if decision.is_deferred() {
            fire.deferred_from = Some(fire.fire_at);
            fire.fire_at = decision.fire_at();
        }
    }

    if let Some(end) = not_after {
        fires.retain(|fire| fire.fire_at <= end);
    }

    ReminderPlan {
        task_id: task.id,
        occurrence_at: Some(occurrence_at),
        fires: dedupe_by_instant(fires),
    }
}

fn candidate_fires(task: &Task, occurrence_at: DateTime<Utc>) -> Vec<(ReminderStage, DateTime<Utc>)> {
    let mut offsets = task
        .reminder_minutes_before
        .iter()
        .copied()
        .collect::<BTreeSet<_>>();
    offsets.insert(0);

    offsets
        .into_iter()
        .rev()
        .filter_map(|minutes| {
            let at = occurrence_at.checked_sub_signed(Duration::minutes(i64::from(minutes)))?;
            Some((ReminderStage::from_offset(minutes), at))
        })
        .collect()
}

/// One fire per instant: snoozed fires win, then the stage closest to due.
fn dedupe_by_instant(mut fires: Vec<PlannedFire>) -> Vec<PlannedFire> {
    fires.sort_by(|a, b| {
        a.fire_at
            .cmp(&b.fire_at)
            .then_with(|| rank(a).cmp(&rank(b)))
    });
    fires.dedup_by(|later, earlier| later.fire_at == earlier.fire_at);
    fires
}

fn rank(fire: &PlannedFire) -> (u8, u32) {
    let snoozed = if fire.origin == FireOrigin::Snoozed { 0 } else { 1 };
    (snoozed, fire.stage.minutes_before())
}
