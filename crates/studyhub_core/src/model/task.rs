//! Task domain model.
//!
//! # Responsibility
//! - Define the task record shared by reminder planning and the sweep.
//! - Own recurrence descriptor validation and parent-chain checks.
//!
//! # Invariants
//! - `id` is never nil.
//! - `recurrence_interval >= 1`; `recurrence_days` holds weekday numbers
//!   `0..=6` (Sunday first) and is only allowed for weekly recurrence.
//! - `recurrence_end_date` is not earlier than `due_date` when both are set.
//! - A recurring task's `parent_task_id` chain is acyclic and ends at a root
//!   without a parent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a task.
pub type TaskId = Uuid;

/// Stable identifier of an authenticated account.
pub type UserId = Uuid;

/// Repeat pattern unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Recurrence descriptor of a repeating task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub recurrence_type: RecurrenceType,
    /// Repeat every N units. Must be >= 1.
    #[serde(default = "default_interval")]
    pub recurrence_interval: u32,
    /// Active weekdays, 0 = Sunday. Weekly only; empty means "same weekday
    /// as the due date".
    #[serde(default)]
    pub recurrence_days: Vec<u8>,
    /// Inclusive upper bound for occurrences.
    #[serde(default)]
    pub recurrence_end_date: Option<DateTime<Utc>>,
    /// Series root this instance was spawned from.
    #[serde(default)]
    pub parent_task_id: Option<TaskId>,
    /// Number of instances spawned before this one.
    #[serde(default)]
    pub occurrence_count: u32,
}

fn default_interval() -> u32 {
    1
}

impl Recurrence {
    pub fn new(recurrence_type: RecurrenceType, recurrence_interval: u32) -> Self {
        Self {
            recurrence_type,
            recurrence_interval,
            recurrence_days: Vec::new(),
            recurrence_end_date: None,
            parent_task_id: None,
            occurrence_count: 0,
        }
    }

    /// Weekly recurrence on the given weekdays (0 = Sunday).
    pub fn weekly_on(days: &[u8], recurrence_interval: u32) -> Self {
        let mut rule = Self::new(RecurrenceType::Weekly, recurrence_interval);
        rule.recurrence_days = days.to_vec();
        rule
    }

    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.recurrence_end_date = Some(end);
        self
    }

    /// Sorted, deduplicated weekday set.
    pub fn active_days(&self) -> Vec<u8> {
        self.recurrence_days
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Returns whether `at` is still inside the series bound.
    pub fn allows(&self, at: DateTime<Utc>) -> bool {
        self.recurrence_end_date.map_or(true, |end| at <= end)
    }
}

/// Snooze bookkeeping carried on the task row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnoozeState {
    #[serde(default)]
    pub snoozed_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub snooze_count: u32,
    /// Last instant a reminder for this task was delivered.
    #[serde(default)]
    pub last_reminder_at: Option<DateTime<Utc>>,
}

/// Checklist item owned by exactly one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: Uuid,
    pub title: String,
    pub order: i32,
    #[serde(default)]
    pub completed: bool,
}

impl Subtask {
    pub fn new(title: impl Into<String>, order: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            order,
            completed: false,
        }
    }
}

/// Task snapshot as read from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TaskWire")]
pub struct Task {
    pub id: TaskId,
    pub owner_id: Option<UserId>,
    pub title: String,
    pub due_date: Option<DateTime<Utc>>,
    pub completed: bool,
    pub deleted: bool,
    pub recurrence: Option<Recurrence>,
    pub snooze: SnoozeState,
    /// Pre-reminder offsets in minutes before the due instant.
    pub reminder_minutes_before: Vec<u32>,
    pub subtasks: Vec<Subtask>,
}

impl Task {
    /// Creates an open, non-recurring task with a generated id.
    pub fn new(title: impl Into<String>, due_date: Option<DateTime<Utc>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: None,
            title: title.into(),
            due_date,
            completed: false,
            deleted: false,
            recurrence: None,
            snooze: SnoozeState::default(),
            reminder_minutes_before: Vec::new(),
            subtasks: Vec::new(),
        }
    }

    pub fn with_reminders(mut self, minutes_before: &[u32]) -> Self {
        self.reminder_minutes_before = minutes_before.to_vec();
        self
    }

    pub fn with_recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = Some(recurrence);
        self
    }

    pub fn with_owner(mut self, owner_id: UserId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// Open tasks are the only ones that may notify.
    pub fn is_active(&self) -> bool {
        !self.completed && !self.deleted
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    /// Series root id: the parent for spawned instances, self otherwise.
    pub fn series_root_id(&self) -> TaskId {
        self.recurrence
            .as_ref()
            .and_then(|rule| rule.parent_task_id)
            .unwrap_or(self.id)
    }

    pub fn complete(&mut self) {
        self.completed = true;
        self.snooze.snoozed_until = None;
    }

    /// Subtasks sorted by explicit order, ties broken by id.
    pub fn ordered_subtasks(&self) -> Vec<&Subtask> {
        let mut items = self.subtasks.iter().collect::<Vec<_>>();
        items.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        items
    }

    /// Marks one subtask completed. Returns `false` when the id is unknown.
    pub fn complete_subtask(&mut self, subtask_id: Uuid) -> bool {
        match self.subtasks.iter_mut().find(|item| item.id == subtask_id) {
            Some(item) => {
                item.completed = true;
                true
            }
            None => false,
        }
    }

    /// Validates record-level invariants.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.id.is_nil() {
            return Err(TaskValidationError::NilId);
        }
        let Some(rule) = &self.recurrence else {
            return Ok(());
        };
        if rule.recurrence_interval == 0 {
            return Err(TaskValidationError::ZeroInterval);
        }
        if let Some(day) = rule.recurrence_days.iter().copied().find(|day| *day > 6) {
            return Err(TaskValidationError::InvalidWeekday(day));
        }
        if !rule.recurrence_days.is_empty() && rule.recurrence_type != RecurrenceType::Weekly {
            return Err(TaskValidationError::DaysRequireWeekly(rule.recurrence_type));
        }
        if rule.parent_task_id == Some(self.id) {
            return Err(TaskValidationError::ParentCycle(self.id));
        }
        if let (Some(due), Some(end)) = (self.due_date, rule.recurrence_end_date) {
            if end < due {
                return Err(TaskValidationError::EndBeforeDue { due, end });
            }
        }
        Ok(())
    }
}

/// Walks the `parent_task_id` chain of `task` using `lookup`.
///
/// # Errors
/// - `ParentCycle` when a task id repeats along the chain.
/// - `MissingParent` when a referenced parent cannot be resolved.
pub fn validate_parent_chain<F>(task: &Task, lookup: F) -> Result<TaskId, TaskValidationError>
where
    F: Fn(TaskId) -> Option<Task>,
{
    let mut visited = BTreeSet::from([task.id]);
    let mut parent = task
        .recurrence
        .as_ref()
        .and_then(|rule| rule.parent_task_id);
    let mut root = task.id;

    while let Some(parent_id) = parent {
        if !visited.insert(parent_id) {
            return Err(TaskValidationError::ParentCycle(parent_id));
        }
        let parent_task = lookup(parent_id).ok_or(TaskValidationError::MissingParent(parent_id))?;
        root = parent_task.id;
        parent = parent_task
            .recurrence
            .as_ref()
            .and_then(|rule| rule.parent_task_id);
    }

    Ok(root)
}

/// Task invariant violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    NilId,
    ZeroInterval,
    InvalidWeekday(u8),
    DaysRequireWeekly(RecurrenceType),
    EndBeforeDue {
        due: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    ParentCycle(TaskId),
    MissingParent(TaskId),
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId => write!(f, "task id must not be nil"),
            Self::ZeroInterval => write!(f, "recurrence_interval must be >= 1"),
            Self::InvalidWeekday(day) => {
                write!(f, "recurrence_days contains invalid weekday {day} (expected 0..=6)")
            }
            Self::DaysRequireWeekly(kind) => write!(
                f,
                "recurrence_days is only allowed for weekly recurrence, got {kind:?}"
            ),
            Self::EndBeforeDue { due, end } => write!(
                f,
                "recurrence_end_date ({end}) must be >= due_date ({due})"
            ),
            Self::ParentCycle(id) => write!(f, "parent_task_id chain has a cycle at {id}"),
            Self::MissingParent(id) => write!(f, "parent task not found: {id}"),
        }
    }
}

impl Error for TaskValidationError {}

/// Wire shape; deserialization goes through `Task::validate`.
#[derive(Deserialize)]
struct TaskWire {
    id: TaskId,
    #[serde(default)]
    owner_id: Option<UserId>,
    title: String,
    #[serde(default)]
    due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    recurrence: Option<Recurrence>,
    #[serde(default)]
    snooze: SnoozeState,
    #[serde(default)]
    reminder_minutes_before: Vec<u32>,
    #[serde(default)]
    subtasks: Vec<Subtask>,
}

impl TryFrom<TaskWire> for Task {
    type Error = TaskValidationError;

    fn try_from(wire: TaskWire) -> Result<Self, Self::Error> {
        let task = Task {
            id: wire.id,
            owner_id: wire.owner_id,
            title: wire.title,
            due_date: wire.due_date,
            completed: wire.completed,
            deleted: wire.deleted,
            recurrence: wire.recurrence,
            snooze: wire.snooze,
            reminder_minutes_before: wire.reminder_minutes_before,
            subtasks: wire.subtasks,
        };
        task.validate()?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_parent_chain, Recurrence, RecurrenceType, Subtask, Task, TaskValidationError};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    #[test]
    fn ordered_subtasks_follow_explicit_order() {
        let mut task = Task::new("essay", None);
        task.subtasks.push(Subtask::new("outline", 2));
        task.subtasks.push(Subtask::new("sources", 1));
        task.subtasks.push(Subtask::new("draft", 3));

        let titles = task
            .ordered_subtasks()
            .into_iter()
            .map(|item| item.title.as_str())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["sources", "outline", "draft"]);
    }

    #[test]
    fn subtasks_complete_independently() {
        let mut task = Task::new("lab report", None);
        task.subtasks.push(Subtask::new("measure", 1));
        task.subtasks.push(Subtask::new("write up", 2));
        let first = task.subtasks[0].id;

        assert!(task.complete_subtask(first));
        assert!(task.subtasks[0].completed);
        assert!(!task.subtasks[1].completed);
        assert!(!task.complete_subtask(uuid::Uuid::new_v4()));
    }

    #[test]
    fn validate_rejects_days_on_non_weekly_rule() {
        let mut rule = Recurrence::new(RecurrenceType::Daily, 1);
        rule.recurrence_days = vec![1];
        let task = Task::new("gym", None).with_recurrence(rule);
        assert_eq!(
            task.validate().unwrap_err(),
            TaskValidationError::DaysRequireWeekly(RecurrenceType::Daily)
        );
    }

    #[test]
    fn validate_rejects_end_before_due() {
        let due = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let task = Task::new("standup", Some(due))
            .with_recurrence(Recurrence::new(RecurrenceType::Daily, 1).until(end));
        assert!(matches!(
            task.validate().unwrap_err(),
            TaskValidationError::EndBeforeDue { .. }
        ));
    }

    #[test]
    fn parent_chain_detects_cycles_and_resolves_roots() {
        let root = Task::new("series", None).with_recurrence(Recurrence::new(RecurrenceType::Daily, 1));
        let mut child_rule = Recurrence::new(RecurrenceType::Daily, 1);
        child_rule.parent_task_id = Some(root.id);
        let child = Task::new("series #2", None).with_recurrence(child_rule);

        let store = HashMap::from([(root.id, root.clone()), (child.id, child.clone())]);
        let resolved = validate_parent_chain(&child, |id| store.get(&id).cloned())
            .expect("chain should resolve");
        assert_eq!(resolved, root.id);

        let mut looped_root = root.clone();
        looped_root
            .recurrence
            .as_mut()
            .expect("recurring")
            .parent_task_id = Some(child.id);
        let cyclic = HashMap::from([(root.id, looped_root), (child.id, child.clone())]);
        let err = validate_parent_chain(&child, |id| cyclic.get(&id).cloned())
            .expect_err("cycle must be rejected");
        assert_eq!(err, TaskValidationError::ParentCycle(child.id));
    }
}
