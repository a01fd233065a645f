//! Due-soon selection for the email reminder sweep.

use crate::model::task::{Task, TaskId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueTaskSummary {
    pub task_id: TaskId,
    pub title: String,
    pub due_date: DateTime<Utc>,
}

/// Tasks of one owner that are due inside the sweep window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueReminderBatch {
    pub owner_id: UserId,
    pub tasks: Vec<DueTaskSummary>,
}

/// Open, owned tasks due in `[now, now + window]`, grouped per owner.
///
/// Owners and their tasks are ordered deterministically (owner id, then due
/// date, then task id).
pub fn select_due_for_email(
    tasks: &[Task],
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<DueReminderBatch> {
    let until = now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC);
    let mut by_owner: BTreeMap<UserId, Vec<DueTaskSummary>> = BTreeMap::new();

    for task in tasks.iter().filter(|task| task.is_active()) {
        let (Some(owner_id), Some(due)) = (task.owner_id, task.due_date) else {
            continue;
        };
        if due < now || due > until {
            continue;
        }
        by_owner.entry(owner_id).or_default().push(DueTaskSummary {
            task_id: task.id,
            title: task.title.clone(),
            due_date: due,
        });
    }

    by_owner
        .into_iter()
        .map(|(owner_id, mut tasks)| {
            tasks.sort_by(|a, b| {
                a.due_date
                    .cmp(&b.due_date)
                    .then_with(|| a.task_id.cmp(&b.task_id))
            });
            DueReminderBatch { owner_id, tasks }
        })
        .collect()
}
