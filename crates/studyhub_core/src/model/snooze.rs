//! Snooze records and reminder stages.
//!
//! # Invariants
//! - A snooze is scoped to one occurrence of one task.
//! - `is_processed` only moves from `false` to `true`.

use crate::model::task::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Which reminder of an occurrence a fire belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ReminderStage {
    /// Pre-reminder `minutes` before the occurrence.
    Advance { minutes: u32 },
    /// The occurrence instant itself.
    Due,
}

impl ReminderStage {
    /// Maps a configured offset to its stage; `0` is the due instant.
    pub fn from_offset(minutes: u32) -> Self {
        if minutes == 0 {
            Self::Due
        } else {
            Self::Advance { minutes }
        }
    }

    pub fn minutes_before(self) -> u32 {
        match self {
            Self::Advance { minutes } => minutes,
            Self::Due => 0,
        }
    }

    /// Stable storage label (`due`, `advance:60`).
    pub fn as_label(self) -> String {
        match self {
            Self::Advance { minutes } => format!("advance:{minutes}"),
            Self::Due => "due".to_string(),
        }
    }

    pub fn parse_label(value: &str) -> Option<Self> {
        if value == "due" {
            return Some(Self::Due);
        }
        let minutes = value.strip_prefix("advance:")?.parse::<u32>().ok()?;
        Some(Self::from_offset(minutes))
    }
}

impl Display for ReminderStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_label())
    }
}

/// One user-initiated deferral of a reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnoozedReminder {
    pub id: Uuid,
    pub task_id: TaskId,
    /// Stage the user snoozed.
    pub stage: ReminderStage,
    /// Occurrence the snooze was issued against.
    pub occurrence_at: DateTime<Utc>,
    pub snooze_until: DateTime<Utc>,
    pub is_processed: bool,
    pub created_at: DateTime<Utc>,
}

impl SnoozedReminder {
    pub fn new(
        task_id: TaskId,
        stage: ReminderStage,
        occurrence_at: DateTime<Utc>,
        snooze_until: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            stage,
            occurrence_at,
            snooze_until,
            is_processed: false,
            created_at,
        }
    }

    /// Unprocessed snoozes still take precedence in planning.
    pub fn is_pending(&self) -> bool {
        !self.is_processed
    }

    /// Pending and not yet due at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.snooze_until > now
    }

    pub fn mark_processed(&mut self) {
        self.is_processed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::ReminderStage;

    #[test]
    fn stage_labels_are_stable() {
        assert_eq!(ReminderStage::from_offset(0), ReminderStage::Due);
        assert_eq!(ReminderStage::from_offset(60).as_label(), "advance:60");
        assert_eq!(
            ReminderStage::parse_label("advance:15"),
            Some(ReminderStage::Advance { minutes: 15 })
        );
        assert_eq!(ReminderStage::parse_label("due"), Some(ReminderStage::Due));
        assert_eq!(ReminderStage::parse_label("advance:"), None);
        assert_eq!(ReminderStage::parse_label("later"), None);
    }

    #[test]
    fn stage_serializes_with_kind_tag() {
        let json = serde_json::to_value(ReminderStage::Advance { minutes: 30 }).unwrap();
        assert_eq!(json["kind"], "advance");
        assert_eq!(json["minutes"], 30);
        let due = serde_json::to_value(ReminderStage::Due).unwrap();
        assert_eq!(due["kind"], "due");
    }
}
