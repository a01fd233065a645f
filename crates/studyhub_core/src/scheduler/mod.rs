//! Reminder scheduling.
//!
//! # Responsibility
//! - Compute next-fire times from due dates, recurrence, snoozes and quiet
//!   hours (`plan`), optionally merged into digests (`batch`).
//! - Issue and cancel local notifications through the bridge (`service`).
//! - Select due-soon tasks for the email sweep (`sweep`).
//!
//! # Invariants
//! - Rescheduling a task cancels every ledger entry for it before issuing
//!   new fires.
//! - No fire is computed after a series' `recurrence_end_date`.
//! - A pending snooze for the current occurrence wins over the candidates
//!   it covers.
//! - Quiet hours shift fires to the window end; they never drop them.

use chrono::{DateTime, Duration, Utc};
use std::cell::Cell;

pub mod batch;
pub mod plan;
pub mod quiet_hours;
pub mod recurrence;
pub mod service;
pub mod sweep;

pub use batch::{batch_fires, BatchedDelivery};
pub use plan::{plan_task_reminders, FireOrigin, PlannedFire, ReminderPlan};
pub use quiet_hours::{apply_quiet_hours, QuietHoursDecision};
pub use recurrence::{next_occurrence, occurrences_between, spawn_next_instance};
pub use service::{ReminderScheduler, SchedulerError, SchedulerResult, SnoozeOutcome};
pub use sweep::{select_due_for_email, DueReminderBatch, DueTaskSummary};

/// Time source for scheduling decisions.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Cell<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}
