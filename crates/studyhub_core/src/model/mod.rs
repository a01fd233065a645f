//! Domain model for reminder coordination.
//!
//! # Responsibility
//! - Define the task, snooze, preference and notification shapes the
//!   scheduler, bridge and hook operate on.
//! - Keep wire naming aligned with the backend tables (`snake_case`).
//!
//! # Invariants
//! - Every task is identified by a stable non-nil `TaskId`.
//! - Timestamps are UTC instants; local calendar math goes through
//!   `UserPreferences::local_offset`.

pub mod notification;
pub mod preferences;
pub mod snooze;
pub mod task;
