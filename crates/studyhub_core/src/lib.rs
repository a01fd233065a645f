//! Core reminder and notification logic for StudyHub.
//! This crate is the single source of truth for reminder invariants.

pub mod bridge;
pub mod config;
pub mod db;
pub mod events;
pub mod hook;
pub mod logging;
pub mod model;
pub mod push;
pub mod repo;
pub mod scheduler;

pub use bridge::{
    detect_bridge, BridgeError, DetectedBridge, NativeBridge, NativeShell, PlatformNotifier,
    WebBridge,
};
pub use config::{ConfigError, ReminderConfig};
pub use events::{BusEvent, DispatchReport, EventBus, EventKind, EventPayload, Subscription};
pub use hook::{parse_deep_link, CenterDeps, DeepLink, NotificationCenter, NotificationState};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::notification::{
    DeviceToken, LocalNotificationRequest, NotificationId, NotificationSchedule, Platform,
    PushTokenEvent, ReceivedNotification,
};
pub use model::preferences::{QuietHours, TimeOfDay, UserPreferences};
pub use model::snooze::{ReminderStage, SnoozedReminder};
pub use model::task::{Recurrence, RecurrenceType, Task, TaskId, UserId};
pub use push::{
    AuthChange, AuthChannel, IdentityProvider, PushBackend, PushPayload,
    PushRegistrationManager, RegistrationOutcome, SendResult,
};
pub use repo::reminder_store::{ReminderStore, RepoError, RepoResult, SqliteReminderStore};
pub use scheduler::{
    plan_task_reminders, Clock, FixedClock, ReminderPlan, ReminderScheduler, SchedulerError,
    SystemClock,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
