//! Notification-facing value types shared by the bridge, push and hook layers.

use crate::model::snooze::ReminderStage;
use crate::model::task::TaskId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Closed set of platform identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Ios,
    Android,
    #[default]
    Web,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
            Self::Web => "web",
        }
    }
}

/// Opaque push token issued by the platform's delivery service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceToken(String);

impl DeviceToken {
    pub fn parse(value: impl Into<String>) -> Result<Self, InvalidDeviceToken> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(InvalidDeviceToken::Empty);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(InvalidDeviceToken::Whitespace);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix safe to put in logs.
    pub fn redacted(&self) -> String {
        let prefix = self.0.chars().take(6).collect::<String>();
        format!("{prefix}…")
    }
}

impl TryFrom<String> for DeviceToken {
    type Error = InvalidDeviceToken;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DeviceToken> for String {
    fn from(value: DeviceToken) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidDeviceToken {
    Empty,
    Whitespace,
}

impl Display for InvalidDeviceToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "device token must not be empty"),
            Self::Whitespace => write!(f, "device token must not contain whitespace"),
        }
    }
}

impl Error for InvalidDeviceToken {}

/// Token issued or rotated by the native layer. Never persisted by core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTokenEvent {
    pub token: DeviceToken,
    pub platform: Platform,
}

/// Platform notification id (Android requires a 32-bit int).
///
/// Ids are a 31-bit FNV-1a hash, so distinct fires can collide: with `n`
/// live notifications the chance of any collision is about
/// `n^2 / 2^32` (under 0.03% for 1 000). The ledger reports collisions when
/// it records them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub i32);

impl NotificationId {
    /// Reserved id for development test fires.
    pub const TEST_FIRE: Self = Self(1);

    /// Deterministic id for one fire, so re-issuing it replaces the old one.
    pub fn for_fire(task_id: TaskId, occurrence_at: DateTime<Utc>, stage: ReminderStage) -> Self {
        let mut hash = Fnv1a::new();
        hash.write(task_id.as_bytes());
        hash.write(&occurrence_at.timestamp().to_le_bytes());
        hash.write(stage.as_label().as_bytes());
        Self::from_hash(hash.finish())
    }

    /// Deterministic id for a digest covering several fires.
    pub fn for_digest(fire_at: DateTime<Utc>, members: &[NotificationId]) -> Self {
        let mut hash = Fnv1a::new();
        hash.write(b"digest");
        hash.write(&fire_at.timestamp().to_le_bytes());
        for member in members {
            hash.write(&member.0.to_le_bytes());
        }
        Self::from_hash(hash.finish())
    }

    fn from_hash(value: u32) -> Self {
        // Positive range, clear of the reserved low ids.
        let folded = (value & 0x7fff_ffff) as i32;
        Self(folded.max(1024))
    }
}

struct Fnv1a(u32);

impl Fnv1a {
    fn new() -> Self {
        Self(0x811c_9dc5)
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= u32::from(*byte);
            self.0 = self.0.wrapping_mul(0x0100_0193);
        }
    }

    fn finish(&self) -> u32 {
        self.0
    }
}

/// When a local notification should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum NotificationSchedule {
    Immediate,
    At { at: DateTime<Utc> },
    After { seconds: u64 },
}

/// Local notification request handed to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalNotificationRequest {
    pub id: NotificationId,
    pub title: String,
    pub body: String,
    pub schedule: NotificationSchedule,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub deep_link: Option<String>,
    #[serde(default = "default_true")]
    pub sound: bool,
    #[serde(default = "default_true")]
    pub vibrate: bool,
}

fn default_true() -> bool {
    true
}

impl LocalNotificationRequest {
    pub fn new(
        id: NotificationId,
        title: impl Into<String>,
        body: impl Into<String>,
        schedule: NotificationSchedule,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            body: body.into(),
            schedule,
            task_id: None,
            deep_link: None,
            sound: true,
            vibrate: true,
        }
    }

    pub fn for_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self.deep_link = Some(task_deep_link(task_id));
        self
    }
}

/// Deep link opening one task in the app shell.
pub fn task_deep_link(task_id: TaskId) -> String {
    format!("studyhub://tasks/{task_id}")
}

/// Deep link opening the calendar on one local date.
pub fn calendar_deep_link(date: NaiveDate) -> String {
    format!("studyhub://calendar/{}", date.format("%Y-%m-%d"))
}

/// Notification delivered to the app, in foreground or through a tap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedNotification {
    #[serde(default)]
    pub id: Option<NotificationId>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub deep_link: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Result of asking the platform for permission and a fresh token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRefresh {
    pub token: Option<DeviceToken>,
    pub permission_granted: bool,
}
