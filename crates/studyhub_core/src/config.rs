//! Scheduler configuration.
//!
//! Loaded from JSON by the host (missing keys fall back to defaults) and
//! validated once before use.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Tunables of the reminder scheduler and the email sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Fires this close together are merged when batching is enabled.
    pub batch_window_minutes: u32,
    /// Look-ahead of the email reminder sweep.
    pub sweep_window_hours: u32,
    /// Upper bound accepted by `snooze`.
    pub max_snooze_minutes: u32,
    /// Offset used by event reminders when the caller gives none.
    pub default_event_reminder_minutes: u32,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            batch_window_minutes: 5,
            sweep_window_hours: 24,
            max_snooze_minutes: 24 * 60,
            default_event_reminder_minutes: 15,
        }
    }
}

impl ReminderConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_window_hours == 0 {
            return Err(ConfigError::Invalid {
                field: "sweep_window_hours",
                reason: "must be >= 1",
            });
        }
        if self.max_snooze_minutes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_snooze_minutes",
                reason: "must be >= 1",
            });
        }
        if self.batch_window_minutes > 24 * 60 {
            return Err(ConfigError::Invalid {
                field: "batch_window_minutes",
                reason: "must not exceed one day",
            });
        }
        Ok(())
    }

    pub fn batch_window(&self) -> Duration {
        Duration::minutes(i64::from(self.batch_window_minutes))
    }

    pub fn sweep_window(&self) -> Duration {
        Duration::hours(i64::from(self.sweep_window_hours))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "invalid reminder config json: {message}"),
            Self::Invalid { field, reason } => write!(f, "invalid reminder config `{field}`: {reason}"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{ConfigError, ReminderConfig};

    #[test]
    fn missing_keys_use_defaults() {
        let config = ReminderConfig::from_json(r#"{ "batch_window_minutes": 10 }"#).unwrap();
        assert_eq!(config.batch_window_minutes, 10);
        assert_eq!(config.sweep_window_hours, 24);
        assert_eq!(config.max_snooze_minutes, 1440);
    }

    #[test]
    fn zero_sweep_window_is_rejected() {
        let err = ReminderConfig::from_json(r#"{ "sweep_window_hours": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "sweep_window_hours",
                ..
            }
        ));
    }
}
