//! Client-observed notification state and its transition function.
//!
//! # Invariants
//! - `reduce` is pure: the same state and action always give the same result.
//! - Actions carry only the fields they change; everything else is copied
//!   from the previous state.

use crate::model::notification::{DeviceToken, Platform, ReceivedNotification};
use serde::{Deserialize, Serialize};

/// How the last notification reached the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interaction {
    /// Presented while the app was in the foreground.
    Received,
    /// Opened by the user.
    Tapped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastNotification {
    pub interaction: Interaction,
    pub notification: ReceivedNotification,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationState {
    pub is_native: bool,
    /// Set once activation finished.
    pub is_ready: bool,
    pub token: Option<DeviceToken>,
    pub platform: Platform,
    pub permission_granted: bool,
    pub last_notification: Option<LastNotification>,
}

/// Every state change the center can make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationAction {
    Activated {
        is_native: bool,
        platform: Platform,
        token: Option<DeviceToken>,
    },
    TokenIssued(DeviceToken),
    TokenRefreshed {
        token: Option<DeviceToken>,
        permission_granted: bool,
    },
    Received(ReceivedNotification),
    Tapped(ReceivedNotification),
    SignedOut,
    Deactivated,
}

impl NotificationAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Activated { .. } => "activated",
            Self::TokenIssued(_) => "token_issued",
            Self::TokenRefreshed { .. } => "token_refreshed",
            Self::Received(_) => "received",
            Self::Tapped(_) => "tapped",
            Self::SignedOut => "signed_out",
            Self::Deactivated => "deactivated",
        }
    }
}

pub fn reduce(state: &NotificationState, action: NotificationAction) -> NotificationState {
    let mut next = state.clone();
    match action {
        NotificationAction::Activated {
            is_native,
            platform,
            token,
        } => {
            next.is_native = is_native;
            next.platform = platform;
            next.permission_granted = token.is_some();
            next.token = token;
            next.is_ready = true;
        }
        NotificationAction::TokenIssued(token) => {
            next.token = Some(token);
            // A token is only issued after the user granted permission.
            next.permission_granted = true;
        }
        NotificationAction::TokenRefreshed {
            token,
            permission_granted,
        } => {
            next.permission_granted = permission_granted;
            if token.is_some() || !permission_granted {
                next.token = token;
            }
        }
        NotificationAction::Received(notification) => {
            next.last_notification = Some(LastNotification {
                interaction: Interaction::Received,
                notification,
            });
        }
        NotificationAction::Tapped(notification) => {
            next.last_notification = Some(LastNotification {
                interaction: Interaction::Tapped,
                notification,
            });
        }
        NotificationAction::SignedOut => {
            next.token = None;
            next.permission_granted = false;
        }
        NotificationAction::Deactivated => {
            next.is_ready = false;
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::{reduce, Interaction, NotificationAction, NotificationState};
    use crate::model::notification::{DeviceToken, Platform, ReceivedNotification};
    use chrono::{TimeZone, Utc};

    fn token(value: &str) -> DeviceToken {
        DeviceToken::parse(value).unwrap()
    }

    #[test]
    fn activation_marks_ready_and_copies_capabilities() {
        let state = reduce(
            &NotificationState::default(),
            NotificationAction::Activated {
                is_native: true,
                platform: Platform::Android,
                token: Some(token("fcm-1")),
            },
        );
        assert!(state.is_ready);
        assert!(state.is_native);
        assert!(state.permission_granted);
        assert_eq!(state.platform, Platform::Android);
        assert_eq!(state.token, Some(token("fcm-1")));
    }

    #[test]
    fn denied_refresh_clears_token_but_failed_fetch_keeps_it() {
        let mut state = NotificationState {
            token: Some(token("fcm-1")),
            permission_granted: true,
            ..NotificationState::default()
        };

        let kept = reduce(
            &state,
            NotificationAction::TokenRefreshed {
                token: None,
                permission_granted: true,
            },
        );
        assert_eq!(kept.token, Some(token("fcm-1")));

        state = reduce(
            &state,
            NotificationAction::TokenRefreshed {
                token: None,
                permission_granted: false,
            },
        );
        assert_eq!(state.token, None);
        assert!(!state.permission_granted);
    }

    #[test]
    fn sign_out_clears_token_and_permission_only() {
        let notification = ReceivedNotification {
            id: None,
            title: "Essay".to_string(),
            body: "Due now".to_string(),
            task_id: None,
            deep_link: None,
            received_at: Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap(),
        };
        let state = NotificationState {
            is_native: true,
            is_ready: true,
            token: Some(token("apns-1")),
            platform: Platform::Ios,
            permission_granted: true,
            last_notification: None,
        };
        let state = reduce(&state, NotificationAction::Tapped(notification));
        let state = reduce(&state, NotificationAction::SignedOut);

        assert_eq!(state.token, None);
        assert!(!state.permission_granted);
        assert!(state.is_ready);
        assert_eq!(state.platform, Platform::Ios);
        assert_eq!(
            state.last_notification.map(|last| last.interaction),
            Some(Interaction::Tapped)
        );
    }
}
