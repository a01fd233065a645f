//! Capability trait and the native-shell adapter.

use crate::bridge::BridgeError;
use crate::events::listeners::{ListenerSet, Subscription};
use crate::model::notification::{
    calendar_deep_link, DeviceToken, LocalNotificationRequest, NotificationId,
    NotificationSchedule, Platform, PushTokenEvent, ReceivedNotification, TokenRefresh,
};
use crate::model::snooze::ReminderStage;
use crate::model::task::TaskId;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use std::cell::RefCell;
use uuid::Uuid;

/// Uniform notification capability surface.
pub trait NativeBridge {
    fn is_native(&self) -> bool;
    fn platform(&self) -> Platform;
    /// Last token known to the shell, if any.
    fn current_token(&self) -> Option<DeviceToken>;
    /// Asks for permission and a fresh token.
    fn refresh_token(&self) -> TokenRefresh;

    fn on_token_issued(&self, listener: Box<dyn FnMut(&PushTokenEvent)>) -> Subscription;
    fn on_notification_received(
        &self,
        listener: Box<dyn FnMut(&ReceivedNotification)>,
    ) -> Subscription;
    fn on_notification_tapped(
        &self,
        listener: Box<dyn FnMut(&ReceivedNotification)>,
    ) -> Subscription;

    fn schedule_local(&self, request: &LocalNotificationRequest);
    fn cancel(&self, ids: &[NotificationId]);
    fn cancel_all(&self);

    /// Schedules a single due-time reminder for a task.
    fn schedule_task_reminder(
        &self,
        task_id: TaskId,
        title: &str,
        at: DateTime<Utc>,
    ) -> NotificationId {
        let id = NotificationId::for_fire(task_id, at, ReminderStage::Due);
        let request = LocalNotificationRequest::new(
            id,
            "Task reminder",
            title,
            NotificationSchedule::At { at },
        )
        .for_task(task_id);
        self.schedule_local(&request);
        id
    }

    /// Schedules a reminder `minutes_before` a calendar event starts.
    fn schedule_event_reminder(
        &self,
        event_id: Uuid,
        title: &str,
        starts_at: DateTime<Utc>,
        minutes_before: u32,
    ) -> NotificationId {
        let stage = ReminderStage::from_offset(minutes_before);
        let id = NotificationId::for_fire(event_id, starts_at, stage);
        let body = match stage {
            ReminderStage::Due => format!("{title} starts now"),
            ReminderStage::Advance { minutes } => format!("{title} starts in {minutes} min"),
        };
        let at = starts_at - Duration::minutes(i64::from(minutes_before));
        let mut request =
            LocalNotificationRequest::new(id, "Upcoming event", body, NotificationSchedule::At { at });
        request.deep_link = Some(calendar_deep_link(starts_at.date_naive()));
        self.schedule_local(&request);
        id
    }

    /// Fires a local notification two seconds from now.
    ///
    /// Development builds inside a native shell only; returns whether a
    /// notification was requested.
    fn send_test_notification(&self) -> bool {
        if !cfg!(debug_assertions) || !self.is_native() {
            debug!("event=test_notification module=bridge status=skipped");
            return false;
        }
        let request = LocalNotificationRequest::new(
            NotificationId::TEST_FIRE,
            "StudyHub",
            "Test notification: notifications are working.",
            NotificationSchedule::After { seconds: 2 },
        );
        self.schedule_local(&request);
        true
    }
}

/// Vendor-SDK-shaped platform notification API.
pub trait PlatformNotifier {
    /// Runtime capability probe.
    fn is_available(&self) -> bool;
    fn platform(&self) -> Platform;
    fn current_token(&self) -> Option<DeviceToken>;
    fn request_permission(&self) -> Result<bool, BridgeError>;
    /// Registers with the push service and returns the issued token.
    fn register_for_push(&self) -> Result<Option<DeviceToken>, BridgeError>;
    fn schedule(&self, request: &LocalNotificationRequest) -> Result<(), BridgeError>;
    fn cancel(&self, ids: &[NotificationId]) -> Result<(), BridgeError>;
    fn cancel_all(&self) -> Result<(), BridgeError>;
}

/// Adapter used inside a native shell.
///
/// The host forwards platform callbacks through `emit_*`.
pub struct NativeShell<N> {
    notifier: N,
    token_issued: ListenerSet<PushTokenEvent>,
    received: ListenerSet<ReceivedNotification>,
    tapped: ListenerSet<ReceivedNotification>,
    last_token: RefCell<Option<DeviceToken>>,
}

impl<N: PlatformNotifier> NativeShell<N> {
    pub fn new(notifier: N) -> Self {
        Self {
            notifier,
            token_issued: ListenerSet::new("token_issued"),
            received: ListenerSet::new("notification_received"),
            tapped: ListenerSet::new("notification_tapped"),
            last_token: RefCell::new(None),
        }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Platform issued or rotated the device token.
    pub fn emit_token_issued(&self, token: DeviceToken) {
        info!(
            "event=token_issued module=bridge status=ok platform={} token={}",
            self.notifier.platform().as_str(),
            token.redacted()
        );
        *self.last_token.borrow_mut() = Some(token.clone());
        let event = PushTokenEvent {
            token,
            platform: self.notifier.platform(),
        };
        self.token_issued.emit(&event);
    }

    /// Notification arrived while the app was in the foreground.
    pub fn emit_received(&self, notification: ReceivedNotification) {
        debug!(
            "event=notification_received module=bridge status=ok has_task={}",
            notification.task_id.is_some()
        );
        self.received.emit(&notification);
    }

    /// User tapped a notification.
    pub fn emit_tapped(&self, notification: ReceivedNotification) {
        debug!(
            "event=notification_tapped module=bridge status=ok has_task={}",
            notification.task_id.is_some()
        );
        self.tapped.emit(&notification);
    }
}

impl<N: PlatformNotifier> NativeBridge for NativeShell<N> {
    fn is_native(&self) -> bool {
        true
    }

    fn platform(&self) -> Platform {
        self.notifier.platform()
    }

    fn current_token(&self) -> Option<DeviceToken> {
        let cached = self.last_token.borrow().clone();
        cached.or_else(|| self.notifier.current_token())
    }

    fn refresh_token(&self) -> TokenRefresh {
        let permission_granted = match self.notifier.request_permission() {
            Ok(granted) => granted,
            Err(err) => {
                warn!(
                    "event=token_refresh module=bridge status=error stage=permission error={err}"
                );
                false
            }
        };
        if !permission_granted {
            info!("event=token_refresh module=bridge status=ok permission=false");
            return TokenRefresh {
                token: None,
                permission_granted: false,
            };
        }

        match self.notifier.register_for_push() {
            Ok(Some(token)) => {
                self.emit_token_issued(token.clone());
                TokenRefresh {
                    token: Some(token),
                    permission_granted: true,
                }
            }
            Ok(None) => {
                info!("event=token_refresh module=bridge status=ok permission=true token=none");
                TokenRefresh {
                    token: self.current_token(),
                    permission_granted: true,
                }
            }
            Err(err) => {
                warn!("event=token_refresh module=bridge status=error stage=register error={err}");
                TokenRefresh {
                    token: self.current_token(),
                    permission_granted: true,
                }
            }
        }
    }

    fn on_token_issued(&self, listener: Box<dyn FnMut(&PushTokenEvent)>) -> Subscription {
        self.token_issued.subscribe(listener)
    }

    fn on_notification_received(
        &self,
        listener: Box<dyn FnMut(&ReceivedNotification)>,
    ) -> Subscription {
        self.received.subscribe(listener)
    }

    fn on_notification_tapped(
        &self,
        listener: Box<dyn FnMut(&ReceivedNotification)>,
    ) -> Subscription {
        self.tapped.subscribe(listener)
    }

    fn schedule_local(&self, request: &LocalNotificationRequest) {
        match self.notifier.schedule(request) {
            Ok(()) => debug!(
                "event=notification_schedule module=bridge status=ok notification_id={}",
                request.id.0
            ),
            Err(err) => warn!(
                "event=notification_schedule module=bridge status=error notification_id={} error={err}",
                request.id.0
            ),
        }
    }

    fn cancel(&self, ids: &[NotificationId]) {
        if ids.is_empty() {
            return;
        }
        match self.notifier.cancel(ids) {
            Ok(()) => debug!(
                "event=notification_cancel module=bridge status=ok count={}",
                ids.len()
            ),
            Err(err) => warn!(
                "event=notification_cancel module=bridge status=error count={} error={err}",
                ids.len()
            ),
        }
    }

    fn cancel_all(&self) {
        match self.notifier.cancel_all() {
            Ok(()) => info!("event=notification_cancel_all module=bridge status=ok"),
            Err(err) => warn!("event=notification_cancel_all module=bridge status=error error={err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{NativeBridge, NativeShell, PlatformNotifier};
    use crate::bridge::BridgeError;
    use crate::model::notification::{
        DeviceToken, LocalNotificationRequest, NotificationId, NotificationSchedule, Platform,
    };
    use chrono::{TimeZone, Utc};
    use std::cell::RefCell;
    use std::rc::Rc;
    use uuid::Uuid;

    #[derive(Default)]
    struct FlakyNotifier {
        scheduled: RefCell<Vec<LocalNotificationRequest>>,
        deny_permission: bool,
    }

    impl PlatformNotifier for FlakyNotifier {
        fn is_available(&self) -> bool {
            true
        }

        fn platform(&self) -> Platform {
            Platform::Android
        }

        fn current_token(&self) -> Option<DeviceToken> {
            None
        }

        fn request_permission(&self) -> Result<bool, BridgeError> {
            Ok(!self.deny_permission)
        }

        fn register_for_push(&self) -> Result<Option<DeviceToken>, BridgeError> {
            Ok(Some(DeviceToken::parse("fcm-fresh").expect("token")))
        }

        fn schedule(&self, request: &LocalNotificationRequest) -> Result<(), BridgeError> {
            if request.title.is_empty() {
                return Err(BridgeError::Platform("title required".to_string()));
            }
            self.scheduled.borrow_mut().push(request.clone());
            Ok(())
        }

        fn cancel(&self, _ids: &[NotificationId]) -> Result<(), BridgeError> {
            Err(BridgeError::Unavailable)
        }

        fn cancel_all(&self) -> Result<(), BridgeError> {
            Ok(())
        }
    }

    #[test]
    fn platform_errors_are_swallowed() {
        let shell = NativeShell::new(FlakyNotifier::default());
        shell.schedule_local(&LocalNotificationRequest::new(
            NotificationId(2048),
            "",
            "body",
            NotificationSchedule::Immediate,
        ));
        shell.cancel(&[NotificationId(2048)]);
        assert!(shell.notifier().scheduled.borrow().is_empty());
    }

    #[test]
    fn refresh_token_emits_and_caches_token() {
        let shell = NativeShell::new(FlakyNotifier::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = shell.on_token_issued(Box::new(move |event| {
            sink.borrow_mut().push(event.token.as_str().to_string());
        }));

        let refresh = shell.refresh_token();
        assert!(refresh.permission_granted);
        assert_eq!(refresh.token.as_ref().map(DeviceToken::as_str), Some("fcm-fresh"));
        assert_eq!(*seen.borrow(), vec!["fcm-fresh".to_string()]);
        assert_eq!(
            shell.current_token().as_ref().map(DeviceToken::as_str),
            Some("fcm-fresh")
        );
    }

    #[test]
    fn denied_permission_yields_no_token() {
        let shell = NativeShell::new(FlakyNotifier {
            deny_permission: true,
            ..FlakyNotifier::default()
        });
        let refresh = shell.refresh_token();
        assert!(!refresh.permission_granted);
        assert!(refresh.token.is_none());
    }

    #[test]
    fn event_reminder_fires_before_start_with_calendar_link() {
        let shell = NativeShell::new(FlakyNotifier::default());
        let starts_at = Utc.with_ymd_and_hms(2026, 9, 14, 10, 0, 0).unwrap();
        shell.schedule_event_reminder(Uuid::new_v4(), "Lecture", starts_at, 15);

        let scheduled = shell.notifier().scheduled.borrow();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(
            scheduled[0].schedule,
            NotificationSchedule::At {
                at: Utc.with_ymd_and_hms(2026, 9, 14, 9, 45, 0).unwrap()
            }
        );
        assert_eq!(
            scheduled[0].deep_link.as_deref(),
            Some("studyhub://calendar/2026-09-14")
        );
    }
}
