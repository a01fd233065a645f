//! Null-object bridge for plain browser contexts.

use crate::bridge::native::NativeBridge;
use crate::events::listeners::Subscription;
use crate::model::notification::{
    DeviceToken, LocalNotificationRequest, NotificationId, Platform, PushTokenEvent,
    ReceivedNotification, TokenRefresh,
};
use log::debug;

/// Capability-absent adapter; every call is a silent no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebBridge;

impl WebBridge {
    pub fn new() -> Self {
        Self
    }
}

impl NativeBridge for WebBridge {
    fn is_native(&self) -> bool {
        false
    }

    fn platform(&self) -> Platform {
        Platform::Web
    }

    fn current_token(&self) -> Option<DeviceToken> {
        None
    }

    fn refresh_token(&self) -> TokenRefresh {
        TokenRefresh::default()
    }

    fn on_token_issued(&self, _listener: Box<dyn FnMut(&PushTokenEvent)>) -> Subscription {
        Subscription::noop()
    }

    fn on_notification_received(
        &self,
        _listener: Box<dyn FnMut(&ReceivedNotification)>,
    ) -> Subscription {
        Subscription::noop()
    }

    fn on_notification_tapped(
        &self,
        _listener: Box<dyn FnMut(&ReceivedNotification)>,
    ) -> Subscription {
        Subscription::noop()
    }

    fn schedule_local(&self, request: &LocalNotificationRequest) {
        debug!(
            "event=notification_schedule module=bridge status=skipped reason=not_native notification_id={}",
            request.id.0
        );
    }

    fn cancel(&self, _ids: &[NotificationId]) {}

    fn cancel_all(&self) {}
}
