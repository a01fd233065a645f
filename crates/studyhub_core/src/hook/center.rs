//! Lifecycle owner of the notification state.

use crate::bridge::NativeBridge;
use crate::events::{EventBus, EventKind, EventPayload, ListenerSet, Subscription};
use crate::hook::deep_link::parse_deep_link;
use crate::hook::state::{reduce, NotificationAction, NotificationState};
use crate::model::notification::{
    DeviceToken, LocalNotificationRequest, NotificationId, PushTokenEvent, ReceivedNotification,
    TokenRefresh,
};
use crate::model::task::TaskId;
use crate::push::{
    AuthChange, IdentityProvider, PushPayload, PushRegistrationManager, RegistrationOutcome,
    SendResult,
};
use crate::scheduler::ReminderScheduler;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

const DEFAULT_EVENT_REMINDER_MINUTES: u32 = 15;

/// Collaborators of a [`NotificationCenter`].
pub struct CenterDeps {
    pub bridge: Rc<dyn NativeBridge>,
    pub registration: Rc<PushRegistrationManager>,
    pub identity: Rc<dyn IdentityProvider>,
    pub bus: Rc<EventBus>,
    /// Attached to the bus while the center is active.
    pub scheduler: Option<Rc<ReminderScheduler>>,
}

struct CenterInner {
    deps: CenterDeps,
    state: RefCell<NotificationState>,
    observers: ListenerSet<NotificationState>,
    subscriptions: RefCell<Vec<Subscription>>,
    active: Cell<bool>,
    last_registration: RefCell<Option<RegistrationOutcome>>,
}

impl CenterInner {
    fn dispatch(&self, action: NotificationAction) {
        let name = action.name();
        let next = {
            let current = self.state.borrow();
            reduce(&current, action)
        };
        if *self.state.borrow() == next {
            debug!("event=state_dispatch module=hook status=unchanged action={name}");
            return;
        }
        *self.state.borrow_mut() = next.clone();
        debug!("event=state_dispatch module=hook status=ok action={name}");
        self.observers.emit(&next);
    }

    fn remember(&self, outcome: RegistrationOutcome) {
        *self.last_registration.borrow_mut() = Some(outcome);
    }

    fn on_token_issued(&self, event: &PushTokenEvent) {
        self.dispatch(NotificationAction::TokenIssued(event.token.clone()));
        let outcome = self
            .deps
            .registration
            .register_token(&event.token, event.platform);
        self.remember(outcome);
    }

    fn on_received(&self, notification: &ReceivedNotification) {
        self.dispatch(NotificationAction::Received(notification.clone()));
        self.deps.bus.publish(
            EventKind::NewItem,
            EventPayload::Notification(notification.clone()),
        );
    }

    fn on_tapped(&self, notification: &ReceivedNotification) {
        self.dispatch(NotificationAction::Tapped(notification.clone()));
        if let Some(link) = notification.deep_link.as_deref() {
            match parse_deep_link(link) {
                Some(target) => info!(
                    "event=notification_tap module=hook status=ok route={}",
                    target.as_route()
                ),
                None => return,
            }
        }
        self.deps.bus.publish(
            EventKind::OpenIndicator,
            EventPayload::Notification(notification.clone()),
        );
    }

    fn on_auth_change(&self, change: &AuthChange) {
        match change {
            AuthChange::SignedIn(user_id) => {
                let token = self
                    .state
                    .borrow()
                    .token
                    .clone()
                    .or_else(|| self.deps.bridge.current_token());
                info!(
                    "event=auth_change module=hook status=ok change=signed_in user_id={user_id} has_token={}",
                    token.is_some()
                );
                if let Some(token) = token {
                    let outcome = self
                        .deps
                        .registration
                        .register_token(&token, self.deps.bridge.platform());
                    self.remember(outcome);
                }
            }
            AuthChange::SignedOut => {
                info!("event=auth_change module=hook status=ok change=signed_out");
                let outcome = self.deps.registration.cleanup();
                self.remember(outcome);
                self.dispatch(NotificationAction::SignedOut);
            }
        }
    }
}

/// Reactive façade the UI consumes.
///
/// # Invariants
/// - Only this type writes [`NotificationState`], always through `reduce`.
/// - `deactivate` detaches every subscription `activate` created.
pub struct NotificationCenter {
    inner: Rc<CenterInner>,
}

impl NotificationCenter {
    pub fn new(deps: CenterDeps) -> Self {
        Self {
            inner: Rc::new(CenterInner {
                deps,
                state: RefCell::new(NotificationState::default()),
                observers: ListenerSet::new("notification_state"),
                subscriptions: RefCell::new(Vec::new()),
                active: Cell::new(false),
                last_registration: RefCell::new(None),
            }),
        }
    }

    /// Wires bridge, identity and bus listeners, then registers any existing
    /// token. Calling it twice is a no-op.
    pub fn activate(&self) {
        if self.inner.active.replace(true) {
            debug!("event=center_activate module=hook status=skipped reason=already_active");
            return;
        }
        let deps = &self.inner.deps;
        let bridge = Rc::clone(&deps.bridge);

        self.inner.dispatch(NotificationAction::Activated {
            is_native: bridge.is_native(),
            platform: bridge.platform(),
            token: bridge.current_token(),
        });

        let mut subscriptions = Vec::new();
        let weak = Rc::downgrade(&self.inner);
        subscriptions.push(bridge.on_token_issued(Box::new(
            with_inner::<PushTokenEvent>(&weak, |inner, event| inner.on_token_issued(event)),
        )));
        subscriptions.push(bridge.on_notification_received(Box::new(
            with_inner::<ReceivedNotification>(&weak, |inner, notification| {
                inner.on_received(notification)
            }),
        )));
        subscriptions.push(bridge.on_notification_tapped(Box::new(
            with_inner::<ReceivedNotification>(&weak, |inner, notification| {
                inner.on_tapped(notification)
            }),
        )));
        subscriptions.push(deps.identity.on_auth_change(Box::new(with_inner::<AuthChange>(
            &weak,
            |inner, change| inner.on_auth_change(change),
        ))));
        if let Some(scheduler) = &deps.scheduler {
            subscriptions.extend(scheduler.attach(&deps.bus));
        }
        let count = subscriptions.len();
        self.inner.subscriptions.borrow_mut().extend(subscriptions);

        let outcome = deps.registration.initialize(bridge.as_ref());
        self.inner.remember(outcome);
        info!(
            "event=center_activate module=hook status=ok native={} subscriptions={count}",
            bridge.is_native()
        );
    }

    pub fn deactivate(&self) {
        if !self.inner.active.replace(false) {
            return;
        }
        let subscriptions = std::mem::take(&mut *self.inner.subscriptions.borrow_mut());
        let count = subscriptions.len();
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        self.inner.dispatch(NotificationAction::Deactivated);
        info!("event=center_deactivate module=hook status=ok subscriptions={count}");
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub fn state(&self) -> NotificationState {
        self.inner.state.borrow().clone()
    }

    /// Observes every state change; the listener gets the new state.
    pub fn subscribe_state(&self, listener: impl FnMut(&NotificationState) + 'static) -> Subscription {
        self.inner.observers.subscribe(listener)
    }

    /// Outcome of the most recent registration or cleanup attempt.
    pub fn last_registration(&self) -> Option<RegistrationOutcome> {
        self.inner.last_registration.borrow().clone()
    }

    /// Asks for permission and a fresh token; updates `permission_granted`.
    pub fn refresh_token(&self) -> TokenRefresh {
        let refresh = self.inner.deps.bridge.refresh_token();
        self.inner.dispatch(NotificationAction::TokenRefreshed {
            token: refresh.token.clone(),
            permission_granted: refresh.permission_granted,
        });
        refresh
    }

    pub fn send_test_notification(&self) -> bool {
        self.inner.deps.bridge.send_test_notification()
    }

    pub fn schedule_local(&self, request: &LocalNotificationRequest) {
        self.inner.deps.bridge.schedule_local(request);
    }

    pub fn schedule_task_reminder(
        &self,
        task_id: TaskId,
        title: &str,
        at: DateTime<Utc>,
    ) -> NotificationId {
        self.inner
            .deps
            .bridge
            .schedule_task_reminder(task_id, title, at)
    }

    /// `minutes_before` defaults to the scheduler's configured event offset.
    pub fn schedule_event_reminder(
        &self,
        event_id: TaskId,
        title: &str,
        starts_at: DateTime<Utc>,
        minutes_before: Option<u32>,
    ) -> NotificationId {
        let minutes = minutes_before.unwrap_or_else(|| {
            self.inner
                .deps
                .scheduler
                .as_ref()
                .map_or(DEFAULT_EVENT_REMINDER_MINUTES, |scheduler| {
                    scheduler.config().default_event_reminder_minutes
                })
        });
        self.inner
            .deps
            .bridge
            .schedule_event_reminder(event_id, title, starts_at, minutes)
    }

    /// Cancels every pending local notification and forgets the ledger.
    pub fn cancel_all(&self) {
        match &self.inner.deps.scheduler {
            Some(scheduler) => {
                if let Err(err) = scheduler.cancel_all() {
                    error!("event=center_cancel_all module=hook status=error error={err}");
                }
            }
            None => self.inner.deps.bridge.cancel_all(),
        }
    }

    pub fn send_push(&self, payload: &PushPayload) -> SendResult {
        self.inner.deps.registration.send_to_current_user(payload)
    }

    /// Server-side disassociation; the local token stays in state.
    pub fn cleanup(&self) -> RegistrationOutcome {
        let outcome = self.inner.deps.registration.cleanup();
        self.inner.remember(outcome.clone());
        outcome
    }

    pub fn current_token(&self) -> Option<DeviceToken> {
        self.inner.state.borrow().token.clone()
    }
}

impl Drop for NotificationCenter {
    fn drop(&mut self) {
        self.deactivate();
    }
}

/// Adapts a center callback into a listener that holds only a weak handle.
fn with_inner<T: 'static>(
    weak: &Weak<CenterInner>,
    callback: impl Fn(&CenterInner, &T) + 'static,
) -> impl FnMut(&T) + 'static {
    let weak = Weak::clone(weak);
    move |value| {
        if let Some(inner) = weak.upgrade() {
            callback(&inner, value);
        }
    }
}
