#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use studyhub_core::bridge::BridgeError;
use studyhub_core::db::open_db_in_memory;
use studyhub_core::push::{BackendError, FunctionReply};
use studyhub_core::{
    Clock, DeviceToken, FixedClock, LocalNotificationRequest, NativeBridge, NativeShell,
    NotificationId, Platform, PlatformNotifier, PushBackend, ReminderConfig, ReminderScheduler,
    SqliteReminderStore, UserId, UserPreferences,
};

/// Platform call as seen by the notifier, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformOp {
    Schedule(NotificationId),
    Cancel(Vec<NotificationId>),
    CancelAll,
}

/// In-memory platform that keeps the pending set the OS would keep.
pub struct RecordingNotifier {
    pub platform: Platform,
    pub token: RefCell<Option<DeviceToken>>,
    pub grant_permission: Cell<bool>,
    pub issue_token: RefCell<Option<DeviceToken>>,
    pending: RefCell<BTreeMap<NotificationId, LocalNotificationRequest>>,
    ops: RefCell<Vec<PlatformOp>>,
}

impl RecordingNotifier {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            token: RefCell::new(None),
            grant_permission: Cell::new(true),
            issue_token: RefCell::new(None),
            pending: RefCell::new(BTreeMap::new()),
            ops: RefCell::new(Vec::new()),
        }
    }

    pub fn with_token(self, token: &str) -> Self {
        *self.token.borrow_mut() = Some(DeviceToken::parse(token).unwrap());
        self
    }

    pub fn pending(&self) -> Vec<LocalNotificationRequest> {
        let mut items = self.pending.borrow().values().cloned().collect::<Vec<_>>();
        items.sort_by_key(|request| fire_key(request));
        items
    }

    pub fn ops(&self) -> Vec<PlatformOp> {
        self.ops.borrow().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.borrow_mut().clear();
    }
}

fn fire_key(request: &LocalNotificationRequest) -> (Option<DateTime<Utc>>, i32) {
    let at = match request.schedule {
        studyhub_core::NotificationSchedule::At { at } => Some(at),
        _ => None,
    };
    (at, request.id.0)
}

impl PlatformNotifier for RecordingNotifier {
    fn is_available(&self) -> bool {
        true
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn current_token(&self) -> Option<DeviceToken> {
        self.token.borrow().clone()
    }

    fn request_permission(&self) -> Result<bool, BridgeError> {
        Ok(self.grant_permission.get())
    }

    fn register_for_push(&self) -> Result<Option<DeviceToken>, BridgeError> {
        let issued = self.issue_token.borrow().clone();
        if let Some(token) = &issued {
            *self.token.borrow_mut() = Some(token.clone());
        }
        Ok(issued)
    }

    fn schedule(&self, request: &LocalNotificationRequest) -> Result<(), BridgeError> {
        self.ops.borrow_mut().push(PlatformOp::Schedule(request.id));
        self.pending.borrow_mut().insert(request.id, request.clone());
        Ok(())
    }

    fn cancel(&self, ids: &[NotificationId]) -> Result<(), BridgeError> {
        self.ops.borrow_mut().push(PlatformOp::Cancel(ids.to_vec()));
        let mut pending = self.pending.borrow_mut();
        for id in ids {
            pending.remove(id);
        }
        Ok(())
    }

    fn cancel_all(&self) -> Result<(), BridgeError> {
        self.ops.borrow_mut().push(PlatformOp::CancelAll);
        self.pending.borrow_mut().clear();
        Ok(())
    }
}

/// Backend double recording token calls and function invocations.
#[derive(Default)]
pub struct RecordingBackend {
    pub upserts: RefCell<Vec<(UserId, DeviceToken, Platform)>>,
    pub removals: RefCell<Vec<(UserId, DeviceToken)>>,
    pub invocations: RefCell<Vec<(String, Value)>>,
    pub offline: Cell<bool>,
    pub reply: RefCell<Option<FunctionReply>>,
}

impl PushBackend for RecordingBackend {
    fn upsert_device_token(
        &self,
        user_id: UserId,
        token: &DeviceToken,
        platform: Platform,
    ) -> Result<(), BackendError> {
        if self.offline.get() {
            return Err(BackendError::Network("offline".to_string()));
        }
        self.upserts
            .borrow_mut()
            .push((user_id, token.clone(), platform));
        Ok(())
    }

    fn remove_device_token(
        &self,
        user_id: UserId,
        token: &DeviceToken,
    ) -> Result<(), BackendError> {
        if self.offline.get() {
            return Err(BackendError::Network("offline".to_string()));
        }
        self.removals.borrow_mut().push((user_id, token.clone()));
        Ok(())
    }

    fn invoke_function(&self, name: &str, body: &Value) -> Result<FunctionReply, BackendError> {
        if self.offline.get() {
            return Err(BackendError::Network("offline".to_string()));
        }
        self.invocations
            .borrow_mut()
            .push((name.to_string(), body.clone()));
        Ok(self
            .reply
            .borrow()
            .clone()
            .unwrap_or_else(|| FunctionReply::ok(serde_json::json!({ "success": true }))))
    }
}

/// Scheduler wired to a recording native shell and an in-memory store.
pub struct Harness {
    pub shell: Rc<NativeShell<RecordingNotifier>>,
    pub store: Rc<SqliteReminderStore>,
    pub clock: Rc<FixedClock>,
    pub scheduler: Rc<ReminderScheduler>,
}

impl Harness {
    pub fn new(now: DateTime<Utc>, preferences: UserPreferences) -> Self {
        let shell = Rc::new(NativeShell::new(RecordingNotifier::new(Platform::Android)));
        let store = Rc::new(SqliteReminderStore::try_new(open_db_in_memory().unwrap()).unwrap());
        let clock = Rc::new(FixedClock::new(now));
        let scheduler = Rc::new(ReminderScheduler::new(
            Rc::clone(&shell) as Rc<dyn NativeBridge>,
            Rc::clone(&store) as Rc<dyn studyhub_core::ReminderStore>,
            Rc::clone(&clock) as Rc<dyn Clock>,
            preferences,
            ReminderConfig::default(),
        ));
        Self {
            shell,
            store,
            clock,
            scheduler,
        }
    }

    pub fn notifier(&self) -> &RecordingNotifier {
        self.shell.notifier()
    }

    /// Scheduled instants of pending `At` notifications, ascending.
    pub fn pending_times(&self) -> Vec<DateTime<Utc>> {
        let mut times = self
            .notifier()
            .pending()
            .into_iter()
            .filter_map(|request| match request.schedule {
                studyhub_core::NotificationSchedule::At { at } => Some(at),
                _ => None,
            })
            .collect::<Vec<_>>();
        times.sort();
        times
    }
}

pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .unwrap()
}
