//! Explicitly constructed publish/subscribe bus.
//!
//! One bus instance is created at startup and shared (`Rc<EventBus>`) with the
//! components that publish or listen; there is no process-global registry.

use crate::events::listeners::{DispatchReport, ListenerSet, Subscription};
use crate::model::notification::ReceivedNotification;
use crate::model::task::{Task, TaskId};
use log::debug;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Closed set of bus event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Open the in-app notification indicator/panel.
    OpenIndicator,
    /// A new notification-worthy item arrived.
    NewItem,
    /// Time-critical alarm that should interrupt the user.
    UrgentAlarm,
    /// A task was created or edited; reminders need recomputing.
    TaskChanged,
    TaskCompleted,
    TaskDeleted,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::OpenIndicator,
        EventKind::NewItem,
        EventKind::UrgentAlarm,
        EventKind::TaskChanged,
        EventKind::TaskCompleted,
        EventKind::TaskDeleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenIndicator => "open_indicator",
            Self::NewItem => "new_item",
            Self::UrgentAlarm => "urgent_alarm",
            Self::TaskChanged => "task_changed",
            Self::TaskCompleted => "task_completed",
            Self::TaskDeleted => "task_deleted",
        }
    }
}

/// Data carried by one publish.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Empty,
    Task(Box<Task>),
    TaskRef(TaskId),
    Notification(ReceivedNotification),
    Message { title: String, body: String },
}

/// What listeners receive.
#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    pub kind: EventKind,
    pub payload: EventPayload,
}

/// Synchronous, single-threaded event bus.
#[derive(Default)]
pub struct EventBus {
    channels: RefCell<BTreeMap<EventKind, ListenerSet<BusEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        kind: EventKind,
        listener: impl FnMut(&BusEvent) + 'static,
    ) -> Subscription {
        let set = self
            .channels
            .borrow_mut()
            .entry(kind)
            .or_insert_with(|| ListenerSet::new(kind.as_str()))
            .clone();
        set.subscribe(listener)
    }

    /// Delivers to every listener of `kind` before returning.
    ///
    /// Publishing with no listeners is a no-op.
    pub fn publish(&self, kind: EventKind, payload: EventPayload) -> DispatchReport {
        let set = self.channels.borrow().get(&kind).cloned();
        let Some(set) = set else {
            debug!(
                "event=bus_publish module=events status=ok kind={} listeners=0",
                kind.as_str()
            );
            return DispatchReport::default();
        };

        let event = BusEvent { kind, payload };
        let report = set.emit(&event);
        debug!(
            "event=bus_publish module=events status={} kind={} delivered={} failed={} skipped={}",
            if report.is_clean() { "ok" } else { "degraded" },
            kind.as_str(),
            report.delivered,
            report.failed,
            report.skipped
        );
        report
    }

    pub fn unsubscribe_all(&self, kind: EventKind) {
        if let Some(set) = self.channels.borrow().get(&kind) {
            set.clear();
        }
    }

    /// Drops every listener of every kind.
    pub fn reset(&self) {
        let channels = std::mem::take(&mut *self.channels.borrow_mut());
        for set in channels.values() {
            set.clear();
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.channels.borrow().get(&kind).map_or(0, ListenerSet::len)
    }
}
