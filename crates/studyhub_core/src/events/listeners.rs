//! Single-threaded listener registry with panic isolation.
//!
//! # Invariants
//! - Listeners run in subscription order.
//! - A panicking listener is logged and counted; later listeners still run.
//! - Dispatch works on a snapshot taken when `emit` starts; listeners removed
//!   during dispatch are not invoked afterwards.

use crate::logging::panic_payload_text;
use log::{error, warn};
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

type SharedListener<T> = Rc<RefCell<Box<dyn FnMut(&T)>>>;

struct Registry<T> {
    next_id: u64,
    entries: Vec<(u64, SharedListener<T>)>,
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    /// Listeners skipped because they were already running (re-entrant emit).
    pub skipped: usize,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Handle returned by every `subscribe`.
///
/// Dropping the handle leaves the listener registered; call
/// [`Subscription::unsubscribe`] to detach it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(detach: impl FnOnce() + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Subscription for capability-absent surfaces; unsubscribing does nothing.
    pub fn noop() -> Self {
        Self { detach: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

/// Ordered listener list for one channel.
pub struct ListenerSet<T> {
    channel: &'static str,
    registry: Rc<RefCell<Registry<T>>>,
}

impl<T> Clone for ListenerSet<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel,
            registry: Rc::clone(&self.registry),
        }
    }
}

impl<T: 'static> ListenerSet<T> {
    pub fn new(channel: &'static str) -> Self {
        Self {
            channel,
            registry: Rc::new(RefCell::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub fn channel(&self) -> &'static str {
        self.channel
    }

    pub fn subscribe(&self, listener: impl FnMut(&T) + 'static) -> Subscription {
        let id = {
            let mut registry = self.registry.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            let boxed: Box<dyn FnMut(&T)> = Box::new(listener);
            registry.entries.push((id, Rc::new(RefCell::new(boxed))));
            id
        };

        let weak = Rc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = weak.upgrade() {
                registry
                    .borrow_mut()
                    .entries
                    .retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Invokes every listener with `value`. Never panics.
    pub fn emit(&self, value: &T) -> DispatchReport {
        let snapshot = self.registry.borrow().entries.clone();
        let mut report = DispatchReport::default();

        for (id, listener) in snapshot {
            if !self.contains(id) {
                continue;
            }
            let Ok(mut callback) = listener.try_borrow_mut() else {
                warn!(
                    "event=listener_skipped module=events status=skipped channel={} listener_id={} reason=reentrant",
                    self.channel, id
                );
                report.skipped += 1;
                continue;
            };
            match catch_unwind(AssertUnwindSafe(|| (*callback)(value))) {
                Ok(()) => report.delivered += 1,
                Err(payload) => {
                    report.failed += 1;
                    error!(
                        "event=listener_failed module=events status=error channel={} listener_id={} payload={}",
                        self.channel,
                        id,
                        panic_payload_text(payload.as_ref())
                    );
                }
            }
        }

        report
    }

    /// Removes every listener; outstanding handles become no-ops.
    pub fn clear(&self) {
        self.registry.borrow_mut().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.borrow().entries.is_empty()
    }

    fn contains(&self, id: u64) -> bool {
        self.registry
            .borrow()
            .entries
            .iter()
            .any(|(entry_id, _)| *entry_id == id)
    }
}
