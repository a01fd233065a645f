//! Reminder scheduler service.
//!
//! # Responsibility
//! - Turn plans into platform notifications and keep the ledger in sync.
//! - Own snooze persistence and the completion/deletion cancellation paths.
//! - React to task events published on the bus.
//!
//! # Invariants
//! - Every issue path cancels the task's ledger entries first.
//! - Only notifications actually handed to a native platform are recorded.

use crate::bridge::NativeBridge;
use crate::config::ReminderConfig;
use crate::events::{BusEvent, EventBus, EventKind, EventPayload, Subscription};
use crate::model::notification::{LocalNotificationRequest, NotificationId, NotificationSchedule};
use crate::model::preferences::UserPreferences;
use crate::model::snooze::{ReminderStage, SnoozedReminder};
use crate::model::task::{SnoozeState, Task, TaskId};
use crate::repo::reminder_store::{LedgerEntry, ReminderStore, RepoError};
use crate::scheduler::batch::{batch_fires, BatchedDelivery};
use crate::scheduler::plan::{current_occurrence, plan_task_reminders, PlannedFire, ReminderPlan};
use crate::scheduler::recurrence::spawn_next_instance;
use crate::scheduler::Clock;
use chrono::{DateTime, Duration, Utc};
use log::{error, info, warn};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::{Rc, Weak};

/// Scheduler use-case error.
#[derive(Debug)]
pub enum SchedulerError {
    Repo(RepoError),
    InvalidSnoozeMinutes { minutes: u32, max: u32 },
    /// Task has no occurrence left to remind about.
    NoUpcomingOccurrence(TaskId),
}

impl Display for SchedulerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::InvalidSnoozeMinutes { minutes, max } => {
                write!(f, "snooze minutes must be in 1..={max}, got {minutes}")
            }
            Self::NoUpcomingOccurrence(task_id) => {
                write!(f, "task {task_id} has no upcoming occurrence")
            }
        }
    }
}

impl Error for SchedulerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for SchedulerError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Result of a snooze request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnoozeOutcome {
    pub record: SnoozedReminder,
    pub plan: ReminderPlan,
    /// Updated task-side snooze bookkeeping for the host to persist.
    pub snooze_state: SnoozeState,
}

const DIGEST_TITLE: &str = "StudyHub reminders";
const SPLIT_BODY: &str = "Task reminder";

/// Issues and cancels reminders for task snapshots.
pub struct ReminderScheduler {
    bridge: Rc<dyn NativeBridge>,
    store: Rc<dyn ReminderStore>,
    clock: Rc<dyn Clock>,
    preferences: RefCell<UserPreferences>,
    config: ReminderConfig,
}

impl ReminderScheduler {
    pub fn new(
        bridge: Rc<dyn NativeBridge>,
        store: Rc<dyn ReminderStore>,
        clock: Rc<dyn Clock>,
        preferences: UserPreferences,
        config: ReminderConfig,
    ) -> Self {
        Self {
            bridge,
            store,
            clock,
            preferences: RefCell::new(preferences),
            config,
        }
    }

    pub fn preferences(&self) -> UserPreferences {
        self.preferences.borrow().clone()
    }

    /// Replaces the preferences snapshot; affects later plans only.
    pub fn set_preferences(&self, preferences: UserPreferences) {
        *self.preferences.borrow_mut() = preferences;
    }

    pub fn config(&self) -> &ReminderConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Computes the plan without touching the platform.
    pub fn plan(&self, task: &Task) -> SchedulerResult<ReminderPlan> {
        let snoozes = self.store.pending_snoozes(task.id)?;
        let prefs = self.preferences.borrow();
        Ok(plan_task_reminders(task, &snoozes, &prefs, self.clock.now()))
    }

    /// Cancels every scheduled fire of `task`, then issues its current plan.
    pub fn reschedule(&self, task: &Task) -> SchedulerResult<ReminderPlan> {
        self.cancel_task(task.id)?;
        let plan = self.fresh_plan(task)?;
        let deliveries = plan
            .fires
            .iter()
            .cloned()
            .map(BatchedDelivery::Single)
            .collect::<Vec<_>>();
        self.issue(&deliveries, &titles_of(std::slice::from_ref(task)))?;
        info!(
            "event=reminder_reschedule module=scheduler status=ok task_id={} fires={}",
            task.id,
            plan.fires.len()
        );
        Ok(plan)
    }

    /// Reschedules several tasks, merging close fires when batching is on.
    pub fn reschedule_many(&self, tasks: &[Task]) -> SchedulerResult<Vec<ReminderPlan>> {
        let mut plans = Vec::with_capacity(tasks.len());
        for task in tasks {
            self.cancel_task(task.id)?;
            plans.push(self.fresh_plan(task)?);
        }

        let fires = plans
            .iter()
            .flat_map(|plan| plan.fires.iter().cloned())
            .collect::<Vec<_>>();
        let window = if self.preferences.borrow().batch_notifications {
            self.config.batch_window()
        } else {
            Duration::zero()
        };
        let deliveries = batch_fires(fires, window);
        self.issue(&deliveries, &titles_of(tasks))?;
        info!(
            "event=reminder_reschedule_many module=scheduler status=ok tasks={} deliveries={}",
            tasks.len(),
            deliveries.len()
        );
        Ok(plans)
    }

    /// Cancels the task's pending notifications; returns how many ids were
    /// cancelled. Digests shared with other tasks are re-issued per peer.
    pub fn cancel_task(&self, task_id: TaskId) -> SchedulerResult<usize> {
        let ids = self.store.clear_task(task_id)?;
        if ids.is_empty() {
            return Ok(0);
        }
        self.bridge.cancel(&ids);

        for id in &ids {
            let peers = self.store.scheduled_with_id(*id)?;
            if peers.is_empty() {
                continue;
            }
            self.store.remove_notification(*id)?;
            info!(
                "event=digest_split module=scheduler status=ok notification_id={} peers={}",
                id.0,
                peers.len()
            );
            self.reissue_individually(peers)?;
        }
        info!(
            "event=reminder_cancel module=scheduler status=ok task_id={task_id} cancelled={}",
            ids.len()
        );
        Ok(ids.len())
    }

    /// Cancels the task's fires and returns its next recurring instance,
    /// already scheduled, if the series continues.
    pub fn complete_task(&self, task: &Task) -> SchedulerResult<Option<Task>> {
        self.cancel_task(task.id)?;
        self.store.mark_task_snoozes_processed(task.id)?;

        let offset = self.preferences.borrow().local_offset();
        let next = spawn_next_instance(task, self.clock.now(), offset);
        if let Some(next) = &next {
            self.reschedule(next)?;
        }
        info!(
            "event=task_complete module=scheduler status=ok task_id={} next_instance={}",
            task.id,
            next.is_some()
        );
        Ok(next)
    }

    pub fn delete_task(&self, task_id: TaskId) -> SchedulerResult<()> {
        self.cancel_task(task_id)?;
        self.store.mark_task_snoozes_processed(task_id)?;
        info!("event=task_delete module=scheduler status=ok task_id={task_id}");
        Ok(())
    }

    /// Defers `stage` of the task's current occurrence by `minutes`.
    ///
    /// Earlier pending snoozes of the task are superseded.
    pub fn snooze(
        &self,
        task: &Task,
        stage: ReminderStage,
        minutes: u32,
    ) -> SchedulerResult<SnoozeOutcome> {
        let max = self.config.max_snooze_minutes;
        if minutes == 0 || minutes > max {
            return Err(SchedulerError::InvalidSnoozeMinutes { minutes, max });
        }
        let now = self.clock.now();
        let occurrence_at = {
            let prefs = self.preferences.borrow();
            current_occurrence(task, &prefs, now)
        }
        .filter(|_| task.is_active())
        .ok_or(SchedulerError::NoUpcomingOccurrence(task.id))?;

        let superseded = self.store.mark_task_snoozes_processed(task.id)?;
        let record = SnoozedReminder::new(
            task.id,
            stage,
            occurrence_at,
            now.checked_add_signed(Duration::minutes(i64::from(minutes)))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            now,
        );
        self.store.insert_snooze(&record)?;
        info!(
            "event=reminder_snooze module=scheduler status=ok task_id={} stage={} minutes={} superseded={}",
            task.id, stage, minutes, superseded
        );

        let plan = self.reschedule(task)?;
        let mut snooze_state = task.snooze.clone();
        snooze_state.snoozed_until = Some(record.snooze_until);
        snooze_state.snooze_count = snooze_state.snooze_count.saturating_add(1);
        Ok(SnoozeOutcome {
            record,
            plan,
            snooze_state,
        })
    }

    /// Marks `fire` delivered and returns the task's updated bookkeeping.
    pub fn record_delivery(&self, task: &Task, fire: &PlannedFire) -> SchedulerResult<SnoozeState> {
        let mut state = task.snooze.clone();
        if let Some(snooze_id) = fire.snooze_id {
            match self.store.mark_snooze_processed(snooze_id) {
                Ok(()) | Err(RepoError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
            state.snoozed_until = None;
        }
        state.last_reminder_at = Some(self.clock.now().max(fire.fire_at));
        Ok(state)
    }

    /// Bulk cancel of every pending local notification.
    pub fn cancel_all(&self) -> SchedulerResult<usize> {
        self.bridge.cancel_all();
        let removed = self.store.clear_all()?;
        info!("event=reminder_cancel_all module=scheduler status=ok removed={removed}");
        Ok(removed)
    }

    /// Subscribes the scheduler to task events on `bus`.
    ///
    /// Handlers hold a weak reference; dropping the scheduler turns them into
    /// no-ops.
    pub fn attach(self: &Rc<Self>, bus: &EventBus) -> Vec<Subscription> {
        let mut subscriptions = Vec::with_capacity(3);
        for kind in [
            EventKind::TaskChanged,
            EventKind::TaskCompleted,
            EventKind::TaskDeleted,
        ] {
            let scheduler: Weak<Self> = Rc::downgrade(self);
            subscriptions.push(bus.subscribe(kind, move |event| {
                if let Some(scheduler) = scheduler.upgrade() {
                    scheduler.handle_event(event);
                }
            }));
        }
        subscriptions
    }

    fn handle_event(&self, event: &BusEvent) {
        let result = match (event.kind, &event.payload) {
            (EventKind::TaskChanged, EventPayload::Task(task)) => self.reschedule(task).map(|_| ()),
            (EventKind::TaskCompleted, EventPayload::Task(task)) => {
                self.complete_task(task).map(|_| ())
            }
            (EventKind::TaskDeleted, EventPayload::Task(task)) => self.delete_task(task.id),
            (EventKind::TaskDeleted, EventPayload::TaskRef(task_id)) => self.delete_task(*task_id),
            (kind, _) => {
                warn!(
                    "event=scheduler_event module=scheduler status=skipped kind={} reason=unexpected_payload",
                    kind.as_str()
                );
                return;
            }
        };
        if let Err(err) = result {
            error!(
                "event=scheduler_event module=scheduler status=error kind={} error={err}",
                event.kind.as_str()
            );
        }
    }

    /// Plans with stale snoozes (other occurrences) marked processed.
    fn fresh_plan(&self, task: &Task) -> SchedulerResult<ReminderPlan> {
        let now = self.clock.now();
        let prefs = self.preferences.borrow().clone();
        let occurrence = current_occurrence(task, &prefs, now).filter(|_| task.is_active());

        let mut snoozes = self.store.pending_snoozes(task.id)?;
        for stale in snoozes
            .iter()
            .filter(|snooze| Some(snooze.occurrence_at) != occurrence)
        {
            self.store.mark_snooze_processed(stale.id)?;
        }
        snoozes.retain(|snooze| Some(snooze.occurrence_at) == occurrence);

        Ok(plan_task_reminders(task, &snoozes, &prefs, now))
    }

    fn issue(
        &self,
        deliveries: &[BatchedDelivery],
        titles: &BTreeMap<TaskId, String>,
    ) -> SchedulerResult<()> {
        let now = self.clock.now();
        let native = self.bridge.is_native();
        let mut ledger = Vec::new();

        for delivery in deliveries {
            let id = delivery.notification_id();
            let request = self.build_request(delivery, id, titles, now);
            self.bridge.schedule_local(&request);
            if native {
                ledger.extend(delivery.members().iter().map(|fire| LedgerEntry {
                    notification_id: id,
                    task_id: fire.task_id,
                    stage: fire.stage,
                    fire_at: delivery.fire_at(),
                    title: titles.get(&fire.task_id).cloned().unwrap_or_default(),
                }));
            }
        }

        if !ledger.is_empty() {
            self.store.record_scheduled(&ledger)?;
        }
        Ok(())
    }

    fn reissue_individually(&self, peers: Vec<LedgerEntry>) -> SchedulerResult<()> {
        let now = self.clock.now();
        let native = self.bridge.is_native();
        let mut ledger = Vec::with_capacity(peers.len());
        for peer in peers {
            let id = NotificationId::for_fire(peer.task_id, peer.fire_at, peer.stage);
            let request = LocalNotificationRequest::new(
                id,
                peer.title.clone(),
                SPLIT_BODY,
                schedule_for(peer.fire_at, now),
            )
            .for_task(peer.task_id);
            self.bridge.schedule_local(&self.with_alert_prefs(request));
            if native {
                ledger.push(LedgerEntry {
                    notification_id: id,
                    ..peer
                });
            }
        }
        if !ledger.is_empty() {
            self.store.record_scheduled(&ledger)?;
        }
        Ok(())
    }

    fn build_request(
        &self,
        delivery: &BatchedDelivery,
        id: NotificationId,
        titles: &BTreeMap<TaskId, String>,
        now: DateTime<Utc>,
    ) -> LocalNotificationRequest {
        let schedule = schedule_for(delivery.fire_at(), now);
        let request = match delivery {
            BatchedDelivery::Single(fire) => {
                let title = titles.get(&fire.task_id).cloned().unwrap_or_default();
                LocalNotificationRequest::new(
                    id,
                    title,
                    remaining_text(fire.occurrence_at - fire.fire_at),
                    schedule,
                )
                .for_task(fire.task_id)
            }
            BatchedDelivery::Digest { members, .. } => {
                let names = members
                    .iter()
                    .filter_map(|fire| titles.get(&fire.task_id).map(String::as_str))
                    .collect::<Vec<_>>();
                LocalNotificationRequest::new(
                    id,
                    DIGEST_TITLE,
                    format!("{} tasks: {}", members.len(), names.join(", ")),
                    schedule,
                )
            }
        };
        self.with_alert_prefs(request)
    }

    fn with_alert_prefs(&self, mut request: LocalNotificationRequest) -> LocalNotificationRequest {
        let prefs = self.preferences.borrow();
        request.sound = prefs.sound_enabled;
        request.vibrate = prefs.vibration_enabled;
        request
    }
}

fn titles_of(tasks: &[Task]) -> BTreeMap<TaskId, String> {
    tasks
        .iter()
        .map(|task| (task.id, task.title.clone()))
        .collect()
}

fn schedule_for(fire_at: DateTime<Utc>, now: DateTime<Utc>) -> NotificationSchedule {
    if fire_at <= now {
        NotificationSchedule::Immediate
    } else {
        NotificationSchedule::At { at: fire_at }
    }
}

/// Body text describing how long until the occurrence.
fn remaining_text(remaining: Duration) -> String {
    let minutes = remaining.num_minutes();
    if minutes <= 0 {
        return "Due now".to_string();
    }
    if minutes % (24 * 60) == 0 {
        let days = minutes / (24 * 60);
        return format!("Due in {days} day{}", if days == 1 { "" } else { "s" });
    }
    if minutes % 60 == 0 {
        return format!("Due in {} h", minutes / 60);
    }
    format!("Due in {minutes} min")
}
