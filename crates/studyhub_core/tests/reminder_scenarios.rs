mod common;

use chrono::{Datelike, Duration, FixedOffset, Weekday};
use common::{utc, Harness, PlatformOp};
use std::rc::Rc;
use studyhub_core::db::open_db_in_memory;
use studyhub_core::repo::reminder_store::{ScheduleLedger, SnoozeStore};
use studyhub_core::scheduler::recurrence::next_occurrence;
use studyhub_core::scheduler::FireOrigin;
use studyhub_core::{
    plan_task_reminders, Clock, EventBus, EventKind, EventPayload, FixedClock, NativeBridge,
    QuietHours, Recurrence, RecurrenceType, ReminderConfig, ReminderScheduler, ReminderStage,
    ReminderStore, SqliteReminderStore, Task, TimeOfDay, UserPreferences, WebBridge,
};

fn quiet_nights() -> UserPreferences {
    UserPreferences {
        quiet_hours: Some(QuietHours::every_day(
            TimeOfDay::new(22, 0).unwrap(),
            TimeOfDay::new(7, 0).unwrap(),
        )),
        ..UserPreferences::default()
    }
}

#[test]
fn one_hour_and_due_reminders_schedule_two_fires() {
    let due = utc(2026, 5, 4, 18, 0);
    let harness = Harness::new(due - Duration::hours(3), UserPreferences::default());
    let task = Task::new("Physics problem set", Some(due)).with_reminders(&[60, 0]);

    let plan = harness.scheduler.reschedule(&task).unwrap();

    assert_eq!(plan.fire_times(), vec![due - Duration::minutes(60), due]);
    assert_eq!(harness.pending_times(), vec![due - Duration::minutes(60), due]);
    assert_eq!(harness.store.scheduled_for_task(task.id).unwrap().len(), 2);
}

#[test]
fn snoozing_the_early_reminder_leaves_due_fire_alone() {
    let due = utc(2026, 5, 4, 18, 0);
    let harness = Harness::new(due - Duration::hours(2), UserPreferences::default());
    let task = Task::new("Physics problem set", Some(due)).with_reminders(&[60, 0]);
    harness.scheduler.reschedule(&task).unwrap();

    harness.clock.set(due - Duration::minutes(55));
    let outcome = harness
        .scheduler
        .snooze(&task, ReminderStage::Advance { minutes: 60 }, 15)
        .unwrap();

    let snoozed_to = due - Duration::minutes(40);
    assert_eq!(outcome.record.snooze_until, snoozed_to);
    assert_eq!(outcome.plan.fire_times(), vec![snoozed_to, due]);
    assert_eq!(outcome.plan.fires[0].origin, FireOrigin::Snoozed);
    assert_eq!(outcome.snooze_state.snooze_count, 1);
    assert_eq!(outcome.snooze_state.snoozed_until, Some(snoozed_to));
    assert_eq!(harness.pending_times(), vec![snoozed_to, due]);
}

#[test]
fn weekly_series_evaluated_on_sunday_targets_monday() {
    // 2026-05-04 is a Monday.
    let anchor = utc(2026, 5, 4, 10, 0);
    let sunday = utc(2026, 5, 10, 12, 0);
    assert_eq!(sunday.weekday(), Weekday::Sun);
    let rule = Recurrence::weekly_on(&[1, 3, 5], 1);
    let utc_offset = FixedOffset::east_opt(0).unwrap();

    let next = next_occurrence(&rule, anchor, sunday, utc_offset).unwrap();
    assert_eq!(next, utc(2026, 5, 11, 10, 0));
    assert_eq!(next.weekday(), Weekday::Mon);

    let task = Task::new("Lecture review", Some(anchor)).with_recurrence(rule);
    let plan = plan_task_reminders(&task, &[], &UserPreferences::default(), sunday);
    assert_eq!(plan.occurrence_at, Some(next));
    assert_eq!(plan.fire_times(), vec![next]);
}

#[test]
fn weekly_series_due_on_inactive_day_starts_on_next_active_day() {
    // 2026-05-03 is a Sunday; the series runs Mon/Wed/Fri.
    let due = utc(2026, 5, 3, 9, 0);
    assert_eq!(due.weekday(), Weekday::Sun);
    let task = Task::new("Problem sheet", Some(due))
        .with_recurrence(Recurrence::weekly_on(&[1, 3, 5], 1));

    let plan = plan_task_reminders(
        &task,
        &[],
        &UserPreferences::default(),
        utc(2026, 5, 3, 8, 0),
    );

    assert_eq!(plan.occurrence_at, Some(utc(2026, 5, 4, 9, 0)));
    assert_eq!(plan.fire_times(), vec![utc(2026, 5, 4, 9, 0)]);
}

#[test]
fn out_of_range_recurrence_yields_no_occurrence() {
    let due = utc(2026, 5, 4, 9, 0);
    // Weekly on Monday only: the due date is the single in-range occurrence.
    for (recurrence_type, days) in [("daily", vec![]), ("weekly", vec![1u8])] {
        let raw = serde_json::json!({
            "id": uuid::Uuid::new_v4(),
            "title": "Thesis checkpoint",
            "due_date": due,
            "recurrence": {
                "recurrence_type": recurrence_type,
                "recurrence_interval": 4_000_000_000u32,
                "recurrence_days": days,
            },
        });
        let task: Task = serde_json::from_value(raw).unwrap();

        let plan = plan_task_reminders(
            &task,
            &[],
            &UserPreferences::default(),
            due + Duration::hours(1),
        );
        assert!(plan.is_empty(), "{recurrence_type}");
        assert_eq!(plan.occurrence_at, None);

        let harness = Harness::new(due + Duration::hours(1), UserPreferences::default());
        assert_eq!(harness.scheduler.complete_task(&task).unwrap(), None);
    }
}

#[test]
fn late_fire_moves_to_end_of_quiet_hours() {
    let due = utc(2026, 5, 4, 23, 30);
    let harness = Harness::new(due - Duration::hours(5), quiet_nights());
    let task = Task::new("Lab report", Some(due));

    let plan = harness.scheduler.reschedule(&task).unwrap();

    assert_eq!(plan.fires.len(), 1);
    assert_eq!(plan.fires[0].fire_at, utc(2026, 5, 5, 7, 0));
    assert_eq!(plan.fires[0].deferred_from, Some(due));
    assert_eq!(harness.pending_times(), vec![utc(2026, 5, 5, 7, 0)]);
}

#[test]
fn quiet_hours_never_fire_early() {
    let prefs = quiet_nights();
    let due = utc(2026, 5, 5, 6, 30);
    let task = Task::new("Morning quiz", Some(due)).with_reminders(&[30, 90, 600]);

    let plan = plan_task_reminders(&task, &[], &prefs, utc(2026, 5, 4, 12, 0));

    // 20:30 stays; 05:00, 06:00 and 06:30 collapse onto the window end.
    assert_eq!(
        plan.fire_times(),
        vec![utc(2026, 5, 4, 20, 30), utc(2026, 5, 5, 7, 0)]
    );
    for fire in &plan.fires {
        if let Some(original) = fire.deferred_from {
            assert!(fire.fire_at >= original);
        }
    }
}

#[test]
fn completing_a_task_cancels_its_pending_fires() {
    let due = utc(2026, 5, 4, 18, 0);
    let harness = Harness::new(due - Duration::hours(3), UserPreferences::default());
    let bus = EventBus::new();
    let _subscriptions = harness.scheduler.attach(&bus);

    let mut task = Task::new("Essay draft", Some(due)).with_reminders(&[60, 0]);
    bus.publish(EventKind::TaskChanged, EventPayload::Task(Box::new(task.clone())));
    assert_eq!(harness.pending_times().len(), 2);

    task.complete();
    let report = bus.publish(EventKind::TaskCompleted, EventPayload::Task(Box::new(task.clone())));

    assert!(report.is_clean());
    assert!(harness.notifier().pending().is_empty());
    assert!(harness.store.scheduled_for_task(task.id).unwrap().is_empty());

    harness.clock.set(due + Duration::minutes(1));
    let replan = harness.scheduler.plan(&task).unwrap();
    assert!(replan.is_empty());
}

#[test]
fn completing_a_recurring_task_schedules_the_next_instance() {
    let due = utc(2026, 5, 4, 9, 0);
    let harness = Harness::new(due - Duration::hours(1), UserPreferences::default());
    let task = Task::new("Flashcards", Some(due))
        .with_recurrence(Recurrence::new(RecurrenceType::Daily, 1));
    harness.scheduler.reschedule(&task).unwrap();

    harness.clock.set(due + Duration::minutes(30));
    let next = harness.scheduler.complete_task(&task).unwrap().unwrap();

    assert_eq!(next.due_date, Some(due + Duration::days(1)));
    assert_eq!(next.recurrence.as_ref().unwrap().parent_task_id, Some(task.id));
    assert!(harness.store.scheduled_for_task(task.id).unwrap().is_empty());
    assert_eq!(harness.pending_times(), vec![due + Duration::days(1)]);
}

#[test]
fn deleting_by_id_cancels_fires() {
    let due = utc(2026, 5, 4, 18, 0);
    let harness = Harness::new(due - Duration::hours(3), UserPreferences::default());
    let bus = EventBus::new();
    let _subscriptions = harness.scheduler.attach(&bus);
    let task = Task::new("Read chapter 4", Some(due)).with_reminders(&[30]);
    harness.scheduler.reschedule(&task).unwrap();

    bus.publish(EventKind::TaskDeleted, EventPayload::TaskRef(task.id));

    assert!(harness.notifier().pending().is_empty());
}

#[test]
fn rescheduling_cancels_stale_fires_before_issuing_new_ones() {
    let due = utc(2026, 5, 4, 18, 0);
    let harness = Harness::new(due - Duration::hours(3), UserPreferences::default());
    let mut task = Task::new("Group meeting", Some(due)).with_reminders(&[60]);
    harness.scheduler.reschedule(&task).unwrap();
    let stale = harness
        .store
        .scheduled_for_task(task.id)
        .unwrap()
        .into_iter()
        .map(|entry| entry.notification_id)
        .collect::<Vec<_>>();
    harness.notifier().clear_ops();

    let moved = due + Duration::hours(1);
    task.due_date = Some(moved);
    harness.scheduler.reschedule(&task).unwrap();
    // Same snapshot again: must not duplicate.
    harness.scheduler.reschedule(&task).unwrap();

    let ops = harness.notifier().ops();
    match &ops[0] {
        PlatformOp::Cancel(ids) => {
            let mut ids = ids.clone();
            ids.sort();
            let mut expected = stale.clone();
            expected.sort();
            assert_eq!(ids, expected);
        }
        other => panic!("expected cancel first, got {other:?}"),
    }
    assert_eq!(
        harness.pending_times(),
        vec![moved - Duration::minutes(60), moved]
    );
    assert_eq!(harness.store.scheduled_for_task(task.id).unwrap().len(), 2);
}

#[test]
fn no_fire_is_planned_past_the_series_end() {
    let due = utc(2026, 5, 4, 9, 0);
    let end = utc(2026, 5, 6, 8, 30);
    let harness = Harness::new(due - Duration::hours(2), UserPreferences::default());
    let mut task = Task::new("Vocabulary", Some(due))
        .with_reminders(&[60])
        .with_recurrence(Recurrence::new(RecurrenceType::Daily, 1).until(end));

    let mut instances = 0;
    loop {
        let occurrence = task.due_date.unwrap();
        harness.clock.set(occurrence - Duration::hours(2));
        let plan = harness.scheduler.reschedule(&task).unwrap();
        assert!(plan.fire_times().iter().all(|at| *at <= end));
        instances += 1;

        harness.clock.set(occurrence + Duration::minutes(5));
        match harness.scheduler.complete_task(&task).unwrap() {
            Some(next) => {
                assert!(next.due_date.unwrap() <= end);
                task = next;
            }
            None => break,
        }
    }
    assert_eq!(instances, 2);
    assert!(harness.pending_times().iter().all(|at| *at <= end));
}

#[test]
fn quiet_hours_shift_past_series_end_drops_the_fire() {
    let due = utc(2026, 5, 4, 23, 30);
    let end = utc(2026, 5, 5, 6, 0);
    let task = Task::new("Night reading", Some(due))
        .with_recurrence(Recurrence::new(RecurrenceType::Daily, 1).until(end));

    let plan = plan_task_reminders(&task, &[], &quiet_nights(), due - Duration::hours(3));

    assert!(plan.is_empty());
}

#[test]
fn active_snooze_wins_until_processed() {
    let due = utc(2026, 5, 4, 18, 0);
    let harness = Harness::new(due - Duration::minutes(29), UserPreferences::default());
    let mut task = Task::new("Office hours", Some(due)).with_reminders(&[30, 10]);

    let outcome = harness
        .scheduler
        .snooze(&task, ReminderStage::Advance { minutes: 30 }, 30)
        .unwrap();
    let snoozed_to = due + Duration::minutes(1);
    assert_eq!(outcome.plan.fire_times(), vec![snoozed_to]);

    harness.clock.set(snoozed_to);
    task.snooze = harness
        .scheduler
        .record_delivery(&task, &outcome.plan.fires[0])
        .unwrap();
    assert_eq!(task.snooze.snoozed_until, None);
    assert_eq!(task.snooze.last_reminder_at, Some(snoozed_to));

    harness.clock.set(snoozed_to + Duration::minutes(1));
    assert!(harness.store.pending_snoozes(task.id).unwrap().is_empty());
    assert!(harness.scheduler.plan(&task).unwrap().is_empty());
}

#[test]
fn new_snooze_supersedes_the_previous_one() {
    let due = utc(2026, 5, 4, 18, 0);
    let harness = Harness::new(due - Duration::minutes(50), UserPreferences::default());
    let task = Task::new("Seminar", Some(due)).with_reminders(&[60]);

    harness
        .scheduler
        .snooze(&task, ReminderStage::Advance { minutes: 60 }, 5)
        .unwrap();
    harness.clock.advance(Duration::minutes(5));
    let second = harness
        .scheduler
        .snooze(&task, ReminderStage::Advance { minutes: 60 }, 20)
        .unwrap();

    let pending = harness.store.pending_snoozes(task.id).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second.record.id);
    assert_eq!(
        harness.pending_times(),
        vec![due - Duration::minutes(25), due]
    );
}

#[test]
fn snooze_minutes_are_validated() {
    let due = utc(2026, 5, 4, 18, 0);
    let harness = Harness::new(due - Duration::hours(1), UserPreferences::default());
    let task = Task::new("Seminar", Some(due));

    assert!(harness.scheduler.snooze(&task, ReminderStage::Due, 0).is_err());
    assert!(harness
        .scheduler
        .snooze(&task, ReminderStage::Due, ReminderConfig::default().max_snooze_minutes + 1)
        .is_err());
    assert!(harness.store.pending_snoozes(task.id).unwrap().is_empty());
}

#[test]
fn batched_fires_share_one_digest_and_split_on_cancel() {
    let prefs = UserPreferences {
        batch_notifications: true,
        ..UserPreferences::default()
    };
    let harness = Harness::new(utc(2026, 5, 4, 7, 0), prefs);
    let first = Task::new("Chemistry quiz", Some(utc(2026, 5, 4, 9, 0)));
    let second = Task::new("History essay", Some(utc(2026, 5, 4, 9, 3)));

    harness
        .scheduler
        .reschedule_many(&[first.clone(), second.clone()])
        .unwrap();

    let pending = harness.notifier().pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].title, "StudyHub reminders");
    assert!(pending[0].body.contains("Chemistry quiz"));
    assert!(pending[0].body.contains("History essay"));
    assert_eq!(harness.pending_times(), vec![utc(2026, 5, 4, 9, 3)]);

    harness.scheduler.cancel_task(first.id).unwrap();

    let pending = harness.notifier().pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].task_id, Some(second.id));
    assert_eq!(pending[0].title, "History essay");
    assert_eq!(harness.store.scheduled_for_task(second.id).unwrap().len(), 1);
    assert!(harness.store.scheduled_for_task(first.id).unwrap().is_empty());
}

#[test]
fn web_bridge_plans_but_records_nothing() {
    let due = utc(2026, 5, 4, 18, 0);
    let store = Rc::new(SqliteReminderStore::try_new(open_db_in_memory().unwrap()).unwrap());
    let scheduler = ReminderScheduler::new(
        Rc::new(WebBridge::new()) as Rc<dyn NativeBridge>,
        Rc::clone(&store) as Rc<dyn ReminderStore>,
        Rc::new(FixedClock::new(due - Duration::hours(2))) as Rc<dyn Clock>,
        UserPreferences::default(),
        ReminderConfig::default(),
    );
    let task = Task::new("Web only", Some(due)).with_reminders(&[15]);

    let plan = scheduler.reschedule(&task).unwrap();

    assert_eq!(plan.fires.len(), 2);
    assert!(store.scheduled_for_task(task.id).unwrap().is_empty());
    assert_eq!(scheduler.cancel_task(task.id).unwrap(), 0);
}
