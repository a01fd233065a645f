//! Snooze and scheduled-notification persistence.
//!
//! # Responsibility
//! - Persist `SnoozedReminder` rows and their one-way processed flag.
//! - Keep the ledger of platform notification ids issued per task, so stale
//!   fires can be cancelled after a restart.
//!
//! # Invariants
//! - A processed snooze is never returned as pending and never un-processed
//!   (enforced by a trigger as well).
//! - Timestamps are stored as epoch milliseconds.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::notification::NotificationId;
use crate::model::snooze::{ReminderStage, SnoozedReminder};
use crate::model::task::TaskId;
use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::{params, Connection, Row};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const LEDGER_SELECT_SQL: &str = "SELECT
    notification_id,
    task_id,
    stage,
    fire_at,
    title
FROM scheduled_notifications";

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence error for reminder stores.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(Uuid),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted reminder data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One platform notification issued for a task.
///
/// A digest notification has one entry per member task, all sharing the
/// same `notification_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub notification_id: NotificationId,
    pub task_id: TaskId,
    pub stage: ReminderStage,
    pub fire_at: DateTime<Utc>,
    /// Task title, kept so a split digest can be re-issued per task.
    pub title: String,
}

pub trait SnoozeStore {
    fn insert_snooze(&self, snooze: &SnoozedReminder) -> RepoResult<()>;
    /// Unprocessed snoozes of one task, oldest first.
    fn pending_snoozes(&self, task_id: TaskId) -> RepoResult<Vec<SnoozedReminder>>;
    fn mark_snooze_processed(&self, snooze_id: Uuid) -> RepoResult<()>;
    /// Marks every pending snooze of the task processed; returns the count.
    fn mark_task_snoozes_processed(&self, task_id: TaskId) -> RepoResult<usize>;
}

pub trait ScheduleLedger {
    /// Upserts `entries`; returns how many reused an id already held by a
    /// task outside this batch (an id collision, logged as a warning).
    fn record_scheduled(&self, entries: &[LedgerEntry]) -> RepoResult<usize>;
    fn scheduled_for_task(&self, task_id: TaskId) -> RepoResult<Vec<LedgerEntry>>;
    /// Entries of every task sharing one platform notification.
    fn scheduled_with_id(&self, notification_id: NotificationId) -> RepoResult<Vec<LedgerEntry>>;
    fn remove_notification(&self, notification_id: NotificationId) -> RepoResult<usize>;
    /// Drops the task's entries and returns their ids for cancellation.
    fn clear_task(&self, task_id: TaskId) -> RepoResult<Vec<NotificationId>>;
    fn clear_all(&self) -> RepoResult<usize>;
}

/// Everything the reminder scheduler persists.
pub trait ReminderStore: SnoozeStore + ScheduleLedger {}

impl<T: SnoozeStore + ScheduleLedger> ReminderStore for T {}

/// SQLite-backed reminder store owning its connection.
#[derive(Debug)]
pub struct SqliteReminderStore {
    conn: Connection,
}

impl SqliteReminderStore {
    /// Wraps a migrated connection (see `db::open_db`).
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        let expected_version = latest_version();
        let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl SnoozeStore for SqliteReminderStore {
    fn insert_snooze(&self, snooze: &SnoozedReminder) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO snoozed_reminders (
                id,
                task_id,
                stage,
                occurrence_at,
                snooze_until,
                is_processed,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                snooze.id.to_string(),
                snooze.task_id.to_string(),
                snooze.stage.as_label(),
                snooze.occurrence_at.timestamp_millis(),
                snooze.snooze_until.timestamp_millis(),
                i64::from(snooze.is_processed),
                snooze.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn pending_snoozes(&self, task_id: TaskId) -> RepoResult<Vec<SnoozedReminder>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, stage, occurrence_at, snooze_until, is_processed, created_at
             FROM snoozed_reminders
             WHERE task_id = ?1
               AND is_processed = 0
             ORDER BY created_at ASC, id ASC;",
        )?;
        let mut rows = stmt.query([task_id.to_string()])?;
        let mut snoozes = Vec::new();
        while let Some(row) = rows.next()? {
            snoozes.push(parse_snooze_row(row)?);
        }
        Ok(snoozes)
    }

    fn mark_snooze_processed(&self, snooze_id: Uuid) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE snoozed_reminders SET is_processed = 1 WHERE id = ?1;",
            [snooze_id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(snooze_id));
        }
        Ok(())
    }

    fn mark_task_snoozes_processed(&self, task_id: TaskId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE snoozed_reminders
             SET is_processed = 1
             WHERE task_id = ?1
               AND is_processed = 0;",
            [task_id.to_string()],
        )?;
        Ok(changed)
    }
}

impl ScheduleLedger for SqliteReminderStore {
    fn record_scheduled(&self, entries: &[LedgerEntry]) -> RepoResult<usize> {
        let batch_tasks = entries
            .iter()
            .map(|entry| entry.task_id.to_string())
            .collect::<BTreeSet<_>>();
        let tx = self.conn.unchecked_transaction()?;
        let mut collisions = 0;
        for entry in entries {
            let holders = {
                let mut stmt = tx.prepare(
                    "SELECT task_id FROM scheduled_notifications
                    WHERE notification_id = ?1 AND task_id <> ?2;",
                )?;
                let rows = stmt.query_map(
                    params![entry.notification_id.0, entry.task_id.to_string()],
                    |row| row.get::<_, String>(0),
                )?;
                let holders = rows.collect::<Result<Vec<_>, _>>()?;
                holders
            };
            if holders.iter().any(|holder| !batch_tasks.contains(holder)) {
                collisions += 1;
                warn!(
                    "event=ledger_id_collision module=repo status=warn notification_id={} task_id={}",
                    entry.notification_id.0, entry.task_id
                );
            }
            tx.execute(
                "INSERT INTO scheduled_notifications (
                    notification_id,
                    task_id,
                    stage,
                    fire_at,
                    title
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT (notification_id, task_id) DO UPDATE SET
                    stage = excluded.stage,
                    fire_at = excluded.fire_at,
                    title = excluded.title;",
                params![
                    entry.notification_id.0,
                    entry.task_id.to_string(),
                    entry.stage.as_label(),
                    entry.fire_at.timestamp_millis(),
                    entry.title.as_str(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(collisions)
    }

    fn scheduled_for_task(&self, task_id: TaskId) -> RepoResult<Vec<LedgerEntry>> {
        self.query_ledger(
            &format!("{LEDGER_SELECT_SQL} WHERE task_id = ?1 ORDER BY fire_at ASC, notification_id ASC;"),
            task_id.to_string(),
        )
    }

    fn scheduled_with_id(&self, notification_id: NotificationId) -> RepoResult<Vec<LedgerEntry>> {
        self.query_ledger(
            &format!("{LEDGER_SELECT_SQL} WHERE notification_id = ?1 ORDER BY task_id ASC;"),
            notification_id.0,
        )
    }

    fn remove_notification(&self, notification_id: NotificationId) -> RepoResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM scheduled_notifications WHERE notification_id = ?1;",
            [notification_id.0],
        )?;
        Ok(removed)
    }

    fn clear_task(&self, task_id: TaskId) -> RepoResult<Vec<NotificationId>> {
        let ids = self
            .scheduled_for_task(task_id)?
            .into_iter()
            .map(|entry| entry.notification_id)
            .collect::<Vec<_>>();
        self.conn.execute(
            "DELETE FROM scheduled_notifications WHERE task_id = ?1;",
            [task_id.to_string()],
        )?;
        Ok(ids)
    }

    fn clear_all(&self) -> RepoResult<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM scheduled_notifications;", [])?;
        Ok(removed)
    }
}

impl SqliteReminderStore {
    fn query_ledger(
        &self,
        sql: &str,
        key: impl rusqlite::ToSql,
    ) -> RepoResult<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([key])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_ledger_row(row)?);
        }
        Ok(entries)
    }
}

fn parse_snooze_row(row: &Row<'_>) -> RepoResult<SnoozedReminder> {
    let id_text: String = row.get("id")?;
    let task_text: String = row.get("task_id")?;
    let stage_label: String = row.get("stage")?;
    let is_processed: i64 = row.get("is_processed")?;

    Ok(SnoozedReminder {
        id: parse_uuid(&id_text, "snoozed_reminders.id")?,
        task_id: parse_uuid(&task_text, "snoozed_reminders.task_id")?,
        stage: ReminderStage::parse_label(&stage_label).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid stage `{stage_label}` in snoozed_reminders.stage"
            ))
        })?,
        occurrence_at: millis_to_utc(row.get("occurrence_at")?, "snoozed_reminders.occurrence_at")?,
        snooze_until: millis_to_utc(row.get("snooze_until")?, "snoozed_reminders.snooze_until")?,
        is_processed: is_processed == 1,
        created_at: millis_to_utc(row.get("created_at")?, "snoozed_reminders.created_at")?,
    })
}

fn parse_ledger_row(row: &Row<'_>) -> RepoResult<LedgerEntry> {
    let task_text: String = row.get("task_id")?;
    let stage_label: String = row.get("stage")?;

    Ok(LedgerEntry {
        notification_id: NotificationId(row.get("notification_id")?),
        task_id: parse_uuid(&task_text, "scheduled_notifications.task_id")?,
        stage: ReminderStage::parse_label(&stage_label).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid stage `{stage_label}` in scheduled_notifications.stage"
            ))
        })?,
        fire_at: millis_to_utc(row.get("fire_at")?, "scheduled_notifications.fire_at")?,
        title: row.get("title")?,
    })
}

fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn millis_to_utc(value: i64, column: &'static str) -> RepoResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid timestamp `{value}` in {column}")))
}

#[cfg(test)]
mod tests {
    use super::{LedgerEntry, RepoError, ScheduleLedger, SnoozeStore, SqliteReminderStore};
    use crate::db::open_db_in_memory;
    use crate::model::notification::NotificationId;
    use crate::model::snooze::{ReminderStage, SnoozedReminder};
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn store() -> SqliteReminderStore {
        SqliteReminderStore::try_new(open_db_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn processed_snooze_cannot_be_resurrected() {
        let store = store();
        let at = Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap();
        let snooze = SnoozedReminder::new(
            Uuid::new_v4(),
            ReminderStage::Due,
            at,
            at + Duration::minutes(10),
            at,
        );
        store.insert_snooze(&snooze).unwrap();
        store.mark_snooze_processed(snooze.id).unwrap();
        assert!(store.pending_snoozes(snooze.task_id).unwrap().is_empty());

        let err = store
            .connection()
            .execute(
                "UPDATE snoozed_reminders SET is_processed = 0 WHERE id = ?1;",
                [snooze.id.to_string()],
            )
            .unwrap_err();
        assert!(err.to_string().contains("cannot be resurrected"));
    }

    #[test]
    fn mark_unknown_snooze_is_not_found() {
        let store = store();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.mark_snooze_processed(id),
            Err(RepoError::NotFound(found)) if found == id
        ));
    }

    #[test]
    fn ledger_upserts_by_id_and_clears_per_task() {
        let store = store();
        let task_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let at = Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap();
        let entry = LedgerEntry {
            notification_id: NotificationId(4242),
            task_id,
            stage: ReminderStage::Due,
            fire_at: at,
            title: "essay".to_string(),
        };
        store.record_scheduled(&[entry.clone()]).unwrap();
        store.record_scheduled(&[entry.clone()]).unwrap();
        store
            .record_scheduled(&[LedgerEntry {
                notification_id: NotificationId(5151),
                task_id: other,
                ..entry.clone()
            }])
            .unwrap();

        assert_eq!(store.scheduled_for_task(task_id).unwrap(), vec![entry]);
        assert_eq!(store.clear_task(task_id).unwrap(), vec![NotificationId(4242)]);
        assert!(store.scheduled_for_task(task_id).unwrap().is_empty());
        assert_eq!(store.scheduled_for_task(other).unwrap().len(), 1);
    }

    #[test]
    fn digest_entries_share_one_id() {
        let store = store();
        let at = Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap();
        let digest = NotificationId(7777);
        let members = [Uuid::new_v4(), Uuid::new_v4()]
            .into_iter()
            .map(|task_id| LedgerEntry {
                notification_id: digest,
                task_id,
                stage: ReminderStage::Due,
                fire_at: at,
                title: format!("task {task_id}"),
            })
            .collect::<Vec<_>>();
        store.record_scheduled(&members).unwrap();

        assert_eq!(store.record_scheduled(&members).unwrap(), 0);
        assert_eq!(store.scheduled_with_id(digest).unwrap().len(), 2);
        assert_eq!(store.remove_notification(digest).unwrap(), 2);
        assert!(store.scheduled_with_id(digest).unwrap().is_empty());
    }

    #[test]
    fn id_reused_by_another_task_is_reported() {
        let store = store();
        let at = Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap();
        let first = LedgerEntry {
            notification_id: NotificationId(9090),
            task_id: Uuid::new_v4(),
            stage: ReminderStage::Due,
            fire_at: at,
            title: "essay".to_string(),
        };
        let second = LedgerEntry {
            task_id: Uuid::new_v4(),
            title: "quiz".to_string(),
            ..first.clone()
        };

        assert_eq!(store.record_scheduled(&[first.clone()]).unwrap(), 0);
        assert_eq!(store.record_scheduled(&[first]).unwrap(), 0);
        assert_eq!(store.record_scheduled(&[second]).unwrap(), 1);
        assert_eq!(store.scheduled_with_id(NotificationId(9090)).unwrap().len(), 2);
    }
}
