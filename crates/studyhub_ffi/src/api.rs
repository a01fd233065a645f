//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose stable, use-case-level reminder functions to Dart via FRB.
//! - Carry tasks, preferences and plans as JSON strings.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Return values are UTF-8 strings or envelopes with stable meaning.
//! - The shell owns platform scheduling; these calls only plan and persist.

use chrono::{DateTime, TimeZone, Utc};
use log::{debug, warn};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::OnceLock;
use studyhub_core::db::open_db;
use studyhub_core::repo::reminder_store::SnoozeStore;
use studyhub_core::scheduler::select_due_for_email;
use studyhub_core::{
    core_version as core_version_inner, init_logging as init_logging_inner,
    parse_deep_link as parse_deep_link_inner, ping as ping_inner, plan_task_reminders, Clock,
    FixedClock, NativeBridge, ReminderConfig, ReminderPlan, ReminderScheduler, ReminderStage,
    ReminderStore, SqliteReminderStore, Task, UserPreferences, WebBridge,
};
use uuid::Uuid;

const REMINDER_DB_FILE_NAME: &str = "studyhub_reminders.sqlite3";
static REMINDER_DB_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - UI-thread safe for current implementation.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Sync call; may perform small file-system setup work.
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Reconfiguration attempts with different level or directory return error.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Plan envelope returned to the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderPlanResponse {
    /// Whether planning succeeded.
    pub ok: bool,
    /// Fire instants in epoch milliseconds, ascending.
    pub fire_times_ms: Vec<i64>,
    /// Full plan as JSON (empty on failure).
    pub plan_json: String,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl ReminderPlanResponse {
    fn success(plan: &ReminderPlan, message: impl Into<String>) -> Self {
        match serde_json::to_string(plan) {
            Ok(plan_json) => Self {
                ok: true,
                fire_times_ms: plan
                    .fire_times()
                    .iter()
                    .map(DateTime::timestamp_millis)
                    .collect(),
                plan_json,
                message: message.into(),
            },
            Err(err) => Self::failure(format!("plan encoding failed: {err}")),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            fire_times_ms: Vec::new(),
            plan_json: String::new(),
            message: message.into(),
        }
    }
}

/// Snooze envelope returned to the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnoozeResponse {
    pub ok: bool,
    pub snooze_until_ms: Option<i64>,
    /// Updated snooze bookkeeping as JSON, for the shell to persist on the task.
    pub snooze_state_json: String,
    pub plan: ReminderPlanResponse,
    pub message: String,
}

impl SnoozeResponse {
    fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            ok: false,
            snooze_until_ms: None,
            snooze_state_json: String::new(),
            plan: ReminderPlanResponse::failure(message.clone()),
            message,
        }
    }
}

/// Computes the reminder plan of one task, honoring persisted snoozes.
///
/// Input semantics:
/// - `task_json`: task record (`snake_case` keys).
/// - `preferences_json`: optional preferences; defaults when absent or blank.
/// - `now_epoch_ms`: evaluation instant.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn plan_reminders(
    task_json: String,
    preferences_json: Option<String>,
    now_epoch_ms: i64,
) -> ReminderPlanResponse {
    let inputs = parse_task(&task_json).and_then(|task| {
        let preferences = parse_preferences(preferences_json.as_deref())?;
        let now = parse_instant(now_epoch_ms)?;
        Ok((task, preferences, now))
    });
    let (task, preferences, now) = match inputs {
        Ok(inputs) => inputs,
        Err(err) => return ReminderPlanResponse::failure(format!("plan_reminders failed: {err}")),
    };

    let snoozes = match open_store().and_then(|store| {
        store
            .pending_snoozes(task.id)
            .map_err(|err| format!("snooze lookup failed: {err}"))
    }) {
        Ok(snoozes) => snoozes,
        Err(err) => return ReminderPlanResponse::failure(format!("plan_reminders failed: {err}")),
    };

    let plan = plan_task_reminders(&task, &snoozes, &preferences, now);
    debug!(
        "event=ffi_plan module=ffi status=ok task_id={} fires={}",
        task.id,
        plan.fires.len()
    );
    let message = if plan.is_empty() {
        "No upcoming reminders.".to_string()
    } else {
        format!("Planned {} reminder(s).", plan.fires.len())
    };
    ReminderPlanResponse::success(&plan, message)
}

/// Snoozes one reminder stage of a task and returns the updated plan.
///
/// Input semantics:
/// - `stage_minutes_before`: `0` for the due reminder, otherwise the
///   pre-reminder offset being snoozed.
/// - `minutes`: snooze length, `1..=1440`.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn snooze_reminder(
    task_json: String,
    preferences_json: Option<String>,
    stage_minutes_before: u32,
    minutes: u32,
    now_epoch_ms: i64,
) -> SnoozeResponse {
    let result = with_scheduler(preferences_json.as_deref(), now_epoch_ms, |scheduler| {
        let task = parse_task(&task_json)?;
        scheduler
            .snooze(&task, ReminderStage::from_offset(stage_minutes_before), minutes)
            .map_err(|err| err.to_string())
    });

    match result {
        Ok(outcome) => {
            let snooze_state_json = match serde_json::to_string(&outcome.snooze_state) {
                Ok(json) => json,
                Err(err) => {
                    return SnoozeResponse::failure(format!("snooze state encoding failed: {err}"))
                }
            };
            SnoozeResponse {
                ok: true,
                snooze_until_ms: Some(outcome.record.snooze_until.timestamp_millis()),
                snooze_state_json,
                plan: ReminderPlanResponse::success(&outcome.plan, "Reminder snoozed."),
                message: format!("Snoozed for {minutes} min."),
            }
        }
        Err(err) => {
            warn!("event=ffi_snooze module=ffi status=error error={err}");
            SnoozeResponse::failure(format!("snooze_reminder failed: {err}"))
        }
    }
}

/// Drops every reminder recorded for a task (completion or deletion).
///
/// Input semantics:
/// - `task_id`: UUID string of the task.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn cancel_task_reminders(task_id: String, now_epoch_ms: i64) -> String {
    let result = Uuid::parse_str(task_id.trim())
        .map_err(|err| format!("invalid task id `{task_id}`: {err}"))
        .and_then(|task_id| {
            with_scheduler(None, now_epoch_ms, |scheduler| {
                scheduler
                    .delete_task(task_id)
                    .map_err(|err| err.to_string())
            })
        });
    match result {
        Ok(()) => String::new(),
        Err(err) => {
            warn!("event=ffi_cancel module=ffi status=error error={err}");
            err
        }
    }
}

/// Selects tasks due within the sweep window, grouped per owner, as JSON.
///
/// The result is the request body of the email reminder function. Returns
/// `{"error": message}` on invalid input.
#[flutter_rust_bridge::frb(sync)]
pub fn select_due_reminders(tasks_json: String, now_epoch_ms: i64) -> String {
    let selected = serde_json::from_str::<Vec<Task>>(&tasks_json)
        .map_err(|err| format!("invalid tasks json: {err}"))
        .and_then(|tasks| {
            let now = parse_instant(now_epoch_ms)?;
            let window = ReminderConfig::default().sweep_window();
            Ok(select_due_for_email(&tasks, now, window))
        })
        .and_then(|batches| {
            serde_json::to_string(&batches).map_err(|err| format!("encoding failed: {err}"))
        });
    match selected {
        Ok(json) => json,
        Err(err) => serde_json::json!({ "error": err }).to_string(),
    }
}

/// Maps a notification deep link to an in-app route; `None` when malformed.
#[flutter_rust_bridge::frb(sync)]
pub fn parse_deep_link(link: String) -> Option<String> {
    parse_deep_link_inner(&link).map(|target| target.as_route())
}

fn resolve_reminder_db_path() -> PathBuf {
    REMINDER_DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var("STUDYHUB_DB_PATH") {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(REMINDER_DB_FILE_NAME)
        })
        .clone()
}

fn open_store() -> Result<SqliteReminderStore, String> {
    let conn = open_db(resolve_reminder_db_path())
        .map_err(|err| format!("reminder DB open failed: {err}"))?;
    SqliteReminderStore::try_new(conn).map_err(|err| format!("reminder store init failed: {err}"))
}

fn with_scheduler<T>(
    preferences_json: Option<&str>,
    now_epoch_ms: i64,
    f: impl FnOnce(&ReminderScheduler) -> Result<T, String>,
) -> Result<T, String> {
    let preferences = parse_preferences(preferences_json)?;
    let now = parse_instant(now_epoch_ms)?;
    let store = open_store()?;
    let scheduler = ReminderScheduler::new(
        Rc::new(WebBridge::new()) as Rc<dyn NativeBridge>,
        Rc::new(store) as Rc<dyn ReminderStore>,
        Rc::new(FixedClock::new(now)) as Rc<dyn Clock>,
        preferences,
        ReminderConfig::default(),
    );
    f(&scheduler)
}

fn parse_task(raw: &str) -> Result<Task, String> {
    serde_json::from_str::<Task>(raw).map_err(|err| format!("invalid task json: {err}"))
}

fn parse_preferences(raw: Option<&str>) -> Result<UserPreferences, String> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(UserPreferences::default());
    };
    let preferences = serde_json::from_str::<UserPreferences>(raw)
        .map_err(|err| format!("invalid preferences json: {err}"))?;
    preferences.validate().map_err(|err| err.to_string())?;
    Ok(preferences)
}

fn parse_instant(epoch_ms: i64) -> Result<DateTime<Utc>, String> {
    Utc.timestamp_millis_opt(epoch_ms)
        .single()
        .ok_or_else(|| format!("timestamp out of range: {epoch_ms}"))
}
