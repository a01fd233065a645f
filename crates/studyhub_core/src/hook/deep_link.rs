//! Deep-link parsing for tapped notifications.
//!
//! Malformed links are logged and yield `None`; they never reach routing.

use crate::model::task::TaskId;
use chrono::NaiveDate;
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

static DEEP_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^studyhub://(tasks/(?P<task>[0-9A-Fa-f-]{36})|notifications|calendar/(?P<date>\d{4}-\d{2}-\d{2}))/?$")
        .expect("valid deep link regex")
});

/// In-app destination a notification points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeepLink {
    Task(TaskId),
    Notifications,
    Calendar(NaiveDate),
}

impl DeepLink {
    pub fn as_route(&self) -> String {
        match self {
            Self::Task(task_id) => format!("/tasks/{task_id}"),
            Self::Notifications => "/notifications".to_string(),
            Self::Calendar(date) => format!("/calendar/{}", date.format("%Y-%m-%d")),
        }
    }
}

pub fn parse_deep_link(raw: &str) -> Option<DeepLink> {
    let parsed = parse_inner(raw.trim());
    if parsed.is_none() {
        warn!(
            "event=deep_link_parse module=hook status=error len={}",
            raw.len()
        );
    }
    parsed
}

fn parse_inner(raw: &str) -> Option<DeepLink> {
    let captures = DEEP_LINK_RE.captures(raw)?;
    if let Some(task) = captures.name("task") {
        return Uuid::parse_str(task.as_str())
            .ok()
            .filter(|id| !id.is_nil())
            .map(DeepLink::Task);
    }
    if let Some(date) = captures.name("date") {
        return NaiveDate::parse_from_str(date.as_str(), "%Y-%m-%d")
            .ok()
            .map(DeepLink::Calendar);
    }
    Some(DeepLink::Notifications)
}

#[cfg(test)]
mod tests {
    use super::{parse_deep_link, DeepLink};
    use crate::model::notification::{calendar_deep_link, task_deep_link};
    use chrono::NaiveDate;
    use uuid::Uuid;

    #[test]
    fn links_built_by_the_core_parse_back() {
        let task_id = Uuid::new_v4();
        assert_eq!(
            parse_deep_link(&task_deep_link(task_id)),
            Some(DeepLink::Task(task_id))
        );
        let date = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        assert_eq!(
            parse_deep_link(&calendar_deep_link(date)),
            Some(DeepLink::Calendar(date))
        );
        assert_eq!(
            parse_deep_link("studyhub://notifications"),
            Some(DeepLink::Notifications)
        );
    }

    #[test]
    fn malformed_links_are_rejected() {
        assert_eq!(parse_deep_link(""), None);
        assert_eq!(parse_deep_link("https://example.com/tasks/1"), None);
        assert_eq!(parse_deep_link("studyhub://tasks/not-a-uuid"), None);
        assert_eq!(parse_deep_link("studyhub://calendar/2026-02-30"), None);
        assert_eq!(
            parse_deep_link(&format!("studyhub://tasks/{}", Uuid::nil())),
            None
        );
    }

    #[test]
    fn route_strips_scheme() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 9).unwrap();
        assert_eq!(DeepLink::Calendar(date).as_route(), "/calendar/2026-01-09");
        assert_eq!(DeepLink::Notifications.as_route(), "/notifications");
    }
}
