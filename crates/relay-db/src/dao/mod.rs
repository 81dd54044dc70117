pub mod messages;
pub mod pending_results;
pub mod reminders;
pub mod scheduled_tasks;
pub mod sessions;
pub mod tasks;
pub mod webhooks;

use chrono::{DateTime, Utc};

use crate::error::DbError;

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Validation(format!("bad timestamp {s:?}: {e}")))
}

pub(crate) fn parse_ts_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>, DbError> {
    s.map(|s| parse_ts(&s)).transpose()
}
