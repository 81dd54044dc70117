use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_ts, parse_ts_opt};
use crate::error::DbError;
use crate::models::{Reminder, ReminderStatus};
use crate::Result;

pub fn create(
    conn: &Connection,
    message: &str,
    remind_at: DateTime<Utc>,
    session_id: Option<Uuid>,
) -> Result<Reminder> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    conn.execute(
        r#"
        INSERT INTO reminders
            (id, message, remind_at, status, delivered, session_id, created_at, completed_at, delivery_result)
        VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?5, NULL, NULL)
        "#,
        params![
            id.to_string(),
            message,
            remind_at.to_rfc3339(),
            session_id.map(|s| s.to_string()),
            now.to_rfc3339(),
        ],
    )?;
    Ok(Reminder {
        id,
        message: message.to_string(),
        remind_at,
        status: ReminderStatus::Pending,
        delivered: false,
        session_id,
        created_at: now,
        completed_at: None,
        delivery_result: None,
    })
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<Reminder>> {
    conn.query_row(
        r#"
        SELECT id, message, remind_at, status, delivered, session_id, created_at, completed_at, delivery_result
        FROM reminders WHERE id = ?1
        "#,
        params![id.to_string()],
        row_to_reminder,
    )
    .optional()
    .map_err(DbError::from)
}

pub fn list_pending(conn: &Connection) -> Result<Vec<Reminder>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, message, remind_at, status, delivered, session_id, created_at, completed_at, delivery_result
        FROM reminders WHERE status = 'pending'
        "#,
    )?;
    let rows = stmt
        .query_map([], row_to_reminder)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn list_undelivered(conn: &Connection) -> Result<Vec<Reminder>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, message, remind_at, status, delivered, session_id, created_at, completed_at, delivery_result
        FROM reminders WHERE status = 'completed' AND delivered = 0
        "#,
    )?;
    let rows = stmt
        .query_map([], row_to_reminder)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn list_all(conn: &Connection) -> Result<Vec<Reminder>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, message, remind_at, status, delivered, session_id, created_at, completed_at, delivery_result
        FROM reminders ORDER BY remind_at ASC
        "#,
    )?;
    let rows = stmt
        .query_map([], row_to_reminder)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

/// Invariant (c): pending → completed is the only forward transition this
/// function performs; it never resurrects a cancelled or already-completed
/// reminder (P5 monotonicity).
pub fn mark_completed(conn: &Connection, id: Uuid, delivery_result: Option<&str>) -> Result<()> {
    let affected = conn.execute(
        r#"
        UPDATE reminders
        SET status = 'completed', completed_at = ?1, delivery_result = ?2
        WHERE id = ?3 AND status = 'pending'
        "#,
        params![Utc::now().to_rfc3339(), delivery_result, id.to_string()],
    )?;
    if affected == 0 {
        return Err(DbError::Conflict(
            "reminder is not pending; cannot mark completed".into(),
        ));
    }
    Ok(())
}

pub fn mark_delivered(conn: &Connection, id: Uuid) -> Result<()> {
    let affected = conn.execute(
        "UPDATE reminders SET delivered = 1 WHERE id = ?1 AND status = 'completed'",
        params![id.to_string()],
    )?;
    if affected == 0 {
        return Err(DbError::Conflict(
            "reminder is not completed; cannot mark delivered".into(),
        ));
    }
    Ok(())
}

pub fn cancel(conn: &Connection, id: Uuid) -> Result<()> {
    let affected = conn.execute(
        "UPDATE reminders SET status = 'cancelled' WHERE id = ?1 AND status = 'pending'",
        params![id.to_string()],
    )?;
    if affected == 0 {
        return Err(DbError::Conflict(
            "only a pending reminder can be cancelled".into(),
        ));
    }
    Ok(())
}

pub fn delete(conn: &Connection, id: Uuid) -> Result<()> {
    let affected = conn.execute("DELETE FROM reminders WHERE id = ?1", params![id.to_string()])?;
    if affected == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

fn row_to_reminder(row: &rusqlite::Row) -> std::result::Result<Reminder, rusqlite::Error> {
    let id: String = row.get(0)?;
    let remind_at: String = row.get(2)?;
    let status: String = row.get(3)?;
    let session_id: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;
    let completed_at: Option<String> = row.get(7)?;
    Ok(Reminder {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
        message: row.get(1)?,
        remind_at: super::parse_ts(&remind_at).unwrap_or_else(|_| Utc::now()),
        status: ReminderStatus::parse(&status).unwrap_or(ReminderStatus::Pending),
        delivered: row.get(4)?,
        session_id: session_id.and_then(|s| Uuid::parse_str(&s).ok()),
        created_at: parse_ts(&created_at).unwrap_or_else(|_| Utc::now()),
        completed_at: parse_ts_opt(completed_at).unwrap_or(None),
        delivery_result: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;
    use chrono::Duration;

    fn conn() -> Connection {
        let c = Connection::open_in_memory().unwrap();
        run_migrations(&c).unwrap();
        c
    }

    #[test]
    fn lifecycle_pending_completed_delivered() {
        let c = conn();
        let r = create(&c, "check oven", Utc::now() + Duration::minutes(2), None).unwrap();
        assert_eq!(r.status, ReminderStatus::Pending);
        mark_completed(&c, r.id, Some("done")).unwrap();
        assert!(list_undelivered(&c).unwrap().iter().any(|x| x.id == r.id));
        mark_delivered(&c, r.id).unwrap();
        assert!(list_undelivered(&c).unwrap().is_empty());
    }

    #[test]
    fn cannot_complete_a_cancelled_reminder() {
        let c = conn();
        let r = create(&c, "x", Utc::now(), None).unwrap();
        cancel(&c, r.id).unwrap();
        let err = mark_completed(&c, r.id, None).unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn cannot_re_cancel_a_completed_reminder() {
        let c = conn();
        let r = create(&c, "x", Utc::now(), None).unwrap();
        mark_completed(&c, r.id, None).unwrap();
        let err = cancel(&c, r.id).unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }
}
