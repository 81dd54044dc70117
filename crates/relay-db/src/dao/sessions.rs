use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_ts_opt;
use crate::error::DbError;
use crate::models::ChatSession;
use crate::Result;

/// Ensures a row exists in `chat_sessions` for `session_id`, creating it with
/// defaults if absent. Matches Session Runner bootstrap step A.1.
pub fn ensure_exists(conn: &Connection, session_id: Uuid, user_id: &str) -> Result<ChatSession> {
    if let Some(existing) = get(conn, session_id)? {
        return Ok(existing);
    }
    let now = Utc::now();
    conn.execute(
        r#"
        INSERT INTO chat_sessions (session_id, name, user_id, created_at, last_message_at, preview, active)
        VALUES (?1, NULL, ?2, ?3, NULL, NULL, 1)
        "#,
        params![session_id.to_string(), user_id, now.to_rfc3339()],
    )?;
    Ok(ChatSession {
        session_id,
        name: None,
        user_id: user_id.to_string(),
        created_at: now,
        last_message_at: None,
        preview: None,
        active: true,
    })
}

pub fn get(conn: &Connection, session_id: Uuid) -> Result<Option<ChatSession>> {
    conn.query_row(
        r#"
        SELECT session_id, name, user_id, created_at, last_message_at, preview, active
        FROM chat_sessions WHERE session_id = ?1
        "#,
        params![session_id.to_string()],
        row_to_session,
    )
    .optional()
    .map_err(DbError::from)
}

pub fn list(conn: &Connection, user_id: &str) -> Result<Vec<ChatSession>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT session_id, name, user_id, created_at, last_message_at, preview, active
        FROM chat_sessions WHERE user_id = ?1 AND active = 1
        ORDER BY last_message_at DESC NULLS LAST, created_at DESC
        "#,
    )?;
    let rows = stmt
        .query_map(params![user_id], row_to_session)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn rename(conn: &Connection, session_id: Uuid, name: &str) -> Result<()> {
    let affected = conn.execute(
        "UPDATE chat_sessions SET name = ?1 WHERE session_id = ?2",
        params![name, session_id.to_string()],
    )?;
    if affected == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Soft-delete: clears the active flag. History is retained.
pub fn soft_delete(conn: &Connection, session_id: Uuid) -> Result<()> {
    let affected = conn.execute(
        "UPDATE chat_sessions SET active = 0 WHERE session_id = ?1",
        params![session_id.to_string()],
    )?;
    if affected == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

pub fn touch_last_message_at(conn: &Connection, session_id: Uuid) -> Result<()> {
    conn.execute(
        "UPDATE chat_sessions SET last_message_at = ?1 WHERE session_id = ?2",
        params![Utc::now().to_rfc3339(), session_id.to_string()],
    )?;
    Ok(())
}

pub fn set_preview(conn: &Connection, session_id: Uuid, preview: &str) -> Result<()> {
    conn.execute(
        "UPDATE chat_sessions SET preview = ?1 WHERE session_id = ?2",
        params![preview, session_id.to_string()],
    )?;
    Ok(())
}

fn row_to_session(row: &rusqlite::Row) -> std::result::Result<ChatSession, rusqlite::Error> {
    let session_id: String = row.get(0)?;
    let created_at: String = row.get(3)?;
    let last_message_at: Option<String> = row.get(4)?;
    Ok(ChatSession {
        session_id: Uuid::parse_str(&session_id).unwrap_or_else(|_| Uuid::nil()),
        name: row.get(1)?,
        user_id: row.get(2)?,
        created_at: super::parse_ts(&created_at).unwrap_or_else(|_| Utc::now()),
        last_message_at: parse_ts_opt(last_message_at).unwrap_or(None),
        preview: row.get(5)?,
        active: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;

    fn conn() -> Connection {
        let c = Connection::open_in_memory().unwrap();
        run_migrations(&c).unwrap();
        c
    }

    #[test]
    fn ensure_exists_is_idempotent() {
        let c = conn();
        let id = Uuid::new_v4();
        let first = ensure_exists(&c, id, "web_user").unwrap();
        let second = ensure_exists(&c, id, "web_user").unwrap();
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(list(&c, "web_user").unwrap().len(), 1);
    }

    #[test]
    fn soft_delete_hides_from_list_but_keeps_row() {
        let c = conn();
        let id = Uuid::new_v4();
        ensure_exists(&c, id, "web_user").unwrap();
        soft_delete(&c, id).unwrap();
        assert!(list(&c, "web_user").unwrap().is_empty());
        assert!(get(&c, id).unwrap().is_some());
    }

    #[test]
    fn rename_missing_session_errors_not_found() {
        let c = conn();
        let err = rename(&c, Uuid::new_v4(), "x").unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }
}
