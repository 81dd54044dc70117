use rusqlite::{params, Connection};
use uuid::Uuid;

use super::parse_ts;
use crate::models::{ChatMessage, MessageRole};
use crate::Result;

/// Appends a message. Messages are append-only; there is no
/// update/delete path by design.
pub fn append(conn: &Connection, msg: &ChatMessage) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO chat_messages (id, session_id, role, content, agent_name, timestamp, metadata)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            msg.id.to_string(),
            msg.session_id.to_string(),
            msg.role.as_str(),
            msg.content,
            msg.agent_name,
            msg.timestamp.to_rfc3339(),
            msg.metadata.as_ref().map(|v| v.to_string()),
        ],
    )?;
    Ok(())
}

/// Paginated list, most recent last (invariant a: strictly timestamp order).
pub fn list(
    conn: &Connection,
    session_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<(Vec<ChatMessage>, i64)> {
    let total: i64 = conn.query_row(
        "SELECT count(*) FROM chat_messages WHERE session_id = ?1",
        params![session_id.to_string()],
        |r| r.get(0),
    )?;

    let mut stmt = conn.prepare(
        r#"
        SELECT id, session_id, role, content, agent_name, timestamp, metadata
        FROM chat_messages WHERE session_id = ?1
        ORDER BY timestamp ASC
        LIMIT ?2 OFFSET ?3
        "#,
    )?;
    let rows = stmt
        .query_map(params![session_id.to_string(), limit, offset], row_to_message)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok((rows, total))
}

/// Last `n` messages for replay into a fresh agent session.
pub fn last_n(conn: &Connection, session_id: Uuid, n: i64) -> Result<Vec<ChatMessage>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, session_id, role, content, agent_name, timestamp, metadata
        FROM (
            SELECT * FROM chat_messages WHERE session_id = ?1
            ORDER BY timestamp DESC LIMIT ?2
        )
        ORDER BY timestamp ASC
        "#,
    )?;
    let rows = stmt
        .query_map(params![session_id.to_string(), n], row_to_message)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn count_for_session(conn: &Connection, session_id: Uuid) -> Result<i64> {
    let total: i64 = conn.query_row(
        "SELECT count(*) FROM chat_messages WHERE session_id = ?1",
        params![session_id.to_string()],
        |r| r.get(0),
    )?;
    Ok(total)
}

fn row_to_message(row: &rusqlite::Row) -> std::result::Result<ChatMessage, rusqlite::Error> {
    let id: String = row.get(0)?;
    let session_id: String = row.get(1)?;
    let role: String = row.get(2)?;
    let timestamp: String = row.get(5)?;
    let metadata: Option<String> = row.get(6)?;
    Ok(ChatMessage {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
        session_id: Uuid::parse_str(&session_id).unwrap_or_else(|_| Uuid::nil()),
        role: MessageRole::parse(&role).unwrap_or(MessageRole::User),
        content: row.get(3)?,
        agent_name: row.get(4)?,
        timestamp: parse_ts(&timestamp).unwrap_or_else(|_| chrono::Utc::now()),
        metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;
    use chrono::Utc;

    fn conn() -> Connection {
        let c = Connection::open_in_memory().unwrap();
        run_migrations(&c).unwrap();
        c
    }

    fn msg(session_id: Uuid, role: MessageRole, content: &str) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            session_id,
            role,
            content: content.to_string(),
            agent_name: None,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    #[test]
    fn append_and_list_round_trips() {
        let c = conn();
        let session_id = Uuid::new_v4();
        append(&c, &msg(session_id, MessageRole::User, "hi")).unwrap();
        append(&c, &msg(session_id, MessageRole::Assistant, "hello")).unwrap();
        let (rows, total) = list(&c, session_id, 200, 0).unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows[0].content, "hi");
        assert_eq!(rows[1].content, "hello");
    }

    #[test]
    fn last_n_returns_chronological_tail() {
        let c = conn();
        let session_id = Uuid::new_v4();
        for i in 0..5 {
            append(&c, &msg(session_id, MessageRole::User, &format!("m{i}"))).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let tail = last_n(&c, session_id, 3).unwrap();
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].content, "m2");
        assert_eq!(tail[2].content, "m4");
    }

    #[test]
    fn count_for_session_matches_insert_count() {
        let c = conn();
        let session_id = Uuid::new_v4();
        for i in 0..100 {
            let role = if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            append(&c, &msg(session_id, role, "x")).unwrap();
        }
        assert_eq!(count_for_session(&c, session_id).unwrap(), 100);
    }
}
