use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::parse_ts;
use crate::error::DbError;
use crate::models::PendingSchedulerResult;
use crate::Result;

/// Queue of scheduled-task results waiting to be delivered to a client that
/// was offline when the task fired. Delivery is at-least-once: a row is
/// only removed once a connected client has acked it.

pub fn queue_pending_result(
    conn: &Connection,
    task_name: &str,
    prompt: &str,
    response: &str,
    session_id: Option<Uuid>,
) -> Result<PendingSchedulerResult> {
    let result_id = Uuid::new_v4();
    let now = Utc::now();
    conn.execute(
        r#"
        INSERT INTO pending_scheduler_results
            (result_id, task_name, prompt, response, session_id, delivered, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
        "#,
        params![
            result_id.to_string(),
            task_name,
            prompt,
            response,
            session_id.map(|s| s.to_string()),
            now.to_rfc3339(),
        ],
    )?;
    Ok(PendingSchedulerResult {
        result_id,
        task_name: task_name.to_string(),
        prompt: prompt.to_string(),
        response: response.to_string(),
        session_id,
        delivered: false,
        created_at: now,
    })
}

pub fn get_undelivered_results(conn: &Connection) -> Result<Vec<PendingSchedulerResult>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT result_id, task_name, prompt, response, session_id, delivered, created_at
        FROM pending_scheduler_results WHERE delivered = 0
        ORDER BY created_at ASC
        "#,
    )?;
    let rows = stmt
        .query_map([], row_to_result)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn mark_result_delivered(conn: &Connection, result_id: Uuid) -> Result<()> {
    let affected = conn.execute(
        "UPDATE pending_scheduler_results SET delivered = 1 WHERE result_id = ?1",
        params![result_id.to_string()],
    )?;
    if affected == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

fn row_to_result(
    row: &rusqlite::Row,
) -> std::result::Result<PendingSchedulerResult, rusqlite::Error> {
    let result_id: String = row.get(0)?;
    let session_id: Option<String> = row.get(4)?;
    let created_at: String = row.get(6)?;
    Ok(PendingSchedulerResult {
        result_id: Uuid::parse_str(&result_id).unwrap_or_else(|_| Uuid::nil()),
        task_name: row.get(1)?,
        prompt: row.get(2)?,
        response: row.get(3)?,
        session_id: session_id.and_then(|s| Uuid::parse_str(&s).ok()),
        delivered: row.get(5)?,
        created_at: parse_ts(&created_at).unwrap_or_else(|_| Utc::now()),
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
    fn queue_then_drain_then_mark_delivered() {
        let c = conn();
        let r = queue_pending_result(&c, "T1", "ping", "pong", None).unwrap();
        assert_eq!(get_undelivered_results(&c).unwrap().len(), 1);
        mark_result_delivered(&c, r.result_id).unwrap();
        assert!(get_undelivered_results(&c).unwrap().is_empty());
    }

    #[test]
    fn at_least_once_delivery_never_loses_a_result() {
        // P6: a result exists in the queue until explicitly marked delivered.
        let c = conn();
        queue_pending_result(&c, "T1", "ping", "pong", None).unwrap();
        queue_pending_result(&c, "T2", "ping2", "pong2", None).unwrap();
        assert_eq!(get_undelivered_results(&c).unwrap().len(), 2);
    }
}
