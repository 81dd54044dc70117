use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_ts, parse_ts_opt};
use crate::error::DbError;
use crate::models::ScheduledTask;
use crate::Result;

pub fn create(
    conn: &Connection,
    name: &str,
    cron_expression: &str,
    prompt: &str,
    description: Option<&str>,
) -> Result<ScheduledTask> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    conn.execute(
        r#"
        INSERT INTO scheduled_tasks
            (id, name, cron_expression, prompt, description, enabled, created_at, updated_at,
             last_run_at, run_count, last_result, metadata)
        VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6, NULL, 0, NULL, NULL)
        "#,
        params![
            id.to_string(),
            name,
            cron_expression,
            prompt,
            description,
            now.to_rfc3339(),
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation => {
            DbError::Conflict(format!("scheduled task named {name:?} already exists"))
        }
        other => DbError::Sql(other),
    })?;
    Ok(ScheduledTask {
        id,
        name: name.to_string(),
        cron_expression: cron_expression.to_string(),
        prompt: prompt.to_string(),
        description: description.map(str::to_string),
        enabled: true,
        created_at: now,
        updated_at: now,
        last_run_at: None,
        run_count: 0,
        last_result: None,
        metadata: None,
    })
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<ScheduledTask>> {
    conn.query_row(
        r#"
        SELECT id, name, cron_expression, prompt, description, enabled, created_at, updated_at,
               last_run_at, run_count, last_result, metadata
        FROM scheduled_tasks WHERE id = ?1
        "#,
        params![id.to_string()],
        row_to_task,
    )
    .optional()
    .map_err(DbError::from)
}

/// All tasks with `enabled = true`.
pub fn list_enabled(conn: &Connection) -> Result<Vec<ScheduledTask>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, name, cron_expression, prompt, description, enabled, created_at, updated_at,
               last_run_at, run_count, last_result, metadata
        FROM scheduled_tasks WHERE enabled = 1
        "#,
    )?;
    let rows = stmt
        .query_map([], row_to_task)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn list_all(conn: &Connection) -> Result<Vec<ScheduledTask>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, name, cron_expression, prompt, description, enabled, created_at, updated_at,
               last_run_at, run_count, last_result, metadata
        FROM scheduled_tasks ORDER BY created_at ASC
        "#,
    )?;
    let rows = stmt
        .query_map([], row_to_task)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn delete(conn: &Connection, id: Uuid) -> Result<()> {
    let affected = conn.execute(
        "DELETE FROM scheduled_tasks WHERE id = ?1",
        params![id.to_string()],
    )?;
    if affected == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Records a fire: bumps `run_count`, stamps `last_run_at`, stores the first
/// 4 KB of the result.
pub fn record_run(conn: &Connection, id: Uuid, result: &str) -> Result<()> {
    let truncated: String = result.chars().take(4096).collect();
    let affected = conn.execute(
        r#"
        UPDATE scheduled_tasks
        SET run_count = run_count + 1, last_run_at = ?1, last_result = ?2, updated_at = ?1
        WHERE id = ?3
        "#,
        params![Utc::now().to_rfc3339(), truncated, id.to_string()],
    )?;
    if affected == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

fn row_to_task(row: &rusqlite::Row) -> std::result::Result<ScheduledTask, rusqlite::Error> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    let last_run_at: Option<String> = row.get(8)?;
    let run_count: i64 = row.get(9)?;
    let metadata: Option<String> = row.get(11)?;
    Ok(ScheduledTask {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
        name: row.get(1)?,
        cron_expression: row.get(2)?,
        prompt: row.get(3)?,
        description: row.get(4)?,
        enabled: row.get(5)?,
        created_at: parse_ts(&created_at).unwrap_or_else(|_| Utc::now()),
        updated_at: parse_ts(&updated_at).unwrap_or_else(|_| Utc::now()),
        last_run_at: parse_ts_opt(last_run_at).unwrap_or(None),
        run_count: run_count.max(0) as u64,
        last_result: row.get(10)?,
        metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
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
    fn create_then_get_round_trips() {
        let c = conn();
        let t = create(&c, "T1", "* * * * *", "ping", None).unwrap();
        let fetched = get(&c, t.id).unwrap().unwrap();
        assert_eq!(fetched.name, "T1");
        assert!(fetched.enabled);
        assert_eq!(fetched.run_count, 0);
    }

    #[test]
    fn duplicate_name_is_conflict() {
        let c = conn();
        create(&c, "T1", "* * * * *", "ping", None).unwrap();
        let err = create(&c, "T1", "* * * * *", "pong", None).unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn record_run_increments_count_and_stores_result() {
        let c = conn();
        let t = create(&c, "T1", "* * * * *", "ping", None).unwrap();
        record_run(&c, t.id, "pong").unwrap();
        record_run(&c, t.id, "pong again").unwrap();
        let fetched = get(&c, t.id).unwrap().unwrap();
        assert_eq!(fetched.run_count, 2);
        assert_eq!(fetched.last_result.as_deref(), Some("pong again"));
    }

    #[test]
    fn list_enabled_excludes_disabled_tasks() {
        let c = conn();
        create(&c, "T1", "* * * * *", "ping", None).unwrap();
        c.execute("UPDATE scheduled_tasks SET enabled = 0 WHERE name = 'T1'", [])
            .unwrap();
        assert!(list_enabled(&c).unwrap().is_empty());
        assert_eq!(list_all(&c).unwrap().len(), 1);
    }
}
