use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::parse_ts;
use crate::models::Task;
use crate::Result;

/// Generic background-task tracking table, kept intentionally minimal.
pub fn create(conn: &Connection, project_id: &str, title: &str) -> Result<Task> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    conn.execute(
        r#"
        INSERT INTO tasks (id, project_id, status, title, created_at, updated_at)
        VALUES (?1, ?2, 'open', ?3, ?4, ?4)
        "#,
        params![id.to_string(), project_id, title, now.to_rfc3339()],
    )?;
    Ok(Task {
        id,
        project_id: project_id.to_string(),
        status: "open".to_string(),
        title: title.to_string(),
        created_at: now,
        updated_at: now,
    })
}

pub fn list_by_status(conn: &Connection, project_id: &str, status: &str) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, project_id, status, title, created_at, updated_at
        FROM tasks WHERE project_id = ?1 AND status = ?2
        ORDER BY created_at ASC
        "#,
    )?;
    let rows = stmt
        .query_map(params![project_id, status], row_to_task)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn set_status(conn: &Connection, id: Uuid, status: &str) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status, Utc::now().to_rfc3339(), id.to_string()],
    )?;
    Ok(())
}

fn row_to_task(row: &rusqlite::Row) -> std::result::Result<Task, rusqlite::Error> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    Ok(Task {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
        project_id: row.get(1)?,
        status: row.get(2)?,
        title: row.get(3)?,
        created_at: parse_ts(&created_at).unwrap_or_else(|_| Utc::now()),
        updated_at: parse_ts(&updated_at).unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;

    #[test]
    fn create_and_filter_by_status() {
        let c = Connection::open_in_memory().unwrap();
        run_migrations(&c).unwrap();
        let t = create(&c, "proj-1", "do thing").unwrap();
        assert_eq!(list_by_status(&c, "proj-1", "open").unwrap().len(), 1);
        set_status(&c, t.id, "done").unwrap();
        assert!(list_by_status(&c, "proj-1", "open").unwrap().is_empty());
        assert_eq!(list_by_status(&c, "proj-1", "done").unwrap().len(), 1);
    }
}
