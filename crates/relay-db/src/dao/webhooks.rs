use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_ts, parse_ts_opt};
use crate::error::DbError;
use crate::models::Webhook;
use crate::Result;

pub fn create(
    conn: &Connection,
    name: &str,
    path_suffix: &str,
    prompt_template: &str,
    secret: Option<&str>,
) -> Result<Webhook> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    conn.execute(
        r#"
        INSERT INTO webhook_definitions
            (id, name, path_suffix, prompt_template, secret, enabled, trigger_count,
             last_triggered_at, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 1, 0, NULL, ?6)
        "#,
        params![
            id.to_string(),
            name,
            path_suffix,
            prompt_template,
            secret,
            now.to_rfc3339(),
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation => {
            DbError::Conflict(format!(
                "webhook name {name:?} or path {path_suffix:?} already in use"
            ))
        }
        other => DbError::Sql(other),
    })?;
    Ok(Webhook {
        id,
        name: name.to_string(),
        path_suffix: path_suffix.to_string(),
        prompt_template: prompt_template.to_string(),
        secret: secret.map(str::to_string),
        enabled: true,
        trigger_count: 0,
        last_triggered_at: None,
        created_at: now,
    })
}

/// Looked up by path suffix; only enabled webhooks match. Invariant (d): path suffix is unique and
/// case-sensitive, enforced by the DDL's `UNIQUE` constraint and by this
/// query never lower-casing its input.
pub fn find_by_path_enabled(conn: &Connection, path_suffix: &str) -> Result<Option<Webhook>> {
    conn.query_row(
        r#"
        SELECT id, name, path_suffix, prompt_template, secret, enabled, trigger_count,
               last_triggered_at, created_at
        FROM webhook_definitions WHERE path_suffix = ?1 AND enabled = 1
        "#,
        params![path_suffix],
        row_to_webhook,
    )
    .optional()
    .map_err(DbError::from)
}

pub fn list_all(conn: &Connection) -> Result<Vec<Webhook>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, name, path_suffix, prompt_template, secret, enabled, trigger_count,
               last_triggered_at, created_at
        FROM webhook_definitions ORDER BY created_at ASC
        "#,
    )?;
    let rows = stmt
        .query_map([], row_to_webhook)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn delete(conn: &Connection, id: Uuid) -> Result<()> {
    let affected = conn.execute(
        "DELETE FROM webhook_definitions WHERE id = ?1",
        params![id.to_string()],
    )?;
    if affected == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

pub fn record_trigger(conn: &Connection, id: Uuid) -> Result<()> {
    conn.execute(
        r#"
        UPDATE webhook_definitions
        SET trigger_count = trigger_count + 1, last_triggered_at = ?1
        WHERE id = ?2
        "#,
        params![Utc::now().to_rfc3339(), id.to_string()],
    )?;
    Ok(())
}

fn row_to_webhook(row: &rusqlite::Row) -> std::result::Result<Webhook, rusqlite::Error> {
    let id: String = row.get(0)?;
    let trigger_count: i64 = row.get(6)?;
    let last_triggered_at: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;
    Ok(Webhook {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
        name: row.get(1)?,
        path_suffix: row.get(2)?,
        prompt_template: row.get(3)?,
        secret: row.get(4)?,
        enabled: row.get(5)?,
        trigger_count: trigger_count.max(0) as u64,
        last_triggered_at: parse_ts_opt(last_triggered_at).unwrap_or(None),
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
    fn find_by_path_is_case_sensitive() {
        let c = conn();
        create(&c, "gh", "gh", "{{payload.x}}", Some("s3cr3t")).unwrap();
        assert!(find_by_path_enabled(&c, "gh").unwrap().is_some());
        assert!(find_by_path_enabled(&c, "GH").unwrap().is_none());
    }

    #[test]
    fn duplicate_path_suffix_rejected() {
        let c = conn();
        create(&c, "gh", "gh", "{{payload.x}}", None).unwrap();
        let err = create(&c, "gh2", "gh", "other", None).unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn record_trigger_increments_count() {
        let c = conn();
        let w = create(&c, "gh", "gh", "x", None).unwrap();
        record_trigger(&c, w.id).unwrap();
        record_trigger(&c, w.id).unwrap();
        let fetched = find_by_path_enabled(&c, "gh").unwrap().unwrap();
        assert_eq!(fetched.trigger_count, 2);
    }
}
