use rusqlite::Connection;

use crate::Result;

/// Idempotent DDL, run once at bootstrap (§4.12) and safe to re-run
/// (property P10: running it twice leaves the database bit-identical).
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id          TEXT PRIMARY KEY,
            project_id  TEXT NOT NULL,
            status      TEXT NOT NULL,
            title       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_project_status ON tasks(project_id, status);

        CREATE TABLE IF NOT EXISTS chat_sessions (
            session_id      TEXT PRIMARY KEY,
            name            TEXT,
            user_id         TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            last_message_at TEXT,
            preview         TEXT,
            active          BOOLEAN NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS chat_messages (
            id          TEXT PRIMARY KEY,
            session_id  TEXT NOT NULL,
            role        TEXT NOT NULL,
            content     TEXT NOT NULL,
            agent_name  TEXT,
            timestamp   TEXT NOT NULL,
            metadata    TEXT,
            FOREIGN KEY (session_id) REFERENCES chat_sessions(session_id)
        );
        CREATE INDEX IF NOT EXISTS idx_chat_messages_session_ts
            ON chat_messages(session_id, timestamp);

        CREATE TABLE IF NOT EXISTS scheduled_tasks (
            id               TEXT PRIMARY KEY,
            name             TEXT NOT NULL UNIQUE,
            cron_expression  TEXT NOT NULL,
            prompt           TEXT NOT NULL,
            description      TEXT,
            enabled          BOOLEAN NOT NULL DEFAULT 1,
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL,
            last_run_at      TEXT,
            run_count        INTEGER NOT NULL DEFAULT 0,
            last_result      TEXT,
            metadata         TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_scheduled_tasks_enabled ON scheduled_tasks(enabled);

        CREATE TABLE IF NOT EXISTS reminders (
            id               TEXT PRIMARY KEY,
            message          TEXT NOT NULL,
            remind_at        TEXT NOT NULL,
            status           TEXT NOT NULL DEFAULT 'pending',
            delivered        BOOLEAN NOT NULL DEFAULT 0,
            session_id       TEXT,
            created_at       TEXT NOT NULL,
            completed_at     TEXT,
            delivery_result  TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_reminders_status_remind_at
            ON reminders(status, remind_at);
        CREATE INDEX IF NOT EXISTS idx_reminders_pending
            ON reminders(remind_at) WHERE status = 'pending';
        CREATE INDEX IF NOT EXISTS idx_reminders_undelivered
            ON reminders(id) WHERE status = 'completed' AND delivered = 0;

        CREATE TABLE IF NOT EXISTS webhook_definitions (
            id               TEXT PRIMARY KEY,
            name             TEXT NOT NULL UNIQUE,
            path_suffix      TEXT NOT NULL UNIQUE,
            prompt_template  TEXT NOT NULL,
            secret           TEXT,
            enabled          BOOLEAN NOT NULL DEFAULT 1,
            trigger_count    INTEGER NOT NULL DEFAULT 0,
            last_triggered_at TEXT,
            created_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_path_suffix ON webhook_definitions(path_suffix);

        CREATE TABLE IF NOT EXISTS pending_scheduler_results (
            result_id   TEXT PRIMARY KEY,
            task_name   TEXT NOT NULL,
            prompt      TEXT NOT NULL,
            response    TEXT NOT NULL,
            session_id  TEXT,
            delivered   BOOLEAN NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_pending_results_delivered
            ON pending_scheduler_results(delivered);
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='reminders'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
