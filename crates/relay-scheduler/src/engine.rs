// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use relay_config::SchedulerConfig;
use relay_db::Pool;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::executor::TaskExecutor;
use crate::notifier::Notifier;

const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Emitted whenever a scheduled task or reminder fires, so the HTTP/WS layer
/// can turn it into the wire-level chat frames without the scheduler
/// knowing anything about WebSocket sessions.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A system-role chat message for a fired task/reminder or a replayed
    /// offline result. `session_id: None` means every connected session.
    Message {
        session_id: Option<Uuid>,
        content: String,
    },
    /// A `"thinking"`/`"ready"` status update bracketing a scheduled task's
    /// prompt while it is in flight, for the session that was live when it
    /// fired.
    Status { session_id: Uuid, status: &'static str },
}

/// Reports whether any WebSocket client is currently connected for a given
/// session, so the scheduler can decide between live delivery and queuing a
/// pending result for later replay. Implemented by the Connection Manager.
pub trait ConnectionProbe: Send + Sync {
    fn has_connected_clients(&self, session_id: &str) -> bool;
}

pub struct Scheduler {
    pool: Arc<Pool>,
    config: SchedulerConfig,
    executor: Arc<dyn TaskExecutor>,
    connections: Arc<dyn ConnectionProbe>,
    notifier: Notifier,
    events: broadcast::Sender<SchedulerEvent>,
    running: AtomicBool,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    default_user_id: String,
    sanitize_max_len: usize,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Arc<Pool>,
        config: SchedulerConfig,
        executor: Arc<dyn TaskExecutor>,
        connections: Arc<dyn ConnectionProbe>,
        ntfy_url: Option<String>,
        default_user_id: String,
        sanitize_max_len: usize,
    ) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(256);
        Arc::new(Self {
            pool,
            config,
            executor,
            connections,
            notifier: Notifier::new(ntfy_url),
            events: tx,
            running: AtomicBool::new(false),
            handle: tokio::sync::Mutex::new(None),
            default_user_id,
            sanitize_max_len,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// Starts the background tick loop. Idempotent: calling `start` twice is
    /// a no-op on the second call.
    ///
    /// Before the first tick, any reminder that is still `pending` with
    /// `remind_at` already in the past is marked completed-but-undelivered
    /// rather than fired retroactively — it is replayed on next connection
    /// like any other missed delivery, not fired as if it were on time.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.complete_overdue_reminders_on_boot().await;

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                if !this.running.load(Ordering::SeqCst) {
                    break;
                }
                this.tick().await;
            }
        });
        *self.handle.lock().await = Some(handle);
    }

    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }

    async fn tick(&self) {
        self.fire_due_tasks().await;
        self.fire_due_reminders().await;
    }

    async fn complete_overdue_reminders_on_boot(&self) {
        let conn = self.pool.get();
        let reminders = match relay_db::reminders::list_pending(&conn) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list pending reminders at startup");
                return;
            }
        };
        drop(conn);

        let now = Utc::now();
        for reminder in reminders {
            if reminder.remind_at > now {
                continue;
            }
            let conn = self.pool.get();
            if let Err(e) = relay_db::reminders::mark_completed(&conn, reminder.id, None) {
                tracing::warn!(
                    reminder = %reminder.id, error = %e,
                    "failed to mark overdue reminder completed at startup"
                );
            }
        }
    }

    /// Drains every queued reminder and scheduled-task result addressed to
    /// `session_id` (or with no session, for results queued while no client
    /// was connected anywhere) and broadcasts them as system chat messages.
    /// Called by the Connection Manager on a session's first registration.
    pub async fn deliver_pending_for_session(&self, session_id: &str) {
        let target = session_id.parse::<Uuid>().ok();

        let conn = self.pool.get();
        let results = match relay_db::pending_results::get_undelivered_results(&conn) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list pending scheduler results");
                return;
            }
        };
        drop(conn);

        for result in results {
            let targets_this_session = result
                .session_id
                .map(|s| s.to_string() == session_id)
                .unwrap_or(true);
            if !targets_this_session {
                continue;
            }
            let content = format!(
                "[Offline Scheduled Task: {}] {}",
                result.task_name, result.prompt
            );
            let _ = self.events.send(SchedulerEvent::Message {
                session_id: target,
                content,
            });
            let conn = self.pool.get();
            let _ = relay_db::pending_results::mark_result_delivered(&conn, result.result_id);
        }

        let conn = self.pool.get();
        let reminders = match relay_db::reminders::list_undelivered(&conn) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list undelivered reminders");
                return;
            }
        };
        drop(conn);

        for reminder in reminders {
            let targets_this_session = reminder
                .session_id
                .map(|s| s.to_string() == session_id)
                .unwrap_or(true);
            if !targets_this_session {
                continue;
            }
            let content = format!("[Reminder] {}", reminder.message);
            let _ = self.events.send(SchedulerEvent::Message {
                session_id: reminder.session_id.or(target),
                content,
            });
            let conn = self.pool.get();
            let _ = relay_db::reminders::mark_delivered(&conn, reminder.id);
        }
    }

    /// Fires a scheduled task immediately, bypassing its cron schedule, for
    /// a manual "run now" request from the HTTP surface.
    pub async fn trigger_task_now(&self, task_id: Uuid) -> anyhow::Result<String> {
        let conn = self.pool.get();
        let task = relay_db::scheduled_tasks::get(&conn, task_id)?
            .ok_or_else(|| anyhow::anyhow!("scheduled task {task_id} not found"))?;
        drop(conn);
        self.fire_task(task).await;
        let conn = self.pool.get();
        let task = relay_db::scheduled_tasks::get(&conn, task_id)?
            .ok_or_else(|| anyhow::anyhow!("scheduled task {task_id} not found"))?;
        Ok(task.last_result.unwrap_or_default())
    }

    /// Fires every enabled scheduled task whose cron expression has a match
    /// in the window since `last_run_at` (or since creation, on first run).
    async fn fire_due_tasks(&self) {
        let conn = self.pool.get();
        let tasks = match relay_db::scheduled_tasks::list_enabled(&conn) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list enabled scheduled tasks");
                return;
            }
        };
        drop(conn);

        let now = Utc::now();
        for task in tasks {
            let schedule = match Schedule::from_str(&task.cron_expression) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(task = %task.name, error = %e, "invalid cron expression");
                    continue;
                }
            };
            let since = task.last_run_at.unwrap_or(task.created_at);
            let due = schedule.after(&since).take_while(|t| *t <= now).count() > 0;
            if !due {
                continue;
            }

            self.fire_task(task).await;
        }
    }

    /// `_execute_job`: sanitise, announce, run, persist, notify, and (if
    /// nobody was listening) queue for replay — in that order.
    async fn fire_task(&self, task: relay_db::ScheduledTask) {
        let prompt = sanitize(&task.prompt, "scheduler", self.sanitize_max_len);
        let session_id_str = self.config.offline_session_id.clone();
        let session_uuid = resolve_session_id(&session_id_str);
        let live = self.connections.has_connected_clients(&session_id_str);
        let system_message = format!("[Scheduled Task: {}] {}", task.name, prompt);

        if live {
            let _ = self.events.send(SchedulerEvent::Message {
                session_id: Some(session_uuid),
                content: system_message.clone(),
            });
            let _ = self.events.send(SchedulerEvent::Status {
                session_id: session_uuid,
                status: "thinking",
            });
        }

        let conn = self.pool.get();
        persist_system_message(&conn, session_uuid, &self.default_user_id, &system_message);
        drop(conn);

        let result = match self.executor.run_prompt(&session_id_str, &prompt).await {
            Ok(r) => r,
            Err(e) => format!("error: {e}"),
        };

        let conn = self.pool.get();
        if let Err(e) = relay_db::scheduled_tasks::record_run(&conn, task.id, &result) {
            tracing::warn!(task = %task.name, error = %e, "failed to record task run");
        }

        if live {
            let _ = self.events.send(SchedulerEvent::Status {
                session_id: session_uuid,
                status: "ready",
            });
        } else if let Err(e) = relay_db::pending_results::queue_pending_result(
            &conn,
            &task.name,
            &prompt,
            &result,
            None,
        ) {
            tracing::warn!(task = %task.name, error = %e, "failed to queue pending result");
        }
        drop(conn);

        self.notifier
            .send(&format!("Scheduled: {}", task.name), &result)
            .await;
    }

    async fn fire_due_reminders(&self) {
        let conn = self.pool.get();
        let reminders = match relay_db::reminders::list_pending(&conn) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list pending reminders");
                return;
            }
        };
        drop(conn);

        let now = Utc::now();
        for reminder in reminders {
            if reminder.remind_at > now {
                continue;
            }

            let message = sanitize(&reminder.message, "reminder", self.sanitize_max_len);

            let conn = self.pool.get();
            if let Err(e) =
                relay_db::reminders::mark_completed(&conn, reminder.id, Some(&message))
            {
                tracing::warn!(reminder = %reminder.id, error = %e, "failed to mark reminder completed");
                continue;
            }
            drop(conn);

            let session_id_str = reminder
                .session_id
                .map(|s| s.to_string())
                .unwrap_or_else(|| self.config.offline_session_id.clone());

            if self.connections.has_connected_clients(&session_id_str) {
                let session_uuid = reminder
                    .session_id
                    .unwrap_or_else(|| resolve_session_id(&session_id_str));
                let content = format!("[Reminder] {message}");

                let conn = self.pool.get();
                persist_system_message(&conn, session_uuid, &self.default_user_id, &content);
                drop(conn);

                let _ = self.events.send(SchedulerEvent::Message {
                    session_id: Some(session_uuid),
                    content,
                });
                let conn = self.pool.get();
                let _ = relay_db::reminders::mark_delivered(&conn, reminder.id);
            }

            self.notifier.send("Reminder", &message).await;
        }
    }
}

/// Maps the scheduler's synthetic offline session id (or any other
/// non-UUID session reference) onto a deterministic UUID, the same way
/// `relay-core`'s `SessionManager` resolves it on the processing side — so
/// a system message persisted here lands in the same chat session the
/// assistant reply is later appended to. Duplicated rather than imported:
/// `relay-core` already depends on this crate for `TaskExecutor`, so the
/// dependency can't run the other way.
fn resolve_session_id(session_id: &str) -> Uuid {
    Uuid::parse_str(session_id)
        .unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, session_id.as_bytes()))
}

/// Mirrors `relay_core::sanitize`'s control-character stripping and length
/// cap, duplicated here for the same reason as [`resolve_session_id`].
fn sanitize(text: &str, source: &str, max_len: usize) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| *c == '\t' || *c == '\n' || !c.is_control())
        .collect();

    if cleaned.chars().count() > max_len {
        tracing::debug!(source, max_len, "sanitize: truncating");
        cleaned.chars().take(max_len).collect()
    } else {
        cleaned
    }
}

fn persist_system_message(
    conn: &rusqlite::Connection,
    session_id: Uuid,
    user_id: &str,
    content: &str,
) {
    if let Err(e) = relay_db::sessions::ensure_exists(conn, session_id, user_id) {
        tracing::warn!(error = %e, "failed to ensure chat session exists for system message");
        return;
    }
    let message = relay_db::ChatMessage {
        id: Uuid::new_v4(),
        session_id,
        role: relay_db::MessageRole::System,
        content: content.to_string(),
        agent_name: None,
        timestamp: Utc::now(),
        metadata: None,
    };
    if let Err(e) = relay_db::messages::append(conn, &message) {
        tracing::warn!(error = %e, "failed to persist scheduler system message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FakeExecutor;

    #[async_trait]
    impl TaskExecutor for FakeExecutor {
        async fn run_prompt(&self, _session_id: &str, prompt: &str) -> anyhow::Result<String> {
            Ok(format!("ran: {prompt}"))
        }
    }

    struct AlwaysOffline;
    impl ConnectionProbe for AlwaysOffline {
        fn has_connected_clients(&self, _session_id: &str) -> bool {
            false
        }
    }

    struct AlwaysOnline;
    impl ConnectionProbe for AlwaysOnline {
        fn has_connected_clients(&self, _session_id: &str) -> bool {
            true
        }
    }

    fn scheduler(pool: Arc<Pool>, connections: Arc<dyn ConnectionProbe>) -> Arc<Scheduler> {
        Scheduler::new(
            pool,
            SchedulerConfig::default(),
            Arc::new(FakeExecutor),
            connections,
            None,
            "web_user".to_string(),
            16_384,
        )
    }

    #[tokio::test]
    async fn firing_a_task_while_offline_queues_a_pending_result() {
        let pool = Arc::new(Pool::open_in_memory().unwrap());
        let conn = pool.get();
        relay_db::scheduled_tasks::create(&conn, "nightly", "* * * * * *", "say hi", None)
            .unwrap();
        drop(conn);

        let scheduler = scheduler(pool.clone(), Arc::new(AlwaysOffline));
        scheduler.fire_due_tasks().await;

        let conn = pool.get();
        let pending = relay_db::pending_results::get_undelivered_results(&conn).unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].response.contains("ran: say hi"));
    }

    #[tokio::test]
    async fn firing_a_task_while_live_emits_system_message_and_status_frames() {
        let pool = Arc::new(Pool::open_in_memory().unwrap());
        let conn = pool.get();
        relay_db::scheduled_tasks::create(&conn, "nightly", "* * * * * *", "say hi", None)
            .unwrap();
        drop(conn);

        let scheduler = scheduler(pool.clone(), Arc::new(AlwaysOnline));
        let mut events = scheduler.subscribe();
        scheduler.fire_due_tasks().await;

        let first = events.try_recv().unwrap();
        match first {
            SchedulerEvent::Message { content, .. } => {
                assert!(content.starts_with("[Scheduled Task: nightly] say hi"));
            }
            other => panic!("expected Message, got {other:?}"),
        }
        let second = events.try_recv().unwrap();
        assert!(matches!(second, SchedulerEvent::Status { status: "thinking", .. }));
        let third = events.try_recv().unwrap();
        assert!(matches!(third, SchedulerEvent::Status { status: "ready", .. }));

        let conn = pool.get();
        assert!(relay_db::pending_results::get_undelivered_results(&conn)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn reconnect_drains_pending_results_and_reminders() {
        let pool = Arc::new(Pool::open_in_memory().unwrap());
        let conn = pool.get();
        relay_db::pending_results::queue_pending_result(&conn, "nightly", "say hi", "hi!", None)
            .unwrap();
        let reminder =
            relay_db::reminders::create(&conn, "check oven", Utc::now(), None).unwrap();
        relay_db::reminders::mark_completed(&conn, reminder.id, Some("done")).unwrap();
        drop(conn);

        let scheduler = scheduler(pool.clone(), Arc::new(AlwaysOffline));
        let mut events = scheduler.subscribe();
        scheduler.deliver_pending_for_session("web_user").await;

        let first = events.try_recv().unwrap();
        match first {
            SchedulerEvent::Message { content, .. } => {
                assert!(content.starts_with("[Offline Scheduled Task: nightly]"));
            }
            other => panic!("expected Message, got {other:?}"),
        }
        let second = events.try_recv().unwrap();
        match second {
            SchedulerEvent::Message { content, .. } => {
                assert!(content.starts_with("[Reminder]"));
            }
            other => panic!("expected Message, got {other:?}"),
        }

        let conn = pool.get();
        assert!(relay_db::pending_results::get_undelivered_results(&conn)
            .unwrap()
            .is_empty());
        assert!(relay_db::reminders::list_undelivered(&conn).unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_marks_overdue_reminders_completed_without_firing() {
        let pool = Arc::new(Pool::open_in_memory().unwrap());
        let conn = pool.get();
        let overdue = relay_db::reminders::create(
            &conn,
            "already due",
            Utc::now() - chrono::Duration::minutes(5),
            None,
        )
        .unwrap();
        drop(conn);

        let scheduler = scheduler(pool.clone(), Arc::new(AlwaysOffline));
        let mut events = scheduler.subscribe();
        scheduler.start().await;
        scheduler.shutdown().await;

        assert!(events.try_recv().is_err());

        let conn = pool.get();
        let stored = relay_db::reminders::get(&conn, overdue.id).unwrap().unwrap();
        assert_eq!(stored.status, relay_db::ReminderStatus::Completed);
        assert!(!stored.delivered);
    }
}
