// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use relay_db::{ChatMessage, MessageRole, Pool};
use relay_runtime::{AgentEvent, AgentRunner, HistoryTurn};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::events::{classify, ClassifiedEvent, EventCategory};
use crate::malformed::extract_from_malformed_function_call;
use crate::render::render_response_text;
use crate::sanitize::sanitize;

/// Events replayed from the DB are capped to this many messages (bootstrap
/// step A.3).
const MAX_HISTORY_MESSAGES: i64 = 15;

/// The in-memory event list is truncated to this many entries before every
/// invocation (turn processing step B.2).
const MAX_EVENT_WINDOW: usize = 20;

pub struct ProcessMessageResult {
    pub response: String,
    pub events: Vec<ClassifiedEvent>,
}

/// Per-session object owning a unique `session_id` and a stable `user_id`.
/// One instance is created lazily per session by the session manager and
/// lives for the lifetime of that session.
pub struct SessionRunner {
    pool: Arc<Pool>,
    runtime: Arc<dyn AgentRunner>,
    agent_models: HashMap<String, String>,
    sanitize_budget: usize,
    app_name: String,
    user_id: String,
    session_id: Uuid,
    /// Append-only per-session event log, deduplicated on
    /// `(category, summary, timestamp)`.
    events: Mutex<Vec<ClassifiedEvent>>,
}

impl SessionRunner {
    /// Session bootstrap (step A): ensures the DB row exists, constructs a
    /// fresh in-memory agent session, and replays recent history into it.
    pub async fn bootstrap(
        pool: Arc<Pool>,
        runtime: Arc<dyn AgentRunner>,
        agent_models: HashMap<String, String>,
        sanitize_budget: usize,
        app_name: &str,
        user_id: &str,
        session_id: Uuid,
    ) -> anyhow::Result<Self> {
        {
            let conn = pool.get();
            relay_db::sessions::ensure_exists(&conn, session_id, user_id)?;
        }

        let session_id_str = session_id.to_string();
        let handle = runtime
            .get_or_create_session(app_name, user_id, &session_id_str)
            .await?;

        let history = {
            let conn = pool.get();
            relay_db::messages::last_n(&conn, session_id, MAX_HISTORY_MESSAGES)?
        };
        if !history.is_empty() {
            let turns = group_history_into_turns(history);
            if let Err(e) = runtime.seed_history(&handle, turns).await {
                tracing::warn!(session_id = %session_id, error = %e, "failed to replay DB history into session");
            }
        }

        Ok(Self {
            pool,
            runtime,
            agent_models,
            sanitize_budget,
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id,
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Current in-memory event log for this session, most recent last.
    pub async fn events(&self) -> Vec<ClassifiedEvent> {
        self.events.lock().await.clone()
    }

    /// Turn processing (step B): runs one turn, classifies every event,
    /// persists the turn, and returns the filtered response.
    pub async fn process_message(&self, text: &str) -> anyhow::Result<ProcessMessageResult> {
        let text = sanitize(text, "user_message", self.sanitize_budget);

        {
            let mut events = self.events.lock().await;
            if events.len() > MAX_EVENT_WINDOW {
                let cut = events.len() - MAX_EVENT_WINDOW;
                events.drain(0..cut);
            }
        }

        let raw_events = self
            .runtime
            .run(&self.user_id, &self.session_id.to_string(), &text)
            .await?;

        let (response, classified) = self.process_events(raw_events).await;
        let response = render_response_text(&response);

        self.persist_turn(&text, &response).await?;

        let filtered = filter_for_client(&classified);
        Ok(ProcessMessageResult {
            response,
            events: filtered,
        })
    }

    /// Event classification + empty-response recovery (steps C–E).
    async fn process_events(&self, raw_events: Vec<AgentEvent>) -> (String, Vec<ClassifiedEvent>) {
        let mut final_response: Option<String> = None;
        let mut last_text_response: Option<String> = None;
        let mut raw_response_for_recovery = None;
        let mut classified_events = Vec::new();

        for event in &raw_events {
            let classified = classify(event, &self.agent_models);

            if classified.category == EventCategory::ModelResponse {
                if let Some(text) = classified.text.as_ref().filter(|t| !t.is_empty()) {
                    last_text_response = Some(text.clone());
                    if classified.is_final {
                        final_response = Some(text.clone());
                    }
                }
                if event.is_final {
                    raw_response_for_recovery = event.raw_response.clone();
                }
            }

            self.append_event_deduped(classified.clone()).await;
            classified_events.push(classified);
        }

        if final_response.is_none() {
            if let Some(raw) = &raw_response_for_recovery {
                if let Some(recovered) = extract_from_malformed_function_call(raw) {
                    tracing::info!(session_id = %self.session_id, "recovered text from malformed function call");
                    let synthetic = ClassifiedEvent {
                        category: EventCategory::ModelResponse,
                        summary: "Recovered Response from Malformed Function".into(),
                        timestamp: Utc::now(),
                        text: Some(recovered.clone()),
                        is_final: true,
                        details: serde_json::json!({ "recovered_from": "malformed_function_call" }),
                    };
                    self.append_event_deduped(synthetic.clone()).await;
                    classified_events.push(synthetic);
                    final_response = Some(recovered);
                }
            }
        }

        if final_response.is_none() {
            if let Some(text) = last_text_response {
                final_response = Some(text);
            }
        }

        let final_response = final_response.unwrap_or_else(|| {
            log_empty_response_diagnostic(self.session_id, &raw_events);
            "I apologize, but I couldn't generate a response.".to_string()
        });

        (final_response, classified_events)
    }

    async fn append_event_deduped(&self, event: ClassifiedEvent) {
        let mut events = self.events.lock().await;
        let is_dup = events.iter().any(|e| {
            e.category == event.category
                && e.summary == event.summary
                && e.timestamp == event.timestamp
        });
        if !is_dup {
            events.push(event);
        }
    }

    async fn persist_turn(&self, user_text: &str, response: &str) -> anyhow::Result<()> {
        let conn = self.pool.get();
        let now = Utc::now();
        relay_db::messages::append(
            &conn,
            &ChatMessage {
                id: Uuid::new_v4(),
                session_id: self.session_id,
                role: MessageRole::User,
                content: user_text.to_string(),
                agent_name: None,
                timestamp: now,
                metadata: None,
            },
        )?;
        relay_db::messages::append(
            &conn,
            &ChatMessage {
                id: Uuid::new_v4(),
                session_id: self.session_id,
                role: MessageRole::Assistant,
                content: response.to_string(),
                agent_name: Some(self.app_name.clone()),
                timestamp: Utc::now(),
                metadata: None,
            },
        )?;
        relay_db::sessions::touch_last_message_at(&conn, self.session_id)?;
        Ok(())
    }
}

#[async_trait]
impl relay_scheduler::TaskExecutor for SessionRunner {
    async fn run_prompt(&self, session_id: &str, prompt: &str) -> anyhow::Result<String> {
        if session_id != self.session_id.to_string() {
            anyhow::bail!("session id mismatch for scheduled task executor");
        }
        let result = self.process_message(prompt).await?;
        Ok(result.response)
    }
}

fn group_history_into_turns(messages: Vec<ChatMessage>) -> Vec<HistoryTurn> {
    let mut turns = Vec::with_capacity(messages.len());
    let mut invocation_id = Uuid::new_v4().to_string();
    for msg in messages {
        match msg.role {
            MessageRole::User => {
                invocation_id = Uuid::new_v4().to_string();
                turns.push(HistoryTurn {
                    invocation_id: invocation_id.clone(),
                    role: "user".into(),
                    text: msg.content,
                });
            }
            MessageRole::Assistant => {
                turns.push(HistoryTurn {
                    invocation_id: invocation_id.clone(),
                    role: "model".into(),
                    text: msg.content,
                });
            }
            MessageRole::System => {}
        }
    }
    turns
}

/// Keeps every non-model event plus only the *last* model response event,
/// avoiding client-visible duplicate assistant messages (step B.6).
fn filter_for_client(events: &[ClassifiedEvent]) -> Vec<ClassifiedEvent> {
    let mut filtered = Vec::new();
    let mut last_model_event = None;
    for event in events {
        if event.category == EventCategory::ModelResponse {
            if event.is_final || last_model_event.is_none() {
                last_model_event = Some(event.clone());
            }
        } else {
            filtered.push(event.clone());
        }
    }
    if let Some(last) = last_model_event {
        filtered.push(last);
    }
    filtered
}

fn log_empty_response_diagnostic(session_id: Uuid, events: &[AgentEvent]) {
    let breakdown: Vec<String> = events
        .iter()
        .enumerate()
        .map(|(i, e)| {
            format!(
                "[{i}] author={:?} is_final={} parts={}",
                e.author,
                e.is_final,
                e.content.as_ref().map(|c| c.parts.len()).unwrap_or(0)
            )
        })
        .collect();
    tracing::warn!(
        session_id = %session_id,
        event_count = events.len(),
        "no text response found in any event; this may poison subsequent turns\n{}",
        breakdown.join("\n"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_runtime::FakeRuntime;

    fn in_memory_pool() -> Arc<Pool> {
        Arc::new(Pool::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn bootstrap_creates_session_row_and_replays_no_history_on_first_use() {
        let pool = in_memory_pool();
        let runtime: Arc<dyn AgentRunner> = Arc::new(FakeRuntime::always_text("hi"));
        let runner = SessionRunner::bootstrap(
            pool.clone(),
            runtime,
            HashMap::new(),
            16_384,
            "relay",
            "user-1",
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let conn = pool.get();
        assert!(relay_db::sessions::get(&conn, runner.session_id())
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn process_message_persists_user_and_assistant_turns() {
        let pool = in_memory_pool();
        let runtime: Arc<dyn AgentRunner> = Arc::new(FakeRuntime::always_text("pong"));
        let session_id = Uuid::new_v4();
        let runner = SessionRunner::bootstrap(
            pool.clone(),
            runtime,
            HashMap::new(),
            16_384,
            "relay",
            "user-1",
            session_id,
        )
        .await
        .unwrap();

        let result = runner.process_message("ping").await.unwrap();
        assert_eq!(result.response, "pong");

        let conn = pool.get();
        let count = relay_db::messages::count_for_session(&conn, session_id).unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn empty_events_fall_back_to_apology() {
        let pool = in_memory_pool();
        let runtime: Arc<dyn AgentRunner> = Arc::new(FakeRuntime::new(vec![vec![]]));
        let session_id = Uuid::new_v4();
        let runner = SessionRunner::bootstrap(
            pool,
            runtime,
            HashMap::new(),
            16_384,
            "relay",
            "user-1",
            session_id,
        )
        .await
        .unwrap();

        let result = runner.process_message("hello").await.unwrap();
        assert!(result.response.contains("couldn't generate a response"));
    }

    #[tokio::test]
    async fn malformed_function_call_is_recovered_as_response() {
        let pool = in_memory_pool();
        let mut event = AgentEvent::default();
        event.is_final = true;
        event.raw_response = Some(serde_json::json!({
            "candidates": [{
                "finish_reason": "MALFORMED_FUNCTION_CALL",
                "finish_message": "print(\"recovered text\")",
            }]
        }));
        let runtime: Arc<dyn AgentRunner> = Arc::new(FakeRuntime::new(vec![vec![event]]));
        let session_id = Uuid::new_v4();
        let runner = SessionRunner::bootstrap(
            pool,
            runtime,
            HashMap::new(),
            16_384,
            "relay",
            "user-1",
            session_id,
        )
        .await
        .unwrap();

        let result = runner.process_message("hello").await.unwrap();
        assert_eq!(result.response, "recovered text");
    }

    #[test]
    fn filter_for_client_keeps_only_last_model_response() {
        let events = vec![
            ClassifiedEvent {
                category: EventCategory::ModelResponse,
                summary: "Intermediate Response".into(),
                timestamp: Utc::now(),
                text: Some("first".into()),
                is_final: false,
                details: serde_json::json!({}),
            },
            ClassifiedEvent {
                category: EventCategory::ToolCall,
                summary: "Tool Call: search".into(),
                timestamp: Utc::now(),
                text: None,
                is_final: false,
                details: serde_json::json!({}),
            },
            ClassifiedEvent {
                category: EventCategory::ModelResponse,
                summary: "Final Response".into(),
                timestamp: Utc::now(),
                text: Some("final".into()),
                is_final: true,
                details: serde_json::json!({}),
            },
        ];
        let filtered = filter_for_client(&events);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].category, EventCategory::ToolCall);
        assert_eq!(filtered[1].text.as_deref(), Some("final"));
    }
}
