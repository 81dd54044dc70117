// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! A scripted runtime double: each call to `run` pops the next event script
//! from the front of a queue so tests can assert on exact event sequences
//! without a live agent library.
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::event::AgentEvent;
use crate::runner::{AgentRunner, HistoryTurn, SessionHandle};

pub struct FakeRuntime {
    scripts: Mutex<Vec<Vec<AgentEvent>>>,
    /// Every message passed to `run`, in call order, for test assertions.
    pub calls: Mutex<Vec<String>>,
    sessions: Mutex<HashMap<String, ()>>,
    /// Number of turns seeded via `seed_history`, for test assertions.
    pub seeded_turns: Mutex<usize>,
}

impl FakeRuntime {
    pub fn new(scripts: Vec<Vec<AgentEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            calls: Mutex::new(Vec::new()),
            sessions: Mutex::new(HashMap::new()),
            seeded_turns: Mutex::new(0),
        }
    }

    /// Convenience: a runtime that always answers with a single final
    /// model-response event.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![vec![AgentEvent::model_response(reply, true)]])
    }
}

#[async_trait]
impl AgentRunner for FakeRuntime {
    async fn get_or_create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> anyhow::Result<SessionHandle> {
        self.sessions
            .lock()
            .unwrap()
            .entry(session_id.to_string())
            .or_insert(());
        Ok(SessionHandle {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        })
    }

    async fn seed_history(
        &self,
        _session: &SessionHandle,
        turns: Vec<HistoryTurn>,
    ) -> anyhow::Result<()> {
        *self.seeded_turns.lock().unwrap() += turns.len();
        Ok(())
    }

    async fn run(
        &self,
        _user_id: &str,
        _session_id: &str,
        message: &str,
    ) -> anyhow::Result<Vec<AgentEvent>> {
        self.calls.lock().unwrap().push(message.to_string());
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            Ok(vec![AgentEvent::model_response(
                "[no more scripts]",
                true,
            )])
        } else {
            Ok(scripts.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_text_replies_with_scripted_text() {
        let rt = FakeRuntime::always_text("hello");
        let events = rt.run("u1", "s1", "hi").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].content.as_ref().unwrap().text(), "hello");
    }

    #[tokio::test]
    async fn falls_back_once_scripts_are_exhausted() {
        let rt = FakeRuntime::new(vec![]);
        let events = rt.run("u1", "s1", "hi").await.unwrap();
        assert!(events[0].content.as_ref().unwrap().text().contains("no more scripts"));
    }

    #[tokio::test]
    async fn records_every_call_in_order() {
        let rt = FakeRuntime::always_text("ok");
        rt.run("u1", "s1", "first").await.unwrap();
        rt.run("u1", "s1", "second").await.unwrap();
        assert_eq!(*rt.calls.lock().unwrap(), vec!["first", "second"]);
    }
}
