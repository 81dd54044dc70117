// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::event::AgentEvent;

/// Handle to an in-memory agent session owned by the adapted runtime. Its
/// only job is to identify which session a `run` call should append to.
pub struct SessionHandle {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

/// One (role, text) turn replayed into a freshly-created session so the
/// runtime treats prior DB history as part of its own event log.
/// `invocation_id` groups a user/assistant pair into one logical turn.
pub struct HistoryTurn {
    pub invocation_id: String,
    pub role: String,
    pub text: String,
}

/// A thin façade over whatever third-party agent library is in use. The
/// adapter forwards events without interpreting them; all classification
/// happens in the Session Runner.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Fetches an existing in-memory session or creates a fresh one.
    async fn get_or_create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> anyhow::Result<SessionHandle>;

    /// Replays prior turns into a freshly-created session. A no-op on a
    /// session that already has in-memory history.
    async fn seed_history(&self, session: &SessionHandle, turns: Vec<HistoryTurn>) -> anyhow::Result<()>;

    /// Runs one turn to completion and returns the ordered event stream.
    async fn run(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> anyhow::Result<Vec<AgentEvent>>;
}
