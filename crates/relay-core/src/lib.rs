// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod events;
mod malformed;
mod render;
mod sanitize;
mod session_runner;

pub use events::{classify, ClassifiedEvent, EventCategory};
pub use malformed::extract_from_malformed_function_call;
pub use render::render_response_text;
pub use sanitize::{sanitize, sanitize_json};
pub use session_runner::{ProcessMessageResult, SessionRunner};

use std::collections::HashMap;
use std::sync::Arc;

use relay_config::Config;
use relay_db::Pool;
use relay_runtime::AgentRunner;
use tokio::sync::Mutex;
use uuid::Uuid;

const APP_NAME: &str = "relay";

/// Owns one [`SessionRunner`] per session id, constructed lazily on first
/// use and kept alive for the life of the process.
pub struct SessionManager {
    pool: Arc<Pool>,
    runtime: Arc<dyn AgentRunner>,
    agent_models: HashMap<String, String>,
    sanitize_max_len: usize,
    default_user_id: String,
    runners: Mutex<HashMap<Uuid, Arc<SessionRunner>>>,
}

impl SessionManager {
    pub fn new(config: &Config, pool: Arc<Pool>, runtime: Arc<dyn AgentRunner>) -> Self {
        let agent_models = HashMap::from([
            ("main".to_string(), config.model.main_model.clone()),
            ("sub".to_string(), config.model.sub_model.clone()),
        ]);
        Self {
            pool,
            runtime,
            agent_models,
            sanitize_max_len: config.sanitize.max_len,
            default_user_id: config.server.default_user_id.clone(),
            runners: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the runner for `session_id`, bootstrapping one if this is the
    /// first time this process has seen it.
    pub async fn get_or_create(
        &self,
        session_id: Uuid,
        user_id: &str,
    ) -> anyhow::Result<Arc<SessionRunner>> {
        let mut runners = self.runners.lock().await;
        if let Some(runner) = runners.get(&session_id) {
            return Ok(runner.clone());
        }

        let runner = SessionRunner::bootstrap(
            self.pool.clone(),
            self.runtime.clone(),
            self.agent_models.clone(),
            self.sanitize_max_len,
            APP_NAME,
            user_id,
            session_id,
        )
        .await?;
        let runner = Arc::new(runner);
        runners.insert(session_id, runner.clone());
        Ok(runner)
    }
}

/// Parses a scheduler-supplied session id into a `Uuid`. Real client
/// sessions are already UUIDs; the scheduler's synthetic offline session
/// (e.g. `"scheduler-offline"`, configured by `SchedulerConfig`) is not, so
/// it is mapped deterministically onto one.
fn resolve_scheduler_session_id(session_id: &str) -> Uuid {
    Uuid::parse_str(session_id)
        .unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, session_id.as_bytes()))
}

#[async_trait::async_trait]
impl relay_scheduler::TaskExecutor for SessionManager {
    async fn run_prompt(&self, session_id: &str, prompt: &str) -> anyhow::Result<String> {
        let session_id = resolve_scheduler_session_id(session_id);
        let runner = self.get_or_create(session_id, &self.default_user_id).await?;
        let result = runner.process_message(prompt).await?;
        Ok(result.response)
    }
}
