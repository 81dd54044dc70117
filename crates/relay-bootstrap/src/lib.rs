// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Process bootstrap: wires config, persistence, memory, the tool
//! registry, the agent runtime, and the scheduler into one running
//! process, then serves HTTP/WS until told to stop.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use relay_config::Config;
use relay_core::SessionManager;
use relay_db::Pool;
use relay_gateway::{AppState, ConnectionManager};
use relay_mcp_client::McpClient;
use relay_memory::MemoryService;
use relay_runtime::{AgentRunner, FakeRuntime};
use relay_scheduler::Scheduler;
use relay_tools::{MemorySearchTool, MemoryStoreTool, ToolRegistry};

/// Everything the running process needs, plus the handles required to shut
/// it down cleanly.
pub struct App {
    pub config: Arc<Config>,
    pub pool: Arc<Pool>,
    pub state: AppState,
    mcp_clients: Vec<(String, Arc<McpClient>, usize)>,
}

impl App {
    /// Runs the full startup sequence (spec §4.12, steps 1-6). Step 7
    /// (serve HTTP/WS) is left to the caller, which owns the listener and
    /// the shutdown signal.
    pub async fn bootstrap(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        // (1) Credential store: the concrete secret backend is an external
        // collaborator (out of scope); this is the seam where it would be
        // initialised before any component that needs a secret is built.
        tracing::debug!("credential store: no-op, no secret-bearing component configured");

        let pool = Arc::new(open_pool(&config.database)?);

        // (2) DB-stored config overrides: no override table is part of the
        // persistence schema yet, so this is a no-op seam rather than a
        // real merge step.
        apply_db_config_overrides(&pool, &config);

        // (3) Schemas are created by `Pool::open`/`Pool::open_in_memory`
        // themselves (`relay_db::run_migrations`, idempotent).

        // (4) Memory.
        let memory = Arc::new(MemoryService::new(&config.memory));
        if let Err(e) = memory.ensure_collection().await {
            tracing::warn!(error = %e, "failed to ensure memory collection exists at startup");
        }

        // Tool registry: built-in memory tools first, then whatever MCP
        // servers are configured, filtered through the blocklist.
        let mut tools = ToolRegistry::new();
        tools.register(MemorySearchTool::new(memory.clone(), config.memory.vector_dim));
        tools.register(MemoryStoreTool::new(memory.clone(), config.memory.vector_dim));
        let mcp_clients = relay_mcp_client::connect_and_register(
            &config.mcp_servers,
            &config.tool_blocklist,
            &mut tools,
        )
        .await;
        let tools = Arc::new(tools);

        // (5) Agent runtime: the concrete LLM-backed adapter is an external
        // collaborator (spec's "concrete LLM API" non-goal); `FakeRuntime`
        // is wired here so the process is runnable end-to-end against the
        // rest of the stack. Model selection from `config.model` is applied
        // by `SessionManager` regardless of which runtime is plugged in.
        let runtime: Arc<dyn AgentRunner> = Arc::new(FakeRuntime::always_text(
            "No agent runtime configured for this deployment.",
        ));
        let sessions = Arc::new(SessionManager::new(&config, pool.clone(), runtime));

        let connections = ConnectionManager::new();

        // (6) Scheduler singleton.
        let scheduler = Scheduler::new(
            pool.clone(),
            config.scheduler.clone(),
            sessions.clone(),
            connections.clone(),
            config.notifications.ntfy_url.clone(),
            config.server.default_user_id.clone(),
            config.sanitize.max_len,
        );
        connections.set_scheduler(scheduler.clone()).await;
        scheduler.start().await;
        relay_gateway::spawn_scheduler_event_forwarder(scheduler.clone(), connections.clone());

        let state = AppState {
            config: config.clone(),
            pool: pool.clone(),
            sessions,
            scheduler,
            connections,
            tools,
        };

        Ok(Self {
            config,
            pool,
            state,
            mcp_clients,
        })
    }

    /// Stops the scheduler's tick loop and closes every MCP connection.
    /// Database connections are released by `Drop` on `Pool`'s guards;
    /// nothing here needs to close the pool explicitly.
    pub async fn shutdown(&self) {
        self.state.scheduler.shutdown().await;
        relay_mcp_client::disconnect_all(&self.mcp_clients).await;
    }
}

fn open_pool(db: &relay_config::DatabaseConfig) -> anyhow::Result<Pool> {
    match sqlite_path_from_dsn(&db.url) {
        Some(path) => Pool::open(&path, db.pool_min as usize, db.pool_max as usize)
            .map_err(|e| anyhow::anyhow!("opening database at {}: {e}", path.display())),
        None => Pool::open_in_memory()
            .map_err(|e| anyhow::anyhow!("opening in-memory database: {e}")),
    }
}

/// `DatabaseConfig::url` carries the external deployment contract's
/// Postgres DSN shape; the persistence layer here is `rusqlite`-backed (see
/// `relay_db::Pool`'s own doc comment), so a `sqlite://` URL is honoured
/// directly and anything else resolves to a local `relay.db` file.
fn sqlite_path_from_dsn(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        return Some(PathBuf::from(path));
    }
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        return Some(Path::new("relay.db").to_path_buf());
    }
    Some(PathBuf::from(url))
}

fn apply_db_config_overrides(_pool: &Pool, _config: &Config) {
    // No override table exists in the persistence schema yet; this is the
    // seam a future `config_overrides` DAO would plug into.
}
