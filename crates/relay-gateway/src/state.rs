// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use relay_config::Config;
use relay_core::SessionManager;
use relay_db::Pool;
use relay_scheduler::Scheduler;
use relay_tools::ToolRegistry;

use crate::connections::ConnectionManager;

/// Shared application state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: Arc<Pool>,
    pub sessions: Arc<SessionManager>,
    pub scheduler: Arc<Scheduler>,
    pub connections: Arc<ConnectionManager>,
    pub tools: Arc<ToolRegistry>,
}
