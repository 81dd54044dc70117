// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod health;
pub mod memory;
pub mod reminders;
pub mod scheduled_tasks;
pub mod sessions;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(sessions::router())
        .merge(scheduled_tasks::router())
        .merge(reminders::router())
        .merge(webhooks::router())
        .merge(memory::router())
        .merge(health::router())
}
