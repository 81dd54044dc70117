// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod dao;
mod error;
mod models;
mod pool;
mod schema;

pub use dao::{messages, pending_results, reminders, scheduled_tasks, sessions, tasks, webhooks};
pub use error::{DbError, Result};
pub use models::*;
pub use pool::Pool;
pub use schema::run_migrations;
