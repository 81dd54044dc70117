// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Liveness/readiness probes. `/health/ready` and `/health/detailed` share
//! the same deep check: database connectivity and tool registry
//! initialization are critical, memory availability is critical too since
//! an agent without recall degrades in ways operators want paged on.
use axum::{http::StatusCode, extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health/ready", get(check))
        .route("/health/detailed", get(check))
}

#[derive(Serialize)]
struct ComponentStatus {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl ComponentStatus {
    fn ok() -> Self {
        Self {
            status: "ok",
            message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: Some(message.into()),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    components: BTreeMap<String, ComponentStatus>,
    version: &'static str,
}

async fn check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut components = BTreeMap::new();
    let mut overall_ok = true;

    match state.pool.get().execute_batch("SELECT 1") {
        Ok(()) => {
            components.insert("database".to_string(), ComponentStatus::ok());
        }
        Err(e) => {
            overall_ok = false;
            components.insert("database".to_string(), ComponentStatus::error(e.to_string()));
        }
    }

    if state.tools.is_empty() {
        overall_ok = false;
        components.insert(
            "agent".to_string(),
            ComponentStatus::error("tool registry is empty"),
        );
    } else {
        components.insert("agent".to_string(), ComponentStatus::ok());
    }

    if state.tools.get("memory_search").is_some() && state.tools.get("memory_store").is_some() {
        components.insert("memory".to_string(), ComponentStatus::ok());
    } else {
        overall_ok = false;
        components.insert(
            "memory".to_string(),
            ComponentStatus::error("memory tools not registered"),
        );
    }

    let status_code = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let response = HealthResponse {
        status: if overall_ok { "ok" } else { "error" },
        components,
        version: env!("CARGO_PKG_VERSION"),
    };
    (status_code, Json(response))
}
