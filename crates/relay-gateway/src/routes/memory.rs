// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Memory store/search REST routes, dispatched through the same
//! `memory_search`/`memory_store` tool the agent itself calls, so the REST
//! surface and the model share one code path into the memory service.
use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use relay_tools::ToolCall;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/memory/search", post(search_memory))
        .route("/api/memory/store", post(store_memory))
}

#[derive(Deserialize)]
struct SearchMemoryRequest {
    user_id: String,
    query: String,
    #[serde(default)]
    limit: Option<u64>,
    #[serde(default)]
    memory_type: Option<String>,
}

async fn search_memory(
    State(state): State<AppState>,
    Json(req): Json<SearchMemoryRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut args = serde_json::json!({
        "user_id": req.user_id,
        "query": req.query,
    });
    if let Some(limit) = req.limit {
        args["limit"] = serde_json::json!(limit);
    }
    if let Some(memory_type) = req.memory_type {
        args["memory_type"] = serde_json::json!(memory_type);
    }
    let call = ToolCall {
        id: Uuid::new_v4().to_string(),
        name: "memory_search".to_string(),
        args,
    };
    dispatch(&state, call).await
}

#[derive(Deserialize)]
struct StoreMemoryRequest {
    user_id: String,
    text: String,
    #[serde(default)]
    memory_type: Option<String>,
}

async fn store_memory(
    State(state): State<AppState>,
    Json(req): Json<StoreMemoryRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut args = serde_json::json!({
        "user_id": req.user_id,
        "text": req.text,
    });
    if let Some(memory_type) = req.memory_type {
        args["memory_type"] = serde_json::json!(memory_type);
    }
    let call = ToolCall {
        id: Uuid::new_v4().to_string(),
        name: "memory_store".to_string(),
        args,
    };
    dispatch(&state, call).await
}

async fn dispatch(state: &AppState, call: ToolCall) -> Result<Json<serde_json::Value>, ApiError> {
    let output = state.tools.execute(&call).await;
    if output.is_error {
        return Err(ApiError::Validation(output.content));
    }
    let value = serde_json::from_str(&output.content)
        .unwrap_or_else(|_| serde_json::json!({ "result": output.content }));
    Ok(Json(value))
}
