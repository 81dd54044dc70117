// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Session, message, and event REST routes.
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route(
            "/api/sessions/:session_id",
            get(get_session)
                .patch(rename_session)
                .delete(delete_session),
        )
        .route(
            "/api/sessions/:session_id/messages",
            get(list_messages).post(send_message),
        )
        .route(
            "/api/sessions/:session_id/messages/batch",
            post(send_messages_batch),
        )
        .route("/api/sessions/:session_id/events", get(list_events))
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    user_id: Option<String>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<relay_db::ChatSession>, ApiError> {
    let user_id = req.user_id.unwrap_or_else(|| state.config.server.default_user_id.clone());
    let session_id = Uuid::new_v4();
    state.sessions.get_or_create(session_id, &user_id).await?;
    let conn = state.pool.get();
    let session = relay_db::sessions::get(&conn, session_id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(session))
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> Result<Json<Vec<relay_db::ChatSession>>, ApiError> {
    let user_id = params
        .get("user_id")
        .cloned()
        .unwrap_or_else(|| state.config.server.default_user_id.clone());
    let conn = state.pool.get();
    Ok(Json(relay_db::sessions::list(&conn, &user_id)?))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<relay_db::ChatSession>, ApiError> {
    let conn = state.pool.get();
    let session = relay_db::sessions::get(&conn, session_id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(session))
}

#[derive(Deserialize)]
struct RenameSessionRequest {
    name: String,
}

async fn rename_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<RenameSessionRequest>,
) -> Result<StatusCode, ApiError> {
    let conn = state.pool.get();
    relay_db::sessions::rename(&conn, session_id, &req.name)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let conn = state.pool.get();
    relay_db::sessions::soft_delete(&conn, session_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ListMessagesQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    200
}

#[derive(Serialize)]
struct MessagesPage {
    messages: Vec<relay_db::ChatMessage>,
    total: i64,
}

async fn list_messages(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<MessagesPage>, ApiError> {
    let conn = state.pool.get();
    let (messages, total) =
        relay_db::messages::list(&conn, session_id, query.limit, query.offset)?;
    Ok(Json(MessagesPage { messages, total }))
}

#[derive(Deserialize)]
struct SendMessageRequest {
    text: String,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Serialize)]
struct SendMessageResponse {
    response: String,
    events: Vec<relay_core::ClassifiedEvent>,
}

async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let user_id = req
        .user_id
        .unwrap_or_else(|| state.config.server.default_user_id.clone());
    let runner = state.sessions.get_or_create(session_id, &user_id).await?;
    let result = runner.process_message(&req.text).await?;
    let payload = serde_json::json!({
        "type": "message",
        "response": result.response,
        "events": result.events,
    });
    state
        .connections
        .broadcast_to_session(session_id, &payload.to_string())
        .await;
    Ok(Json(SendMessageResponse {
        response: result.response,
        events: result.events,
    }))
}

#[derive(Deserialize)]
struct SendMessagesBatchRequest {
    texts: Vec<String>,
    #[serde(default)]
    user_id: Option<String>,
}

async fn send_messages_batch(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SendMessagesBatchRequest>,
) -> Result<Json<Vec<SendMessageResponse>>, ApiError> {
    let user_id = req
        .user_id
        .unwrap_or_else(|| state.config.server.default_user_id.clone());
    let runner = state.sessions.get_or_create(session_id, &user_id).await?;
    let mut out = Vec::with_capacity(req.texts.len());
    for text in &req.texts {
        let result = runner.process_message(text).await?;
        out.push(SendMessageResponse {
            response: result.response,
            events: result.events,
        });
    }
    Ok(Json(out))
}

async fn list_events(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Vec<relay_core::ClassifiedEvent>>, ApiError> {
    let user_id = state.config.server.default_user_id.clone();
    let runner = state.sessions.get_or_create(session_id, &user_id).await?;
    Ok(Json(runner.events().await))
}
