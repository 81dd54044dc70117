// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/reminders", get(list_reminders).post(create_reminder))
        .route(
            "/api/reminders/:reminder_id",
            get(get_reminder).delete(delete_reminder),
        )
        .route("/api/reminders/:reminder_id/cancel", post(cancel_reminder))
}

#[derive(Deserialize)]
struct CreateReminderRequest {
    message: String,
    remind_at: DateTime<Utc>,
    #[serde(default)]
    session_id: Option<Uuid>,
}

async fn create_reminder(
    State(state): State<AppState>,
    Json(req): Json<CreateReminderRequest>,
) -> Result<Json<relay_db::Reminder>, ApiError> {
    let conn = state.pool.get();
    let reminder = relay_db::reminders::create(&conn, &req.message, req.remind_at, req.session_id)?;
    Ok(Json(reminder))
}

async fn list_reminders(
    State(state): State<AppState>,
) -> Result<Json<Vec<relay_db::Reminder>>, ApiError> {
    let conn = state.pool.get();
    Ok(Json(relay_db::reminders::list_all(&conn)?))
}

async fn get_reminder(
    State(state): State<AppState>,
    Path(reminder_id): Path<Uuid>,
) -> Result<Json<relay_db::Reminder>, ApiError> {
    let conn = state.pool.get();
    let reminder = relay_db::reminders::get(&conn, reminder_id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(reminder))
}

async fn delete_reminder(
    State(state): State<AppState>,
    Path(reminder_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let conn = state.pool.get();
    relay_db::reminders::delete(&conn, reminder_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cancel_reminder(
    State(state): State<AppState>,
    Path(reminder_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let conn = state.pool.get();
    relay_db::reminders::cancel(&conn, reminder_id)?;
    Ok(StatusCode::NO_CONTENT)
}
