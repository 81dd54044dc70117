// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/scheduled-tasks",
            get(list_scheduled_tasks).post(create_scheduled_task),
        )
        .route(
            "/api/scheduled-tasks/:task_id",
            get(get_scheduled_task).delete(delete_scheduled_task),
        )
        .route(
            "/api/scheduled-tasks/:task_id/trigger",
            post(trigger_scheduled_task),
        )
}

#[derive(Deserialize)]
struct CreateScheduledTaskRequest {
    name: String,
    cron_expression: String,
    prompt: String,
    description: Option<String>,
}

async fn create_scheduled_task(
    State(state): State<AppState>,
    Json(req): Json<CreateScheduledTaskRequest>,
) -> Result<Json<relay_db::ScheduledTask>, ApiError> {
    let conn = state.pool.get();
    let task = relay_db::scheduled_tasks::create(
        &conn,
        &req.name,
        &req.cron_expression,
        &req.prompt,
        req.description.as_deref(),
    )?;
    Ok(Json(task))
}

async fn list_scheduled_tasks(
    State(state): State<AppState>,
) -> Result<Json<Vec<relay_db::ScheduledTask>>, ApiError> {
    let conn = state.pool.get();
    Ok(Json(relay_db::scheduled_tasks::list_all(&conn)?))
}

async fn get_scheduled_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<relay_db::ScheduledTask>, ApiError> {
    let conn = state.pool.get();
    let task = relay_db::scheduled_tasks::get(&conn, task_id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(task))
}

async fn delete_scheduled_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let conn = state.pool.get();
    relay_db::scheduled_tasks::delete(&conn, task_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn trigger_scheduled_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = state
        .scheduler
        .trigger_task_now(task_id)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(serde_json::json!({ "result": result })))
}
