// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! HTTP/WebSocket surface: REST routes, the session WebSocket bridge, and
//! the background task that fans scheduler events out to connected clients.
pub mod auth;
pub mod connections;
pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

pub use connections::ConnectionManager;
pub use state::AppState;

use relay_scheduler::SchedulerEvent;

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Builds the full router: REST routes under `/api` and `/health`, plus the
/// per-session WebSocket endpoint at `/ws/:session_id`.
///
/// Every request passes through, in order: a generated request id (so log
/// lines for one request can be correlated), a permissive CORS layer (the
/// API and any browser-based client may live on different origins), a body
/// size cap, and finally the bearer-token check (a no-op when no token is
/// configured).
pub fn build_router(state: AppState) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn_with_state(state.clone(), auth::bearer_auth));

    routes::router()
        .route("/ws/:session_id", get(ws::ws_handler))
        .layer(middleware_stack)
        .with_state(state)
}

/// Subscribes to the scheduler's event channel and fans every fired task or
/// reminder out to its session's connected sockets (or to every session, for
/// events with no session attached). Runs until the scheduler is dropped.
pub fn spawn_scheduler_event_forwarder(
    scheduler: std::sync::Arc<relay_scheduler::Scheduler>,
    connections: std::sync::Arc<ConnectionManager>,
) {
    let mut events = scheduler.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SchedulerEvent::Message { session_id, content }) => {
                    let payload = serde_json::json!({
                        "type": "message",
                        "role": "system",
                        "content": content,
                    });
                    match session_id {
                        Some(session_id) => {
                            connections
                                .broadcast_to_session(session_id, &payload.to_string())
                                .await;
                        }
                        None => {
                            connections.broadcast_to_all_sessions(&payload.to_string()).await;
                        }
                    }
                }
                Ok(SchedulerEvent::Status { session_id, status }) => {
                    let payload = serde_json::json!({
                        "type": "status",
                        "content": status,
                    });
                    connections
                        .broadcast_to_session(session_id, &payload.to_string())
                        .await;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "scheduler event forwarder lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
