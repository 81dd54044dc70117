// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end scenarios spanning persistence, the scheduler, the session
//! runner, and the HTTP surface together rather than one crate at a time.
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use relay_config::Config;
use relay_core::SessionManager;
use relay_db::Pool;
use relay_gateway::{AppState, ConnectionManager};
use relay_runtime::{AgentRunner, FakeRuntime};
use relay_scheduler::Scheduler;
use relay_tools::ToolRegistry;
use sha2::Sha256;
use tower::ServiceExt;
use uuid::Uuid;

fn fake_runtime(reply: &str) -> Arc<dyn AgentRunner> {
    Arc::new(FakeRuntime::always_text(reply))
}

/// A scheduled task that fires while no WS client is connected is queued as
/// a pending result; connecting a client afterwards replays it and marks it
/// delivered.
#[tokio::test]
async fn scheduled_task_fires_offline_then_replays_on_connect() {
    let config = Config::default();
    let pool = Arc::new(Pool::open_in_memory().unwrap());
    let task = {
        let conn = pool.get();
        relay_db::scheduled_tasks::create(&conn, "T1", "* * * * *", "ping", None).unwrap()
    };

    let sessions = Arc::new(SessionManager::new(&config, pool.clone(), fake_runtime("pong")));
    let connections = ConnectionManager::new();
    let scheduler = Scheduler::new(
        pool.clone(),
        config.scheduler.clone(),
        sessions.clone(),
        connections.clone(),
        None,
        config.server.default_user_id.clone(),
        config.sanitize.max_len,
    );
    relay_gateway::spawn_scheduler_event_forwarder(scheduler.clone(), connections.clone());
    connections.set_scheduler(scheduler.clone()).await;

    let result = scheduler.trigger_task_now(task.id).await.unwrap();
    assert_eq!(result, "pong");

    {
        let conn = pool.get();
        let pending = relay_db::pending_results::get_undelivered_results(&conn).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].task_name, "T1");
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    connections.register(Uuid::new_v4(), tx).await;

    let payload = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("forwarded event")
        .expect("channel open");
    assert!(payload.contains("\"type\":\"message\""));
    assert!(payload.contains("\"role\":\"system\""));
    assert!(payload.contains("[Offline Scheduled Task: T1]"));

    let conn = pool.get();
    let pending = relay_db::pending_results::get_undelivered_results(&conn).unwrap();
    assert!(pending.is_empty());
}

/// Fifty consecutive turns keep the in-memory event window capped at 20
/// while every turn is still durably persisted as a user/assistant pair.
#[tokio::test]
async fn fifty_turns_cap_the_event_window_but_persist_every_message() {
    let config = Config::default();
    let pool = Arc::new(Pool::open_in_memory().unwrap());
    let sessions = Arc::new(SessionManager::new(&config, pool.clone(), fake_runtime("ack")));
    let session_id = Uuid::new_v4();
    let runner = sessions.get_or_create(session_id, "web_user").await.unwrap();

    for i in 0..50 {
        runner.process_message(&format!("message {i}")).await.unwrap();
    }

    assert!(runner.events().await.len() <= 20);

    let conn = pool.get();
    let count = relay_db::messages::count_for_session(&conn, session_id).unwrap();
    assert_eq!(count, 100);
}

/// A webhook with a signing secret accepts a correctly-signed request and
/// rejects a mismatched one, never dispatching the agent for the latter.
#[tokio::test]
async fn webhook_rejects_bad_hmac_and_accepts_a_valid_one() {
    let config = Config::default();
    let pool = Arc::new(Pool::open_in_memory().unwrap());
    {
        let conn = pool.get();
        relay_db::webhooks::create(&conn, "gh", "gh", "payload: {{payload.x}}", Some("s3cr3t"))
            .unwrap();
    }

    let sessions = Arc::new(SessionManager::new(&config, pool.clone(), fake_runtime("ok")));
    let connections = ConnectionManager::new();
    let scheduler = Scheduler::new(
        pool.clone(),
        config.scheduler.clone(),
        sessions.clone(),
        connections.clone(),
        None,
        config.server.default_user_id.clone(),
        config.sanitize.max_len,
    );
    let state = AppState {
        config: Arc::new(config),
        pool: pool.clone(),
        sessions,
        scheduler,
        connections,
        tools: Arc::new(ToolRegistry::new()),
    };
    let router = relay_gateway::build_router(state);

    let body = br#"{"x":1}"#;
    let mut mac = Hmac::<Sha256>::new_from_slice(b"s3cr3t").unwrap();
    mac.update(body);
    let signature = hex::encode(mac.finalize().into_bytes());

    let good = Request::builder()
        .method("POST")
        .uri("/api/webhooks/trigger/gh")
        .header("X-Signature-256", format!("sha256={signature}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_vec()))
        .unwrap();
    let response = router.clone().oneshot(good).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let bad = Request::builder()
        .method("POST")
        .uri("/api/webhooks/trigger/gh")
        .header("X-Signature-256", "sha256=0000000000000000000000000000000000000000000000000000000000000000")
        .header("content-type", "application/json")
        .body(Body::from(body.to_vec()))
        .unwrap();
    let response = router.oneshot(bad).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
