// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Webhook definition management and the external trigger endpoint.
//!
//! Rendering and signature verification follow the same shape as the
//! session runner's own recovery path: best-effort, never panicking on
//! malformed external input.
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/webhooks", get(list_webhooks).post(create_webhook))
        .route("/api/webhooks/:webhook_id", axum::routing::delete(delete_webhook))
        .route("/api/webhooks/trigger/:path_suffix", post(trigger_webhook))
}

#[derive(Deserialize)]
struct CreateWebhookRequest {
    name: String,
    path_suffix: String,
    prompt_template: String,
    #[serde(default)]
    secret: Option<String>,
}

async fn create_webhook(
    State(state): State<AppState>,
    Json(req): Json<CreateWebhookRequest>,
) -> Result<Json<relay_db::Webhook>, ApiError> {
    let conn = state.pool.get();
    let webhook = relay_db::webhooks::create(
        &conn,
        &req.name,
        &req.path_suffix,
        &req.prompt_template,
        req.secret.as_deref(),
    )?;
    Ok(Json(webhook))
}

async fn list_webhooks(
    State(state): State<AppState>,
) -> Result<Json<Vec<relay_db::Webhook>>, ApiError> {
    let conn = state.pool.get();
    let mut webhooks = relay_db::webhooks::list_all(&conn)?;
    for webhook in &mut webhooks {
        if webhook.secret.is_some() {
            webhook.secret = Some("***".to_string());
        }
    }
    Ok(Json(webhooks))
}

async fn delete_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let conn = state.pool.get();
    relay_db::webhooks::delete(&conn, webhook_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn trigger_webhook(
    State(state): State<AppState>,
    Path(path_suffix): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let conn = state.pool.get();
    let webhook = relay_db::webhooks::find_by_path_enabled(&conn, &path_suffix)?
        .ok_or(ApiError::NotFound)?;
    drop(conn);

    if let Some(secret) = &webhook.secret {
        let header_sig = headers
            .get("X-Signature-256")
            .or_else(|| headers.get("X-Hub-Signature-256"))
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let sig = header_sig.strip_prefix("sha256=").unwrap_or(header_sig);
        if sig.is_empty() || !verify_hmac(secret, &body, sig) {
            return Err(ApiError::Unauthorized("invalid webhook signature".into()));
        }
    }

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::Validation("invalid JSON payload".into()))?;
    let rendered_prompt = render_template(&webhook.prompt_template, &payload);

    let conn = state.pool.get();
    if let Err(e) = relay_db::webhooks::record_trigger(&conn, webhook.id) {
        tracing::warn!(webhook = %webhook.name, error = %e, "failed to record webhook trigger");
    }
    drop(conn);

    let session_id = webhook_session_id(webhook.id);
    let webhook_id = webhook.id;
    let webhook_name = webhook.name.clone();
    let sessions = state.sessions.clone();
    let connections = state.connections.clone();
    let default_user_id = state.config.server.default_user_id.clone();

    tokio::spawn(async move {
        let response = match sessions.get_or_create(session_id, &default_user_id).await {
            Ok(runner) => match runner.process_message(&rendered_prompt).await {
                Ok(result) => result.response,
                Err(e) => format!("Error processing webhook: {e}"),
            },
            Err(e) => format!("Error processing webhook: {e}"),
        };
        tracing::info!(
            webhook = %webhook_name,
            response_len = response.len(),
            "webhook processed"
        );
        let payload = serde_json::json!({
            "type": "webhook_result",
            "webhook_id": webhook_id,
            "webhook_name": webhook_name,
            "prompt": rendered_prompt,
            "response": response,
        });
        connections.broadcast_to_all_sessions(&payload.to_string()).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted", "webhook_id": webhook.id })),
    ))
}

/// Derives a stable session id for a webhook's synthetic conversation so
/// repeated triggers of the same webhook accumulate history.
fn webhook_session_id(webhook_id: Uuid) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("webhook_{webhook_id}").as_bytes())
}

fn verify_hmac(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = mac.finalize().into_bytes();
    computed.ct_eq(&expected[..]).into()
}

/// Replaces `{{path.to.field}}` placeholders with values resolved from
/// `payload` by walking a dot-separated path. Both `{{payload.x}}` and bare
/// `{{x}}` are supported; unresolvable paths render as an empty string.
fn render_template(template: &str, payload: &serde_json::Value) -> String {
    let pattern = placeholder_re();
    pattern
        .replace_all(template, |caps: &regex::Captures| {
            let path = caps[1].trim();
            resolve_path(payload, path).unwrap_or_default()
        })
        .into_owned()
}

fn resolve_path(payload: &serde_json::Value, path: &str) -> Option<String> {
    let stripped = path.strip_prefix("payload.").unwrap_or(path);
    let mut current = payload;
    for part in stripped.split('.') {
        current = match current {
            serde_json::Value::Object(map) => map.get(part)?,
            serde_json::Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(match current {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn placeholder_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\{\{(.*?)\}\}").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_template_resolves_dotted_payload_paths() {
        let payload = serde_json::json!({"repo": {"name": "relay"}});
        let out = render_template("Repo {{payload.repo.name}} pushed", &payload);
        assert_eq!(out, "Repo relay pushed");
    }

    #[test]
    fn render_template_resolves_bare_keys_too() {
        let payload = serde_json::json!({"repo": {"name": "relay"}});
        let out = render_template("Repo {{repo.name}} pushed", &payload);
        assert_eq!(out, "Repo relay pushed");
    }

    #[test]
    fn render_template_leaves_unresolvable_paths_empty() {
        let payload = serde_json::json!({"repo": {"name": "relay"}});
        let out = render_template("{{payload.missing.field}}!", &payload);
        assert_eq!(out, "!");
    }

    #[test]
    fn hmac_verification_accepts_matching_signature() {
        let mut mac = Hmac::<Sha256>::new_from_slice(b"s3cr3t").unwrap();
        mac.update(b"hello");
        let sig = hex::encode(mac.finalize().into_bytes());
        assert!(verify_hmac("s3cr3t", b"hello", &sig));
    }

    #[test]
    fn hmac_verification_rejects_wrong_secret() {
        let mut mac = Hmac::<Sha256>::new_from_slice(b"s3cr3t").unwrap();
        mac.update(b"hello");
        let sig = hex::encode(mac.finalize().into_bytes());
        assert!(!verify_hmac("wrong", b"hello", &sig));
    }

    #[test]
    fn webhook_session_id_is_stable_for_same_webhook() {
        let id = Uuid::new_v4();
        assert_eq!(webhook_session_id(id), webhook_session_id(id));
    }
}
