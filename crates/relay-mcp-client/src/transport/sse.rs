// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! SSE transport: a long-lived GET establishes the event stream and yields
//! the POST endpoint to send requests to; responses arrive as further SSE
//! `message` events, matched back to the waiting caller by JSON-RPC `id`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use relay_config::McpAuthConfig;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};

use crate::error::{McpError, Result};
use crate::protocol::DEFAULT_REQUEST_TIMEOUT_SECS;

use super::Transport;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

pub struct SseTransport {
    client: reqwest::Client,
    post_url: Arc<Mutex<Option<String>>>,
    pending: Pending,
}

impl SseTransport {
    /// Connects to `sse_url`, applying the configured auth, waits for the
    /// server's `endpoint` event, then sleeps `post_init_delay_ms` (some
    /// servers need a grace period between handshake and first request).
    pub async fn connect(
        sse_url: &str,
        auth: &McpAuthConfig,
        post_init_delay_ms: Option<u64>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let (Some(user), Some(pass)) = (&auth.basic_user, &auth.basic_password) {
            let _ = (user, pass); // basic auth is applied per-request below
        }
        let client = builder.build()?;

        let mut req = client.get(sse_url).header("Accept", "text/event-stream");
        req = apply_auth(req, auth);

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(McpError::Handshake(format!(
                "sse connect returned {}",
                resp.status()
            )));
        }

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (endpoint_tx, endpoint_rx) = oneshot::channel::<String>();
        let base = sse_url.to_string();

        let pending_clone = pending.clone();
        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut buf = String::new();
            let mut endpoint_tx = Some(endpoint_tx);
            while let Some(chunk) = stream.next().await {
                let Ok(bytes) = chunk else { break };
                buf.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(idx) = buf.find("\n\n") {
                    let block: String = buf.drain(..idx + 2).collect();
                    handle_sse_block(&block, &base, &pending_clone, &mut endpoint_tx);
                }
            }
        });

        let post_url = tokio::time::timeout(Duration::from_secs(10), endpoint_rx)
            .await
            .map_err(|_| McpError::Handshake("timed out waiting for endpoint event".into()))?
            .map_err(|_| McpError::Handshake("sse stream closed before endpoint event".into()))?;

        if let Some(delay) = post_init_delay_ms {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        Ok(Self {
            client,
            post_url: Arc::new(Mutex::new(Some(post_url))),
            pending,
        })
    }
}

fn handle_sse_block(
    block: &str,
    base_url: &str,
    pending: &Pending,
    endpoint_tx: &mut Option<oneshot::Sender<String>>,
) {
    let mut event = "message";
    let mut data = String::new();
    for line in block.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = rest.trim();
        } else if let Some(rest) = line.strip_prefix("data:") {
            data.push_str(rest.trim());
        }
    }
    if data.is_empty() {
        return;
    }

    if event == "endpoint" {
        if let Some(tx) = endpoint_tx.take() {
            let resolved = resolve_endpoint(base_url, &data);
            let _ = tx.send(resolved);
        }
        return;
    }

    if let Ok(value) = serde_json::from_str::<Value>(&data) {
        if let Some(id) = value.get("id").and_then(|v| v.as_u64()) {
            let pending = pending.clone();
            tokio::spawn(async move {
                if let Some(tx) = pending.lock().await.remove(&id) {
                    let _ = tx.send(value);
                }
            });
        }
    }
}

fn resolve_endpoint(base_url: &str, path_or_url: &str) -> String {
    if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
        return path_or_url.to_string();
    }
    match url::Url::parse(base_url).and_then(|b| b.join(path_or_url)) {
        Ok(joined) => joined.to_string(),
        Err(_) => path_or_url.to_string(),
    }
}

fn apply_auth(mut req: reqwest::RequestBuilder, auth: &McpAuthConfig) -> reqwest::RequestBuilder {
    if let Some(token) = &auth.bearer_token {
        req = req.bearer_auth(token);
    }
    if let (Some(user), Some(pass)) = (&auth.basic_user, &auth.basic_password) {
        req = req.basic_auth(user, Some(pass));
    }
    for (k, v) in &auth.headers {
        req = req.header(k, v);
    }
    req
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&self, request: Value) -> Result<Value> {
        let id = request
            .get("id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| McpError::Protocol("request missing numeric id".into()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let post_url = self
            .post_url
            .lock()
            .await
            .clone()
            .ok_or_else(|| McpError::Transport("no post endpoint established".into()))?;

        let resp = self.client.post(&post_url).json(&request).send().await?;
        if !resp.status().is_success() {
            self.pending.lock().await.remove(&id);
            return Err(McpError::Transport(format!(
                "post to {post_url} returned {}",
                resp.status()
            )));
        }

        match tokio::time::timeout(
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            rx,
        )
        .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(McpError::Transport("response channel closed".into())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout)
            }
        }
    }

    async fn close(&self) {
        self.pending.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_endpoint_joins_relative_path() {
        let resolved = resolve_endpoint("http://localhost:9000/sse", "/messages?id=1");
        assert_eq!(resolved, "http://localhost:9000/messages?id=1");
    }

    #[test]
    fn resolve_endpoint_passes_through_absolute_url() {
        let resolved = resolve_endpoint("http://localhost:9000/sse", "https://other/host");
        assert_eq!(resolved, "https://other/host");
    }
}
