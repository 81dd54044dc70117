// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use relay_config::McpServerConfig;
use serde_json::{json, Value};

use crate::error::{McpError, Result};
use crate::protocol::{
    extract_tool_result, JsonRpcRequest, McpToolDescriptor, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::transport::{SseTransport, StdioTransport, Transport};

/// A connected MCP server, after a completed `initialize` handshake.
pub struct McpClient {
    name: String,
    transport: Arc<dyn Transport>,
    next_id: AtomicU64,
    negotiated_version: String,
}

impl McpClient {
    pub async fn connect(name: &str, config: &McpServerConfig) -> Result<Self> {
        let transport: Arc<dyn Transport> = match config {
            McpServerConfig::Sse {
                url,
                auth,
                post_init_delay_ms,
            } => Arc::new(SseTransport::connect(url, auth, *post_init_delay_ms).await?),
            McpServerConfig::Stdio { command, args, env } => {
                Arc::new(StdioTransport::spawn(command, args, env).await?)
            }
        };

        let mut client = Self {
            name: name.to_string(),
            transport,
            next_id: AtomicU64::new(1),
            negotiated_version: String::new(),
        };
        client.handshake().await?;
        Ok(client)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id();
        let request = JsonRpcRequest::new(id, method, params);
        let raw = serde_json::to_value(&request)?;
        let response = self.transport.send(raw).await?;

        if let Some(error) = response.get("error") {
            return Err(McpError::Protocol(error.to_string()));
        }
        Ok(response)
    }

    /// Negotiates a protocol version the server understands and declares our
    /// (minimal) capabilities.
    async fn handshake(&mut self) -> Result<()> {
        for version in SUPPORTED_PROTOCOL_VERSIONS {
            let params = json!({
                "protocolVersion": version,
                "capabilities": {
                    "completions": false,
                    "prompts": false,
                    "resources": false,
                    "tools": true,
                },
                "clientInfo": { "name": "relay", "version": env!("CARGO_PKG_VERSION") },
            });
            match self.call("initialize", Some(params)).await {
                Ok(response) => {
                    let agreed = response
                        .get("result")
                        .and_then(|r| r.get("protocolVersion"))
                        .and_then(|v| v.as_str())
                        .unwrap_or(version);
                    self.negotiated_version = agreed.to_string();
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(server = %self.name, version, error = %e, "initialize attempt failed");
                    continue;
                }
            }
        }
        Err(McpError::Handshake(format!(
            "server {} rejected every supported protocol version",
            self.name
        )))
    }

    pub fn negotiated_version(&self) -> &str {
        &self.negotiated_version
    }

    pub async fn list_tools(&self) -> Result<Vec<McpToolDescriptor>> {
        let response = self.call("tools/list", None).await?;
        let tools = response
            .get("result")
            .and_then(|r| r.get("tools"))
            .cloned()
            .unwrap_or(Value::Array(vec![]));
        Ok(serde_json::from_value(tools)?)
    }

    /// Invokes a remote tool and extracts its result using the
    /// `result` → `output` → whole-body priority order.
    pub async fn call_tool(&self, tool_name: &str, args: Value) -> Result<String> {
        let params = json!({ "name": tool_name, "arguments": args });
        let response = self.call("tools/call", Some(params)).await?;
        Ok(extract_tool_result(&response))
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
