// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! JSON-RPC 2.0 envelope types for the MCP wire protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol versions offered during the initialize handshake, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-03-26", "2024-04-18", "2024-02-15"];

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Result of invoking a tool on a remote server. MCP responses carry either
/// a `result` field, an `output` field, or (rarely) nothing but the bare
/// body — callers should try each in that priority order.
pub fn extract_tool_result(body: &Value) -> String {
    if let Some(result) = body.get("result") {
        if let Some(content) = result.get("content") {
            return content.to_string();
        }
        return result.to_string();
    }
    if let Some(output) = body.get("output") {
        return output.to_string();
    }
    body.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_prefers_result_content_over_whole_body() {
        let body = json!({ "result": { "content": [{"type": "text", "text": "hi"}] } });
        assert!(extract_tool_result(&body).contains("hi"));
    }

    #[test]
    fn extract_falls_back_to_output_field() {
        let body = json!({ "output": "fallback" });
        assert_eq!(extract_tool_result(&body), "\"fallback\"");
    }

    #[test]
    fn extract_falls_back_to_whole_body() {
        let body = json!({ "anything": 1 });
        assert_eq!(extract_tool_result(&body), body.to_string());
    }
}
