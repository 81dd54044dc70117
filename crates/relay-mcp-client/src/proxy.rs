// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;
use relay_tools::{Tool, ToolCall, ToolOutput};
use serde_json::Value;

use crate::client::McpClient;
use crate::protocol::McpToolDescriptor;

/// Adapts a single tool advertised by a remote MCP server into the local
/// tool registry's `Tool` trait.
pub struct McpToolProxy {
    client: Arc<McpClient>,
    descriptor: McpToolDescriptor,
}

impl McpToolProxy {
    pub fn new(client: Arc<McpClient>, descriptor: McpToolDescriptor) -> Self {
        Self { client, descriptor }
    }
}

#[async_trait]
impl Tool for McpToolProxy {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn parameters_schema(&self) -> Value {
        self.descriptor.input_schema.clone()
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.client.call_tool(&self.descriptor.name, call.args.clone()).await {
            Ok(text) => ToolOutput::ok(&call.id, text),
            Err(e) => ToolOutput::err(&call.id, format!("mcp call failed: {e}")),
        }
    }
}
