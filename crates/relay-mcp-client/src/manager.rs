// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use relay_config::McpServerConfig;
use relay_tools::{filter_blocked, ToolRegistry};

use crate::client::McpClient;
use crate::proxy::McpToolProxy;

/// Connects to every configured MCP server and merges its advertised tools
/// into the local registry, dropping any name that appears on the
/// blocklist. Returns the list of connected clients (kept alive so their
/// transports stay open) and the count of tools filtered per server.
pub async fn connect_and_register(
    servers: &HashMap<String, McpServerConfig>,
    blocklist: &[String],
    registry: &mut ToolRegistry,
) -> Vec<(String, Arc<McpClient>, usize)> {
    let mut connected = Vec::new();

    for (name, config) in servers {
        let client = match McpClient::connect(name, config).await {
            Ok(c) => Arc::new(c),
            Err(e) => {
                tracing::warn!(server = %name, error = %e, "failed to connect to MCP server");
                continue;
            }
        };

        let tools = match client.list_tools().await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(server = %name, error = %e, "failed to list tools");
                continue;
            }
        };

        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        let survivors = filter_blocked(names, blocklist);
        let filtered_count = tools.len() - survivors.len();
        if filtered_count > 0 {
            tracing::warn!(server = %name, filtered_count, "blocklist filtered tools from MCP server");
        }

        for descriptor in tools {
            if !survivors.contains(&descriptor.name.as_str()) {
                continue;
            }
            registry.register(McpToolProxy::new(client.clone(), descriptor));
        }

        connected.push((name.clone(), client, filtered_count));
    }

    connected
}

pub async fn disconnect_all(clients: &[(String, Arc<McpClient>, usize)]) {
    for (_, client, _) in clients {
        client.close().await;
    }
}
