// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use relay_memory::{MemoryPoint, MemoryService, SearchFilter};
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Deterministic bag-of-hashed-tokens embedding used when no learned
/// embedding model is wired in. It keeps vector search mechanically
/// functional (same text always maps to the same vector, related tokens
/// collide into the same buckets) without depending on a model-serving
/// crate that has no counterpart anywhere in this workspace's dependency
/// stack.
fn hash_embed(text: &str, dim: usize) -> Vec<f32> {
    let mut v = vec![0f32; dim];
    for token in text.split_whitespace() {
        let mut hash: u64 = 1469598103934665603;
        for b in token.as_bytes() {
            hash ^= *b as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
        v[(hash as usize) % dim] += 1.0;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

pub struct MemorySearchTool {
    memory: Arc<MemoryService>,
    vector_dim: usize,
}

impl MemorySearchTool {
    pub fn new(memory: Arc<MemoryService>, vector_dim: usize) -> Self {
        Self { memory, vector_dim }
    }
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search previously stored memories for this user. Returns the most relevant matches."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": { "type": "string" },
                "query": { "type": "string" },
                "limit": { "type": "integer", "default": 5 },
                "memory_type": { "type": "string" }
            },
            "required": ["user_id", "query"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let user_id = match call.args.get("user_id").and_then(|v| v.as_str()) {
            Some(u) => u,
            None => return ToolOutput::err(&call.id, "missing 'user_id'"),
        };
        let query = match call.args.get("query").and_then(|v| v.as_str()) {
            Some(q) => q,
            None => return ToolOutput::err(&call.id, "missing 'query'"),
        };
        let limit = call
            .args
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(5) as usize;
        let filter = SearchFilter {
            memory_type: call
                .args
                .get("memory_type")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            ..Default::default()
        };

        let vector = hash_embed(query, self.vector_dim);
        let hits = self.memory.search(vector, user_id, limit, &filter).await;
        match serde_json::to_string(&hits) {
            Ok(json) => ToolOutput::ok(&call.id, json),
            Err(e) => ToolOutput::err(&call.id, format!("failed to serialize results: {e}")),
        }
    }
}

pub struct MemoryStoreTool {
    memory: Arc<MemoryService>,
    vector_dim: usize,
}

impl MemoryStoreTool {
    pub fn new(memory: Arc<MemoryService>, vector_dim: usize) -> Self {
        Self { memory, vector_dim }
    }
}

#[async_trait]
impl Tool for MemoryStoreTool {
    fn name(&self) -> &str {
        "memory_store"
    }

    fn description(&self) -> &str {
        "Store a piece of text in long-term memory for this user."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": { "type": "string" },
                "text": { "type": "string" },
                "memory_type": { "type": "string", "default": "general" }
            },
            "required": ["user_id", "text"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let user_id = match call.args.get("user_id").and_then(|v| v.as_str()) {
            Some(u) => u,
            None => return ToolOutput::err(&call.id, "missing 'user_id'"),
        };
        let text = match call.args.get("text").and_then(|v| v.as_str()) {
            Some(t) => t,
            None => return ToolOutput::err(&call.id, "missing 'text'"),
        };
        let memory_type = call
            .args
            .get("memory_type")
            .and_then(|v| v.as_str())
            .unwrap_or("general");

        let point = MemoryPoint {
            user_id: user_id.to_string(),
            text: text.to_string(),
            vector: hash_embed(text, self.vector_dim),
            memory_type: memory_type.to_string(),
            source_agent: None,
            extra: Default::default(),
        };
        self.memory.upsert(vec![point]).await;
        ToolOutput::ok(&call.id, "stored")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embed_is_deterministic_and_normalized() {
        let a = hash_embed("hello world", 32);
        let b = hash_embed("hello world", 32);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[test]
    fn hash_embed_differs_for_different_text() {
        let a = hash_embed("hello world", 32);
        let b = hash_embed("goodbye moon", 32);
        assert_ne!(a, b);
    }
}
