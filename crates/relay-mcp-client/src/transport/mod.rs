// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod sse;
mod stdio;

pub use sse::SseTransport;
pub use stdio::StdioTransport;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A transport delivers one JSON-RPC request and returns the matching
/// response body. Each call is independent; request/response correlation by
/// `id` is the transport's responsibility.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Value) -> Result<Value>;

    /// Tears down the transport (closes the SSE stream, kills the stdio
    /// subprocess). Best-effort.
    async fn close(&self);
}
