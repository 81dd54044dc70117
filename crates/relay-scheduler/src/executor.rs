// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

/// Runs a prompt against the agent runtime on behalf of a fired scheduled
/// task or reminder. Implemented by `relay-core`'s Session Runner; kept as a
/// trait here so the scheduler never depends on the runtime crate directly.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn run_prompt(&self, session_id: &str, prompt: &str) -> anyhow::Result<String>;
}
