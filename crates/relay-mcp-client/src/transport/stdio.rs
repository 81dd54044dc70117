// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Stdio transport: spawns the MCP server as a subprocess, writes
//! newline-delimited JSON-RPC requests to stdin, reads responses from
//! stdout, and watches stderr for a readiness line (falling back to a fixed
//! delay if none appears).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{oneshot, Mutex};

use crate::error::{McpError, Result};
use crate::protocol::DEFAULT_REQUEST_TIMEOUT_SECS;

use super::Transport;

const READINESS_FALLBACK: Duration = Duration::from_secs(10);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

pub struct StdioTransport {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    pending: Pending,
}

impl StdioTransport {
    pub async fn spawn(command: &str, args: &[String], env: &HashMap<String, String>) -> Result<Self> {
        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take().ok_or_else(|| {
            McpError::Transport("failed to capture child stdin".into())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            McpError::Transport("failed to capture child stdout".into())
        })?;
        let stderr = child.stderr.take();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        let pending_clone = pending.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(value) = serde_json::from_str::<Value>(&line) else {
                    continue;
                };
                if let Some(id) = value.get("id").and_then(|v| v.as_u64()) {
                    if let Some(tx) = pending_clone.lock().await.remove(&id) {
                        let _ = tx.send(value);
                    }
                }
            }
        });

        // Readiness watch: wait for the first stderr line, or fall back to a
        // fixed delay if the server never prints one.
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            let _ = tokio::time::timeout(READINESS_FALLBACK, lines.next_line()).await;
            tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });
        } else {
            tokio::time::sleep(READINESS_FALLBACK).await;
        }

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            pending,
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, request: Value) -> Result<Value> {
        let id = request
            .get("id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| McpError::Protocol("request missing numeric id".into()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');
        {
            let mut stdin = self.stdin.lock().await;
            stdin.write_all(&line).await?;
            stdin.flush().await?;
        }

        match tokio::time::timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS), rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(McpError::Transport("response channel closed".into())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout)
            }
        }
    }

    /// Sends SIGTERM, gives the process 5s to exit, then SIGKILLs it.
    async fn close(&self) {
        let mut child = self.child.lock().await;
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                unsafe {
                    libc::kill(pid as i32, libc::SIGTERM);
                }
            }
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
        let _ = child.start_kill();
    }
}
