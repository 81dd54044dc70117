// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Registry of live WebSocket connections, keyed by session id. Broadcasts
//! are best-effort: a socket that has gone away silently drops from its
//! session's set on the next send attempt.
use std::collections::HashMap;
use std::sync::Arc;

use relay_scheduler::{ConnectionProbe, Scheduler};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// One registered socket's outbound channel. The WS handler task owns the
/// receiving half and forwards frames to the browser.
pub type Outbox = mpsc::UnboundedSender<String>;

pub struct ConnectionManager {
    sockets: Mutex<HashMap<Uuid, Vec<(Uuid, Outbox)>>>,
    scheduler: Mutex<Option<Arc<Scheduler>>>,
}

impl ConnectionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sockets: Mutex::new(HashMap::new()),
            scheduler: Mutex::new(None),
        })
    }

    /// Wires the scheduler so the first registration for a session can
    /// trigger replay of queued reminders and offline task results. Must be
    /// called once during bootstrap before any client connects.
    pub async fn set_scheduler(&self, scheduler: Arc<Scheduler>) {
        *self.scheduler.lock().await = Some(scheduler);
    }

    /// Registers a socket for `session_id`, returning a handle to
    /// unregister it later. Triggers pending-delivery replay if this is the
    /// session's first connection.
    pub async fn register(&self, session_id: Uuid, outbox: Outbox) -> Uuid {
        let conn_id = Uuid::new_v4();
        let is_first = {
            let mut sockets = self.sockets.lock().await;
            let entry = sockets.entry(session_id).or_default();
            let was_empty = entry.is_empty();
            entry.push((conn_id, outbox));
            was_empty
        };

        if is_first {
            if let Some(scheduler) = self.scheduler.lock().await.clone() {
                scheduler
                    .deliver_pending_for_session(&session_id.to_string())
                    .await;
            }
        }

        conn_id
    }

    pub async fn unregister(&self, session_id: Uuid, conn_id: Uuid) {
        let mut sockets = self.sockets.lock().await;
        if let Some(entry) = sockets.get_mut(&session_id) {
            entry.retain(|(id, _)| *id != conn_id);
            if entry.is_empty() {
                sockets.remove(&session_id);
            }
        }
    }

    /// Delivers `payload` to every live socket for `session_id`. Best-effort:
    /// sockets with a closed receiver are pruned as a side effect.
    pub async fn broadcast_to_session(&self, session_id: Uuid, payload: &str) {
        let mut sockets = self.sockets.lock().await;
        if let Some(entry) = sockets.get_mut(&session_id) {
            entry.retain(|(_, tx)| tx.send(payload.to_string()).is_ok());
            if entry.is_empty() {
                sockets.remove(&session_id);
            }
        }
    }

    /// Delivers `payload` to every socket in every session. Returns the
    /// count of sockets it was successfully queued to.
    pub async fn broadcast_to_all_sessions(&self, payload: &str) -> usize {
        let mut sockets = self.sockets.lock().await;
        let mut sent = 0;
        sockets.retain(|_, entry| {
            entry.retain(|(_, tx)| {
                if tx.send(payload.to_string()).is_ok() {
                    sent += 1;
                    true
                } else {
                    false
                }
            });
            !entry.is_empty()
        });
        sent
    }

    pub async fn has_connections(&self) -> bool {
        !self.sockets.lock().await.is_empty()
    }

    pub async fn get_any_session_id(&self) -> Option<Uuid> {
        self.sockets.lock().await.keys().next().copied()
    }
}

impl ConnectionProbe for ConnectionManager {
    fn has_connected_clients(&self, session_id: &str) -> bool {
        let Ok(id) = session_id.parse::<Uuid>() else {
            return false;
        };
        self.sockets
            .try_lock()
            .map(|s| s.get(&id).map(|v| !v.is_empty()).unwrap_or(false))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_to_session_only_reaches_that_sessions_sockets() {
        let manager = ConnectionManager::new();
        let session_a = Uuid::new_v4();
        let session_b = Uuid::new_v4();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        manager.register(session_a, tx_a).await;
        manager.register(session_b, tx_b).await;

        manager.broadcast_to_session(session_a, "hello").await;

        assert_eq!(rx_a.recv().await.unwrap(), "hello");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_to_all_sessions_counts_successful_sends() {
        let manager = ConnectionManager::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        manager.register(Uuid::new_v4(), tx1).await;
        manager.register(Uuid::new_v4(), tx2).await;

        let sent = manager.broadcast_to_all_sessions("ping").await;
        assert_eq!(sent, 2);
    }

    #[tokio::test]
    async fn unregister_removes_the_session_once_empty() {
        let manager = ConnectionManager::new();
        let session_id = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn_id = manager.register(session_id, tx).await;
        assert!(manager.has_connections().await);

        manager.unregister(session_id, conn_id).await;
        assert!(!manager.has_connections().await);
    }

    #[tokio::test]
    async fn get_any_session_id_returns_none_when_empty() {
        let manager = ConnectionManager::new();
        assert!(manager.get_any_session_id().await.is_none());
    }
}
