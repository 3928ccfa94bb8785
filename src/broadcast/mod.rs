//! Broadcast Handler: fans a synthesized audio segment out to every
//! listener of one `(sessionId, targetLanguage)` bucket, bounded by a
//! semaphore, retrying transient per-connection failures with
//! exponential backoff and reaping connections that report gone.

use crate::config::BroadcastConfig;
use crate::connection::ConnectionRegistry;
use crate::metrics::{names, Metrics};
use crate::session::SessionRegistry;
use crate::types::{ConnectionId, SessionId};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Success,
    Gone,
    Transient,
}

/// The per-connection transport contract: push one audio frame.
/// Production backs this with the connection's outbound websocket
/// queue; tests use an in-process fake that can simulate gone/transient
/// connections.
#[async_trait]
pub trait FrameSender: Send + Sync {
    async fn send(&self, conn_id: &ConnectionId, audio: &[u8]) -> SendOutcome;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastCounts {
    pub success: u32,
    pub failed: u32,
    pub stale: u32,
}

pub struct BroadcastHandler {
    config: BroadcastConfig,
    connections: Arc<ConnectionRegistry>,
    sessions: Arc<SessionRegistry>,
    sender: Arc<dyn FrameSender>,
    metrics: Arc<Metrics>,
}

impl BroadcastHandler {
    pub fn new(
        config: BroadcastConfig,
        connections: Arc<ConnectionRegistry>,
        sessions: Arc<SessionRegistry>,
        sender: Arc<dyn FrameSender>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { config, connections, sessions, sender, metrics }
    }

    pub async fn broadcast(&self, session_id: &SessionId, target_language: &str, audio: Arc<Vec<u8>>) -> BroadcastCounts {
        let conn_ids = self.connections.list_listeners_by_language(session_id, target_language);
        if conn_ids.is_empty() {
            return BroadcastCounts::default();
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_broadcasts));
        let tasks = conn_ids.into_iter().map(|conn_id| {
            let semaphore = semaphore.clone();
            let audio = audio.clone();
            async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                Some(self.send_with_retry(conn_id, audio).await)
            }
        });
        let results = futures::future::join_all(tasks).await;

        let mut counts = BroadcastCounts::default();
        for outcome in results.into_iter().flatten() {
            match outcome {
                SendOutcome::Success => counts.success += 1,
                SendOutcome::Gone => counts.stale += 1,
                SendOutcome::Transient => counts.failed += 1,
            }
        }

        self.metrics.incr_by(names::BROADCAST_SUCCESS, counts.success as u64);
        self.metrics.incr_by(names::BROADCAST_FAILURE, counts.failed as u64);
        self.metrics.incr_by(names::BROADCAST_STALE, counts.stale as u64);
        counts
    }

    /// One connection's send, with gone-connection reaping and
    /// exponential-backoff retry of transient failures up to
    /// `max_retries`.
    async fn send_with_retry(&self, conn_id: ConnectionId, audio: Arc<Vec<u8>>) -> SendOutcome {
        for attempt in 0..=self.config.max_retries {
            match self.sender.send(&conn_id, &audio).await {
                SendOutcome::Success => return SendOutcome::Success,
                SendOutcome::Gone => {
                    self.reap(&conn_id).await;
                    return SendOutcome::Gone;
                }
                SendOutcome::Transient => {
                    if attempt < self.config.max_retries {
                        let backoff = self.config.retry_backoff_ms * 2u64.pow(attempt);
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }
        warn!(connection_id = %conn_id, "broadcast send exhausted retries, reporting failed");
        SendOutcome::Transient
    }

    async fn reap(&self, conn_id: &ConnectionId) {
        if let Some(conn) = self.connections.remove_connection(conn_id) {
            let _ = self.sessions.decrement_listeners(&conn.session_id);
        }
    }
}
