//! ASR Session Manager: one streaming ASR session per active speaker,
//! forwarding `Partial`/`Final` events to the partial-result pipeline.
//!
//! The speech recognizer itself is an external collaborator (assumed,
//! not implemented here, same as the translator and synthesizer): this
//! module owns only the one-session-per-speaker lifecycle and the
//! trait the rest of the system programs against.

use crate::types::{SessionId, TranscriptResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct AsrEvent {
    pub result: TranscriptResult,
}

/// The streaming recognizer contract the rest of the system programs
/// against. A real deployment backs this with a cloud transcription
/// service; tests and local runs use an in-process fake.
#[async_trait]
pub trait AsrStream: Send + Sync {
    async fn feed(&self, session_id: &SessionId, chunk: &[u8]) -> Vec<AsrEvent>;
}

struct SpeakerSession {
    stability: StabilityLevel,
}

/// Enforces "exactly one streaming ASR session per active speaker":
/// a second `open` for the same session is a no-op rather than
/// spinning up a competing stream.
pub struct AsrSessionManager {
    sessions: Mutex<HashMap<SessionId, SpeakerSession>>,
    stream: Box<dyn AsrStream>,
}

impl AsrSessionManager {
    pub fn new(stream: Box<dyn AsrStream>) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), stream }
    }

    /// `enablePartialResultsStabilization=true`, default stability `high`.
    pub fn open(&self, session_id: SessionId, stability: StabilityLevel) {
        self.sessions.lock().unwrap().entry(session_id).or_insert(SpeakerSession { stability });
    }

    pub fn close(&self, session_id: &SessionId) {
        self.sessions.lock().unwrap().remove(session_id);
    }

    pub fn is_open(&self, session_id: &SessionId) -> bool {
        self.sessions.lock().unwrap().contains_key(session_id)
    }

    pub fn stability_of(&self, session_id: &SessionId) -> Option<StabilityLevel> {
        self.sessions.lock().unwrap().get(session_id).map(|s| s.stability)
    }

    /// Drain one chunk through the session's ASR stream, in receipt
    /// order (the caller is expected to call this from a single
    /// per-speaker ingestion task so chunk order is preserved).
    pub async fn feed(&self, session_id: &SessionId, chunk: &[u8]) -> Vec<AsrEvent> {
        if !self.is_open(session_id) {
            return Vec::new();
        }
        self.stream.feed(session_id, chunk).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct EchoAsr;

    #[async_trait]
    impl AsrStream for EchoAsr {
        async fn feed(&self, session_id: &SessionId, chunk: &[u8]) -> Vec<AsrEvent> {
            vec![AsrEvent {
                result: TranscriptResult {
                    result_id: "r1".into(),
                    session_id: session_id.clone(),
                    source_language: "en".into(),
                    text: format!("{} bytes", chunk.len()),
                    timestamp: Utc::now(),
                    is_final: false,
                    stability_score: Some(0.9),
                    replaces_result_ids: None,
                },
            }]
        }
    }

    #[tokio::test]
    async fn feed_is_a_noop_for_a_session_that_was_never_opened() {
        let manager = AsrSessionManager::new(Box::new(EchoAsr));
        let events = manager.feed(&SessionId("golden-eagle-427".into()), &[1, 2]).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn open_is_idempotent_and_feed_forwards_to_the_stream() {
        let manager = AsrSessionManager::new(Box::new(EchoAsr));
        let session = SessionId("golden-eagle-427".into());
        manager.open(session.clone(), StabilityLevel::High);
        manager.open(session.clone(), StabilityLevel::Low);
        assert_eq!(manager.stability_of(&session), Some(StabilityLevel::High));

        let events = manager.feed(&session, &[1, 2, 3, 4]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].result.text, "4 bytes");
    }

    #[test]
    fn close_removes_the_session() {
        let manager = AsrSessionManager::new(Box::new(EchoAsr));
        let session = SessionId("golden-eagle-427".into());
        manager.open(session.clone(), StabilityLevel::High);
        manager.close(&session);
        assert!(!manager.is_open(&session));
    }
}
