//! Session Registry: session lifecycle, TTL, listener-count
//! invariant, and broadcast-control state transitions.

pub mod id_generator;

use crate::config::SessionConfig;
use crate::error::ApiError;
use crate::store::memory::{AtomicCounterStore, MemoryStore};
use crate::store::{Condition, Store};
use crate::types::{BroadcastState, QualityTier, Session, SessionId};
use chrono::{Duration, Utc};
use id_generator::SessionIdGenerator;
use std::sync::RwLock;
use tracing::{info, warn};

/// Retained separately from `Session` so a speaker cannot open two
/// concurrent active sessions (invariant: "at most one session per
/// speakerId while active").
struct SpeakerIndex {
    by_speaker: RwLock<std::collections::HashMap<String, SessionId>>,
}

impl SpeakerIndex {
    fn new() -> Self {
        Self { by_speaker: RwLock::new(std::collections::HashMap::new()) }
    }
}

pub struct SessionRegistry {
    config: SessionConfig,
    sessions: MemoryStore<SessionId, Session>,
    listener_counts: AtomicCounterStore<SessionId>,
    speaker_index: SpeakerIndex,
    id_generator: SessionIdGenerator,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        let id_generator = SessionIdGenerator::new(config.id_generator_max_attempts);
        Self {
            config,
            sessions: MemoryStore::new(),
            listener_counts: AtomicCounterStore::new(),
            speaker_index: SpeakerIndex::new(),
            id_generator,
        }
    }

    /// `CreateSession(speakerId, sourceLanguage, qualityTier) -> Session`.
    /// Outer retry loop wraps the generator's own bounded attempts with
    /// exponential backoff, failing with `SessionIDExhaustion` only
    /// after both budgets are spent.
    pub async fn create_session(
        &self,
        speaker_id: &str,
        source_language: &str,
        quality_tier: QualityTier,
    ) -> Result<Session, ApiError> {
        {
            let speakers = self.speaker_index.by_speaker.read().unwrap();
            if let Some(existing) = speakers.get(speaker_id) {
                if let Ok(Some(session)) = self.sessions.get(existing) {
                    if session.broadcast_state.is_active {
                        return Err(ApiError::session(
                            "SESSION_ALREADY_ACTIVE",
                            format!("speaker {speaker_id} already owns an active session"),
                        ));
                    }
                }
            }
        }

        let mut backoff_ms = self.config.id_backoff_base_ms;
        let mut last_err = None;
        for attempt in 0..self.config.id_outer_retries {
            let result = self.id_generator.generate(|candidate| {
                self.sessions.get(&SessionId(candidate.to_string())).ok().flatten().is_none()
            });
            match result {
                Ok(id) => {
                    let now = Utc::now();
                    let max_duration = Duration::minutes(self.config.max_session_minutes);
                    let session = Session {
                        session_id: SessionId(id.clone()),
                        speaker_id: speaker_id.to_string(),
                        source_language: source_language.to_string(),
                        quality_tier,
                        created_at: now,
                        expires_at: now + max_duration,
                        listener_count: 0,
                        broadcast_state: BroadcastState::new(),
                    };
                    self.sessions
                        .put(session.session_id.clone(), session.clone(), Some(session.expires_at), Some(Condition::NotExists))
                        .map_err(|_| {
                            ApiError::internal("INTERNAL_SESSION_COLLISION", "session id collided on insert")
                        })?;
                    self.listener_counts.init(session.session_id.clone(), 0);
                    self.speaker_index
                        .by_speaker
                        .write()
                        .unwrap()
                        .insert(speaker_id.to_string(), session.session_id.clone());
                    info!(session_id = %session.session_id, speaker_id, attempt, "session created");
                    return Ok(session);
                }
                Err(e) => {
                    last_err = Some(e);
                    warn!(attempt, backoff_ms, "session id generation attempt failed, backing off");
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
        warn!(speaker_id, "session id space exhausted after outer retries");
        let _ = last_err;
        Err(ApiError::internal("SESSION_ID_EXHAUSTION", "could not allocate a unique session id"))
    }

    pub fn get_session(&self, session_id: &SessionId) -> Result<Session, ApiError> {
        self.sessions
            .get(session_id)
            .ok()
            .flatten()
            .ok_or_else(|| ApiError::session("SESSION_NOT_FOUND", format!("session {session_id} not found")))
    }

    pub fn mark_inactive(&self, session_id: &SessionId) -> Result<(), ApiError> {
        let mut session = self.get_session(session_id)?;
        session.broadcast_state.mark_inactive();
        self.persist(&session)?;
        self.speaker_index.by_speaker.write().unwrap().remove(&session.speaker_id);
        Ok(())
    }

    pub fn update_broadcast_state(
        &self,
        session_id: &SessionId,
        transition: BroadcastTransition,
    ) -> Result<Session, ApiError> {
        let mut session = self.get_session(session_id)?;
        if !session.broadcast_state.is_active {
            return Err(ApiError::session("SESSION_INACTIVE", "session is no longer active"));
        }
        match transition {
            BroadcastTransition::Pause => session.broadcast_state.pause(),
            BroadcastTransition::Resume => session.broadcast_state.resume(),
            BroadcastTransition::Mute => session.broadcast_state.mute(),
            BroadcastTransition::Unmute => session.broadcast_state.unmute(),
            BroadcastTransition::SetVolume(v) => session.broadcast_state.set_volume(v)?,
        }
        self.persist(&session)?;
        Ok(session)
    }

    /// `IncrementListeners` delegates to `AtomicAdd(+1)`.
    pub fn increment_listeners(&self, session_id: &SessionId) -> Result<i64, ApiError> {
        let session = self.get_session(session_id)?;
        if !session.broadcast_state.is_active {
            return Err(ApiError::session("SESSION_INACTIVE", "cannot join an inactive session"));
        }
        let count = self.listener_counts.atomic_add(session_id.clone(), 1).map_err(ApiError::from)?;
        self.sync_listener_count(session_id, count)?;
        Ok(count)
    }

    /// `DecrementListeners` delegates to `AtomicAdd(-1, condition >= 1)`;
    /// failure surfaces as `NegativeCountError`, never retried.
    pub fn decrement_listeners(&self, session_id: &SessionId) -> Result<i64, ApiError> {
        let count = self.listener_counts.atomic_add(session_id.clone(), -1).map_err(ApiError::from)?;
        let _ = self.sync_listener_count(session_id, count);
        Ok(count)
    }

    pub fn listener_count(&self, session_id: &SessionId) -> i64 {
        self.listener_counts.get(session_id)
    }

    fn sync_listener_count(&self, session_id: &SessionId, count: i64) -> Result<(), ApiError> {
        if let Ok(Some(mut session)) = self.sessions.get(session_id) {
            session.listener_count = count;
            self.persist(&session)?;
        }
        Ok(())
    }

    fn persist(&self, session: &Session) -> Result<(), ApiError> {
        self.sessions
            .put(session.session_id.clone(), session.clone(), Some(session.expires_at), None)
            .map_err(ApiError::from)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum BroadcastTransition {
    Pause,
    Resume,
    Mute,
    Unmute,
    SetVolume(f32),
}
