//! Core data model shared across every component: sessions, connections,
//! transcription results, and the emotion/rate/volume measurements that
//! drive SSML generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Human-readable session identifier, `adjective-noun-NNN`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        SessionId(s)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque per-connection identifier (one per websocket upgrade).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new() -> Self {
        ConnectionId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `standard` vs `premium` session quality tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Standard,
    Premium,
}

/// Role a connection was registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionRole {
    Speaker,
    Listener,
}

/// The session's broadcast-control state: `{isActive, isPaused, isMuted,
/// volume, lastStateChange}`. "Broadcasting" holds iff
/// `is_active && !is_paused && !is_muted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastState {
    pub is_active: bool,
    pub is_paused: bool,
    pub is_muted: bool,
    pub volume: f32,
    pub last_state_change: DateTime<Utc>,
}

impl BroadcastState {
    pub fn new() -> Self {
        Self {
            is_active: true,
            is_paused: false,
            is_muted: false,
            volume: 1.0,
            last_state_change: Utc::now(),
        }
    }

    /// Validated volume setter; rejects anything outside `[0,1]`.
    pub fn set_volume(&mut self, volume: f32) -> Result<(), crate::error::ApiError> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(crate::error::ApiError::validation(
                "VALIDATION_BAD_VOLUME",
                format!("volume must be between 0.0 and 1.0, got {volume}"),
            ));
        }
        self.volume = volume;
        self.last_state_change = Utc::now();
        Ok(())
    }

    pub fn pause(&mut self) {
        self.is_paused = true;
        self.last_state_change = Utc::now();
    }

    pub fn resume(&mut self) {
        self.is_paused = false;
        self.last_state_change = Utc::now();
    }

    pub fn mute(&mut self) {
        self.is_muted = true;
        self.last_state_change = Utc::now();
    }

    pub fn unmute(&mut self) {
        self.is_muted = false;
        self.last_state_change = Utc::now();
    }

    pub fn mark_inactive(&mut self) {
        self.is_active = false;
        self.last_state_change = Utc::now();
    }

    /// "Broadcasting": active, not paused, not muted.
    pub fn is_broadcasting(&self) -> bool {
        self.is_active && !self.is_paused && !self.is_muted
    }
}

impl Default for BroadcastState {
    fn default() -> Self {
        Self::new()
    }
}

/// A speaker-owned broadcast instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub speaker_id: String,
    pub source_language: String,
    pub quality_tier: QualityTier,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub listener_count: i64,
    pub broadcast_state: BroadcastState,
}

/// A registered connection (speaker or listener).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub connection_id: ConnectionId,
    pub session_id: SessionId,
    pub role: ConnectionRole,
    /// `Some` for listeners only; speakers carry no target language.
    pub target_language: Option<String>,
    /// Authenticated user id for speakers, anonymous listener id otherwise.
    pub user_id: String,
    pub connected_at: DateTime<Utc>,
    pub ttl: DateTime<Utc>,
}

/// Measured emotion/rate/volume dynamics of the speaker's stream,
/// consumed by the SSML generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionDynamics {
    pub emotion: Emotion,
    pub intensity: f32,
    pub rate_wpm: u32,
    pub volume_level: VolumeLevel,
}

impl Default for EmotionDynamics {
    fn default() -> Self {
        Self {
            emotion: Emotion::Neutral,
            intensity: 0.0,
            rate_wpm: 150,
            volume_level: VolumeLevel::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Excited,
    Neutral,
    Fearful,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeLevel {
    Soft,
    Normal,
    Loud,
    XLoud,
}

/// One streaming-ASR emission: either a revisable partial or an
/// authoritative final.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub result_id: String,
    pub session_id: SessionId,
    pub source_language: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub is_final: bool,
    /// Present on partials only.
    pub stability_score: Option<f32>,
    /// Present on finals only, when the ASR reports which partials it supersedes.
    pub replaces_result_ids: Option<Vec<String>>,
}

/// A segment forwarded from the partial-result handler to the
/// translation orchestrator.
#[derive(Debug, Clone)]
pub struct ForwardedSegment {
    pub session_id: SessionId,
    pub source_language: String,
    pub text: String,
    pub emotion: EmotionDynamics,
    pub is_final: bool,
}
