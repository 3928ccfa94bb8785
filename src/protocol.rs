//! Wire protocol: the message shapes speakers and listeners exchange
//! with the server over the framed per-connection channel, plus the
//! REST error body shared with [`crate::error::ErrorBody`].

use crate::types::QualityTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound speaker-originated control actions (`sendAudio` is handled on
/// the binary/audio path and has no JSON shape here).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SpeakerAction {
    CreateSession { source_language: String, quality_tier: QualityTier },
    /// Audio pushed as a base64 text frame; binary frames carry the
    /// same PCM16 bytes without the JSON envelope.
    SendAudio { data: String },
    Pause { session_id: String },
    Resume { session_id: String },
    Mute { session_id: String },
    Unmute { session_id: String },
    SetVolume { session_id: String, volume: f32 },
    GetSessionStatus { session_id: String },
    Heartbeat,
}

impl SpeakerAction {
    /// The `sessionId` a control action claims to apply to, for actions
    /// that carry one; `None` for `sendAudio`/`heartbeat`/`createSession`,
    /// which are scoped to the connection itself.
    pub fn claimed_session_id(&self) -> Option<&str> {
        match self {
            SpeakerAction::Pause { session_id }
            | SpeakerAction::Resume { session_id }
            | SpeakerAction::Mute { session_id }
            | SpeakerAction::Unmute { session_id }
            | SpeakerAction::SetVolume { session_id, .. }
            | SpeakerAction::GetSessionStatus { session_id } => Some(session_id),
            SpeakerAction::CreateSession { .. } | SpeakerAction::SendAudio { .. } | SpeakerAction::Heartbeat => None,
        }
    }
}

/// Inbound listener-originated actions.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ListenerAction {
    JoinSession { session_id: String, target_language: String },
    GetSessionStatus { session_id: String },
    Heartbeat,
}

impl ListenerAction {
    pub fn claimed_session_id(&self) -> Option<&str> {
        match self {
            ListenerAction::GetSessionStatus { session_id } => Some(session_id),
            ListenerAction::JoinSession { .. } | ListenerAction::Heartbeat => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityWarningKind {
    Clipping,
    Echo,
    Silence,
    LowSnr,
}

/// Every outbound server message, tagged by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    SessionCreated {
        session_id: String,
        expires_at: DateTime<Utc>,
        quality_tier: QualityTier,
        timestamp: DateTime<Utc>,
    },
    ListenerJoined {
        session_id: String,
        listener_count: i64,
        target_language: String,
        timestamp: DateTime<Utc>,
    },
    SessionStatus {
        session_id: String,
        is_active: bool,
        listener_count: i64,
        language_distribution: Vec<(String, usize)>,
        timestamp: DateTime<Utc>,
    },
    BroadcastControl {
        session_id: String,
        is_paused: bool,
        is_muted: bool,
        volume: f32,
        timestamp: DateTime<Utc>,
    },
    AudioQualityWarning {
        session_id: String,
        warning_type: QualityWarningKind,
        severity: String,
        message: String,
        recommendation: String,
        timestamp: DateTime<Utc>,
    },
    ConnectionRefresh {
        new_connection_url: Option<String>,
        expires_in_secs: i64,
        timestamp: DateTime<Utc>,
    },
    ConnectionWarning {
        remaining_minutes: i64,
        timestamp: DateTime<Utc>,
    },
    HeartbeatAck {
        timestamp: DateTime<Utc>,
    },
    SessionEnded {
        session_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    Error {
        code: &'static str,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        correlation_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl OutboundMessage {
    pub fn error(err: &crate::error::ApiError) -> Self {
        let body = err.to_body();
        OutboundMessage::Error {
            code: body.code,
            message: body.message,
            details: body.details,
            correlation_id: body.correlation_id,
            timestamp: Utc::now(),
        }
    }
}
