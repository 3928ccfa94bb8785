//! REST surface: session CRUD and health.
//!
//! `POST /sessions` and `PATCH`/`DELETE /sessions/{id}` require a
//! bearer token that resolves to the speaker role; `GET /sessions/{id}`
//! and `GET /health` are public, matching the teacher's
//! protected/public route split in `server::mod::start`.

use super::AppState;
use crate::error::ApiError;
use crate::ratelimit::Operation;
use crate::session::BroadcastTransition;
use crate::types::{QualityTier, SessionId};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
}

fn require_speaker(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    let token = bearer_token(headers);
    state
        .token_validator
        .verify(token, crate::types::ConnectionRole::Speaker)
        .map(|identity| identity.user_id)
        .map_err(|reason| ApiError::auth("AUTH_REJECTED", format!("token rejected: {}", reason.as_str())))
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub source_language: String,
    #[serde(default)]
    pub quality_tier: Option<QualityTier>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub speaker_id: String,
    pub source_language: String,
    pub quality_tier: QualityTier,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub listener_count: i64,
    pub is_active: bool,
    pub is_paused: bool,
    pub is_muted: bool,
    pub volume: f32,
}

impl From<crate::types::Session> for SessionResponse {
    fn from(s: crate::types::Session) -> Self {
        Self {
            session_id: s.session_id.0,
            speaker_id: s.speaker_id,
            source_language: s.source_language,
            quality_tier: s.quality_tier,
            expires_at: s.expires_at,
            listener_count: s.listener_count,
            is_active: s.broadcast_state.is_active,
            is_paused: s.broadcast_state.is_paused,
            is_muted: s.broadcast_state.is_muted,
            volume: s.broadcast_state.volume,
        }
    }
}

pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let speaker_id = require_speaker(&state, &headers)?;
    state.rate_limiter.enforce(
        Operation::SessionCreate,
        &speaker_id,
        "RATE_LIMIT_SESSION_CREATE",
        "too many session creation attempts",
    )?;
    let quality_tier = request.quality_tier.unwrap_or(QualityTier::Standard);
    let session = state.sessions.create_session(&speaker_id, &request.source_language, quality_tier).await?;
    state.asr.open(session.session_id.clone(), crate::asr::StabilityLevel::High);
    Ok(Json(session.into()))
}

pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.sessions.get_session(&SessionId(id))?;
    Ok(Json(session.into()))
}

#[derive(Debug, Deserialize)]
pub struct PatchSessionRequest {
    pub is_paused: Option<bool>,
    pub is_muted: Option<bool>,
    pub volume: Option<f32>,
}

pub async fn patch_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<PatchSessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let speaker_id = require_speaker(&state, &headers)?;
    state.rate_limiter.enforce(
        Operation::ControlMessage,
        &speaker_id,
        "RATE_LIMIT_CONTROL_MESSAGE",
        "too many control messages",
    )?;
    let session_id = SessionId(id);
    if let Some(paused) = request.is_paused {
        let transition = if paused { BroadcastTransition::Pause } else { BroadcastTransition::Resume };
        state.sessions.update_broadcast_state(&session_id, transition)?;
    }
    if let Some(muted) = request.is_muted {
        let transition = if muted { BroadcastTransition::Mute } else { BroadcastTransition::Unmute };
        state.sessions.update_broadcast_state(&session_id, transition)?;
    }
    if let Some(volume) = request.volume {
        state.sessions.update_broadcast_state(&session_id, BroadcastTransition::SetVolume(volume))?;
    }
    let session = state.sessions.get_session(&session_id)?;
    Ok(Json(session.into()))
}

pub async fn delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<(), ApiError> {
    require_speaker(&state, &headers)?;
    let session_id = SessionId(id);
    state.sessions.mark_inactive(&session_id)?;
    state.asr.close(&session_id);
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
