//! Control-Message Router: turns inbound speaker control actions into
//! session state transitions and the matching outbound acknowledgement,
//! and throttles speaker-directed audio-quality warnings so a sustained
//! issue doesn't re-alert on every chunk.

use crate::connection::ConnectionRegistry;
use crate::protocol::{OutboundMessage, QualityWarningKind};
use crate::session::{BroadcastTransition, SessionRegistry};
use crate::types::{ConnectionId, SessionId};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

pub struct ControlRouter {
    sessions: std::sync::Arc<SessionRegistry>,
    connections: std::sync::Arc<ConnectionRegistry>,
    quality_warning_cooldown: Duration,
    last_quality_warning: RwLock<HashMap<(ConnectionId, QualityWarningKind), DateTime<Utc>>>,
}

impl ControlRouter {
    pub fn new(
        sessions: std::sync::Arc<SessionRegistry>,
        connections: std::sync::Arc<ConnectionRegistry>,
        quality_warning_cooldown_secs: i64,
    ) -> Self {
        Self {
            sessions,
            connections,
            quality_warning_cooldown: Duration::seconds(quality_warning_cooldown_secs.max(0)),
            last_quality_warning: RwLock::new(HashMap::new()),
        }
    }

    pub fn pause(&self, session_id: &SessionId) -> Result<OutboundMessage, crate::error::ApiError> {
        self.apply(session_id, BroadcastTransition::Pause)
    }

    pub fn resume(&self, session_id: &SessionId) -> Result<OutboundMessage, crate::error::ApiError> {
        self.apply(session_id, BroadcastTransition::Resume)
    }

    pub fn mute(&self, session_id: &SessionId) -> Result<OutboundMessage, crate::error::ApiError> {
        self.apply(session_id, BroadcastTransition::Mute)
    }

    pub fn unmute(&self, session_id: &SessionId) -> Result<OutboundMessage, crate::error::ApiError> {
        self.apply(session_id, BroadcastTransition::Unmute)
    }

    pub fn set_volume(&self, session_id: &SessionId, volume: f32) -> Result<OutboundMessage, crate::error::ApiError> {
        self.apply(session_id, BroadcastTransition::SetVolume(volume))
    }

    fn apply(&self, session_id: &SessionId, transition: BroadcastTransition) -> Result<OutboundMessage, crate::error::ApiError> {
        let session = self.sessions.update_broadcast_state(session_id, transition)?;
        Ok(OutboundMessage::BroadcastControl {
            session_id: session.session_id.to_string(),
            is_paused: session.broadcast_state.is_paused,
            is_muted: session.broadcast_state.is_muted,
            volume: session.broadcast_state.volume,
            timestamp: Utc::now(),
        })
    }

    pub fn session_status(&self, session_id: &SessionId) -> Result<OutboundMessage, crate::error::ApiError> {
        let session = self.sessions.get_session(session_id)?;
        let mut distribution: HashMap<String, usize> = HashMap::new();
        for listener in self.connections.list_listeners(session_id) {
            if let Some(lang) = listener.target_language {
                *distribution.entry(lang).or_insert(0) += 1;
            }
        }
        Ok(OutboundMessage::SessionStatus {
            session_id: session.session_id.to_string(),
            is_active: session.broadcast_state.is_active,
            listener_count: session.listener_count,
            language_distribution: distribution.into_iter().collect(),
            timestamp: Utc::now(),
        })
    }

    /// Builds an `audioQualityWarning` message for `conn_id`, but only if
    /// the same `(connectionId, issueKind)` pair hasn't already warned
    /// within the cooldown window.
    pub fn quality_warning(
        &self,
        session_id: &SessionId,
        conn_id: &ConnectionId,
        kind: QualityWarningKind,
        severity: &str,
        message: &str,
        recommendation: &str,
    ) -> Option<OutboundMessage> {
        let now = Utc::now();
        let mut last_sent = self.last_quality_warning.write().unwrap();
        let key = (conn_id.clone(), kind);
        if let Some(sent_at) = last_sent.get(&key) {
            if now - *sent_at < self.quality_warning_cooldown {
                return None;
            }
        }
        last_sent.insert(key, now);
        Some(OutboundMessage::AudioQualityWarning {
            session_id: session_id.to_string(),
            warning_type: kind,
            severity: severity.to_string(),
            message: message.to_string(),
            recommendation: recommendation.to_string(),
            timestamp: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::types::QualityTier;

    async fn router() -> (ControlRouter, SessionId) {
        let sessions = std::sync::Arc::new(SessionRegistry::new(SessionConfig::default()));
        let connections = std::sync::Arc::new(ConnectionRegistry::new(120));
        let session = sessions.create_session("speaker-1", "en", QualityTier::Standard).await.unwrap();
        let router = ControlRouter::new(sessions, connections, 60);
        (router, session.session_id)
    }

    #[tokio::test]
    async fn pause_then_resume_round_trips_broadcast_state() {
        let (router, session_id) = router().await;
        let msg = router.pause(&session_id).unwrap();
        match msg {
            OutboundMessage::BroadcastControl { is_paused, .. } => assert!(is_paused),
            _ => panic!("expected BroadcastControl"),
        }
        let msg = router.resume(&session_id).unwrap();
        match msg {
            OutboundMessage::BroadcastControl { is_paused, .. } => assert!(!is_paused),
            _ => panic!("expected BroadcastControl"),
        }
    }

    #[tokio::test]
    async fn set_volume_out_of_range_surfaces_a_validation_error() {
        let (router, session_id) = router().await;
        let err = router.set_volume(&session_id, 2.0).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_BAD_VOLUME");
    }

    #[tokio::test]
    async fn session_status_reports_listener_count_and_language_distribution() {
        let (router, session_id) = router_with_listener().await;
        let msg = router.session_status(&session_id).unwrap();
        match msg {
            OutboundMessage::SessionStatus { language_distribution, .. } => {
                assert_eq!(language_distribution, vec![("es".to_string(), 1)]);
            }
            _ => panic!("expected SessionStatus"),
        }
    }

    async fn router_with_listener() -> (ControlRouter, SessionId) {
        let sessions = std::sync::Arc::new(SessionRegistry::new(SessionConfig::default()));
        let connections = std::sync::Arc::new(ConnectionRegistry::new(120));
        let session = sessions.create_session("speaker-2", "en", QualityTier::Standard).await.unwrap();
        connections.register_listener(ConnectionId::new(), session.session_id.clone(), "es".into(), "anon".into());
        (ControlRouter::new(sessions, connections, 60), session.session_id)
    }

    #[tokio::test]
    async fn quality_warning_is_suppressed_within_the_cooldown_window() {
        let (router, session_id) = router().await;
        let conn_id = ConnectionId::new();
        let first = router.quality_warning(&session_id, &conn_id, QualityWarningKind::Clipping, "high", "clipping detected", "lower input gain");
        assert!(first.is_some());
        let second = router.quality_warning(&session_id, &conn_id, QualityWarningKind::Clipping, "high", "clipping detected", "lower input gain");
        assert!(second.is_none());
        let different_kind = router.quality_warning(&session_id, &conn_id, QualityWarningKind::Echo, "medium", "echo detected", "use headphones");
        assert!(different_kind.is_some());
    }
}
