//! Connection Registry: binds connections to a session and
//! role, maintains the `(sessionId, targetLanguage) -> {connectionId}`
//! language index, and reaps stale entries.

use crate::error::ApiError;
use crate::types::{Connection, ConnectionId, ConnectionRole, SessionId};
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::info;

/// `(sessionId, targetLanguage)` composite key for the language index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LanguageKey(SessionId, String);

pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    language_index: RwLock<HashMap<LanguageKey, HashSet<ConnectionId>>>,
    /// All connections (speaker + listeners) owned by a session, so a
    /// disconnect or control broadcast doesn't need a scan.
    by_session: RwLock<HashMap<SessionId, HashSet<ConnectionId>>>,
    connection_ttl_minutes: i64,
}

impl ConnectionRegistry {
    pub fn new(connection_ttl_minutes: i64) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            language_index: RwLock::new(HashMap::new()),
            by_session: RwLock::new(HashMap::new()),
            connection_ttl_minutes,
        }
    }

    pub fn register_speaker(&self, conn_id: ConnectionId, session_id: SessionId, user_id: String) -> Connection {
        let now = Utc::now();
        let connection = Connection {
            connection_id: conn_id.clone(),
            session_id: session_id.clone(),
            role: ConnectionRole::Speaker,
            target_language: None,
            user_id,
            connected_at: now,
            ttl: now + Duration::minutes(self.connection_ttl_minutes),
        };
        self.insert(connection.clone());
        connection
    }

    pub fn register_listener(
        &self,
        conn_id: ConnectionId,
        session_id: SessionId,
        target_language: String,
        user_id: String,
    ) -> Connection {
        let now = Utc::now();
        let connection = Connection {
            connection_id: conn_id.clone(),
            session_id: session_id.clone(),
            role: ConnectionRole::Listener,
            target_language: Some(target_language.clone()),
            user_id,
            connected_at: now,
            ttl: now + Duration::minutes(self.connection_ttl_minutes),
        };
        self.insert(connection.clone());
        self.language_index
            .write()
            .unwrap()
            .entry(LanguageKey(session_id, target_language))
            .or_default()
            .insert(conn_id);
        connection
    }

    fn insert(&self, connection: Connection) {
        self.by_session
            .write()
            .unwrap()
            .entry(connection.session_id.clone())
            .or_default()
            .insert(connection.connection_id.clone());
        self.connections.write().unwrap().insert(connection.connection_id.clone(), connection);
    }

    pub fn get_connection(&self, conn_id: &ConnectionId) -> Result<Connection, ApiError> {
        self.connections
            .read()
            .unwrap()
            .get(conn_id)
            .cloned()
            .ok_or_else(|| ApiError::connection("CONNECTION_NOT_FOUND", "connection not found"))
    }

    /// A connection's `sessionId` must reference the session it claims;
    /// used before any send so a forged/stale connection id can't be
    /// used to push audio or control messages into another session.
    pub fn validate(&self, conn_id: &ConnectionId, session_id: &SessionId) -> Result<Connection, ApiError> {
        let conn = self.get_connection(conn_id)?;
        if &conn.session_id != session_id {
            return Err(ApiError::connection(
                "CONNECTION_SESSION_MISMATCH",
                "connection does not belong to the claimed session",
            ));
        }
        Ok(conn)
    }

    /// `ListListenersByLanguage(sessionId, targetLanguage) -> [connId]`,
    /// a single index lookup, never a scan.
    pub fn list_listeners_by_language(&self, session_id: &SessionId, target_language: &str) -> Vec<ConnectionId> {
        let key = LanguageKey(session_id.clone(), target_language.to_string());
        self.language_index
            .read()
            .unwrap()
            .get(&key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every unique target language currently present on a session, for
    /// the fan-out orchestrator's language discovery step.
    pub fn unique_target_languages(&self, session_id: &SessionId) -> Vec<String> {
        let index = self.language_index.read().unwrap();
        index
            .keys()
            .filter(|k| &k.0 == session_id)
            .map(|k| k.1.clone())
            .collect()
    }

    pub fn list_listeners(&self, session_id: &SessionId) -> Vec<Connection> {
        let connections = self.connections.read().unwrap();
        self.by_session
            .read()
            .unwrap()
            .get(session_id)
            .map(|set| {
                set.iter()
                    .filter_map(|id| connections.get(id))
                    .filter(|c| c.role == ConnectionRole::Listener)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn list_all(&self, session_id: &SessionId) -> Vec<Connection> {
        let connections = self.connections.read().unwrap();
        self.by_session
            .read()
            .unwrap()
            .get(session_id)
            .map(|set| set.iter().filter_map(|id| connections.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    /// Idempotent: removing an already-removed connection is a no-op,
    /// matching the stale-handling contract for connection removal.
    pub fn remove_connection(&self, conn_id: &ConnectionId) -> Option<Connection> {
        let removed = self.connections.write().unwrap().remove(conn_id);
        if let Some(conn) = &removed {
            if let Some(lang) = &conn.target_language {
                let key = LanguageKey(conn.session_id.clone(), lang.clone());
                if let Some(set) = self.language_index.write().unwrap().get_mut(&key) {
                    set.remove(conn_id);
                }
            }
            if let Some(set) = self.by_session.write().unwrap().get_mut(&conn.session_id) {
                set.remove(conn_id);
            }
            info!(connection_id = %conn_id, session_id = %conn.session_id, "connection removed");
        }
        removed
    }

    pub fn remove_all_for_session(&self, session_id: &SessionId) -> Vec<Connection> {
        let conn_ids: Vec<ConnectionId> = self
            .by_session
            .read()
            .unwrap()
            .get(session_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        conn_ids.into_iter().filter_map(|id| self.remove_connection(&id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_index_is_a_single_lookup_not_a_scan() {
        let registry = ConnectionRegistry::new(120);
        let session = SessionId("golden-eagle-427".into());
        registry.register_listener(ConnectionId::new(), session.clone(), "es".into(), "anon-1".into());
        registry.register_listener(ConnectionId::new(), session.clone(), "es".into(), "anon-2".into());
        registry.register_listener(ConnectionId::new(), session.clone(), "fr".into(), "anon-3".into());

        assert_eq!(registry.list_listeners_by_language(&session, "es").len(), 2);
        assert_eq!(registry.list_listeners_by_language(&session, "fr").len(), 1);
        assert_eq!(registry.list_listeners_by_language(&session, "de").len(), 0);

        let mut langs = registry.unique_target_languages(&session);
        langs.sort();
        assert_eq!(langs, vec!["es".to_string(), "fr".to_string()]);
    }

    #[test]
    fn removing_a_connection_is_idempotent() {
        let registry = ConnectionRegistry::new(120);
        let session = SessionId("golden-eagle-427".into());
        let conn_id = ConnectionId::new();
        registry.register_listener(conn_id.clone(), session.clone(), "es".into(), "anon-1".into());
        assert!(registry.remove_connection(&conn_id).is_some());
        assert!(registry.remove_connection(&conn_id).is_none());
        assert_eq!(registry.list_listeners_by_language(&session, "es").len(), 0);
    }

    #[test]
    fn validate_rejects_session_mismatch() {
        let registry = ConnectionRegistry::new(120);
        let session_a = SessionId("golden-eagle-427".into());
        let session_b = SessionId("quiet-river-512".into());
        let conn_id = ConnectionId::new();
        registry.register_listener(conn_id.clone(), session_a, "es".into(), "anon-1".into());
        let err = registry.validate(&conn_id, &session_b).unwrap_err();
        assert_eq!(err.code(), "CONNECTION_SESSION_MISMATCH");
    }
}
