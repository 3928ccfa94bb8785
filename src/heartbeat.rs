//! Heartbeat & Connection-Lifetime: acks inbound heartbeats and, on each
//! tick, checks a connection's age against the refresh/warning
//! thresholds and its absolute TTL.
//!
//! Shaped after the gateway's cron-style heartbeat tick (outcome enum,
//! config, periodic evaluation), adapted here to run per connection
//! rather than per scheduled checklist item.

use crate::config::HeartbeatConfig;
use crate::protocol::OutboundMessage;
use crate::types::ConnectionId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, Default)]
struct ThresholdState {
    refresh_sent: bool,
    warning_sent: bool,
}

/// One tick's verdict for a single connection.
#[derive(Debug, Default)]
pub struct HeartbeatEvaluation {
    pub messages: Vec<OutboundMessage>,
    /// `true` once the connection has reached its absolute TTL; the
    /// caller must close the connection and reap it from the registries.
    pub force_close: bool,
}

pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    state: RwLock<HashMap<ConnectionId, ThresholdState>>,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self { config, state: RwLock::new(HashMap::new()) }
    }

    pub fn ack(&self) -> OutboundMessage {
        OutboundMessage::HeartbeatAck { timestamp: Utc::now() }
    }

    /// Evaluates one connection's age against the configured thresholds.
    /// `refresh`/`warning` each fire at most once per connection;
    /// `force_close` fires every time past TTL (the caller is expected
    /// to close and forget the connection immediately after).
    pub fn evaluate(&self, conn_id: &ConnectionId, connected_at: DateTime<Utc>, ttl: DateTime<Utc>) -> HeartbeatEvaluation {
        let now = Utc::now();
        if now >= ttl {
            self.forget(conn_id);
            return HeartbeatEvaluation { messages: Vec::new(), force_close: true };
        }

        let elapsed_minutes = (now - connected_at).num_minutes();
        let mut state = {
            let states = self.state.read().unwrap();
            states.get(conn_id).copied().unwrap_or_default()
        };
        let mut messages = Vec::new();

        if elapsed_minutes >= self.config.refresh_minutes && !state.refresh_sent {
            messages.push(OutboundMessage::ConnectionRefresh {
                new_connection_url: None,
                expires_in_secs: (ttl - now).num_seconds().max(0),
                timestamp: now,
            });
            state.refresh_sent = true;
        }
        if elapsed_minutes >= self.config.warning_minutes && !state.warning_sent {
            messages.push(OutboundMessage::ConnectionWarning {
                remaining_minutes: (ttl - now).num_minutes().max(0),
                timestamp: now,
            });
            state.warning_sent = true;
        }

        if state.refresh_sent || state.warning_sent {
            self.state.write().unwrap().insert(conn_id.clone(), state);
        }
        HeartbeatEvaluation { messages, force_close: false }
    }

    pub fn forget(&self, conn_id: &ConnectionId) {
        self.state.write().unwrap().remove(conn_id);
    }
}
