//! WebSocket upgrade and per-connection message loop.
//!
//! One upgraded socket serves either a speaker or a listener; the role
//! is decided by the first inbound JSON message (`createSession` vs
//! `joinSession`), mirroring the teacher's upgrade-then-dispatch shape
//! in `server::mod::handle_websocket`.

use super::AppState;
use crate::asr::StabilityLevel;
use crate::audio::quality::{classify_volume, detect_clipping, detect_echo, SilenceDetector, SnrCalculator, SpeakingRateEstimator};
use crate::audio::{pcm16_samples, validate_pcm16_chunk};
use crate::broadcast::{FrameSender, SendOutcome};
use crate::protocol::{ListenerAction, OutboundMessage, QualityWarningKind, SpeakerAction};
use crate::ratelimit::Operation;
use crate::types::{ConnectionId, ConnectionRole, Emotion, EmotionDynamics, ForwardedSegment, QualityTier, SessionId};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One frame pushed through a [`WsHub`] channel: synthesized audio
/// destined for a listener, or a JSON-encoded server message destined
/// for either role (e.g. `listenerJoined` routed to the speaker).
pub enum HubFrame {
    Audio(Vec<u8>),
    Text(String),
}

/// Registry of live outbound channels, one per upgraded socket; the
/// [`crate::broadcast::BroadcastHandler`] pushes synthesized audio
/// through it by connection id, and the message loops use it to push
/// JSON notifications to a connection other than their own.
pub struct WsHub {
    senders: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<HubFrame>>>,
}

impl WsHub {
    pub fn new() -> Self {
        Self { senders: RwLock::new(HashMap::new()) }
    }

    fn register(&self, conn_id: ConnectionId, sender: mpsc::UnboundedSender<HubFrame>) {
        self.senders.write().unwrap().insert(conn_id, sender);
    }

    fn unregister(&self, conn_id: &ConnectionId) {
        self.senders.write().unwrap().remove(conn_id);
    }

    /// Push a JSON text frame to another live connection; `false` if
    /// the connection is gone.
    pub fn send_text(&self, conn_id: &ConnectionId, text: String) -> bool {
        let sender = self.senders.read().unwrap().get(conn_id).cloned();
        match sender {
            Some(sender) => sender.send(HubFrame::Text(text)).is_ok(),
            None => false,
        }
    }
}

impl Default for WsHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl FrameSender for WsHub {
    async fn send(&self, conn_id: &ConnectionId, audio: &[u8]) -> SendOutcome {
        let sender = self.senders.read().unwrap().get(conn_id).cloned();
        match sender {
            Some(sender) => match sender.send(HubFrame::Audio(audio.to_vec())) {
                Ok(()) => SendOutcome::Success,
                Err(_) => SendOutcome::Gone,
            },
            None => SendOutcome::Gone,
        }
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Tracks the best-effort audio-quality analyzers for one speaker
/// connection; reset per socket, discarded on disconnect.
struct QualityMonitor {
    snr: SnrCalculator,
    silence: SilenceDetector,
    rate: SpeakingRateEstimator,
    started_at: std::time::Instant,
}

impl QualityMonitor {
    fn new(snr_window_chunks: usize) -> Self {
        Self {
            snr: SnrCalculator::new(snr_window_chunks),
            silence: SilenceDetector::new(-50.0, 5.0),
            rate: SpeakingRateEstimator::new(0.02, 0.18, 8.0),
            started_at: std::time::Instant::now(),
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    match state.rate_limiter.enforce_connection(
        Operation::Connect,
        "global",
        "RATE_LIMIT_CONNECT_WARN",
        "connection attempts are approaching the rate limit",
        "RATE_LIMIT_CONNECT",
        "too many connection attempts",
    ) {
        Ok(None) => {}
        Ok(Some(warning)) => {
            let _ = send_json(&mut sink, &OutboundMessage::error(&warning)).await;
        }
        Err(e) => {
            let _ = send_json(&mut sink, &OutboundMessage::error(&e)).await;
            let _ = sink.close().await;
            return;
        }
    }

    let first = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => break text,
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!(error = %e, "websocket closed before a role-establishing message arrived");
                return;
            }
        }
    };

    if let Ok(SpeakerAction::CreateSession { source_language, quality_tier }) = serde_json::from_str::<SpeakerAction>(&first) {
        run_speaker(sink, stream, state, source_language, quality_tier).await;
        return;
    }
    if let Ok(ListenerAction::JoinSession { session_id, target_language }) = serde_json::from_str::<ListenerAction>(&first) {
        run_listener(sink, stream, state, session_id, target_language).await;
        return;
    }

    let _ = send_json(
        &mut sink,
        &OutboundMessage::error(&crate::error::ApiError::validation(
            "VALIDATION_BAD_FIRST_MESSAGE",
            "first message must be createSession or joinSession",
        )),
    )
    .await;
}

async fn send_json<S>(sink: &mut S, msg: &OutboundMessage) -> Result<(), axum::Error>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let text = serde_json::to_string(msg).expect("OutboundMessage always serializes");
    sink.send(Message::Text(text.into())).await
}

async fn run_speaker(
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut stream: futures::stream::SplitStream<WebSocket>,
    state: AppState,
    source_language: String,
    quality_tier: QualityTier,
) {
    let user_id = format!("speaker-{}", uuid::Uuid::new_v4());
    if let Err(e) = state.rate_limiter.enforce(
        Operation::SessionCreate,
        &user_id,
        "RATE_LIMIT_SESSION_CREATE",
        "too many session creation attempts",
    ) {
        let _ = send_json(&mut sink, &OutboundMessage::error(&e)).await;
        return;
    }
    let session = match state.sessions.create_session(&user_id, &source_language, quality_tier).await {
        Ok(s) => s,
        Err(e) => {
            let _ = send_json(&mut sink, &OutboundMessage::error(&e)).await;
            return;
        }
    };
    let session_id = session.session_id.clone();
    let conn_id = ConnectionId::new();
    let connection = state.connections.register_speaker(conn_id.clone(), session_id.clone(), user_id);
    state.asr.open(session_id.clone(), StabilityLevel::High);

    let (tx, mut rx) = mpsc::unbounded_channel::<HubFrame>();
    state.ws_hub.register(conn_id.clone(), tx);

    let _ = send_json(
        &mut sink,
        &OutboundMessage::SessionCreated {
            session_id: session_id.to_string(),
            expires_at: session.expires_at,
            quality_tier: session.quality_tier,
            timestamp: chrono::Utc::now(),
        },
    )
    .await;

    let mut quality = QualityMonitor::new(state.config.audio.snr_window_chunks);

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(HubFrame::Text(text)) => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    // Speakers never receive synthesized audio back; the
                    // registration exists only so `WsHub` has one uniform
                    // per-connection channel for both roles.
                    Some(HubFrame::Audio(_)) => {}
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let mut close = false;
                        for msg in speaker_text_messages(&text, &state, &session_id, &conn_id, connection.connected_at, &mut close).await {
                            let _ = send_json(&mut sink, &msg).await;
                        }
                        if close {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        let mut close = false;
                        for msg in ingest_audio(&state, &session_id, &conn_id, &bytes, &mut quality, &mut close).await {
                            let _ = send_json(&mut sink, &msg).await;
                        }
                        if close {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "speaker websocket error");
                        break;
                    }
                }
            }
        }
    }

    state.ws_hub.unregister(&conn_id);
    state.heartbeat.forget(&conn_id);
    state.asr.close(&session_id);
    let _ = state.sessions.mark_inactive(&session_id);
    let ended = OutboundMessage::SessionEnded {
        session_id: session_id.to_string(),
        reason: "speaker_disconnected".to_string(),
        timestamp: chrono::Utc::now(),
    };
    let ended_json = serde_json::to_string(&ended).expect("OutboundMessage always serializes");
    for listener in state.connections.list_listeners(&session_id) {
        state.ws_hub.send_text(&listener.connection_id, ended_json.clone());
    }
    info!(session_id = %session_id, "speaker disconnected");
    let _ = sink.close().await;
}

/// Handle one inbound text frame from a speaker: control actions,
/// `sendAudio` (base64 text-framed audio), and heartbeats. Returns the
/// outbound messages to send, if any, and sets `close` if the
/// connection should be torn down (past its absolute TTL).
async fn speaker_text_messages(
    text: &str,
    state: &AppState,
    session_id: &SessionId,
    conn_id: &ConnectionId,
    connected_at: chrono::DateTime<chrono::Utc>,
    close: &mut bool,
) -> Vec<OutboundMessage> {
    let Ok(action) = serde_json::from_str::<SpeakerAction>(text) else {
        return Vec::new();
    };

    if let Some(claimed) = action.claimed_session_id() {
        if let Err(e) = state.connections.validate(conn_id, &SessionId(claimed.to_string())) {
            return vec![OutboundMessage::error(&e)];
        }
    }

    if !matches!(action, SpeakerAction::Heartbeat) {
        if let Err(e) = state.rate_limiter.enforce(
            Operation::ControlMessage,
            &conn_id.0,
            "RATE_LIMIT_CONTROL_MESSAGE",
            "too many control messages",
        ) {
            return vec![OutboundMessage::error(&e)];
        }
    }

    let result = match action {
        SpeakerAction::SendAudio { data } => {
            let Ok(bytes) = STANDARD.decode(data) else {
                return vec![OutboundMessage::error(&crate::error::ApiError::audio(
                    "AUDIO_BAD_ENCODING",
                    "sendAudio data is not valid base64",
                ))];
            };
            let mut quality = QualityMonitor::new(state.config.audio.snr_window_chunks);
            return ingest_audio(state, session_id, conn_id, &bytes, &mut quality, close).await;
        }
        SpeakerAction::Pause { .. } => state.control.pause(session_id),
        SpeakerAction::Resume { .. } => state.control.resume(session_id),
        SpeakerAction::Mute { .. } => state.control.mute(session_id),
        SpeakerAction::Unmute { .. } => state.control.unmute(session_id),
        SpeakerAction::SetVolume { volume, .. } => state.control.set_volume(session_id, volume),
        SpeakerAction::GetSessionStatus { .. } => state.control.session_status(session_id),
        SpeakerAction::Heartbeat => {
            let mut messages = vec![state.heartbeat.ack()];
            if let Ok(connection) = state.connections.get_connection(conn_id) {
                let eval = state.heartbeat.evaluate(conn_id, connected_at, connection.ttl);
                messages.extend(eval.messages);
                *close = eval.force_close;
            }
            return messages;
        }
        SpeakerAction::CreateSession { .. } => return Vec::new(),
    };

    match result {
        Ok(msg) => vec![msg],
        Err(e) => vec![OutboundMessage::error(&e)],
    }
}

/// Push one audio chunk through the ingestion pipeline: quality
/// analyzers, ASR feed, partial/final gating, translation fan-out, and
/// parallel synthesis + broadcast. Returns any quality-warning messages
/// due back to the speaker.
async fn ingest_audio(
    state: &AppState,
    session_id: &SessionId,
    conn_id: &ConnectionId,
    bytes: &[u8],
    quality: &mut QualityMonitor,
    close: &mut bool,
) -> Vec<OutboundMessage> {
    if validate_pcm16_chunk(bytes).is_err() {
        return Vec::new();
    }

    match state.rate_limiter.enforce_connection(
        Operation::AudioChunk,
        &conn_id.0,
        "RATE_LIMIT_AUDIO_CHUNK_WARN",
        "audio is arriving faster than the rate limit allows",
        "RATE_LIMIT_AUDIO_CHUNK",
        "sustained audio rate limit overage",
    ) {
        Ok(None) => {}
        Ok(Some(warning)) => return vec![OutboundMessage::error(&warning)],
        Err(e) => {
            *close = true;
            return vec![OutboundMessage::error(&e)];
        }
    }

    let samples = pcm16_samples(bytes);
    let elapsed_s = quality.started_at.elapsed().as_secs_f32();
    let mut warnings = Vec::new();

    let clipping = detect_clipping(&samples, 98.0, 1.0);
    if clipping.is_clipping {
        warnings.extend(state.control.quality_warning(
            session_id,
            conn_id,
            QualityWarningKind::Clipping,
            "high",
            "input audio is clipping",
            "lower microphone input gain",
        ));
    }
    let echo = detect_echo(&samples, state.config.audio.sample_rate, 10, 500, 6.0);
    if echo.has_echo {
        warnings.extend(state.control.quality_warning(
            session_id,
            conn_id,
            QualityWarningKind::Echo,
            "medium",
            "echo detected in input audio",
            "use headphones to avoid feedback",
        ));
    }
    let silence = quality.silence.detect(&samples, elapsed_s);
    if silence.is_silent {
        warnings.extend(state.control.quality_warning(
            session_id,
            conn_id,
            QualityWarningKind::Silence,
            "low",
            "sustained silence detected",
            "check the input device is active",
        ));
    }
    let snr_db = quality.snr.calculate(&samples);
    if snr_db < 10.0 {
        warnings.extend(state.control.quality_warning(
            session_id,
            conn_id,
            QualityWarningKind::LowSnr,
            "medium",
            "low signal-to-noise ratio",
            "reduce background noise",
        ));
    }

    let volume_level = classify_volume(silence.energy_db);
    let rate_wpm = quality.rate.update(&samples, elapsed_s);

    for event in state.asr.feed(session_id, bytes).await {
        let result = event.result;
        let forwarded = if result.is_final {
            match state.partial_results.on_final(&result) {
                crate::partial::ForwardDecision::Forward => vec![result.clone()],
                crate::partial::ForwardDecision::Suppress => Vec::new(),
            }
        } else {
            state.partial_results.on_partial(result.clone())
        };

        for result in forwarded {
            let segment = ForwardedSegment {
                session_id: session_id.clone(),
                source_language: result.source_language.clone(),
                text: result.text.clone(),
                emotion: EmotionDynamics { emotion: Emotion::Neutral, intensity: 0.0, rate_wpm, volume_level },
                is_final: result.is_final,
            };
            let language_results = state.translation.fan_out(&segment).await;
            let ssml_by_lang: Vec<(String, String)> = language_results.into_iter().map(|r| (r.language, r.ssml)).collect();
            let audio_by_lang = state.synthesis.synthesize_parallel(ssml_by_lang).await;
            for (language, audio) in audio_by_lang {
                state.broadcast.broadcast(session_id, &language, Arc::new(audio)).await;
            }
        }
    }

    warnings
}

async fn run_listener(
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut stream: futures::stream::SplitStream<WebSocket>,
    state: AppState,
    session_id: String,
    target_language: String,
) {
    let session_id = SessionId(session_id);

    let user_id = format!("anon-{}", uuid::Uuid::new_v4());
    if let Err(e) = state.rate_limiter.enforce(
        Operation::ListenerJoin,
        &user_id,
        "RATE_LIMIT_LISTENER_JOIN",
        "too many join attempts",
    ) {
        let _ = send_json(&mut sink, &OutboundMessage::error(&e)).await;
        return;
    }

    let listener_count = match state.sessions.increment_listeners(&session_id) {
        Ok(count) => count,
        Err(e) => {
            let _ = send_json(&mut sink, &OutboundMessage::error(&e)).await;
            return;
        }
    };

    let conn_id = ConnectionId::new();
    let connection = state.connections.register_listener(conn_id.clone(), session_id.clone(), target_language.clone(), user_id);

    let (tx, mut rx) = mpsc::unbounded_channel::<HubFrame>();
    state.ws_hub.register(conn_id.clone(), tx);

    let joined = OutboundMessage::ListenerJoined {
        session_id: session_id.to_string(),
        listener_count,
        target_language,
        timestamp: chrono::Utc::now(),
    };
    let joined_json = serde_json::to_string(&joined).expect("OutboundMessage always serializes");
    let speaker = state.connections.list_all(&session_id).into_iter().find(|c| c.role == ConnectionRole::Speaker);
    if let Some(speaker) = speaker {
        state.ws_hub.send_text(&speaker.connection_id, joined_json);
    }

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(HubFrame::Audio(audio)) => {
                        if sink.send(Message::Binary(audio.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(HubFrame::Text(text)) => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(action) = serde_json::from_str::<ListenerAction>(&text) else { continue };
                        if let Some(claimed) = action.claimed_session_id() {
                            if let Err(e) = state.connections.validate(&conn_id, &SessionId(claimed.to_string())) {
                                let _ = send_json(&mut sink, &OutboundMessage::error(&e)).await;
                                continue;
                            }
                        }
                        if !matches!(action, ListenerAction::Heartbeat) {
                            if let Err(e) = state.rate_limiter.enforce(
                                Operation::ControlMessage,
                                &conn_id.0,
                                "RATE_LIMIT_CONTROL_MESSAGE",
                                "too many control messages",
                            ) {
                                let _ = send_json(&mut sink, &OutboundMessage::error(&e)).await;
                                continue;
                            }
                        }
                        let mut close = false;
                        let outbound = match action {
                            ListenerAction::GetSessionStatus { .. } => state.control.session_status(&session_id).ok(),
                            ListenerAction::Heartbeat => {
                                let mut messages = vec![state.heartbeat.ack()];
                                let eval = state.heartbeat.evaluate(&conn_id, connection.connected_at, connection.ttl);
                                messages.extend(eval.messages);
                                close = eval.force_close;
                                for msg in messages {
                                    let _ = send_json(&mut sink, &msg).await;
                                }
                                None
                            }
                            ListenerAction::JoinSession { .. } => None,
                        };
                        if let Some(msg) = outbound {
                            let _ = send_json(&mut sink, &msg).await;
                        }
                        if close {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "listener websocket error");
                        break;
                    }
                }
            }
        }
    }

    state.ws_hub.unregister(&conn_id);
    state.heartbeat.forget(&conn_id);
    state.connections.remove_connection(&conn_id);
    let _ = state.sessions.decrement_listeners(&session_id);
    let _ = sink.close().await;
}
