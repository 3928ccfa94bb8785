//! End-to-end scenarios driven directly against the public component
//! APIs (no network/websocket layer), one test per literal scenario.

use async_trait::async_trait;
use babelcast::audio::AudioBuffer;
use babelcast::broadcast::{BroadcastHandler, FrameSender, SendOutcome};
use babelcast::config::Config;
use babelcast::connection::ConnectionRegistry;
use babelcast::metrics::{names, Metrics};
use babelcast::partial::PartialResultHandler;
use babelcast::ratelimit::{Operation, RateLimiter, Verdict};
use babelcast::session::SessionRegistry;
use babelcast::synthesis::{SynthesisError, SynthesisService, Synthesizer};
use babelcast::translate::{TranslateError, TranslationOrchestrator, Translator};
use babelcast::types::{ConnectionId, EmotionDynamics, ForwardedSegment, QualityTier, SessionId, TranscriptResult};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

/// Scenario 1: session creation and rejoin.
#[tokio::test]
async fn session_creation_and_listener_join() {
    let config = Config::default();
    let sessions = SessionRegistry::new(config.session.clone());
    let connections = ConnectionRegistry::new(60);

    let session = sessions.create_session("speaker-1", "en", QualityTier::Premium).await.unwrap();
    assert_eq!(session.listener_count, 0);
    assert_eq!(session.source_language, "en");

    let speaker_conn = ConnectionId::new();
    connections.register_speaker(speaker_conn, session.session_id.clone(), "speaker-1".to_string());

    let listener_conn = ConnectionId::new();
    connections.register_listener(listener_conn, session.session_id.clone(), "es".to_string(), "anon-a".to_string());
    let count = sessions.increment_listeners(&session.session_id).unwrap();

    assert_eq!(count, 1);
    assert_eq!(sessions.listener_count(&session.session_id), 1);
    assert_eq!(connections.unique_target_languages(&session.session_id), vec!["es".to_string()]);
}

struct FixedTranslator;

#[async_trait]
impl Translator for FixedTranslator {
    async fn translate(&self, _source: &str, target: &str, text: &str) -> Result<String, TranslateError> {
        Ok(format!("[{target}] {text}"))
    }
}

struct FixedSynthesizer {
    calls: AtomicU32,
}

#[async_trait]
impl Synthesizer for FixedSynthesizer {
    async fn synthesize(&self, voice: &str, ssml: &str) -> Result<Vec<u8>, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{voice}:{ssml}").into_bytes())
    }
}

struct RecordingSender {
    received: RwLock<Vec<(ConnectionId, Vec<u8>)>>,
}

#[async_trait]
impl FrameSender for RecordingSender {
    async fn send(&self, conn_id: &ConnectionId, audio: &[u8]) -> SendOutcome {
        self.received.write().unwrap().push((conn_id.clone(), audio.to_vec()));
        SendOutcome::Success
    }
}

/// Scenario 2: fan-out across languages, with a cache-hit check on a
/// repeated identical segment.
#[tokio::test]
async fn fan_out_across_languages() {
    let config = Config::default();
    let sessions = SessionRegistry::new(config.session.clone());
    let connections = Arc::new(ConnectionRegistry::new(60));
    let metrics = Arc::new(Metrics::new());

    let session = sessions.create_session("speaker-2", "en", QualityTier::Standard).await.unwrap();
    let a = ConnectionId::new();
    let b = ConnectionId::new();
    let c = ConnectionId::new();
    connections.register_listener(a.clone(), session.session_id.clone(), "es".to_string(), "a".to_string());
    connections.register_listener(b.clone(), session.session_id.clone(), "es".to_string(), "b".to_string());
    connections.register_listener(c.clone(), session.session_id.clone(), "fr".to_string(), "c".to_string());

    let translator = Arc::new(FixedTranslator);
    let orchestrator =
        TranslationOrchestrator::new(config.translation.clone(), translator, connections.clone(), metrics.clone());

    let synthesizer = Arc::new(FixedSynthesizer { calls: AtomicU32::new(0) });
    let synthesis = SynthesisService::new(config.synthesis.clone(), synthesizer.clone());

    let sender = Arc::new(RecordingSender { received: RwLock::new(Vec::new()) });
    let broadcast = BroadcastHandler::new(
        config.broadcast.clone(),
        connections.clone(),
        Arc::new(SessionRegistry::new(config.session.clone())),
        sender.clone(),
        metrics.clone(),
    );

    let segment = ForwardedSegment {
        session_id: session.session_id.clone(),
        source_language: "en".to_string(),
        text: "Hello everyone, this is important.".to_string(),
        emotion: EmotionDynamics::default(),
        is_final: true,
    };

    let first = orchestrator.fan_out(&segment).await;
    let mut languages: Vec<&str> = first.iter().map(|r| r.language.as_str()).collect();
    languages.sort();
    assert_eq!(languages, vec!["es", "fr"]);
    assert_eq!(metrics.counter(names::TRANSLATION_CACHE_MISS), 2);

    let ssml_by_lang: Vec<(String, String)> = first.into_iter().map(|r| (r.language, r.ssml)).collect();
    let audio_by_lang = synthesis.synthesize_parallel(ssml_by_lang).await;
    assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 2);

    for (lang, audio) in audio_by_lang {
        broadcast.broadcast(&session.session_id, &lang, Arc::new(audio)).await;
    }

    {
        let received = sender.received.read().unwrap();
        let for_a = received.iter().filter(|(id, _)| *id == a).count();
        let for_b = received.iter().filter(|(id, _)| *id == b).count();
        let for_c = received.iter().filter(|(id, _)| *id == c).count();
        assert_eq!(for_a, 1);
        assert_eq!(for_b, 1);
        assert_eq!(for_c, 1);
        let a_audio = &received.iter().find(|(id, _)| *id == a).unwrap().1;
        let b_audio = &received.iter().find(|(id, _)| *id == b).unwrap().1;
        assert_eq!(a_audio, b_audio);
    }

    // Second identical fan-out hits the translation cache: both
    // languages resolve from cache, no new misses recorded.
    let second = orchestrator.fan_out(&segment).await;
    assert_eq!(second.len(), 2);
    assert_eq!(metrics.counter(names::TRANSLATION_CACHE_HIT), 2);
    assert_eq!(metrics.counter(names::TRANSLATION_CACHE_MISS), 2);
}

fn transcript(session_id: &SessionId, result_id: &str, text: &str, is_final: bool, stability: Option<f32>) -> TranscriptResult {
    TranscriptResult {
        result_id: result_id.to_string(),
        session_id: session_id.clone(),
        source_language: "en".to_string(),
        text: text.to_string(),
        timestamp: Utc::now(),
        is_final,
        stability_score: stability,
        replaces_result_ids: None,
    }
}

/// Scenario 3: partial stability gating then final dedup suppression.
#[test]
fn partial_then_final_dedup() {
    let config = Config::default();
    assert_eq!(config.partial_results.min_stability, 0.85);
    assert_eq!(config.partial_results.max_buffer_timeout_secs, 5.0);

    let handler = PartialResultHandler::new(config.partial_results.clone());
    let session_id = SessionId("golden-eagle-427".to_string());

    let low = transcript(&session_id, "r1", "hello", false, Some(0.70));
    assert!(handler.on_partial(low).is_empty(), "below min_stability must not forward");

    // Stable and at a sentence boundary: clears all three forwarding gates.
    let stable = transcript(&session_id, "r1", "hello everyone.", false, Some(0.92));
    let forwarded = handler.on_partial(stable);
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].text, "hello everyone.");

    // The final's normalized text matches the already-forwarded partial's
    // normalized text, so it must be suppressed from a second broadcast.
    let fin = transcript(&session_id, "r2", "Hello everyone!", true, None);
    let decision = handler.on_final(&fin);
    assert!(matches!(decision, babelcast::partial::ForwardDecision::Suppress));
}

/// Scenario 4: broadcast to a bucket where one listener reports gone.
struct GoneForOne {
    gone: ConnectionId,
    received: RwLock<Vec<ConnectionId>>,
}

#[async_trait]
impl FrameSender for GoneForOne {
    async fn send(&self, conn_id: &ConnectionId, _audio: &[u8]) -> SendOutcome {
        if *conn_id == self.gone {
            return SendOutcome::Gone;
        }
        self.received.write().unwrap().push(conn_id.clone());
        SendOutcome::Success
    }
}

#[tokio::test]
async fn broadcast_with_a_gone_connection() {
    let config = Config::default();
    let sessions = Arc::new(SessionRegistry::new(config.session.clone()));
    let connections = Arc::new(ConnectionRegistry::new(60));
    let metrics = Arc::new(Metrics::new());

    let session = sessions.create_session("speaker-4", "en", QualityTier::Standard).await.unwrap();
    let c1 = ConnectionId::new();
    let c2 = ConnectionId::new();
    let c3 = ConnectionId::new();
    connections.register_listener(c1.clone(), session.session_id.clone(), "de".to_string(), "c1".to_string());
    connections.register_listener(c2.clone(), session.session_id.clone(), "de".to_string(), "c2".to_string());
    connections.register_listener(c3.clone(), session.session_id.clone(), "de".to_string(), "c3".to_string());
    sessions.increment_listeners(&session.session_id).unwrap();
    sessions.increment_listeners(&session.session_id).unwrap();
    sessions.increment_listeners(&session.session_id).unwrap();

    let sender = Arc::new(GoneForOne { gone: c2.clone(), received: RwLock::new(Vec::new()) });
    let broadcast = BroadcastHandler::new(
        config.broadcast.clone(),
        connections.clone(),
        sessions.clone(),
        sender.clone(),
        metrics,
    );

    let counts = broadcast.broadcast(&session.session_id, "de", Arc::new(vec![1, 2, 3])).await;

    assert_eq!(counts.success, 2);
    assert_eq!(counts.stale, 1);
    assert!(connections.get_connection(&c2).is_err(), "gone connection must be removed");
    assert_eq!(sessions.listener_count(&session.session_id), 2);
    let received = sender.received.read().unwrap();
    assert!(received.contains(&c1));
    assert!(received.contains(&c3));
}

/// Scenario 5: backpressure overflow drops exactly the oldest excess chunks.
#[test]
fn backpressure_overflow_drops_oldest() {
    let config = Config::default();
    assert_eq!(config.audio.capacity_chunks(), 50);

    let mut buffer = AudioBuffer::new(&config.audio);
    for i in 0..60u32 {
        buffer.push(vec![i as u8]);
    }

    assert_eq!(buffer.len(), 50);
    assert_eq!(buffer.overflow_count, 10);
    assert_eq!(buffer.total_dropped, 10);
    assert_eq!(buffer.total_added, 60);

    // Ingestion continues: the buffer still drains in order, oldest-first
    // among what survived (chunks 0..=9 were dropped).
    assert_eq!(buffer.pop().unwrap(), vec![10u8]);
}

/// Scenario 6: sustained audio-chunk overage first warns, then closes.
#[test]
fn rate_limit_escalation_warns_then_closes() {
    let mut limits = HashMap::new();
    limits.insert(Operation::AudioChunk, 50u32);
    let limiter = RateLimiter::new(limits, 3, 6);

    let mut warned = false;
    let mut closed = false;
    for _ in 0..200 {
        match limiter.check(Operation::AudioChunk, "speaker-6") {
            Ok(Verdict::Allowed) => {}
            Ok(Verdict::WarnAndAllow) => warned = true,
            Ok(Verdict::CloseConnection) => closed = true,
            Err(_) => closed = true,
        }
    }

    assert!(warned, "a warning verdict must fire once the warning threshold is crossed");
    assert!(closed, "sustained overage past the close threshold must close the connection");
}
