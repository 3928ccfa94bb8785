//! Translation Fan-Out Orchestrator: for each forwarded transcript,
//! translates and synthesizes into every listening language in parallel,
//! then hands each language's audio to the broadcast handler.
//!
//! The translator and synthesizer are external collaborators (same
//! posture as the ASR stream): this module owns the cache, the circuit
//! breaker, and the per-language fan-out shape, programmed against a
//! `Translator` trait.

pub mod breaker;
pub mod cache;

use crate::config::TranslationConfig;
use crate::connection::ConnectionRegistry;
use crate::metrics::{names, Metrics};
use crate::ssml;
use crate::types::ForwardedSegment;
use async_trait::async_trait;
use breaker::CircuitBreaker;
use cache::TranslationCache;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct TranslateError(pub String);

/// The translation provider contract. A real deployment backs this with
/// a cloud translation API; tests use an in-process fake.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, source_lang: &str, target_lang: &str, text: &str) -> Result<String, TranslateError>;
}

/// One target language's outcome for a single fan-out segment: the SSML
/// ready for synthesis, or why that language was skipped.
pub struct LanguageResult {
    pub language: String,
    pub ssml: String,
}

/// Translates and SSML-renders a forwarded segment into every language
/// currently listening to its session, skipping languages whose
/// translator call fails without blocking the others.
pub struct TranslationOrchestrator {
    config: TranslationConfig,
    cache: TranslationCache,
    breaker: CircuitBreaker,
    translator: Arc<dyn Translator>,
    connections: Arc<ConnectionRegistry>,
    metrics: Arc<Metrics>,
}

impl TranslationOrchestrator {
    pub fn new(
        config: TranslationConfig,
        translator: Arc<dyn Translator>,
        connections: Arc<ConnectionRegistry>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let cache = TranslationCache::new(config.cache_ttl_secs, config.max_cache_entries, config.eviction_batch_pct);
        let breaker = CircuitBreaker::new(
            config.circuit_breaker_threshold,
            Duration::from_secs(config.circuit_breaker_cooldown_secs.max(0) as u64),
        );
        Self { config, cache, breaker, translator, connections, metrics }
    }

    /// Fan out one forwarded segment across every unique target language
    /// of its session. Returns only the languages that produced SSML;
    /// languages with no listeners or a persistent translate failure are
    /// silently absent (the orchestrator logs and counts them).
    pub async fn fan_out(&self, segment: &ForwardedSegment) -> Vec<LanguageResult> {
        let listener_count = self.connections.list_listeners(&segment.session_id).len();
        if listener_count == 0 {
            return Vec::new();
        }

        let languages = self.connections.unique_target_languages(&segment.session_id);
        let start = std::time::Instant::now();

        let mut tasks = Vec::new();
        for language in languages {
            if language == segment.source_language {
                continue;
            }
            tasks.push(self.translate_one(segment, language));
        }
        let results: Vec<Option<LanguageResult>> = futures::future::join_all(tasks).await;

        self.metrics.observe(names::FANOUT_DURATION_MS, start.elapsed().as_millis() as f64);
        self.metrics.incr_by("fanout.listener_count", listener_count as u64);
        results.into_iter().flatten().collect()
    }

    async fn translate_one(&self, segment: &ForwardedSegment, language: String) -> Option<LanguageResult> {
        let text = match self.translate_with_cache(&segment.source_language, &language, &segment.text).await {
            Ok(text) => text,
            Err(e) => {
                warn!(session_id = %segment.session_id, language, error = %e.0, "translation failed for language, skipping");
                self.metrics.incr(names::FANOUT_LANGUAGE_FAILURE);
                return None;
            }
        };
        let ssml = ssml::generate(&text, segment.emotion);
        Some(LanguageResult { language, ssml })
    }

    async fn translate_with_cache(
        &self,
        source_lang: &str,
        target_lang: &str,
        text: &str,
    ) -> Result<String, TranslateError> {
        if let Some(cached) = self.cache.get(source_lang, target_lang, text) {
            self.metrics.incr(names::TRANSLATION_CACHE_HIT);
            return Ok(cached);
        }
        self.metrics.incr(names::TRANSLATION_CACHE_MISS);

        if self.breaker.is_open() {
            return Err(TranslateError("circuit breaker open for translation service".into()));
        }

        let mut last_err = None;
        for attempt in 0..=self.config.translate_retries {
            let deadline = Duration::from_millis(self.config.translate_timeout_ms);
            match tokio::time::timeout(deadline, self.translator.translate(source_lang, target_lang, text)).await {
                Ok(Ok(translated)) => {
                    self.breaker.record_success();
                    self.cache.insert(source_lang, target_lang, text, translated.clone());
                    return Ok(translated);
                }
                Ok(Err(e)) => {
                    self.breaker.record_failure();
                    last_err = Some(e);
                }
                Err(_) => {
                    self.breaker.record_failure();
                    last_err = Some(TranslateError("translate call timed out".into()));
                }
            }
            if attempt < self.config.translate_retries {
                tokio::time::sleep(Duration::from_millis(50 * (attempt as u64 + 1))).await;
            }
        }
        Err(last_err.unwrap_or_else(|| TranslateError("translation failed with no recorded error".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionId, Emotion, EmotionDynamics, SessionId, VolumeLevel};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTranslator {
        calls: AtomicUsize,
        fail_for: Vec<String>,
    }

    #[async_trait]
    impl Translator for FakeTranslator {
        async fn translate(&self, _source: &str, target: &str, text: &str) -> Result<String, TranslateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_for.iter().any(|l| l == target) {
                return Err(TranslateError("simulated provider failure".into()));
            }
            Ok(format!("[{target}] {text}"))
        }
    }

    fn segment(session: &SessionId) -> ForwardedSegment {
        ForwardedSegment {
            session_id: session.clone(),
            source_language: "en".into(),
            text: "Hello everyone, this is important.".into(),
            emotion: EmotionDynamics { emotion: Emotion::Neutral, intensity: 0.0, rate_wpm: 150, volume_level: VolumeLevel::Normal },
            is_final: true,
        }
    }

    fn setup(fail_for: Vec<&str>) -> (TranslationOrchestrator, SessionId) {
        let session = SessionId("golden-eagle-427".into());
        let connections = Arc::new(ConnectionRegistry::new(120));
        connections.register_listener(ConnectionId::new(), session.clone(), "es".into(), "anon-1".into());
        connections.register_listener(ConnectionId::new(), session.clone(), "fr".into(), "anon-2".into());
        let translator = Arc::new(FakeTranslator {
            calls: AtomicUsize::new(0),
            fail_for: fail_for.into_iter().map(String::from).collect(),
        });
        let orchestrator = TranslationOrchestrator::new(
            TranslationConfig::default(),
            translator,
            connections,
            Arc::new(Metrics::new()),
        );
        (orchestrator, session)
    }

    #[tokio::test]
    async fn fans_out_to_every_unique_target_language() {
        let (orchestrator, session) = setup(vec![]);
        let mut results = orchestrator.fan_out(&segment(&session)).await;
        results.sort_by(|a, b| a.language.cmp(&b.language));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].language, "es");
        assert_eq!(results[1].language, "fr");
    }

    #[tokio::test]
    async fn a_failed_language_is_skipped_without_blocking_siblings() {
        let (orchestrator, session) = setup(vec!["fr"]);
        let results = orchestrator.fan_out(&segment(&session)).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].language, "es");
    }

    #[tokio::test]
    async fn no_listeners_means_no_translate_calls() {
        let session = SessionId("empty-session-001".into());
        let connections = Arc::new(ConnectionRegistry::new(120));
        let translator = Arc::new(FakeTranslator { calls: AtomicUsize::new(0), fail_for: vec![] });
        let orchestrator =
            TranslationOrchestrator::new(TranslationConfig::default(), translator, connections, Arc::new(Metrics::new()));
        let results = orchestrator.fan_out(&segment(&session)).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn repeated_identical_text_hits_the_cache_on_the_second_call() {
        let (orchestrator, session) = setup(vec![]);
        orchestrator.fan_out(&segment(&session)).await;
        orchestrator.fan_out(&segment(&session)).await;
        let snap = orchestrator.metrics.snapshot();
        assert!(snap.counters[names::TRANSLATION_CACHE_HIT] >= 2);
    }
}
