//! Parallel Synthesis Service: turns `{language -> ssml}` into
//! `{language -> audioBytes}`, one neural voice per language from a
//! static table, each call bounded by a deadline and a process-wide
//! concurrency cap.
//!
//! The synthesis provider itself is an external collaborator, same
//! posture as [`crate::translate::Translator`] and [`crate::asr::AsrStream`].

use crate::config::SynthesisConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct SynthesisError(pub String);

/// The neural TTS provider contract: render one SSML document with a
/// named voice into PCM16 LE mono 16 kHz audio bytes.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, voice: &str, ssml: &str) -> Result<Vec<u8>, SynthesisError>;
}

pub struct SynthesisService {
    config: SynthesisConfig,
    synthesizer: Arc<dyn Synthesizer>,
    concurrency: Arc<Semaphore>,
}

impl SynthesisService {
    pub fn new(config: SynthesisConfig, synthesizer: Arc<dyn Synthesizer>) -> Self {
        let concurrency = Arc::new(Semaphore::new(config.max_concurrent_calls));
        Self { config, synthesizer, concurrency }
    }

    /// Synthesizes every `{language -> ssml}` entry in parallel under the
    /// shared concurrency cap, returning only the languages that
    /// succeeded within their per-call deadline.
    pub async fn synthesize_parallel(&self, ssml_by_lang: Vec<(String, String)>) -> HashMap<String, Vec<u8>> {
        let tasks = ssml_by_lang.into_iter().map(|(language, ssml)| self.synthesize_one(language, ssml));
        let results = futures::future::join_all(tasks).await;
        results.into_iter().flatten().collect()
    }

    async fn synthesize_one(&self, language: String, ssml: String) -> Option<(String, Vec<u8>)> {
        let Some(voice) = self.config.voice_table.get(&language).cloned() else {
            warn!(language, "unsupported_language: no voice configured, skipping synthesis");
            return None;
        };

        let _permit = self.concurrency.acquire().await.ok()?;
        let deadline = Duration::from_millis(self.config.per_call_deadline_ms);
        match tokio::time::timeout(deadline, self.synthesizer.synthesize(&voice, &ssml)).await {
            Ok(Ok(audio)) => Some((language, audio)),
            Ok(Err(e)) => {
                warn!(language, voice, error = %e.0, "synthesis call failed, skipping language");
                None
            }
            Err(_) => {
                warn!(language, voice, "synthesis call exceeded its deadline, skipping language");
                None
            }
        }
    }
}
