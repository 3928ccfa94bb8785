//! HTTP-backed implementations of the three external-collaborator
//! traits (`AsrStream`, `Translator`, `Synthesizer`). Each is a thin
//! `reqwest` client against a configurable base URL; an empty URL
//! means the provider isn't wired up and every call fails closed with
//! a transient error rather than panicking, so the rest of the
//! pipeline's retry/circuit-breaker/skip-on-failure machinery applies
//! uniformly whether the outage is ours or the provider's.

use crate::asr::{AsrEvent, AsrStream};
use crate::synthesis::{SynthesisError, Synthesizer};
use crate::translate::{TranslateError, Translator};
use crate::types::SessionId;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub struct HttpAsr {
    client: Client,
    base_url: String,
}

impl HttpAsr {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[derive(Serialize)]
struct AsrRequest<'a> {
    session_id: &'a str,
    #[serde(with = "base64_bytes")]
    chunk: &'a [u8],
}

#[derive(Deserialize)]
struct AsrResponse {
    events: Vec<AsrEventWire>,
}

#[derive(Deserialize)]
struct AsrEventWire {
    result_id: String,
    text: String,
    is_final: bool,
    stability_score: Option<f32>,
    replaces_result_ids: Option<Vec<String>>,
}

#[async_trait]
impl AsrStream for HttpAsr {
    async fn feed(&self, session_id: &SessionId, chunk: &[u8]) -> Vec<AsrEvent> {
        if self.base_url.is_empty() {
            return Vec::new();
        }
        let request = AsrRequest { session_id: session_id.as_ref(), chunk };
        let response = self.client.post(format!("{}/feed", self.base_url)).json(&request).send().await;
        let Ok(response) = response else { return Vec::new() };
        let Ok(body) = response.json::<AsrResponse>().await else { return Vec::new() };
        body.events
            .into_iter()
            .map(|e| AsrEvent {
                result: crate::types::TranscriptResult {
                    result_id: e.result_id,
                    session_id: session_id.clone(),
                    source_language: String::new(),
                    text: e.text,
                    timestamp: chrono::Utc::now(),
                    is_final: e.is_final,
                    stability_score: e.stability_score,
                    replaces_result_ids: e.replaces_result_ids,
                },
            })
            .collect()
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &&[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }
}

pub struct HttpTranslator {
    client: Client,
    base_url: String,
}

impl HttpTranslator {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    source_lang: &'a str,
    target_lang: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translated_text: String,
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, source_lang: &str, target_lang: &str, text: &str) -> Result<String, TranslateError> {
        if self.base_url.is_empty() {
            return Err(TranslateError("translation provider not configured".into()));
        }
        let request = TranslateRequest { source_lang, target_lang, text };
        let response = self
            .client
            .post(format!("{}/translate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| TranslateError(format!("translation request failed: {e}")))?;
        let body = response
            .json::<TranslateResponse>()
            .await
            .map_err(|e| TranslateError(format!("translation response malformed: {e}")))?;
        Ok(body.translated_text)
    }
}

pub struct HttpSynthesizer {
    client: Client,
    base_url: String,
}

impl HttpSynthesizer {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    voice: &'a str,
    ssml: &'a str,
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, voice: &str, ssml: &str) -> Result<Vec<u8>, SynthesisError> {
        if self.base_url.is_empty() {
            return Err(SynthesisError("synthesis provider not configured".into()));
        }
        let request = SynthesizeRequest { voice, ssml };
        let response = self
            .client
            .post(format!("{}/synthesize", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| SynthesisError(format!("synthesis request failed: {e}")))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SynthesisError(format!("synthesis response unreadable: {e}")))?;
        Ok(bytes.to_vec())
    }
}
