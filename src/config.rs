//! Configuration management
//!
//! Layered TOML configuration for the broadcast server: store backend,
//! rate limits, buffer sizes, the static language-voice table, ASR
//! stability defaults, and partial-result rollout. Mirrors the
//! load/save shape of a conventional `serde`-backed `Config`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub partial_results: PartialResultsConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub providers: ProviderConfig,
}

/// Base URLs for the external collaborator services (ASR, translation,
/// synthesis). Each is a plain request/response HTTP API; an empty URL
/// means the provider is unconfigured and every call fails closed with
/// a transient-provider error rather than panicking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub asr_url: String,
    #[serde(default)]
    pub translate_url: String,
    #[serde(default)]
    pub synthesis_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub https: bool,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    7878
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            https: false,
            cert_path: None,
            key_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared HS256 secret used to verify bearer tokens.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Whether a listener connection may proceed without a bearer token.
    #[serde(default)]
    pub allow_anonymous_listeners: bool,
}

fn default_jwt_secret() -> String {
    "dev-only-insecure-secret-change-me".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            allow_anonymous_listeners: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_session_minutes")]
    pub max_session_minutes: i64,
    #[serde(default = "default_id_gen_attempts")]
    pub id_generator_max_attempts: u32,
    #[serde(default = "default_id_outer_retries")]
    pub id_outer_retries: u32,
    #[serde(default = "default_id_backoff_ms")]
    pub id_backoff_base_ms: u64,
}

fn default_max_session_minutes() -> i64 {
    120
}
fn default_id_gen_attempts() -> u32 {
    10
}
fn default_id_outer_retries() -> u32 {
    5
}
fn default_id_backoff_ms() -> u64 {
    50
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_session_minutes: default_max_session_minutes(),
            id_generator_max_attempts: default_id_gen_attempts(),
            id_outer_retries: default_id_outer_retries(),
            id_backoff_base_ms: default_id_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_chunk_ms")]
    pub chunk_ms: u32,
    #[serde(default = "default_buffer_seconds")]
    pub buffer_seconds: f32,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_snr_window")]
    pub snr_window_chunks: usize,
}

fn default_chunk_ms() -> u32 {
    100
}
fn default_buffer_seconds() -> f32 {
    5.0
}
fn default_sample_rate() -> u32 {
    16_000
}
fn default_snr_window() -> usize {
    20
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            chunk_ms: default_chunk_ms(),
            buffer_seconds: default_buffer_seconds(),
            sample_rate: default_sample_rate(),
            snr_window_chunks: default_snr_window(),
        }
    }
}

impl AudioConfig {
    pub fn capacity_chunks(&self) -> usize {
        ((self.buffer_seconds * 1000.0) / self.chunk_ms as f32) as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialResultsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rollout_pct")]
    pub rollout_percentage: u32,
    #[serde(default = "default_min_stability")]
    pub min_stability: f32,
    #[serde(default = "default_max_buffer_timeout_secs")]
    pub max_buffer_timeout_secs: f64,
    #[serde(default = "default_orphan_timeout_secs")]
    pub orphan_timeout_secs: f64,
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: i64,
    #[serde(default = "default_dedup_max_entries")]
    pub dedup_max_entries: usize,
    #[serde(default = "default_discrepancy_threshold")]
    pub discrepancy_threshold_pct: f64,
}

fn default_true() -> bool {
    true
}
fn default_rollout_pct() -> u32 {
    100
}
fn default_min_stability() -> f32 {
    0.85
}
fn default_max_buffer_timeout_secs() -> f64 {
    5.0
}
fn default_orphan_timeout_secs() -> f64 {
    20.0
}
fn default_dedup_ttl_secs() -> i64 {
    10
}
fn default_dedup_max_entries() -> usize {
    10_000
}
fn default_discrepancy_threshold() -> f64 {
    20.0
}

impl Default for PartialResultsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            rollout_percentage: default_rollout_pct(),
            min_stability: default_min_stability(),
            max_buffer_timeout_secs: default_max_buffer_timeout_secs(),
            orphan_timeout_secs: default_orphan_timeout_secs(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            dedup_max_entries: default_dedup_max_entries(),
            discrepancy_threshold_pct: default_discrepancy_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,
    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: usize,
    #[serde(default = "default_eviction_batch_pct")]
    pub eviction_batch_pct: f32,
    #[serde(default = "default_translate_timeout_ms")]
    pub translate_timeout_ms: u64,
    #[serde(default = "default_translate_retries")]
    pub translate_retries: u32,
    #[serde(default = "default_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    #[serde(default = "default_breaker_cooldown_secs")]
    pub circuit_breaker_cooldown_secs: i64,
}

fn default_cache_ttl_secs() -> i64 {
    3600
}
fn default_max_cache_entries() -> usize {
    50_000
}
fn default_eviction_batch_pct() -> f32 {
    0.02
}
fn default_translate_timeout_ms() -> u64 {
    1500
}
fn default_translate_retries() -> u32 {
    2
}
fn default_breaker_threshold() -> u32 {
    5
}
fn default_breaker_cooldown_secs() -> i64 {
    30
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            max_cache_entries: default_max_cache_entries(),
            eviction_batch_pct: default_eviction_batch_pct(),
            translate_timeout_ms: default_translate_timeout_ms(),
            translate_retries: default_translate_retries(),
            circuit_breaker_threshold: default_breaker_threshold(),
            circuit_breaker_cooldown_secs: default_breaker_cooldown_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default = "default_synth_deadline_ms")]
    pub per_call_deadline_ms: u64,
    #[serde(default = "default_synth_concurrency")]
    pub max_concurrent_calls: usize,
    #[serde(default)]
    pub voice_table: HashMap<String, String>,
}

fn default_synth_deadline_ms() -> u64 {
    2000
}
fn default_synth_concurrency() -> usize {
    50
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        let mut voice_table = HashMap::new();
        for (lang, voice) in default_voice_table_entries() {
            voice_table.insert(lang.to_string(), voice.to_string());
        }
        Self {
            per_call_deadline_ms: default_synth_deadline_ms(),
            max_concurrent_calls: default_synth_concurrency(),
            voice_table,
        }
    }
}

fn default_voice_table_entries() -> &'static [(&'static str, &'static str)] {
    &[
        ("en", "en-US-Neural-A"),
        ("es", "es-ES-Neural-A"),
        ("fr", "fr-FR-Neural-A"),
        ("de", "de-DE-Neural-A"),
        ("it", "it-IT-Neural-A"),
        ("pt", "pt-BR-Neural-A"),
        ("ja", "ja-JP-Neural-A"),
        ("ko", "ko-KR-Neural-A"),
        ("zh", "zh-CN-Neural-A"),
        ("ar", "ar-XA-Neural-A"),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_max_concurrent_broadcasts")]
    pub max_concurrent_broadcasts: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_max_concurrent_broadcasts() -> usize {
    100
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff_ms() -> u64 {
    100
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_concurrent_broadcasts: default_max_concurrent_broadcasts(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_connect_per_min")]
    pub connection_attempts_per_minute: u32,
    #[serde(default = "default_session_create_per_hour")]
    pub session_creates_per_hour: u32,
    #[serde(default = "default_listener_joins_per_min")]
    pub listener_joins_per_minute: u32,
    #[serde(default = "default_heartbeats_per_min")]
    pub heartbeats_per_minute: u32,
    #[serde(default = "default_audio_chunks_per_sec")]
    pub audio_chunks_per_second: u32,
    #[serde(default = "default_control_per_min")]
    pub control_messages_per_minute: u32,
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold_violations: u32,
    #[serde(default = "default_close_threshold")]
    pub close_threshold_violations: u32,
}

fn default_connect_per_min() -> u32 {
    30
}
fn default_session_create_per_hour() -> u32 {
    10
}
fn default_listener_joins_per_min() -> u32 {
    60
}
fn default_heartbeats_per_min() -> u32 {
    30
}
fn default_audio_chunks_per_sec() -> u32 {
    50
}
fn default_control_per_min() -> u32 {
    60
}
fn default_warning_threshold() -> u32 {
    3
}
fn default_close_threshold() -> u32 {
    15
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            connection_attempts_per_minute: default_connect_per_min(),
            session_creates_per_hour: default_session_create_per_hour(),
            listener_joins_per_minute: default_listener_joins_per_min(),
            heartbeats_per_minute: default_heartbeats_per_min(),
            audio_chunks_per_second: default_audio_chunks_per_sec(),
            control_messages_per_minute: default_control_per_min(),
            warning_threshold_violations: default_warning_threshold(),
            close_threshold_violations: default_close_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_refresh_minutes")]
    pub refresh_minutes: i64,
    #[serde(default = "default_warning_minutes")]
    pub warning_minutes: i64,
    #[serde(default = "default_quality_warning_cooldown_secs")]
    pub quality_warning_cooldown_secs: i64,
}

fn default_refresh_minutes() -> i64 {
    90
}
fn default_warning_minutes() -> i64 {
    110
}
fn default_quality_warning_cooldown_secs() -> i64 {
    60
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            refresh_minutes: default_refresh_minutes(),
            warning_minutes: default_warning_minutes(),
            quality_warning_cooldown_secs: default_quality_warning_cooldown_secs(),
        }
    }
}

impl Config {
    fn config_path() -> Result<PathBuf> {
        let dir = dirs_config_dir()?;
        Ok(dir.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config at {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("parsing config at {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("serializing config")?;
        std::fs::write(&path, contents)
            .with_context(|| format!("writing config at {}", path.display()))?;
        Ok(())
    }
}

fn dirs_config_dir() -> Result<PathBuf> {
    let base = std::env::var_os("BABELCAST_CONFIG_DIR")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config/babelcast")))
        .context("could not determine a config directory (set BABELCAST_CONFIG_DIR or HOME)")?;
    Ok(base)
}

/// Render the default configuration as TOML, used by `config init`.
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# default configuration\n".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_chunks_matches_spec_example() {
        // 5s buffer / 100ms chunks = 50 chunks
        let audio = AudioConfig::default();
        assert_eq!(audio.capacity_chunks(), 50);
    }

    #[test]
    fn default_round_trips_through_toml() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
    }
}
