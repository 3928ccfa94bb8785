//! Web server: REST session CRUD plus the speaker/listener websocket.
//!
//! Routing and TLS bring-up follow the teacher's `server::mod::start`
//! shape (CORS layer, `TraceLayer`, optional rustls bind); the routes
//! and message loop are new, built against the wire protocol in
//! [`crate::protocol`].

pub mod rest;
pub mod ws;

use crate::asr::AsrSessionManager;
use crate::auth::TokenValidator;
use crate::broadcast::{BroadcastHandler, FrameSender};
use crate::config::Config;
use crate::connection::ConnectionRegistry;
use crate::control::ControlRouter;
use crate::heartbeat::HeartbeatMonitor;
use crate::metrics::Metrics;
use crate::partial::PartialResultHandler;
use crate::providers::{HttpAsr, HttpSynthesizer, HttpTranslator};
use crate::ratelimit::{Operation, RateLimiter};
use crate::session::SessionRegistry;
use crate::synthesis::SynthesisService;
use crate::translate::TranslationOrchestrator;
use anyhow::{Context, Result};
use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Everything a request handler or connection task needs, shared
/// behind `Arc` clones (mirrors `ServerState` in the teacher).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
    pub connections: Arc<ConnectionRegistry>,
    pub token_validator: Arc<TokenValidator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub asr: Arc<AsrSessionManager>,
    pub partial_results: Arc<PartialResultHandler>,
    pub translation: Arc<TranslationOrchestrator>,
    pub synthesis: Arc<SynthesisService>,
    pub broadcast: Arc<BroadcastHandler>,
    pub control: Arc<ControlRouter>,
    pub heartbeat: Arc<HeartbeatMonitor>,
    pub metrics: Arc<Metrics>,
    pub ws_hub: Arc<ws::WsHub>,
}

fn rate_limits_from_config(cfg: &crate::config::RateLimitConfig) -> HashMap<Operation, u32> {
    let mut limits = HashMap::new();
    limits.insert(Operation::Connect, cfg.connection_attempts_per_minute);
    limits.insert(Operation::SessionCreate, cfg.session_creates_per_hour);
    limits.insert(Operation::ListenerJoin, cfg.listener_joins_per_minute);
    limits.insert(Operation::Heartbeat, cfg.heartbeats_per_minute);
    limits.insert(Operation::AudioChunk, cfg.audio_chunks_per_second);
    limits.insert(Operation::ControlMessage, cfg.control_messages_per_minute);
    limits
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let metrics = Arc::new(Metrics::new());
        let http_client = reqwest::Client::new();
        let ws_hub = Arc::new(ws::WsHub::new());

        let sessions = Arc::new(SessionRegistry::new(config.session.clone()));
        let connections = Arc::new(ConnectionRegistry::new(config.session.max_session_minutes));
        let token_validator = Arc::new(TokenValidator::new(config.auth.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(
            rate_limits_from_config(&config.rate_limits),
            config.rate_limits.warning_threshold_violations,
            config.rate_limits.close_threshold_violations,
        ));
        let asr = Arc::new(AsrSessionManager::new(Box::new(HttpAsr::new(
            http_client.clone(),
            config.providers.asr_url.clone(),
        ))));
        let partial_results = Arc::new(PartialResultHandler::new(config.partial_results.clone()));
        let translator = Arc::new(HttpTranslator::new(http_client.clone(), config.providers.translate_url.clone()));
        let translation = Arc::new(TranslationOrchestrator::new(
            config.translation.clone(),
            translator,
            connections.clone(),
            metrics.clone(),
        ));
        let synthesizer = Arc::new(HttpSynthesizer::new(http_client, config.providers.synthesis_url.clone()));
        let synthesis = Arc::new(SynthesisService::new(config.synthesis.clone(), synthesizer));
        let broadcast = Arc::new(BroadcastHandler::new(
            config.broadcast.clone(),
            connections.clone(),
            sessions.clone(),
            ws_hub.clone() as Arc<dyn FrameSender>,
            metrics.clone(),
        ));
        let control = Arc::new(ControlRouter::new(
            sessions.clone(),
            connections.clone(),
            config.heartbeat.quality_warning_cooldown_secs,
        ));
        let heartbeat = Arc::new(HeartbeatMonitor::new(config.heartbeat.clone()));

        Self {
            config: Arc::new(config),
            sessions,
            connections,
            token_validator,
            rate_limiter,
            asr,
            partial_results,
            translation,
            synthesis,
            broadcast,
            control,
            heartbeat,
            metrics,
            ws_hub,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/sessions", post(rest::create_session))
        .route("/sessions/{id}", get(rest::get_session))
        .route("/sessions/{id}", patch(rest::patch_session))
        .route("/sessions/{id}", delete(rest::delete_session))
        .route("/health", get(rest::health))
        .route("/ws", get(ws::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve, mirroring the teacher's plain-HTTP/rustls-TLS
/// branch in `server::mod::start`.
pub async fn serve(config: Config) -> Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let https = config.server.https;
    let cert_path = config.server.cert_path.clone();
    let key_path = config.server.key_path.clone();

    let state = AppState::new(config);
    let app = router(state);
    let addr: SocketAddr = format!("{host}:{port}").parse().context("parsing bind address")?;

    tracing::info!(%addr, https, "babelcast server starting");

    if https {
        if let (Some(cert_path), Some(key_path)) = (cert_path, key_path) {
            let cert_data = tokio::fs::read(&cert_path).await.context("reading TLS certificate")?;
            let key_data = tokio::fs::read(&key_path).await.context("reading TLS key")?;
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem(cert_data, key_data).await?;
            axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
            return Ok(());
        }
    }

    let listener = tokio::net::TcpListener::bind(addr).await.context("binding listener")?;
    axum::serve(listener, app).await?;
    Ok(())
}
