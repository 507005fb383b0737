//! Rehab coaching server library logic.

pub mod api;
pub mod config;
pub mod sessions;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use config::Config;
use rehab_agent::SessionOrchestrator;
use rehab_db::DbPool;
use rehab_voice::{
    default_registry, CallClient, CapabilityRegistry, CapabilityResolver, ClientHandle,
    ResolveContext,
};
use sessions::SessionManager;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Loaded server configuration.
    pub config: Arc<Config>,
    /// Server-side call client used for join tokens and handed to transports.
    pub call_client: ClientHandle,
    /// Live coaching sessions.
    pub sessions: SessionManager,
}

impl AppState {
    /// Builds state with the provider registry derived from `config.voice`.
    pub fn new(config: Config, pool: DbPool) -> Self {
        let registry = default_registry(&config.voice);
        Self::with_registry(config, pool, registry)
    }

    /// Builds state around an explicit provider registry.
    pub fn with_registry(config: Config, pool: DbPool, registry: CapabilityRegistry) -> Self {
        let call_client = CallClient::new(config.voice.livekit.clone()).into_handle();
        let resolver = CapabilityResolver::new(Arc::new(registry));
        let orchestrator =
            SessionOrchestrator::new(resolver, ResolveContext::with_client(call_client.clone()))
                .with_agent(config.agent.identity());
        let sessions = SessionManager::new(orchestrator, pool.clone(), config.agent.launch_delay());

        Self {
            pool,
            config: Arc::new(config),
            call_client,
            sessions,
        }
    }
}

/// Maximum request body size (64 KiB). Start requests are tiny.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Maximum patient media body (10 MiB): one utterance or one camera frame.
const MAX_MEDIA_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(api::health_handler))
        .route("/token", get(api::token_handler))
        .route("/start-agent", post(api::start_agent_handler))
        .route("/api/sessions", get(api::list_sessions_handler))
        .route("/api/sessions/{callId}", get(api::get_session_handler))
        .route(
            "/api/sessions/{callId}/finish",
            post(api::finish_session_handler),
        )
        .route(
            "/api/sessions/{callId}/speech",
            post(api::speech_handler).layer(DefaultBodyLimit::max(MAX_MEDIA_BODY_BYTES)),
        )
        .route(
            "/api/sessions/{callId}/frames",
            post(api::frame_handler).layer(DefaultBodyLimit::max(MAX_MEDIA_BODY_BYTES)),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(Arc::new(state)))
}
