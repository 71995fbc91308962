//! Axum application state and router.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::generator::Generator;
use super::handlers;
use super::session::{HttpSessionProvider, SessionProvider, UnconfiguredSessionProvider};
use super::upstream::UpstreamClient;
use crate::modules::config::AppConfig;

/// Shared application state. Everything inside is either immutable or its
/// own synchronization domain, so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<Generator>,
    pub upstream: Arc<UpstreamClient>,
    pub config: Arc<AppConfig>,
    pub session_provider: Arc<dyn SessionProvider>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self::with_upstream(config, UpstreamClient::new())
    }

    /// Build state around a specific upstream client (tests point it at a
    /// stub server).
    pub fn with_upstream(config: AppConfig, upstream: UpstreamClient) -> Self {
        let config = Arc::new(config);
        let upstream = Arc::new(upstream);
        let session_provider: Arc<dyn SessionProvider> =
            match config.session_provisioner_url.clone() {
                Some(url) => Arc::new(HttpSessionProvider::new(url)),
                None => Arc::new(UnconfiguredSessionProvider),
            };

        Self {
            generator: Arc::new(Generator::new(upstream.clone(), config.clone())),
            upstream,
            config,
            session_provider,
        }
    }
}

/// Build the public router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(handlers::common::handle_ping))
        .route("/healthz", get(handlers::common::handle_health))
        .route("/v1/models", get(handlers::models::handle_list_models))
        .route(
            "/v1/images/generations",
            post(handlers::images::handle_generations),
        )
        .route(
            "/v1/images/compositions",
            post(handlers::images::handle_compositions),
        )
        .route(
            "/v1/videos/generations",
            post(handlers::videos::handle_generations),
        )
        .route(
            "/v1/chat/completions",
            post(handlers::chat::handle_chat_completions),
        )
        .route(
            "/v1/session/generate",
            post(handlers::session::handle_generate_session),
        )
        .layer(DefaultBodyLimit::max(64 * 1024 * 1024))
        .layer(axum::middleware::from_fn(
            super::middleware::log_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
