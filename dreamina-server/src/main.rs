//! Dreamina Gateway - Headless Daemon
//!
//! A pure Rust HTTP server exposing an OpenAI-compatible surface on /v1/*
//! and translating it into the upstream's draft → poll → collect protocol.

use anyhow::{Context, Result};
use std::net::SocketAddr;

use dreamina_core::gateway::server::{build_router, AppState};
use dreamina_core::modules::{config, logger};

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_logger();

    let mut app_config = config::load_config()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to load configuration")?;

    // Env takes precedence over the config file for the listen port.
    if let Some(port) = std::env::var("DREAMINA_PORT").ok().and_then(|p| p.parse().ok()) {
        app_config.server.port = port;
    }

    let addr: SocketAddr = format!("{}:{}", app_config.server.host, app_config.server.port)
        .parse()
        .context("Invalid listen address")?;

    tracing::info!("Starting Dreamina gateway on {}", addr);
    if app_config.session_provisioner_url.is_some() {
        tracing::info!("Session provisioner configured");
    }

    let state = AppState::new(app_config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!("Gateway listening on http://{}", addr);
    tracing::info!("OpenAI-compatible endpoints at http://{}/v1/", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
