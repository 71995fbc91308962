//! Session provisioning endpoint.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::error::GatewayResult;
use crate::gateway::server::AppState;

/// POST /v1/session/generate — mint a fresh session via the configured
/// provider.
pub async fn handle_generate_session(
    State(state): State<AppState>,
) -> GatewayResult<impl IntoResponse> {
    let token = state.session_provider.issue().await?;
    tracing::info!("Issued a fresh session token");

    Ok(Json(json!({
        "sessionId": token,
        "message": "Session created. Use it as the Bearer token of subsequent requests.",
        "timestamp": chrono::Utc::now().timestamp(),
    })))
}
