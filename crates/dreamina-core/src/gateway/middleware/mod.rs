//! Request middleware and extractors.

pub mod auth;

pub use auth::SessionPool;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Log every request; health traffic stays at trace level.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let is_health_check = path == "/ping" || path == "/healthz";
    if is_health_check {
        tracing::trace!("Heartbeat: {} {}", method, path);
    } else {
        tracing::info!("Request: {} {}", method, path);
    }

    next.run(request).await
}
