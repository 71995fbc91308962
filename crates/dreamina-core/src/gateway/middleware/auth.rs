//! Session-pool extraction from the Authorization header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::header;

use crate::error::GatewayError;
use crate::gateway::token_pool::TokenPool;

/// Extractor wrapping the request's session-token pool.
///
/// The Authorization header carries one or more session tokens
/// (comma-separated) behind the usual `Bearer ` prefix; the pool is split
/// once and stays immutable for the request.
#[derive(Debug, Clone)]
pub struct SessionPool(pub TokenPool);

#[axum::async_trait]
impl<S> FromRequestParts<S> for SessionPool
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                GatewayError::Auth("missing Authorization header".to_string())
            })?;

        TokenPool::from_header(value).map(SessionPool)
    }
}
