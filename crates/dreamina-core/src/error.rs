//! Unified error types for the Dreamina gateway.
//!
//! Each variant corresponds to one stable public error kind; the kind string
//! is part of the API contract and is what clients switch on.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main error type for all gateway operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// Client payload failed field constraints.
    #[error("{0}")]
    Validation(String),

    /// Missing/expired session, or 401/403 from the upstream.
    #[error("{0}")]
    Auth(String),

    /// The session provider refused or timed out.
    #[error("{0}")]
    Provisioning(String),

    /// `get_upload_token` non-success or missing fields.
    #[error("upload token request failed: {0}")]
    UploadToken(String),

    /// `ApplyImageUpload` non-success or `ResponseMetadata.Error`.
    #[error("upload apply failed: {0}")]
    UploadApply(String),

    /// Object-store PUT non-2xx or network failure.
    #[error("upload put failed: {0}")]
    UploadPut(String),

    /// Commit non-success or `UriStatus != 2000`.
    #[error("upload commit failed: {0}")]
    UploadCommit(String),

    /// `aigc_draft/generate` did not return a history record id.
    #[error("draft submit failed: {0}")]
    DraftSubmit(String),

    /// Polling exceeded the configured tick budget.
    #[error("generation timed out: {0}")]
    PollTimeout(String),

    /// No item progress beyond the stall threshold.
    #[error("generation stalled: {0}")]
    PollStall(String),

    /// The upstream reported a terminal failure status or fail code.
    #[error("generation failed [{code}]: {message}")]
    PollRemoteFailed { code: String, message: String },

    /// Low-level HTTP/DNS failure not otherwise classified.
    #[error("{0}")]
    Transport(String),

    /// Unclassified upstream 5xx or response shape surprise.
    #[error("{0}")]
    Server(String),
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Stable kind string surfaced to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Auth(_) => "auth",
            Self::Provisioning(_) => "provisioning",
            Self::UploadToken(_) => "upload-token",
            Self::UploadApply(_) => "upload-apply",
            Self::UploadPut(_) => "upload-put",
            Self::UploadCommit(_) => "upload-commit",
            Self::DraftSubmit(_) => "draft-submit",
            Self::PollTimeout(_) => "poll-timeout",
            Self::PollStall(_) => "poll-stall",
            Self::PollRemoteFailed { .. } => "poll-remote-failed",
            Self::Transport(_) => "transport",
            Self::Server(_) => "server",
        }
    }

    /// HTTP status the kind maps to on the public surface.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Provisioning(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PollTimeout(_) | Self::PollStall(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Server(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Transport(e.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        });
        tracing::debug!("Responding with {} error: {}", self.kind(), self);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(GatewayError::Validation(String::new()).kind(), "validation");
        assert_eq!(
            GatewayError::UploadCommit(String::new()).kind(),
            "upload-commit"
        );
        assert_eq!(
            GatewayError::PollRemoteFailed {
                code: "2038".into(),
                message: String::new()
            }
            .kind(),
            "poll-remote-failed"
        );
    }

    #[test]
    fn validation_maps_to_bad_request() {
        let err = GatewayError::Validation("duration out of range".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
