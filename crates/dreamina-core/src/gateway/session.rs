//! Session provisioning contract.
//!
//! Minting a fresh session involves a browser-automated registration flow
//! that lives outside this crate; the gateway only consumes it through
//! this one-method contract.

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::region::SessionToken;

/// Opaque factory for fresh session tokens.
#[async_trait::async_trait]
pub trait SessionProvider: Send + Sync {
    /// Issue a fresh session token satisfying the session-token
    /// constraints (non-empty, known region prefix).
    async fn issue(&self) -> GatewayResult<String>;
}

/// Provider backed by an external provisioner service: one POST, one
/// `{token}` response.
pub struct HttpSessionProvider {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpSessionProvider {
    pub fn new(endpoint: String) -> Self {
        Self { http: reqwest::Client::new(), endpoint }
    }
}

#[async_trait::async_trait]
impl SessionProvider for HttpSessionProvider {
    async fn issue(&self) -> GatewayResult<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| GatewayError::Provisioning(format!("provisioner unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(GatewayError::Provisioning(format!(
                "provisioner returned {}",
                response.status()
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Provisioning(format!("unparseable provisioner body: {e}")))?;
        let token = payload
            .get("token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::Provisioning("provisioner returned no token".to_string()))?;

        // The contract requires a well-formed session token.
        SessionToken::parse(token)
            .map_err(|e| GatewayError::Provisioning(format!("provisioner issued a bad token: {e}")))?;
        Ok(token.to_string())
    }
}

/// Placeholder used when no provisioner is configured.
pub struct UnconfiguredSessionProvider;

#[async_trait::async_trait]
impl SessionProvider for UnconfiguredSessionProvider {
    async fn issue(&self) -> GatewayResult<String> {
        Err(GatewayError::Provisioning(
            "no session provisioner configured".to_string(),
        ))
    }
}
