//! Upstream HTTP client.
//!
//! One shared connection pool for every upstream exchange: the `/mweb` API
//! on the web origin, the ImageX object-store API, and raw artifact
//! fetches. Hosts normally come from the region table; overrides exist for
//! tests and for fronting deployments.

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use tokio::time::Duration;

use super::region::{format_auth, RegionInfo, SessionToken};
use crate::error::{GatewayError, GatewayResult};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/125.0.0.0 Safari/537.36";

const WEB_VERSION: &str = "7.5.0";

pub struct UpstreamClient {
    http: Client,
    origin_override: Option<String>,
    imagex_override: Option<String>,
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamClient {
    /// Build the shared client. `DREAMINA_UPSTREAM_URL` and
    /// `DREAMINA_IMAGEX_URL` override the region-table hosts.
    pub fn new() -> Self {
        Self::with_overrides(
            std::env::var("DREAMINA_UPSTREAM_URL").ok(),
            std::env::var("DREAMINA_IMAGEX_URL").ok(),
        )
    }

    #[allow(clippy::expect_used, reason = "HTTP client is required for the gateway to function")]
    pub fn with_overrides(origin: Option<String>, imagex: Option<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(120))
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            origin_override: origin.map(|u| u.trim_end_matches('/').to_string()),
            imagex_override: imagex.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    /// Raw client for requests that sit outside the `/mweb` envelope
    /// (object-store PUT, artifact fetches).
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Effective web origin for a region.
    pub fn origin(&self, region: &RegionInfo) -> String {
        self.origin_override
            .clone()
            .unwrap_or_else(|| region.origin.to_string())
    }

    /// Effective ImageX host for a region.
    pub fn imagex_host(&self, region: &RegionInfo) -> String {
        self.imagex_override
            .clone()
            .unwrap_or_else(|| region.imagex_host.to_string())
    }

    /// Query parameters every web-API call carries.
    pub fn standard_query(region: &RegionInfo) -> Vec<(String, String)> {
        vec![
            ("aid".to_string(), region.assistant_id.to_string()),
            ("device_platform".to_string(), "web".to_string()),
            ("region".to_string(), region.region.to_string()),
            ("web_version".to_string(), WEB_VERSION.to_string()),
        ]
    }

    /// POST a JSON body to the web API and unwrap the `{ret, errmsg, data}`
    /// envelope. Transport faults, auth rejections and non-zero `ret`
    /// codes come back pre-classified; phase callers wrap them further.
    pub async fn api_post(
        &self,
        region: &RegionInfo,
        token: &SessionToken,
        path: &str,
        body: Value,
        extra_query: &[(String, String)],
    ) -> GatewayResult<Value> {
        let url = format!("{}{}", self.origin(region), path);
        let mut query = Self::standard_query(region);
        query.extend_from_slice(extra_query);

        let response = self
            .http
            .post(&url)
            .headers(build_headers(region, token))
            .query(&query)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("POST {path}: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(GatewayError::Auth(format!(
                "upstream rejected the session ({status})"
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Server(format!(
                "POST {path} returned {status}: {}",
                snippet(&text)
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Server(format!("POST {path}: unparseable body: {e}")))?;

        let ret = ret_code(&payload);
        if ret != 0 {
            let errmsg = payload
                .get("errmsg")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown upstream error");
            if is_auth_ret(ret, errmsg) {
                return Err(GatewayError::Auth(format!("[ret={ret}] {errmsg}")));
            }
            return Err(GatewayError::Server(format!("[ret={ret}] {errmsg}")));
        }

        Ok(payload.get("data").cloned().unwrap_or(Value::Null))
    }
}

/// Headers the web API expects alongside the session credential.
pub fn build_headers(region: &RegionInfo, token: &SessionToken) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let insert = |headers: &mut HeaderMap, name: &'static str, value: String| {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    };
    insert(&mut headers, "authorization", format_auth(region, &token.secret));
    insert(&mut headers, "cookie", format!("sessionid={}", token.secret));
    insert(&mut headers, "origin", region.origin.to_string());
    insert(&mut headers, "referer", region.referer.to_string());
    headers
}

/// `ret` arrives as a string or a number depending on endpoint.
fn ret_code(payload: &Value) -> i64 {
    match payload.get("ret") {
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        _ => 0,
    }
}

fn is_auth_ret(ret: i64, errmsg: &str) -> bool {
    // 1000-series session faults, plus whatever spells "login" at us.
    matches!(ret, 1000..=1099 | 5000) || errmsg.to_ascii_lowercase().contains("login")
}

fn snippet(text: &str) -> String {
    text.chars().take(300).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::region::resolve_region;

    #[test]
    fn standard_query_carries_the_region_identity() {
        let token = SessionToken::parse("us-abc").expect("parses");
        let region = resolve_region(&token);
        let query = UpstreamClient::standard_query(&region);
        assert!(query.contains(&("aid".to_string(), "513641".to_string())));
        assert!(query.contains(&("region".to_string(), "us".to_string())));
    }

    #[test]
    fn headers_carry_bearer_and_cookie() {
        let token = SessionToken::parse("us-abc").expect("parses");
        let region = resolve_region(&token);
        let headers = build_headers(&region, &token);
        assert_eq!(headers.get("authorization").unwrap(), "Bearer us-abc");
        assert_eq!(headers.get("cookie").unwrap(), "sessionid=abc");
    }

    #[test]
    fn ret_code_reads_both_shapes() {
        assert_eq!(ret_code(&serde_json::json!({"ret": "1015"})), 1015);
        assert_eq!(ret_code(&serde_json::json!({"ret": 0})), 0);
        assert_eq!(ret_code(&serde_json::json!({})), 0);
    }
}
