//! Authenticated image upload to the region's object store.
//!
//! Four phases per input, each failing hard with its own error kind:
//!
//! ```text
//! GET-TOKEN  POST /mweb/v1/get_upload_token (scene 2)  → STS credentials
//! APPLY      GET  ApplyImageUpload, signed             → UploadAddress
//! PUT        POST upload host, raw bytes + CRC32       → 2xx
//! COMMIT     POST CommitImageUpload, signed            → Uri (status 2000)
//! ```
//!
//! Uploads within one generation run strictly in sequence: the draft's
//! ability list is positional, so the i-th uri must come from the i-th
//! client input.

use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use super::image_input::ImageInput;
use super::region::{RegionInfo, SessionToken};
use super::signer::{sign_request, SigningContext};
use super::upstream::UpstreamClient;
use crate::error::{GatewayError, GatewayResult};

const IMAGEX_API_VERSION: &str = "2018-08-01";

/// STS credentials for a single upload. Never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadContext {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub space_name: Option<String>,
}

impl UploadContext {
    /// International tokens address the store by space name, domestic ones
    /// by service id.
    fn effective_service_id(&self, region: &RegionInfo) -> GatewayResult<&str> {
        let id = if region.is_international {
            self.space_name.as_deref().or(self.service_id.as_deref())
        } else {
            self.service_id.as_deref()
        };
        id.filter(|s| !s.is_empty()).ok_or_else(|| {
            GatewayError::UploadToken("token response carries no service id".to_string())
        })
    }
}

/// Store coordinates returned by the apply phase.
#[derive(Debug, Clone)]
struct UploadAddress {
    store_uri: String,
    store_auth: String,
    upload_host: String,
    session_key: String,
}

pub struct Uploader<'a> {
    upstream: &'a UpstreamClient,
    region: &'a RegionInfo,
    token: &'a SessionToken,
}

impl<'a> Uploader<'a> {
    pub fn new(
        upstream: &'a UpstreamClient,
        region: &'a RegionInfo,
        token: &'a SessionToken,
    ) -> Self {
        Self { upstream, region, token }
    }

    /// Upload every input in submission order, returning the opaque uris.
    pub async fn upload_images(&self, inputs: Vec<ImageInput>) -> GatewayResult<Vec<String>> {
        let mut uris = Vec::with_capacity(inputs.len());
        for input in inputs {
            let bytes = input.into_bytes(self.upstream.http()).await?;
            uris.push(self.upload_bytes(&bytes).await?);
        }
        Ok(uris)
    }

    /// Run the full state machine for one in-memory blob.
    pub async fn upload_bytes(&self, bytes: &[u8]) -> GatewayResult<String> {
        let ctx = self.request_token().await?;
        let service_id = ctx.effective_service_id(self.region)?.to_string();
        let address = self.apply(&ctx, &service_id, bytes.len()).await?;
        self.put(&address, bytes).await?;
        self.commit(&ctx, &service_id, &address).await
    }

    async fn request_token(&self) -> GatewayResult<UploadContext> {
        let data = self
            .upstream
            .api_post(
                self.region,
                self.token,
                "/mweb/v1/get_upload_token",
                json!({"scene": 2}),
                &[],
            )
            .await
            .map_err(wrap_phase(GatewayError::UploadToken))?;

        serde_json::from_value(data)
            .map_err(|e| GatewayError::UploadToken(format!("missing credential fields: {e}")))
    }

    async fn apply(
        &self,
        ctx: &UploadContext,
        service_id: &str,
        file_size: usize,
    ) -> GatewayResult<UploadAddress> {
        let mut url = Url::parse(&self.upstream.imagex_host(self.region))
            .map_err(|e| GatewayError::UploadApply(format!("bad imagex host: {e}")))?;
        url.query_pairs_mut()
            .append_pair("Action", "ApplyImageUpload")
            .append_pair("Version", IMAGEX_API_VERSION)
            .append_pair("ServiceId", service_id)
            .append_pair("FileSize", &file_size.to_string())
            .append_pair("s", &random_s());

        let payload = self.signed_call("GET", &url, ctx, None).await?;
        check_imagex_error(&payload).map_err(GatewayError::UploadApply)?;

        let address = payload.pointer("/Result/UploadAddress").ok_or_else(|| {
            GatewayError::UploadApply("response carries no UploadAddress".to_string())
        })?;

        let store = address
            .pointer("/StoreInfos/0")
            .ok_or_else(|| GatewayError::UploadApply("empty StoreInfos".to_string()))?;
        let upload_host = address
            .pointer("/UploadHosts/0")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::UploadApply("empty UploadHosts".to_string()))?;

        Ok(UploadAddress {
            store_uri: field_str(store, "StoreUri")
                .ok_or_else(|| GatewayError::UploadApply("StoreInfos missing StoreUri".into()))?,
            store_auth: field_str(store, "Auth")
                .ok_or_else(|| GatewayError::UploadApply("StoreInfos missing Auth".into()))?,
            upload_host: upload_host.to_string(),
            session_key: field_str(address, "SessionKey")
                .ok_or_else(|| GatewayError::UploadApply("missing SessionKey".into()))?,
        })
    }

    async fn put(&self, address: &UploadAddress, bytes: &[u8]) -> GatewayResult<()> {
        // The checksum covers the exact bytes placed in the body.
        let crc = format!("{:08x}", crc32fast::hash(bytes));
        // Hosts normally arrive bare; keep an explicit scheme when present.
        let base = if address.upload_host.contains("://") {
            address.upload_host.clone()
        } else {
            format!("https://{}", address.upload_host)
        };
        let url = format!("{}/upload/v1/{}", base, address.store_uri);

        let response = self
            .upstream
            .http()
            .post(&url)
            .header("Authorization", &address.store_auth)
            .header("Content-CRC32", &crc)
            .header("Content-Type", "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| GatewayError::UploadPut(format!("PUT {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(GatewayError::UploadPut(format!(
                "object store returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn commit(
        &self,
        ctx: &UploadContext,
        service_id: &str,
        address: &UploadAddress,
    ) -> GatewayResult<String> {
        let mut url = Url::parse(&self.upstream.imagex_host(self.region))
            .map_err(|e| GatewayError::UploadCommit(format!("bad imagex host: {e}")))?;
        url.query_pairs_mut()
            .append_pair("Action", "CommitImageUpload")
            .append_pair("Version", IMAGEX_API_VERSION)
            .append_pair("ServiceId", service_id);

        // The signature's sha256 must cover these exact bytes.
        let body = serde_json::to_vec(&json!({"SessionKey": address.session_key}))
            .map_err(|e| GatewayError::UploadCommit(e.to_string()))?;

        let payload = self.signed_call("POST", &url, ctx, Some(body)).await?;
        check_imagex_error(&payload).map_err(GatewayError::UploadCommit)?;

        let result = payload
            .pointer("/Result/Results/0")
            .ok_or_else(|| GatewayError::UploadCommit("commit returned no results".to_string()))?;

        let uri_status = result.get("UriStatus").and_then(|v| v.as_i64()).unwrap_or(0);
        if uri_status != 2000 {
            return Err(GatewayError::UploadCommit(format!(
                "UriStatus {uri_status} (expected 2000)"
            )));
        }

        field_str(result, "Uri")
            .ok_or_else(|| GatewayError::UploadCommit("commit result missing Uri".to_string()))
    }

    /// Sign and execute one ImageX exchange, returning the parsed body.
    async fn signed_call(
        &self,
        method: &str,
        url: &Url,
        ctx: &UploadContext,
        body: Option<Vec<u8>>,
    ) -> GatewayResult<Value> {
        let phase = phase_for(method);
        let signing = SigningContext {
            access_key_id: &ctx.access_key_id,
            secret_access_key: &ctx.secret_access_key,
            session_token: Some(&ctx.session_token),
            region: self.region.aws_region,
        };
        let payload = body.as_deref().unwrap_or(&[]);
        let signed_headers = sign_request(method, url, payload, &signing, chrono::Utc::now())?;

        let mut request = match method {
            "GET" => self.upstream.http().get(url.clone()),
            _ => self
                .upstream
                .http()
                .post(url.clone())
                .header("Content-Type", "application/json"),
        };
        for (name, value) in &signed_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| phase(format!("{method} {}: {e}", url.path())))?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| phase(format!("unparseable imagex response: {e}")))?;

        if !status.is_success() {
            // The error payload is more specific than the bare status.
            if let Err(message) = check_imagex_error(&payload) {
                return Err(phase(message));
            }
            return Err(phase(format!("imagex returned {status}")));
        }
        Ok(payload)
    }
}

/// `ResponseMetadata.Error` marks a failed ImageX call even under HTTP 200.
fn check_imagex_error(payload: &Value) -> Result<(), String> {
    if let Some(error) = payload.pointer("/ResponseMetadata/Error") {
        let code = error.get("Code").and_then(|v| v.as_str()).unwrap_or("unknown");
        let message = error.get("Message").and_then(|v| v.as_str()).unwrap_or("");
        return Err(format!("{code}: {message}"));
    }
    Ok(())
}

fn field_str(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn phase_for(method: &str) -> fn(String) -> GatewayError {
    if method == "GET" {
        GatewayError::UploadApply
    } else {
        GatewayError::UploadCommit
    }
}

/// Auth and transport faults keep their kind; everything else takes the
/// phase kind.
fn wrap_phase(phase: fn(String) -> GatewayError) -> impl Fn(GatewayError) -> GatewayError {
    move |e| match e {
        GatewayError::Auth(_) | GatewayError::Transport(_) => e,
        other => phase(other.to_string()),
    }
}

fn random_s() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(10)
        .map(char::from)
        .collect::<String>()
        .to_ascii_lowercase()
}
