//! Polymorphic image inputs.
//!
//! Clients hand us remote URLs, local paths in several spellings, raw bytes,
//! or base64 (data-URI or bare). Everything funnels through [`ImageInput`]
//! and normalizes to bytes before the uploader sees it. Classification is
//! pure; only [`ImageInput::into_bytes`] touches the network or filesystem.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::path::PathBuf;

use crate::error::{GatewayError, GatewayResult};

/// One client-supplied image, in whatever form it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// Remote `http(s)` (or protocol-relative) URL, fetched once.
    Url(String),
    /// Local path: `file://`, `~`, absolute or relative.
    Path(String),
    /// Base64 payload with any data-URI header already stripped.
    Base64(String),
    /// Raw bytes, passed through unchanged.
    Bytes(Vec<u8>),
}

impl ImageInput {
    /// Classify a string value. Data-URIs win over the bare-base64
    /// heuristic; anything that is neither URL nor base64 is a path.
    pub fn classify(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.starts_with("http://")
            || trimmed.starts_with("https://")
            || trimmed.starts_with("//")
        {
            return Self::Url(trimmed.to_string());
        }
        if let Some(rest) = strip_data_uri(trimmed) {
            return Self::Base64(rest.to_string());
        }
        if looks_like_base64(trimmed) {
            return Self::Base64(trimmed.to_string());
        }
        Self::Path(trimmed.to_string())
    }

    /// Normalize to bytes. URLs are fetched with the shared client, paths
    /// are canonicalized and read, base64 is decoded.
    pub async fn into_bytes(self, http: &reqwest::Client) -> GatewayResult<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Base64(data) => {
                let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
                BASE64
                    .decode(compact.as_bytes())
                    .map_err(|e| GatewayError::Validation(format!("invalid base64 image: {e}")))
            }
            Self::Url(url) => {
                let url = if let Some(rest) = url.strip_prefix("//") {
                    format!("https://{rest}")
                } else {
                    url
                };
                let response = http.get(&url).send().await?;
                if !response.status().is_success() {
                    return Err(GatewayError::Validation(format!(
                        "failed to fetch image {url}: status {}",
                        response.status()
                    )));
                }
                Ok(response.bytes().await?.to_vec())
            }
            Self::Path(raw) => {
                let path = resolve_local_path(&raw)?;
                tokio::fs::read(&path).await.map_err(|e| {
                    GatewayError::Validation(format!("cannot read image {}: {e}", path.display()))
                })
            }
        }
    }
}

/// Resolve the supported local path spellings to one absolute path.
pub fn resolve_local_path(raw: &str) -> GatewayResult<PathBuf> {
    let stripped = raw.strip_prefix("file://").unwrap_or(raw);

    let expanded = if let Some(rest) = stripped.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| GatewayError::Validation("cannot expand ~: no home dir".to_string()))?;
        home.join(rest)
    } else {
        PathBuf::from(stripped)
    };

    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| GatewayError::Server(format!("cannot resolve cwd: {e}")))?;
        Ok(cwd.join(expanded))
    }
}

/// Strip a `data:<mime>;base64,` header, returning the payload.
fn strip_data_uri(value: &str) -> Option<&str> {
    let rest = value.strip_prefix("data:")?;
    let comma = rest.find(',')?;
    // Only base64-encoded data URIs are supported image carriers.
    if rest[..comma].ends_with(";base64") {
        Some(&rest[comma + 1..])
    } else {
        None
    }
}

/// Bare-base64 heuristic: long enough, padded length, base64 charset only.
/// Deliberately conservative so filenames never false-positive.
fn looks_like_base64(value: &str) -> bool {
    value.len() >= 64
        && value.len() % 4 == 0
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}
