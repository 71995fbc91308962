//! Region resolution from session tokens.
//!
//! The session token is the single source of truth for region selection: an
//! optional `us- | hk- | jp- | sg-` prefix picks the international backend,
//! no prefix means the domestic (`cn`) one. Resolution is pure and cheap, so
//! it runs once per request and the result is carried by value.

use crate::error::{GatewayError, GatewayResult};

/// Closed set of supported regions.
pub const REGIONS: [&str; 5] = ["cn", "us", "hk", "jp", "sg"];

/// Parsed session credential: region plus the raw secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    /// Region tag, `cn` when the token carries no prefix.
    pub region: String,
    /// The credential with any region prefix stripped.
    pub secret: String,
}

impl SessionToken {
    /// Parse a raw token, splitting off a recognized region prefix.
    ///
    /// Unknown prefixes are not an error: `foo-bar` is a domestic secret
    /// that happens to contain a dash.
    pub fn parse(raw: &str) -> GatewayResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(GatewayError::Auth("empty session token".to_string()));
        }

        if let Some((prefix, rest)) = raw.split_once('-') {
            if matches!(prefix, "us" | "hk" | "jp" | "sg") && !rest.is_empty() {
                return Ok(Self { region: prefix.to_string(), secret: rest.to_string() });
            }
        }

        Ok(Self { region: "cn".to_string(), secret: raw.to_string() })
    }

    pub fn is_international(&self) -> bool {
        self.region != "cn"
    }

    /// Reconstruct the prefixed form handed to us by the client.
    pub fn prefixed(&self) -> String {
        if self.region == "cn" {
            self.secret.clone()
        } else {
            format!("{}-{}", self.region, self.secret)
        }
    }
}

/// Per-region backend identity, derived from the token prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionInfo {
    pub region: &'static str,
    pub is_international: bool,
    /// ImageX (object store) API host, scheme included.
    pub imagex_host: &'static str,
    /// Origin of the web app the upstream expects to see.
    pub origin: &'static str,
    /// Region string used in the signature credential scope.
    pub aws_region: &'static str,
    /// Assistant id (`aid`) identifying the backend application.
    pub assistant_id: u32,
    /// Referer sent alongside the origin.
    pub referer: &'static str,
}

/// Resolve the backend identity for a parsed token. Pure, no I/O.
pub fn resolve_region(token: &SessionToken) -> RegionInfo {
    match token.region.as_str() {
        "us" => RegionInfo {
            region: "us",
            is_international: true,
            imagex_host: "https://imagex-us-east-1.byteintlapi.com",
            origin: "https://dreamina.capcut.com",
            aws_region: "us-east-1",
            assistant_id: 513641,
            referer: "https://dreamina.capcut.com/ai-tool/generate",
        },
        "hk" => RegionInfo {
            region: "hk",
            is_international: true,
            imagex_host: "https://imagex-ap-east-1.byteintlapi.com",
            origin: "https://dreamina.capcut.com",
            aws_region: "ap-east-1",
            assistant_id: 513642,
            referer: "https://dreamina.capcut.com/ai-tool/generate",
        },
        "jp" => RegionInfo {
            region: "jp",
            is_international: true,
            imagex_host: "https://imagex-ap-northeast-1.byteintlapi.com",
            origin: "https://dreamina.capcut.com",
            aws_region: "ap-northeast-1",
            assistant_id: 513643,
            referer: "https://dreamina.capcut.com/ai-tool/generate",
        },
        "sg" => RegionInfo {
            region: "sg",
            is_international: true,
            imagex_host: "https://imagex-ap-southeast-1.byteintlapi.com",
            origin: "https://dreamina.capcut.com",
            aws_region: "ap-southeast-1",
            assistant_id: 513644,
            referer: "https://dreamina.capcut.com/ai-tool/generate",
        },
        _ => RegionInfo {
            region: "cn",
            is_international: false,
            imagex_host: "https://imagex.bytedanceapi.com",
            origin: "https://jimeng.jianying.com",
            aws_region: "cn-north-1",
            assistant_id: 513695,
            referer: "https://jimeng.jianying.com/ai-tool/generate",
        },
    }
}

/// Format the Authorization value for a resolved token.
///
/// The prefix round-trips: `format_auth(resolve(t), strip(t))` rebuilds the
/// exact header the client sent.
pub fn format_auth(info: &RegionInfo, secret: &str) -> String {
    if info.is_international {
        format!("Bearer {}-{}", info.region, secret)
    } else {
        format!("Bearer {}", secret)
    }
}
