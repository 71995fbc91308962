//! AWS signature v4 for the ImageX object-store API.
//!
//! Canonical-request assembly and signing-key derivation are separate units
//! (with the service name as a parameter) so each can be checked against the
//! documented AWS vectors; the public [`sign_request`] entry point pins the
//! service to `imagex`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{GatewayError, GatewayResult};

type HmacSha256 = Hmac<Sha256>;

/// Service name used in the credential scope for all ImageX calls.
pub const IMAGEX_SERVICE: &str = "imagex";

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Credentials for one signed exchange.
#[derive(Debug, Clone)]
pub struct SigningContext<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub session_token: Option<&'a str>,
    pub region: &'a str,
}

/// Sign a request against the ImageX API.
///
/// Returns the headers to attach: `x-amz-date`, `x-amz-content-sha256`,
/// `x-amz-security-token` (when present) and `authorization`. The payload
/// hash covers the exact bytes that will be sent; an empty slice hashes to
/// the empty-string digest used for GET.
pub fn sign_request(
    method: &str,
    url: &Url,
    payload: &[u8],
    ctx: &SigningContext<'_>,
    now: DateTime<Utc>,
) -> GatewayResult<Vec<(String, String)>> {
    let host = url
        .host_str()
        .ok_or_else(|| GatewayError::Server(format!("unsignable URL without host: {url}")))?;

    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let payload_hash = sha256_hex(payload);

    let mut headers: Vec<(String, String)> = vec![
        ("host".to_string(), host.to_string()),
        ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(token) = ctx.session_token {
        headers.push(("x-amz-security-token".to_string(), token.to_string()));
    }

    let query: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let (canonical, signed_headers) =
        canonical_request(method, url.path(), &query, &headers, &payload_hash);

    let scope = format!("{}/{}/{}/aws4_request", date, ctx.region, IMAGEX_SERVICE);
    let to_sign = string_to_sign(&amz_date, &scope, &sha256_hex(canonical.as_bytes()));
    let key = derive_signing_key(ctx.secret_access_key, &date, ctx.region, IMAGEX_SERVICE);
    let signature = hex(&hmac_sha256(&key, to_sign.as_bytes()));

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, ctx.access_key_id, scope, signed_headers, signature
    );

    // `host` is set by the HTTP client itself; everything else goes out as-is.
    let mut out: Vec<(String, String)> =
        headers.into_iter().filter(|(k, _)| k != "host").collect();
    out.push(("authorization".to_string(), authorization));
    Ok(out)
}

/// Assemble the canonical request and the `;`-joined signed-header list.
///
/// Header names are lowercased and sorted; query pairs are URI-encoded once
/// and sorted by key then value.
pub fn canonical_request(
    method: &str,
    path: &str,
    query: &[(String, String)],
    headers: &[(String, String)],
    payload_hash: &str,
) -> (String, String) {
    let canonical_uri = if path.is_empty() {
        "/".to_string()
    } else {
        path.split('/')
            .map(|segment| uri_encode(segment, false))
            .collect::<Vec<_>>()
            .join("/")
    };

    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    pairs.sort();
    let canonical_query = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut sorted: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    sorted.sort();

    let canonical_headers = sorted
        .iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect::<String>();
    let signed_headers = sorted
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical = format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
    );
    (canonical, signed_headers)
}

/// `AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{canonical_hash}`.
pub fn string_to_sign(amz_date: &str, scope: &str, canonical_hash: &str) -> String {
    format!("{ALGORITHM}\n{amz_date}\n{scope}\n{canonical_hash}")
}

/// Chained HMAC key derivation: secret → date → region → service → aws4_request.
pub fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode per the sigv4 rules: unreserved characters pass through,
/// everything else becomes `%XX`; `/` is kept in paths.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex(&hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
