//! Image generation endpoints.

use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::draft::models::DEFAULT_IMAGE_MODEL;
use crate::gateway::generator::ImageOptions;
use crate::gateway::image_input::ImageInput;
use crate::gateway::middleware::SessionPool;
use crate::gateway::server::AppState;

const BODY_LIMIT: usize = 64 * 1024 * 1024;

/// POST /v1/images/generations — text-to-image.
pub async fn handle_generations(
    State(state): State<AppState>,
    SessionPool(pool): SessionPool,
    Json(body): Json<Value>,
) -> GatewayResult<Response> {
    // Pixel dimensions are not part of the contract; ratio/resolution is.
    for key in ["size", "width", "height"] {
        if body.get(key).is_some() {
            return Err(GatewayError::Validation(format!(
                "unsupported field '{key}'; use 'ratio' and 'resolution' instead"
            )));
        }
    }

    let prompt = require_str(&body, "prompt")?;
    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_IMAGE_MODEL);
    let options = image_options_from(&body)?;
    let response_format = body
        .get("response_format")
        .and_then(|v| v.as_str())
        .unwrap_or("url")
        .to_string();

    let token = pool.pick();
    let urls = state
        .generator
        .generate_images(model, prompt, &options, token)
        .await?;

    let data = format_image_data(&state, urls, &response_format).await?;
    Ok(openai_image_response(data))
}

/// POST /v1/images/compositions — image-to-image, JSON or multipart.
pub async fn handle_compositions(
    State(state): State<AppState>,
    SessionPool(pool): SessionPool,
    request: Request,
) -> GatewayResult<Response> {
    let (body, images) = if is_multipart(&request) {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| GatewayError::Validation(format!("bad multipart body: {e}")))?;
        parse_image_multipart(multipart).await?
    } else {
        let body = read_json_body(request).await?;
        let images = body
            .get("images")
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str())
                    .map(ImageInput::classify)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        (body, images)
    };

    let prompt = require_str(&body, "prompt")?;
    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_IMAGE_MODEL);
    let options = image_options_from(&body)?;
    let response_format = body
        .get("response_format")
        .and_then(|v| v.as_str())
        .unwrap_or("url")
        .to_string();

    let token = pool.pick();
    let urls = state
        .generator
        .generate_image_composition(model, prompt, images, &options, token)
        .await?;

    let data = format_image_data(&state, urls, &response_format).await?;
    Ok(openai_image_response(data))
}

pub(super) fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

pub(super) async fn read_json_body(request: Request) -> GatewayResult<Value> {
    let bytes = axum::body::to_bytes(request.into_body(), BODY_LIMIT)
        .await
        .map_err(|e| GatewayError::Validation(format!("unreadable body: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| GatewayError::Validation(format!("invalid JSON body: {e}")))
}

pub(super) fn require_str<'a>(body: &'a Value, key: &str) -> GatewayResult<&'a str> {
    body.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| GatewayError::Validation(format!("missing '{key}' field")))
}

/// Shared option block for generations, compositions and chat.
pub(super) fn image_options_from(body: &Value) -> GatewayResult<ImageOptions> {
    let mut options = ImageOptions::default();
    if let Some(ratio) = body.get("ratio").and_then(|v| v.as_str()) {
        options.ratio = ratio.to_string();
    }
    if let Some(resolution) = body.get("resolution").and_then(|v| v.as_str()) {
        options.resolution = resolution.to_string();
    }
    if let Some(negative) = body.get("negative_prompt").and_then(|v| v.as_str()) {
        options.negative_prompt = negative.to_string();
    }
    if let Some(strength) = body.get("sample_strength") {
        let strength = strength
            .as_f64()
            .ok_or_else(|| GatewayError::Validation("sample_strength must be a number".into()))?;
        if !(0.0..=1.0).contains(&strength) {
            return Err(GatewayError::Validation(
                "sample_strength must be within [0, 1]".to_string(),
            ));
        }
        options.sample_strength = strength;
    }
    if let Some(flag) = body.get("intelligent_ratio").and_then(|v| v.as_bool()) {
        options.intelligent_ratio = flag;
    }
    Ok(options)
}

/// Collect the option fields and image parts of a multipart form.
async fn parse_image_multipart(mut multipart: Multipart) -> GatewayResult<(Value, Vec<ImageInput>)> {
    let mut body = json!({});
    let mut images = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::Validation(format!("multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" | "images" | "file" => {
                let is_file = field.file_name().is_some();
                if is_file {
                    let bytes = field.bytes().await.map_err(|e| {
                        GatewayError::Validation(format!("unreadable image part: {e}"))
                    })?;
                    images.push(ImageInput::Bytes(bytes.to_vec()));
                } else if let Ok(text) = field.text().await {
                    images.push(ImageInput::classify(&text));
                }
            }
            "image_urls" | "file_paths" | "filePaths" => {
                let text = field.text().await.map_err(|e| {
                    GatewayError::Validation(format!("unreadable field '{name}': {e}"))
                })?;
                images.push(ImageInput::classify(&text));
            }
            "" => {}
            _ => {
                if let Ok(text) = field.text().await {
                    body[name.as_str()] = parse_scalar(&text);
                }
            }
        }
    }

    Ok((body, images))
}

/// Multipart scalar fields arrive as strings; numbers and bools keep their
/// JSON shape so downstream validation sees one representation.
pub(super) fn parse_scalar(text: &str) -> Value {
    if let Ok(n) = text.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(n) {
            return Value::Number(number);
        }
    }
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(text.to_string()),
    }
}

/// Build `data[]` in the requested format.
pub(super) async fn format_image_data(
    state: &AppState,
    urls: Vec<String>,
    response_format: &str,
) -> GatewayResult<Vec<Value>> {
    if response_format != "b64_json" {
        return Ok(urls.into_iter().map(|url| json!({"url": url})).collect());
    }

    let mut data = Vec::with_capacity(urls.len());
    for url in urls {
        let bytes = state
            .upstream
            .http()
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| GatewayError::Server(format!("artifact fetch failed: {e}")))?
            .bytes()
            .await?;
        data.push(json!({"b64_json": BASE64.encode(&bytes)}));
    }
    Ok(data)
}

pub(super) fn openai_image_response(data: Vec<Value>) -> Response {
    Json(json!({
        "created": chrono::Utc::now().timestamp(),
        "data": data,
    }))
    .into_response()
}
