//! Video generation endpoint.

use axum::extract::{FromRequest, Multipart, Request, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::draft::models::DEFAULT_VIDEO_MODEL;
use crate::gateway::generator::VideoOptions;
use crate::gateway::image_input::ImageInput;
use crate::gateway::middleware::SessionPool;
use crate::gateway::server::AppState;

use super::images::{is_multipart, parse_scalar, read_json_body, require_str};

/// POST /v1/videos/generations — JSON or multipart.
pub async fn handle_generations(
    State(state): State<AppState>,
    SessionPool(pool): SessionPool,
    request: Request,
) -> GatewayResult<Response> {
    let (body, frames) = if is_multipart(&request) {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| GatewayError::Validation(format!("bad multipart body: {e}")))?;
        parse_video_multipart(multipart).await?
    } else {
        let body = read_json_body(request).await?;
        let frames = json_file_paths(&body);
        (body, frames)
    };

    let prompt = require_str(&body, "prompt")?;
    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_VIDEO_MODEL);

    let mut options = VideoOptions::default();
    if let Some(ratio) = body.get("ratio").and_then(|v| v.as_str()) {
        options.ratio = ratio.to_string();
    }
    if let Some(resolution) = body.get("resolution").and_then(|v| v.as_str()) {
        options.resolution = resolution.to_string();
    }
    if let Some(duration) = body.get("duration") {
        options.duration_secs = parse_duration(duration)?;
    }
    options.file_paths = frames;

    let token = pool.pick();
    let url = state
        .generator
        .generate_video(model, prompt, &options, token)
        .await?;

    Ok(Json(json!({
        "created": chrono::Utc::now().timestamp(),
        "data": [{"url": url}],
    }))
    .into_response())
}

/// `duration` is an integer number of seconds; multipart delivers it as a
/// string, JSON as a number. Fractional values are rejected.
fn parse_duration(value: &Value) -> GatewayResult<u32> {
    match value {
        Value::String(s) => s
            .trim()
            .parse::<u32>()
            .map_err(|_| GatewayError::Validation(format!("duration '{s}' is not an integer"))),
        Value::Number(n) => {
            if let Some(int) = n.as_u64() {
                return u32::try_from(int)
                    .map_err(|_| GatewayError::Validation("duration out of range".to_string()));
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= 0.0 && f <= f64::from(u32::MAX) => Ok(f as u32),
                _ => Err(GatewayError::Validation(
                    "duration must be an integer number of seconds".to_string(),
                )),
            }
        }
        _ => Err(GatewayError::Validation("duration must be a number".to_string())),
    }
}

/// Frame inputs from a JSON body: `file_paths` (or `filePaths`).
fn json_file_paths(body: &Value) -> Vec<ImageInput> {
    body.get("file_paths")
        .or_else(|| body.get("filePaths"))
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str())
                .map(ImageInput::classify)
                .collect()
        })
        .unwrap_or_default()
}

async fn parse_video_multipart(mut multipart: Multipart) -> GatewayResult<(Value, Vec<ImageInput>)> {
    let mut body = json!({});
    let mut frames = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::Validation(format!("multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" | "files" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| GatewayError::Validation(format!("unreadable frame: {e}")))?;
                frames.push(ImageInput::Bytes(bytes.to_vec()));
            }
            "file_paths" | "filePaths" => {
                let text = field.text().await.map_err(|e| {
                    GatewayError::Validation(format!("unreadable field '{name}': {e}"))
                })?;
                frames.push(ImageInput::classify(&text));
            }
            "duration" => {
                // Keep the string form; parse_duration handles it.
                let text = field
                    .text()
                    .await
                    .map_err(|e| GatewayError::Validation(format!("unreadable duration: {e}")))?;
                body["duration"] = Value::String(text);
            }
            "" => {}
            _ => {
                if let Ok(text) = field.text().await {
                    body[name.as_str()] = parse_scalar(&text);
                }
            }
        }
    }

    Ok((body, frames))
}
