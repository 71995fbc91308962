//! Chat completions over the image pipeline.
//!
//! Chat is a thin façade: the latest user turn is parsed into prompt text
//! plus reference images, a generation runs, and the artifact links come
//! back as an assistant message — streamed as SSE deltas ending in the
//! `[DONE]` sentinel when `stream:true`.

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::SinkExt;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::draft::models::DEFAULT_IMAGE_MODEL;
use crate::gateway::messages::parse_messages;
use crate::gateway::middleware::SessionPool;
use crate::gateway::region::SessionToken;
use crate::gateway::server::AppState;

use super::images::image_options_from;

/// POST /v1/chat/completions.
pub async fn handle_chat_completions(
    State(state): State<AppState>,
    SessionPool(pool): SessionPool,
    Json(body): Json<Value>,
) -> GatewayResult<Response> {
    let messages = body
        .get("messages")
        .and_then(|v| v.as_array())
        .ok_or_else(|| GatewayError::Validation("missing 'messages' field".to_string()))?;
    let parsed = parse_messages(messages);
    if parsed.text.is_empty() {
        return Err(GatewayError::Validation(
            "messages carry no user prompt".to_string(),
        ));
    }

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_IMAGE_MODEL)
        .to_string();
    let wants_stream = body.get("stream").and_then(|v| v.as_bool()).unwrap_or(false);
    let options = image_options_from(&body)?;
    let token = pool.pick().clone();

    if !wants_stream {
        let urls = run_generation(&state, &model, &parsed.text, parsed.images, &options, &token)
            .await?;
        return Ok(Json(completion_body(&model, &markdown_links(&urls))).into_response());
    }

    // Streamed variant: the role delta goes out immediately, the artifact
    // links follow once the generation lands. Client disconnect drops the
    // receiver, which aborts the worker at its next send.
    let (mut tx, rx) = mpsc::unbounded::<Result<Bytes, std::convert::Infallible>>();
    let stream_id = format!("chatcmpl-{}", Uuid::new_v4());
    let created = chrono::Utc::now().timestamp();
    let stream_model = model.clone();

    tokio::spawn(async move {
        let _ = tx
            .send(Ok(role_chunk(&stream_id, created, &stream_model)))
            .await;

        let content = match run_generation(
            &state,
            &stream_model,
            &parsed.text,
            parsed.images,
            &options,
            &token,
        )
        .await
        {
            Ok(urls) => markdown_links(&urls),
            Err(e) => {
                tracing::error!("Chat generation failed: {}", e);
                format!("Generation failed ({}): {}", e.kind(), e)
            }
        };

        let _ = tx
            .send(Ok(content_chunk(&stream_id, created, &stream_model, &content)))
            .await;
        let _ = tx.send(Ok(stop_chunk(&stream_id, created, &stream_model))).await;
        let _ = tx.send(Ok(Bytes::from_static(b"data: [DONE]\n\n"))).await;
    });

    Response::builder()
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Connection", "keep-alive")
        .body(Body::from_stream(rx))
        .map_err(|e| GatewayError::Server(format!("failed to build SSE response: {e}")))
}

async fn run_generation(
    state: &AppState,
    model: &str,
    prompt: &str,
    images: Vec<crate::gateway::image_input::ImageInput>,
    options: &crate::gateway::generator::ImageOptions,
    token: &SessionToken,
) -> GatewayResult<Vec<String>> {
    if images.is_empty() {
        state
            .generator
            .generate_images(model, prompt, options, token)
            .await
    } else {
        state
            .generator
            .generate_image_composition(model, prompt, images, options, token)
            .await
    }
}

fn markdown_links(urls: &[String]) -> String {
    urls.iter()
        .enumerate()
        .map(|(index, url)| format!("![image_{}]({url})", index + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

fn completion_body(model: &str, content: &str) -> Value {
    json!({
        "id": format!("chatcmpl-{}", Uuid::new_v4()),
        "object": "chat.completion",
        "created": chrono::Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop",
        }],
        "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2},
    })
}

fn sse_chunk(payload: &Value) -> Bytes {
    Bytes::from(format!("data: {payload}\n\n"))
}

fn role_chunk(id: &str, created: i64, model: &str) -> Bytes {
    sse_chunk(&json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": null}],
    }))
}

fn content_chunk(id: &str, created: i64, model: &str, content: &str) -> Bytes {
    sse_chunk(&json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}],
    }))
}

fn stop_chunk(id: &str, created: i64, model: &str) -> Bytes {
    sse_chunk(&json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
    }))
}
