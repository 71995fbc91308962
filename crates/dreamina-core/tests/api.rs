//! Router-level tests: validation, auth, and response shapes.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dreamina_core::gateway::server::{build_router, AppState};
use dreamina_core::gateway::upstream::UpstreamClient;

use common::{fast_config, history_record, mount_credit, mount_draft_generate, mount_history};

const AUTH: &str = "Bearer test-session-secret";

fn app(upstream_uri: Option<String>) -> Router {
    let upstream = UpstreamClient::with_overrides(upstream_uri.clone(), upstream_uri);
    build_router(AppState::with_upstream(fast_config(), upstream))
}

async fn send_json(
    app: Router,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::String(
        String::from_utf8_lossy(&bytes).into_owned(),
    ));
    (status, value)
}

fn error_type(body: &Value) -> &str {
    body.pointer("/error/type").and_then(|v| v.as_str()).unwrap_or("")
}

#[tokio::test]
async fn ping_answers_pong() {
    let (status, body) = send_json(app(None), "GET", "/ping", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("pong".to_string()));
}

#[tokio::test]
async fn models_listing_is_openai_shaped() {
    let (status, body) = send_json(app(None), "GET", "/v1/models", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object"], "list");
    let ids: Vec<&str> = body["data"]
        .as_array()
        .expect("data array")
        .iter()
        .filter_map(|m| m["id"].as_str())
        .collect();
    assert!(ids.contains(&"jimeng-3.0"));
    assert!(ids.contains(&"jimeng-video-3.0"));
    assert!(body["data"][0]["object"] == "model");
}

#[tokio::test]
async fn image_generation_rejects_pixel_dimensions() {
    for key in ["size", "width", "height"] {
        let (status, body) = send_json(
            app(None),
            "POST",
            "/v1/images/generations",
            Some(AUTH),
            Some(json!({"model": "jimeng-3.0", "prompt": "a fox", key: "1024x1024"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_type(&body), "validation");
    }
}

#[tokio::test]
async fn missing_authorization_is_rejected() {
    let (status, body) = send_json(
        app(None),
        "POST",
        "/v1/images/generations",
        None,
        Some(json!({"prompt": "a fox"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_type(&body), "auth");
}

#[tokio::test]
async fn empty_token_pool_is_rejected() {
    let (status, body) = send_json(
        app(None),
        "POST",
        "/v1/images/generations",
        Some("Bearer  ,  "),
        Some(json!({"prompt": "a fox"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_type(&body), "auth");
}

#[tokio::test]
async fn video_duration_bounds_are_enforced() {
    for duration in [json!(3), json!(16), json!("3"), json!(4.5)] {
        let (status, body) = send_json(
            app(None),
            "POST",
            "/v1/videos/generations",
            Some(AUTH),
            Some(json!({"prompt": "a fox", "duration": duration})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "duration {duration} accepted");
        assert_eq!(error_type(&body), "validation");
    }
}

#[tokio::test]
async fn video_rejects_a_third_frame_before_uploading() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mweb/v1/get_upload_token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (status, body) = send_json(
        app(Some(server.uri())),
        "POST",
        "/v1/videos/generations",
        Some(AUTH),
        Some(json!({
            "prompt": "a fox",
            "duration": "10",
            "file_paths": ["https://x/1.png", "https://x/2.png", "https://x/3.png"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_type(&body), "validation");
}

#[tokio::test]
async fn video_multipart_parses_string_duration() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mweb/v1/get_upload_token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let boundary = "XTESTBOUNDARY";
    let mut form = String::new();
    for (name, value) in [
        ("prompt", "a fox"),
        ("duration", "16"),
        ("file_paths", "https://x/1.png"),
    ] {
        form.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    form.push_str(&format!("--{boundary}--\r\n"));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/videos/generations")
        .header(header::AUTHORIZATION, AUTH)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(form))
        .expect("request");

    let response = app(Some(server.uri())).oneshot(request).await.expect("response");
    // "16" parses but is out of range; the string made it through intact.
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn composition_rejects_empty_and_oversized_input_sets() {
    let (status, body) = send_json(
        app(None),
        "POST",
        "/v1/images/compositions",
        Some(AUTH),
        Some(json!({"prompt": "merge", "images": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_type(&body), "validation");

    let eleven: Vec<String> = (0..11).map(|i| format!("https://x/{i}.png")).collect();
    let (status, body) = send_json(
        app(None),
        "POST",
        "/v1/images/compositions",
        Some(AUTH),
        Some(json!({"prompt": "merge", "images": eleven})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_type(&body), "validation");
}

#[tokio::test]
async fn image_generation_end_to_end_over_http() {
    let server = MockServer::start().await;
    mount_credit(&server).await;
    mount_draft_generate(&server, "h1").await;
    mount_history(
        &server,
        "h1",
        history_record(50, &["https://img/a", "https://img/b", "https://img/c", "https://img/d"], 7),
    )
    .await;

    let (status, body) = send_json(
        app(Some(server.uri())),
        "POST",
        "/v1/images/generations",
        Some(AUTH),
        Some(json!({
            "model": "jimeng-3.0",
            "prompt": "a red fox",
            "ratio": "16:9",
            "resolution": "2k",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["created"].as_i64().expect("created") > 0);
    let data = body["data"].as_array().expect("data");
    assert_eq!(data.len(), 4);
    assert_eq!(data[0]["url"], "https://img/a");
}

#[tokio::test]
async fn b64_response_format_inlines_artifacts() {
    let server = MockServer::start().await;
    mount_credit(&server).await;
    mount_draft_generate(&server, "h1").await;
    let artifact_url = format!("{}/artifact/a.webp", server.uri());
    mount_history(&server, "h1", history_record(50, &[&artifact_url], 7)).await;
    Mock::given(method("GET"))
        .and(path("/artifact/a.webp"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"webp-bytes".to_vec()))
        .mount(&server)
        .await;

    let (status, body) = send_json(
        app(Some(server.uri())),
        "POST",
        "/v1/images/generations",
        Some(AUTH),
        Some(json!({"prompt": "a fox", "response_format": "b64_json"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    use base64::Engine;
    let expected = base64::engine::general_purpose::STANDARD.encode(b"webp-bytes");
    assert_eq!(body["data"][0]["b64_json"], Value::String(expected));
}

#[tokio::test]
async fn session_generate_without_provisioner_is_provisioning_error() {
    let (status, body) = send_json(
        app(None),
        "POST",
        "/v1/session/generate",
        Some(AUTH),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_type(&body), "provisioning");
}

#[tokio::test]
async fn chat_completion_returns_markdown_links() {
    let server = MockServer::start().await;
    mount_credit(&server).await;
    mount_draft_generate(&server, "h1").await;
    mount_history(&server, "h1", history_record(50, &["https://img/a"], 7)).await;

    let (status, body) = send_json(
        app(Some(server.uri())),
        "POST",
        "/v1/chat/completions",
        Some(AUTH),
        Some(json!({
            "model": "jimeng-3.0",
            "messages": [{"role": "user", "content": "a red fox"}],
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object"], "chat.completion");
    let content = body["choices"][0]["message"]["content"].as_str().expect("content");
    assert!(content.contains("![image_1](https://img/a)"));
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn chat_streaming_ends_with_done_sentinel() {
    let server = MockServer::start().await;
    mount_credit(&server).await;
    mount_draft_generate(&server, "h1").await;
    mount_history(&server, "h1", history_record(50, &["https://img/a"], 7)).await;

    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::AUTHORIZATION, AUTH)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "model": "jimeng-3.0",
                "stream": true,
                "messages": [{"role": "user", "content": "a red fox"}],
            })
            .to_string(),
        ))
        .expect("request");

    let response = app(Some(server.uri())).oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("stream body");
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("\"role\":\"assistant\""));
    assert!(text.contains("![image_1](https://img/a)"));
    assert!(text.contains("\"finish_reason\":\"stop\""));
    assert!(text.trim_end().ends_with("data: [DONE]"));
}
