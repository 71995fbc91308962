use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dreamina_core::modules::config::AppConfig;

/// Config with millisecond poll intervals so tests finish quickly.
pub fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.poller.max_poll_count = 10;
    config.poller.base_interval_ms = 1;
    config.poller.max_interval_ms = 5;
    config.poller.widen_step_ms = 1;
    config
}

pub fn envelope(data: Value) -> Value {
    json!({"ret": "0", "errmsg": "success", "data": data})
}

/// Credit check: a healthy balance so no receive attempt fires.
pub async fn mount_credit(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token/points"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
            {"points": {"giftCredit": 10, "purchaseCredit": 0, "vipCredit": 0, "totalCredit": 10}}
        ]))))
        .mount(server)
        .await;
}

/// Draft submission returning `history_id`.
pub async fn mount_draft_generate(server: &MockServer, history_id: &str) {
    Mock::given(method("POST"))
        .and(path("/mweb/v1/aigc_draft/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "aigc_data": {"history_record_id": history_id}
        }))))
        .mount(server)
        .await;
}

/// A finished history record with one image item per URL.
pub fn history_record(status: i64, image_urls: &[&str], finish_time: i64) -> Value {
    let items: Vec<Value> = image_urls
        .iter()
        .map(|url| {
            json!({
                "image": {"large_images": [{"image_url": url}]},
                "common_attr": {"cover_url": url},
            })
        })
        .collect();
    json!({
        "status": status,
        "fail_code": "",
        "item_list": items,
        "task": {"finish_time": finish_time},
    })
}

pub async fn mount_history(server: &MockServer, history_id: &str, record: Value) {
    Mock::given(method("POST"))
        .and(path("/mweb/v1/get_history_by_ids"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            history_id: record
        }))))
        .mount(server)
        .await;
}

/// Pull the parsed `draft_content` out of the captured submit request.
pub async fn submitted_draft(server: &MockServer) -> Value {
    let requests = server.received_requests().await.expect("recording enabled");
    let submit = requests
        .iter()
        .find(|r| r.url.path() == "/mweb/v1/aigc_draft/generate")
        .expect("draft submitted");
    let body: Value = serde_json::from_slice(&submit.body).expect("valid submit body");
    let draft_content = body["draft_content"].as_str().expect("draft_content string");
    serde_json::from_str(draft_content).expect("valid draft json")
}
