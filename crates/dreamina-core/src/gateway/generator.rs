//! Generation orchestration.
//!
//! One public operation per generation mode. Each call owns its whole
//! pipeline: validate → resolve region → (upload inputs in order) → build
//! draft → submit → poll → collect artifact URLs. Nothing is shared
//! between requests except the HTTP connection pool and the config.

use serde_json::{json, Value};
use std::sync::Arc;

use super::credit;
use super::draft::models::{
    self, multi_image_count, resolve_image_model, resolve_video_model, SPECIAL_SQUARE_MODEL,
};
use super::draft::resolution::{resolution_params, ResolutionParams};
use super::draft::{build_image_draft, build_video_draft, ImageDraftParams, VideoDraftParams};
use super::image_input::ImageInput;
use super::poller::{GenerationKind, PollTick, PollingStatus, SmartPoller, SmartPollerConfig};
use super::region::{resolve_region, RegionInfo, SessionToken};
use super::uploader::Uploader;
use super::upstream::UpstreamClient;
use crate::error::{GatewayError, GatewayResult};
use crate::modules::config::AppConfig;

/// Artifacts a standard image generation produces.
const DEFAULT_IMAGE_ITEM_COUNT: usize = 4;

/// Limits from the public API contract.
pub const MAX_COMPOSITION_IMAGES: usize = 10;
pub const MAX_VIDEO_FRAMES: usize = 2;
pub const MIN_VIDEO_DURATION_SECS: u32 = 4;
pub const MAX_VIDEO_DURATION_SECS: u32 = 15;

const VIDEO_RESOLUTIONS: [&str; 3] = ["480p", "720p", "1080p"];

/// Options for image generation and composition.
#[derive(Debug, Clone)]
pub struct ImageOptions {
    pub ratio: String,
    pub resolution: String,
    pub negative_prompt: String,
    pub sample_strength: f64,
    /// Accepted on the public surface but pinned to `false` in drafts until
    /// the upstream honors it.
    pub intelligent_ratio: bool,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            ratio: "1:1".to_string(),
            resolution: "2k".to_string(),
            negative_prompt: String::new(),
            sample_strength: 0.5,
            intelligent_ratio: false,
        }
    }
}

/// Options for video generation.
#[derive(Debug, Clone)]
pub struct VideoOptions {
    pub ratio: String,
    pub resolution: String,
    pub duration_secs: u32,
    pub file_paths: Vec<ImageInput>,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            ratio: "16:9".to_string(),
            resolution: "720p".to_string(),
            duration_secs: 5,
            file_paths: Vec::new(),
        }
    }
}

pub struct Generator {
    upstream: Arc<UpstreamClient>,
    config: Arc<AppConfig>,
}

impl Generator {
    pub fn new(upstream: Arc<UpstreamClient>, config: Arc<AppConfig>) -> Self {
        Self { upstream, config }
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    /// Text-to-image. Returns artifact URLs in upstream order.
    pub async fn generate_images(
        &self,
        model: &str,
        prompt: &str,
        options: &ImageOptions,
        token: &SessionToken,
    ) -> GatewayResult<Vec<String>> {
        if prompt.trim().is_empty() {
            return Err(GatewayError::Validation("prompt must not be empty".to_string()));
        }
        let region = resolve_region(token);
        let model_key = resolve_image_model(
            model,
            region.is_international,
            self.config.strict_international_models,
        )?;
        let resolution = self.image_resolution(model, options)?;
        let expected = multi_image_count(model, prompt).unwrap_or(DEFAULT_IMAGE_ITEM_COUNT);

        credit::ensure_credit(&self.upstream, &region, token).await;

        let params = ImageDraftParams {
            model_key,
            prompt,
            negative_prompt: &options.negative_prompt,
            sample_strength: options.sample_strength,
            resolution,
            uploaded: &[],
        };
        let bundle = build_image_draft(&params);
        let history_id = self.submit_draft(&region, token, &bundle).await?;
        tracing::info!(
            "Submitted image draft: model={} history_id={} expected_items={}",
            model,
            history_id,
            expected
        );

        let record = self
            .poll_history(&region, token, &history_id, GenerationKind::Image, expected)
            .await?;
        let urls = extract_image_urls(&record);
        if urls.is_empty() {
            return Err(GatewayError::Server(format!(
                "history {history_id} finished without image URLs"
            )));
        }
        Ok(urls)
    }

    /// Image-to-image with 1..=10 reference inputs. Upload order defines
    /// ability order.
    pub async fn generate_image_composition(
        &self,
        model: &str,
        prompt: &str,
        images: Vec<ImageInput>,
        options: &ImageOptions,
        token: &SessionToken,
    ) -> GatewayResult<Vec<String>> {
        if images.is_empty() {
            return Err(GatewayError::Validation(
                "composition requires at least one input image".to_string(),
            ));
        }
        if images.len() > MAX_COMPOSITION_IMAGES {
            return Err(GatewayError::Validation(format!(
                "composition accepts at most {MAX_COMPOSITION_IMAGES} images, got {}",
                images.len()
            )));
        }
        let region = resolve_region(token);
        let model_key = resolve_image_model(
            model,
            region.is_international,
            self.config.strict_international_models,
        )?;
        let resolution = self.image_resolution(model, options)?;

        credit::ensure_credit(&self.upstream, &region, token).await;

        let uploader = Uploader::new(&self.upstream, &region, token);
        let uploaded = uploader.upload_images(images).await?;

        let params = ImageDraftParams {
            model_key,
            prompt,
            negative_prompt: &options.negative_prompt,
            sample_strength: options.sample_strength,
            resolution,
            uploaded: &uploaded,
        };
        let bundle = build_image_draft(&params);
        let history_id = self.submit_draft(&region, token, &bundle).await?;
        tracing::info!(
            "Submitted blend draft: model={} history_id={} inputs={}",
            model,
            history_id,
            uploaded.len()
        );

        let record = self
            .poll_history(
                &region,
                token,
                &history_id,
                GenerationKind::Image,
                DEFAULT_IMAGE_ITEM_COUNT,
            )
            .await?;
        let urls = extract_image_urls(&record);
        if urls.is_empty() {
            return Err(GatewayError::Server(format!(
                "history {history_id} finished without image URLs"
            )));
        }
        Ok(urls)
    }

    /// Text- or image-to-video. Returns the single artifact URL.
    pub async fn generate_video(
        &self,
        model: &str,
        prompt: &str,
        options: &VideoOptions,
        token: &SessionToken,
    ) -> GatewayResult<String> {
        if prompt.trim().is_empty() {
            return Err(GatewayError::Validation("prompt must not be empty".to_string()));
        }
        if !(MIN_VIDEO_DURATION_SECS..=MAX_VIDEO_DURATION_SECS).contains(&options.duration_secs) {
            return Err(GatewayError::Validation(format!(
                "duration must be an integer between {MIN_VIDEO_DURATION_SECS} and {MAX_VIDEO_DURATION_SECS} seconds"
            )));
        }
        if options.file_paths.len() > MAX_VIDEO_FRAMES {
            return Err(GatewayError::Validation(format!(
                "at most {MAX_VIDEO_FRAMES} frame inputs are supported, got {}",
                options.file_paths.len()
            )));
        }
        if !VIDEO_RESOLUTIONS.contains(&options.resolution.as_str()) {
            return Err(GatewayError::Validation(format!(
                "unsupported video resolution '{}' (expected one of {})",
                options.resolution,
                VIDEO_RESOLUTIONS.join(", ")
            )));
        }
        let region = resolve_region(token);
        let model_key = resolve_video_model(
            model,
            region.is_international,
            self.config.strict_international_models,
        )?;
        let resolution = resolution_params("1k", &options.ratio)?;

        credit::ensure_credit(&self.upstream, &region, token).await;

        // First frame before last frame, matching the client's ordering.
        let uploader = Uploader::new(&self.upstream, &region, token);
        let frames = uploader.upload_images(options.file_paths.clone()).await?;

        let params = VideoDraftParams {
            model_key,
            prompt,
            duration_secs: options.duration_secs,
            resolution,
            resolution_label: &options.resolution,
            frames: &frames,
        };
        let bundle = build_video_draft(&params);
        let history_id = self.submit_draft(&region, token, &bundle).await?;
        tracing::info!(
            "Submitted video draft: model={} history_id={} duration={}s frames={}",
            model,
            history_id,
            options.duration_secs,
            frames.len()
        );

        let record = self
            .poll_history(&region, token, &history_id, GenerationKind::Video, 1)
            .await?;
        extract_video_url(&record).ok_or_else(|| {
            GatewayError::Server(format!("history {history_id} finished without a video URL"))
        })
    }

    /// Resolution for an image call, honoring the square-model override.
    fn image_resolution(
        &self,
        model: &str,
        options: &ImageOptions,
    ) -> GatewayResult<ResolutionParams> {
        if model == SPECIAL_SQUARE_MODEL {
            let forced = ResolutionParams {
                width: 1024,
                height: 1024,
                image_ratio: 1,
                resolution_type: "2k",
            };
            tracing::info!(
                "Model {} overrides resolution to 1024x1024/2k (requested {}/{})",
                model,
                options.resolution,
                options.ratio
            );
            return Ok(forced);
        }
        resolution_params(&options.resolution, &options.ratio)
    }

    /// `aigc_draft/generate` → history record id.
    async fn submit_draft(
        &self,
        region: &RegionInfo,
        token: &SessionToken,
        bundle: &super::draft::DraftBundle,
    ) -> GatewayResult<String> {
        let body = bundle.submission_body(region.assistant_id);
        let data = self
            .upstream
            .api_post(
                region,
                token,
                "/mweb/v1/aigc_draft/generate",
                body,
                &[("da_version".to_string(), bundle.da_version.to_string())],
            )
            .await
            .map_err(|e| match e {
                GatewayError::Auth(_) | GatewayError::Transport(_) => e,
                other => GatewayError::DraftSubmit(other.to_string()),
            })?;

        let history_id = data
            .pointer("/aigc_data/history_record_id")
            .or_else(|| data.pointer("/history_record_id"));
        match history_id {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(GatewayError::DraftSubmit(
                "generate response carries no history_record_id".to_string(),
            )),
        }
    }

    /// Drive the smart poller against `get_history_by_ids`.
    async fn poll_history(
        &self,
        region: &RegionInfo,
        token: &SessionToken,
        history_id: &str,
        kind: GenerationKind,
        expected_item_count: usize,
    ) -> GatewayResult<Value> {
        let poller_config = SmartPollerConfig::from_settings(
            &self.config.poller,
            self.config.terminal.clone(),
            kind,
            expected_item_count,
        );
        let poller = SmartPoller::new(poller_config);

        let outcome = poller
            .poll(|| async move {
                let data = self
                    .upstream
                    .api_post(
                        region,
                        token,
                        "/mweb/v1/get_history_by_ids",
                        history_tick_body(history_id, region.assistant_id),
                        &[],
                    )
                    .await?;
                let record = data.get(history_id).cloned().ok_or_else(|| {
                    GatewayError::Server(format!("history {history_id} missing from response"))
                })?;
                Ok(PollTick {
                    status: polling_status(&record, history_id),
                    data: record,
                })
            })
            .await?;

        tracing::info!(
            "Generation finished: history_id={} status={} elapsed={:?}",
            history_id,
            outcome.status,
            outcome.elapsed
        );
        Ok(outcome.data)
    }
}

/// Request body for one poll tick.
fn history_tick_body(history_id: &str, assistant_id: u32) -> Value {
    json!({
        "history_ids": [history_id],
        "image_info": {
            "width": 2048,
            "height": 2048,
            "format": "webp",
            "image_scene_list": [
                {"scene": "smart_crop", "width": 360, "height": 360,
                 "uniq_key": "smart_crop-w:360-h:360", "format": "webp"},
                {"scene": "smart_crop", "width": 480, "height": 480,
                 "uniq_key": "smart_crop-w:480-h:480", "format": "webp"},
                {"scene": "normal", "width": 2400, "height": 2400,
                 "uniq_key": "2400", "format": "webp"},
            ],
        },
        "http_common_info": {"aid": assistant_id},
    })
}

/// Snapshot the fields the poller consumes.
fn polling_status(record: &Value, history_id: &str) -> PollingStatus {
    let fail_code = match record.get("fail_code") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    PollingStatus {
        status: record.get("status").and_then(|v| v.as_i64()).unwrap_or(0),
        fail_code,
        item_count: record
            .get("item_list")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0),
        finish_time: record
            .pointer("/task/finish_time")
            .or_else(|| record.get("finish_time"))
            .and_then(|v| v.as_i64())
            .unwrap_or(0),
        history_id: history_id.to_string(),
    }
}

/// Pull image URLs out of a finished record, in item order.
fn extract_image_urls(record: &Value) -> Vec<String> {
    let Some(items) = record.get("item_list").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            item.pointer("/image/large_images/0/image_url")
                .or_else(|| item.pointer("/common_attr/cover_url"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .collect()
}

/// Pull the video URL out of a finished record.
fn extract_video_url(record: &Value) -> Option<String> {
    let items = record.get("item_list").and_then(|v| v.as_array())?;
    items.iter().find_map(|item| {
        item.pointer("/video/transcoded_video/origin/video_url")
            .or_else(|| item.pointer("/video/video_url"))
            .or_else(|| item.pointer("/common_attr/cover_url"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    })
}

/// Public model list for `/v1/models`.
pub fn list_models() -> Vec<&'static str> {
    models::public_model_names()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polling_status_reads_both_fail_code_shapes() {
        let record = json!({"status": 30, "fail_code": 2038, "item_list": []});
        let status = polling_status(&record, "h1");
        assert_eq!(status.status, 30);
        assert_eq!(status.fail_code, "2038");
        assert_eq!(status.item_count, 0);

        let record = json!({"status": 50, "fail_code": "", "item_list": [1, 2],
                            "task": {"finish_time": 1700000000}});
        let status = polling_status(&record, "h1");
        assert_eq!(status.item_count, 2);
        assert_eq!(status.finish_time, 1_700_000_000);
    }

    #[test]
    fn image_urls_prefer_large_images() {
        let record = json!({"item_list": [
            {"image": {"large_images": [{"image_url": "https://img/1"}]}},
            {"common_attr": {"cover_url": "https://img/2"}},
        ]});
        assert_eq!(extract_image_urls(&record), vec!["https://img/1", "https://img/2"]);
    }

    #[test]
    fn video_url_prefers_transcoded_origin() {
        let record = json!({"item_list": [
            {"video": {"transcoded_video": {"origin": {"video_url": "https://v/1"}}},
             "common_attr": {"cover_url": "https://v/cover"}},
        ]});
        assert_eq!(extract_video_url(&record).as_deref(), Some("https://v/1"));
    }
}
