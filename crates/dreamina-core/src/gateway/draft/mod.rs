//! Draft document construction.
//!
//! The upstream describes a generation job as a deeply nested, versioned
//! JSON tree ("draft"). Node builders here compose that tree per mode and
//! serialize it once at the edge; every node gets a fresh identifier in a
//! single pass, and `main_component_id` always equals the sole component's
//! id.

pub mod models;
pub mod resolution;

use rand::Rng;
use serde_json::{json, Value};
use uuid::Uuid;

use self::resolution::ResolutionParams;

const IMAGE_DRAFT_MIN_VERSION: &str = "3.0.2";
const IMAGE_DRAFT_VERSION: &str = "3.0.9";
const VIDEO_DRAFT_VERSION: &str = "3.0.5";

/// Everything `aigc_draft/generate` needs besides the session.
#[derive(Debug, Clone)]
pub struct DraftBundle {
    pub submit_id: String,
    pub draft_content: String,
    pub metrics_extra: String,
    pub root_model: String,
    /// `da_version` query parameter matching the draft's schema version.
    pub da_version: &'static str,
    /// Extra commerce block required by video submissions.
    video_commerce: bool,
}

impl DraftBundle {
    /// Assemble the submission body around the draft content.
    pub fn submission_body(&self, assistant_id: u32) -> Value {
        let mut extend = json!({"root_model": self.root_model});
        if self.video_commerce {
            let commerce = json!({
                "benefit_type": "basic_video_operation_vgfm_v_three",
                "resource_id": "generate_video",
                "resource_id_type": "str",
                "resource_sub_type": "aigc",
            });
            extend["m_video_commerce_info"] = commerce.clone();
            extend["m_video_commerce_info_list"] = json!([commerce]);
        }

        json!({
            "extend": extend,
            "submit_id": self.submit_id,
            "metrics_extra": self.metrics_extra,
            "draft_content": self.draft_content,
            "http_common_info": {"aid": assistant_id},
        })
    }
}

/// Inputs for an image draft; `uploaded` empty means text-to-image,
/// otherwise blend mode with one ability per uri in order.
#[derive(Debug, Clone)]
pub struct ImageDraftParams<'a> {
    pub model_key: &'a str,
    pub prompt: &'a str,
    pub negative_prompt: &'a str,
    pub sample_strength: f64,
    pub resolution: ResolutionParams,
    pub uploaded: &'a [String],
}

/// Inputs for a video draft; `frames` holds first (and optionally last)
/// frame uris, in that order.
#[derive(Debug, Clone)]
pub struct VideoDraftParams<'a> {
    pub model_key: &'a str,
    pub prompt: &'a str,
    pub duration_secs: u32,
    pub resolution: ResolutionParams,
    /// Upstream resolution label, e.g. `720p`.
    pub resolution_label: &'a str,
    pub frames: &'a [String],
}

/// Seed range the web client uses for image generation.
pub fn random_seed() -> u64 {
    rand::thread_rng().gen_range(2_500_000_000u64..2_600_000_000u64)
}

fn node_id() -> String {
    Uuid::new_v4().to_string()
}

fn metrics_extra(submit_id: &str) -> String {
    json!({
        "enterFrom": "click",
        "isDefaultSeed": 1,
        "promptSource": "custom",
        "isRegenerate": false,
        "originSubmitId": submit_id,
    })
    .to_string()
}

fn metadata_node() -> Value {
    json!({
        "type": "",
        "id": node_id(),
        "created_platform": 3,
        "created_platform_version": "",
        "created_time_in_ms": chrono::Utc::now().timestamp_millis(),
        "created_did": "",
    })
}

/// The shared core parameter block; the same ratio/large-image pair is
/// echoed wherever a core param appears.
fn core_param(params: &ImageDraftParams<'_>, prompt: &str) -> Value {
    json!({
        "type": "",
        "id": node_id(),
        "model": params.model_key,
        "prompt": prompt,
        "negative_prompt": params.negative_prompt,
        "seed": random_seed(),
        "sample_strength": params.sample_strength,
        "image_ratio": params.resolution.image_ratio,
        "large_image_info": large_image_info(&params.resolution),
        "intelligent_ratio": false,
    })
}

fn large_image_info(resolution: &ResolutionParams) -> Value {
    json!({
        "type": "",
        "id": node_id(),
        "height": resolution.height,
        "width": resolution.width,
        "resolution_type": resolution.resolution_type,
    })
}

/// One uploaded reference image, as the blend ability expects it.
fn image_ref_node(uri: &str) -> Value {
    json!({
        "type": "image",
        "id": node_id(),
        "source_from": "upload",
        "platform_type": 1,
        "name": "",
        "image_uri": uri,
        "width": 0,
        "height": 0,
        "format": "",
        "uri": uri,
    })
}

/// Frame node for video drafts (same shape, component-level placement).
fn frame_node(uri: &str, resolution: &ResolutionParams) -> Value {
    json!({
        "type": "image",
        "id": node_id(),
        "source_from": "upload",
        "platform_type": 1,
        "name": "",
        "image_uri": uri,
        "width": resolution.width,
        "height": resolution.height,
        "format": "",
        "uri": uri,
    })
}

/// Build a text-to-image or blend draft.
pub fn build_image_draft(params: &ImageDraftParams<'_>) -> DraftBundle {
    let submit_id = node_id();
    let component_id = node_id();
    let blend = !params.uploaded.is_empty();

    let abilities = if blend {
        // Reference-image prompts are marked with a leading "##".
        let prompt = format!("##{}", params.prompt);
        let ability_list: Vec<Value> = params
            .uploaded
            .iter()
            .map(|uri| {
                json!({
                    "type": "",
                    "id": node_id(),
                    "name": "byte_edit",
                    "image_uri_list": [uri],
                    "image_list": [image_ref_node(uri)],
                    "strength": params.sample_strength,
                })
            })
            .collect();
        let placeholders: Vec<Value> = (0..params.uploaded.len())
            .map(|index| json!({"type": "", "id": node_id(), "ability_index": index}))
            .collect();

        json!({
            "type": "",
            "id": node_id(),
            "blend": {
                "type": "",
                "id": node_id(),
                "core_param": core_param(params, &prompt),
                "ability_list": ability_list,
                "prompt_placeholder_info_list": placeholders,
                "postedit_param": {"type": "", "id": node_id(), "generate_type": 0},
                "history_option": {"type": "", "id": node_id()},
            }
        })
    } else {
        json!({
            "type": "",
            "id": node_id(),
            "generate": {
                "type": "",
                "id": node_id(),
                "core_param": core_param(params, params.prompt),
                "history_option": {"type": "", "id": node_id()},
            }
        })
    };

    let draft = json!({
        "type": "draft",
        "id": node_id(),
        "min_version": IMAGE_DRAFT_MIN_VERSION,
        "is_from_tsn": true,
        "version": IMAGE_DRAFT_VERSION,
        "main_component_id": component_id,
        "component_list": [{
            "type": "image_base_component",
            "id": component_id,
            "min_version": IMAGE_DRAFT_MIN_VERSION,
            "aigc_mode": "workbench",
            "metadata": metadata_node(),
            "generate_type": if blend { "blend" } else { "generate" },
            "abilities": abilities,
        }],
    });

    DraftBundle {
        draft_content: draft.to_string(),
        metrics_extra: metrics_extra(&submit_id),
        submit_id,
        root_model: params.model_key.to_string(),
        da_version: IMAGE_DRAFT_VERSION,
        video_commerce: false,
    }
}

/// Build a text-to-video or image-to-video draft. The first frame always
/// precedes the last frame.
pub fn build_video_draft(params: &VideoDraftParams<'_>) -> DraftBundle {
    let submit_id = node_id();
    let component_id = node_id();

    let first_frame = params.frames.first().map(|uri| frame_node(uri, &params.resolution));
    let end_frame = params.frames.get(1).map(|uri| frame_node(uri, &params.resolution));

    let aspect_ratio = ratio_label(&params.resolution);
    let draft = json!({
        "type": "draft",
        "id": node_id(),
        "min_version": VIDEO_DRAFT_VERSION,
        "is_from_tsn": true,
        "version": VIDEO_DRAFT_VERSION,
        "main_component_id": component_id,
        "component_list": [{
            "type": "video_base_component",
            "id": component_id,
            "min_version": "1.0.0",
            "aigc_mode": "workbench",
            "metadata": metadata_node(),
            "generate_type": "gen_video",
            "abilities": {
                "type": "",
                "id": node_id(),
                "gen_video": {
                    "type": "",
                    "id": node_id(),
                    "text_to_video_params": {
                        "type": "",
                        "id": node_id(),
                        "model_req_key": params.model_key,
                        "priority": 0,
                        "seed": random_seed(),
                        "video_aspect_ratio": aspect_ratio,
                        "video_gen_inputs": [{
                            "type": "",
                            "id": node_id(),
                            "min_version": VIDEO_DRAFT_VERSION,
                            "prompt": params.prompt,
                            "resolution": params.resolution_label,
                            "duration_ms": u64::from(params.duration_secs) * 1000,
                            "fps": 24,
                            "video_mode": 2,
                            "first_frame_image": first_frame,
                            "end_frame_image": end_frame,
                        }],
                    },
                    "video_task_extra": metrics_extra(&submit_id),
                }
            },
        }],
    });

    DraftBundle {
        draft_content: draft.to_string(),
        metrics_extra: metrics_extra(&submit_id),
        submit_id,
        root_model: params.model_key.to_string(),
        da_version: VIDEO_DRAFT_VERSION,
        video_commerce: true,
    }
}

fn ratio_label(resolution: &ResolutionParams) -> &'static str {
    match resolution.image_ratio {
        1 => "1:1",
        2 => "3:4",
        3 => "4:3",
        5 => "9:16",
        6 => "2:3",
        7 => "3:2",
        8 => "21:9",
        9 => "9:21",
        _ => "16:9",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::resolution::resolution_params;

    fn image_params<'a>(uploaded: &'a [String]) -> ImageDraftParams<'a> {
        ImageDraftParams {
            model_key: "high_aes_general_v30l:general_v3.0_18b",
            prompt: "a red fox",
            negative_prompt: "",
            sample_strength: 0.5,
            resolution: resolution_params("2k", "16:9").expect("supported"),
            uploaded,
        }
    }

    #[test]
    fn generate_draft_has_matching_component_ids() {
        let bundle = build_image_draft(&image_params(&[]));
        let draft: Value = serde_json::from_str(&bundle.draft_content).expect("valid json");
        let main_id = draft["main_component_id"].as_str().expect("id");
        assert_eq!(draft["component_list"][0]["id"].as_str().expect("id"), main_id);
        assert_eq!(draft["component_list"][0]["generate_type"], "generate");
        let core = &draft["component_list"][0]["abilities"]["generate"]["core_param"];
        assert_eq!(core["prompt"], "a red fox");
        assert_eq!(core["intelligent_ratio"], false);
        assert_eq!(core["image_ratio"], 4);
        assert_eq!(core["large_image_info"]["width"], 2560);
    }

    #[test]
    fn blend_draft_keeps_ability_order() {
        let uploaded = vec!["uri-one".to_string(), "uri-two".to_string()];
        let bundle = build_image_draft(&image_params(&uploaded));
        let draft: Value = serde_json::from_str(&bundle.draft_content).expect("valid json");
        let blend = &draft["component_list"][0]["abilities"]["blend"];

        let abilities = blend["ability_list"].as_array().expect("ability list");
        assert_eq!(abilities.len(), 2);
        assert_eq!(abilities[0]["image_uri_list"][0], "uri-one");
        assert_eq!(abilities[1]["image_uri_list"][0], "uri-two");
        assert_eq!(abilities[0]["name"], "byte_edit");
        assert_eq!(abilities[0]["image_list"][0]["image_uri"], "uri-one");

        let placeholders = blend["prompt_placeholder_info_list"].as_array().expect("list");
        assert_eq!(placeholders.len(), 2);
        for (index, placeholder) in placeholders.iter().enumerate() {
            assert_eq!(placeholder["ability_index"], index as u64);
        }

        assert!(blend["core_param"]["prompt"]
            .as_str()
            .expect("prompt")
            .starts_with("##"));
    }

    #[test]
    fn seed_stays_in_the_client_range() {
        for _ in 0..64 {
            let seed = random_seed();
            assert!((2_500_000_000..2_600_000_000).contains(&seed));
        }
    }

    #[test]
    fn video_draft_orders_frames() {
        let frames = vec!["first".to_string(), "last".to_string()];
        let params = VideoDraftParams {
            model_key: "dreamina_ic_generate_video_model_vgfm_3.0",
            prompt: "a fox running",
            duration_secs: 10,
            resolution: resolution_params("1k", "16:9").expect("supported"),
            resolution_label: "720p",
            frames: &frames,
        };
        let bundle = build_video_draft(&params);
        let draft: Value = serde_json::from_str(&bundle.draft_content).expect("valid json");
        let input = &draft["component_list"][0]["abilities"]["gen_video"]["text_to_video_params"]
            ["video_gen_inputs"][0];
        assert_eq!(input["first_frame_image"]["image_uri"], "first");
        assert_eq!(input["end_frame_image"]["image_uri"], "last");
        assert_eq!(input["duration_ms"], 10_000);
        assert_eq!(input["fps"], 24);

        let body = bundle.submission_body(513695);
        assert_eq!(body["extend"]["root_model"], params.model_key);
        assert!(body["extend"]["m_video_commerce_info"].is_object());
        assert_eq!(body["http_common_info"]["aid"], 513695);
    }

    #[test]
    fn image_submission_body_omits_commerce() {
        let bundle = build_image_draft(&image_params(&[]));
        let body = bundle.submission_body(513695);
        assert!(body["extend"]["m_video_commerce_info"].is_null());
        assert_eq!(body["submit_id"], bundle.submit_id);
        assert_eq!(body["draft_content"], bundle.draft_content);
    }

    #[test]
    fn every_node_gets_a_fresh_id() {
        let bundle = build_image_draft(&image_params(&[]));
        let draft: Value = serde_json::from_str(&bundle.draft_content).expect("valid json");
        let mut ids = Vec::new();
        collect_ids(&draft, &mut ids);
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        // main_component_id mirrors the component id; everything else is unique.
        assert_eq!(unique.len(), ids.len() - 1);
    }

    fn collect_ids(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (key, entry) in map {
                    if key == "id" || key == "main_component_id" {
                        if let Some(s) = entry.as_str() {
                            out.push(s.to_string());
                        }
                    }
                    collect_ids(entry, out);
                }
            }
            Value::Array(list) => {
                for entry in list {
                    collect_ids(entry, out);
                }
            }
            _ => {}
        }
    }
}
