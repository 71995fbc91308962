//! Public model names → upstream model keys.
//!
//! Two tables per media type: the domestic backend and the international
//! one expose different model sets. Domestic falls back to the default on
//! an unknown name; international rejects it (kept explicit behind the
//! `strict_international_models` switch).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{GatewayError, GatewayResult};

pub const DEFAULT_IMAGE_MODEL: &str = "jimeng-3.0";
pub const DEFAULT_VIDEO_MODEL: &str = "jimeng-video-3.0";

/// Model forced to a fixed 1024×1024 / 2k output regardless of input.
pub const SPECIAL_SQUARE_MODEL: &str = "nanobanana";

const DOMESTIC_IMAGE_MODELS: [(&str, &str); 6] = [
    ("jimeng-4.0", "high_aes_general_v40"),
    ("jimeng-3.0", "high_aes_general_v30l:general_v3.0_18b"),
    ("jimeng-2.1", "high_aes_general_v21_L:general_v2.1_L"),
    ("jimeng-2.0-pro", "high_aes_general_v20_L:general_v2.0_L"),
    ("jimeng-xl-pro", "text2img_xl_sft"),
    ("nanobanana", "external_generate_nanobanana"),
];

const INTERNATIONAL_IMAGE_MODELS: [(&str, &str); 4] = [
    ("jimeng-4.0", "high_aes_general_v40"),
    ("jimeng-3.0", "high_aes_general_v30l_art_fangzhou:general_v3.0_18b"),
    ("jimeng-2.1", "high_aes_general_v21_L:general_v2.1_L"),
    ("nanobanana", "external_generate_nanobanana"),
];

const DOMESTIC_VIDEO_MODELS: [(&str, &str); 3] = [
    ("jimeng-video-3.0", "dreamina_ic_generate_video_model_vgfm_3.0"),
    ("jimeng-video-2.0-pro", "dreamina_ic_generate_video_model_vgfm1.0_pro"),
    ("jimeng-video-2.0", "dreamina_ic_generate_video_model_vgfm1.0"),
];

const INTERNATIONAL_VIDEO_MODELS: [(&str, &str); 2] = [
    ("jimeng-video-3.0", "dreamina_ic_generate_video_model_vgfm_3.0"),
    ("jimeng-video-2.0", "dreamina_ic_generate_video_model_vgfm1.0"),
];

/// Prompts that request a coherent multi-image set (comics, storybooks,
/// "N 张" requests) on jimeng-4.0.
static MULTI_IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"连续|绘本|故事|\d+张").expect("valid regex"));
static IMAGE_COUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)张").expect("valid regex"));

fn lookup(table: &[(&str, &'static str)], name: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
}

/// Resolve a public image model name to the upstream key.
pub fn resolve_image_model(
    name: &str,
    international: bool,
    strict_international: bool,
) -> GatewayResult<&'static str> {
    if international {
        if let Some(key) = lookup(&INTERNATIONAL_IMAGE_MODELS, name) {
            return Ok(key);
        }
        if strict_international {
            return Err(GatewayError::Validation(format!(
                "unknown model '{name}' for international session"
            )));
        }
        return Ok(lookup(&INTERNATIONAL_IMAGE_MODELS, DEFAULT_IMAGE_MODEL)
            .expect("default model is in the table"));
    }

    Ok(lookup(&DOMESTIC_IMAGE_MODELS, name).unwrap_or_else(|| {
        tracing::debug!("Unknown model '{}', falling back to {}", name, DEFAULT_IMAGE_MODEL);
        lookup(&DOMESTIC_IMAGE_MODELS, DEFAULT_IMAGE_MODEL).expect("default model is in the table")
    }))
}

/// Resolve a public video model name to the upstream key.
pub fn resolve_video_model(
    name: &str,
    international: bool,
    strict_international: bool,
) -> GatewayResult<&'static str> {
    if international {
        if let Some(key) = lookup(&INTERNATIONAL_VIDEO_MODELS, name) {
            return Ok(key);
        }
        if strict_international {
            return Err(GatewayError::Validation(format!(
                "unknown model '{name}' for international session"
            )));
        }
        return Ok(lookup(&INTERNATIONAL_VIDEO_MODELS, DEFAULT_VIDEO_MODEL)
            .expect("default model is in the table"));
    }

    Ok(lookup(&DOMESTIC_VIDEO_MODELS, name).unwrap_or_else(|| {
        tracing::debug!("Unknown model '{}', falling back to {}", name, DEFAULT_VIDEO_MODEL);
        lookup(&DOMESTIC_VIDEO_MODELS, DEFAULT_VIDEO_MODEL).expect("default model is in the table")
    }))
}

/// All public model names, for `/v1/models`.
pub fn public_model_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = DOMESTIC_IMAGE_MODELS
        .iter()
        .chain(INTERNATIONAL_IMAGE_MODELS.iter())
        .chain(DOMESTIC_VIDEO_MODELS.iter())
        .chain(INTERNATIONAL_VIDEO_MODELS.iter())
        .map(|(k, _)| *k)
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// How many artifacts a jimeng-4.0 prompt asks for, when it reads like a
/// multi-image request. `None` means a regular single-set generation.
pub fn multi_image_count(model: &str, prompt: &str) -> Option<usize> {
    if model != "jimeng-4.0" || !MULTI_IMAGE_RE.is_match(prompt) {
        return None;
    }
    let count = IMAGE_COUNT_RE
        .captures(prompt)
        .and_then(|c| c[1].parse::<usize>().ok())
        .unwrap_or(4);
    Some(count.max(1))
}
