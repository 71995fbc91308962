//! Resolution / aspect-ratio lookup.
//!
//! Every supported `(resolution, ratio)` pair maps to concrete pixel
//! dimensions, the upstream's ratio enum, and the resolution-type string
//! echoed into the draft. 2k and 4k scale the 1k base grid.

use crate::error::{GatewayError, GatewayResult};

/// Supported aspect ratios, in the upstream's enum order.
pub const RATIOS: [&str; 9] = [
    "1:1", "3:4", "4:3", "16:9", "9:16", "2:3", "3:2", "21:9", "9:21",
];

/// Supported resolution tiers.
pub const RESOLUTIONS: [&str; 3] = ["1k", "2k", "4k"];

/// Concrete generation parameters for one `(resolution, ratio)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionParams {
    pub width: u32,
    pub height: u32,
    /// The upstream's ratio enum value.
    pub image_ratio: u8,
    /// Echoed into `large_image_info.resolution_type`.
    pub resolution_type: &'static str,
}

/// 1k base dimensions and ratio code per aspect ratio.
fn base_for_ratio(ratio: &str) -> Option<(u32, u32, u8)> {
    let entry = match ratio {
        "1:1" => (1024, 1024, 1),
        "3:4" => (864, 1152, 2),
        "4:3" => (1152, 864, 3),
        "16:9" => (1280, 720, 4),
        "9:16" => (720, 1280, 5),
        "2:3" => (832, 1248, 6),
        "3:2" => (1248, 832, 7),
        "21:9" => (1344, 576, 8),
        "9:21" => (576, 1344, 9),
        _ => return None,
    };
    Some(entry)
}

/// Look up the parameters for a `(resolution, ratio)` pair.
pub fn resolution_params(resolution: &str, ratio: &str) -> GatewayResult<ResolutionParams> {
    let (width, height, image_ratio) = base_for_ratio(ratio).ok_or_else(|| {
        GatewayError::Validation(format!(
            "unsupported ratio '{ratio}' (expected one of {})",
            RATIOS.join(", ")
        ))
    })?;

    let (scale, resolution_type) = match resolution {
        "1k" => (1, "1k"),
        "2k" => (2, "2k"),
        "4k" => (4, "4k"),
        _ => {
            return Err(GatewayError::Validation(format!(
                "unsupported resolution '{resolution}' (expected one of {})",
                RESOLUTIONS.join(", ")
            )))
        }
    };

    Ok(ResolutionParams {
        width: width * scale,
        height: height * scale,
        image_ratio,
        resolution_type,
    })
}
