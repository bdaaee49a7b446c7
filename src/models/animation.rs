use serde::{Deserialize, Serialize};

/// Request body of the sprite animate operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnimateParams {
    pub motion_prompt: String,
    pub initial_image: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_ratio_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixel_art_filter: Option<String>,

    /// One of 4, 9, 16, 25, 36, 49, 64.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames: Option<i64>,
    /// One of 64, 128, 256, or 0 for native size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_ratio: Option<f64>,

    #[serde(rename = "loop", skip_serializing_if = "Option::is_none")]
    pub looped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub augment_prompt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gif: Option<bool>,
    pub individual_frames: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spritesheet_with_background: Option<bool>,
}

/// Artifacts returned by a successful animate call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimationResult {
    pub spritesheet_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub individual_frame_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gif_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_cols: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_rows: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_frames: Option<u32>,

    /// Any other fields the service returned, kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AnimationResult {
    /// Grid layout of the sheet, when the service reported one.
    pub fn grid(&self) -> Option<(u32, u32, u32)> {
        match (self.num_cols, self.num_rows, self.num_frames) {
            (Some(cols), Some(rows), Some(frames)) if cols > 0 && rows > 0 => {
                Some((cols, rows, frames))
            }
            _ => None,
        }
    }
}
